pub mod batch;
pub mod catalog;
pub mod factory;
pub mod host;
pub mod matcher;
pub mod resolver;
pub mod shape;

pub mod errors {
    use colplace_core::document::{ShapeKind, SymbolId};
    use thiserror::Error;

    use crate::batch::BatchStatus;

    /// 尺寸校验失败，只影响当前工作项。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ValidationError {
        #[error("{dimension} 不是有限数值")]
        NotFinite { dimension: &'static str },
        #[error("{dimension} 必须大于 0，实际为 {value}")]
        NonPositive { dimension: &'static str, value: f64 },
        #[error("{dimension} 超过上限 {max}，实际为 {value}")]
        ExceedsMaximum {
            dimension: &'static str,
            value: f64,
            max: f64,
        },
    }

    /// 宿主文档接口返回的错误。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum HostError {
        #[error("模板 {0} 不存在")]
        TemplateNotFound(String),
        #[error("类型 #{0} 不存在")]
        SymbolNotFound(u64),
        #[error("标高 {0} 不存在")]
        LevelNotFound(String),
        #[error("模板 {template} 为 {expected:?} 截面，不能使用 {actual:?} 尺寸")]
        KindMismatch {
            template: String,
            expected: ShapeKind,
            actual: ShapeKind,
        },
        #[error("宿主不支持嵌套事务")]
        NestedTransaction,
        #[error("文档已不可用")]
        DocumentUnavailable,
        #[error("宿主拒绝操作: {0}")]
        Rejected(String),
    }

    impl HostError {
        /// 只有文档整体不可用时才需要终止批处理。
        #[inline]
        pub fn is_fatal(&self) -> bool {
            matches!(self, HostError::DocumentUnavailable)
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum CreationCause {
        #[error("模板 {0} 不存在")]
        TemplateNotFound(String),
        #[error("模板 {template} 不支持 {kind:?} 截面")]
        KindMismatch { template: String, kind: ShapeKind },
        #[error("尺寸 {value:.3} 超出模板 {template} 的支持范围 [{min:.3}, {max:.3}]")]
        OutOfRange {
            template: String,
            value: f64,
            min: f64,
            max: f64,
        },
        #[error("新建类型的尺寸 {actual} 与请求的 {requested} 不一致")]
        DimensionMismatch { requested: String, actual: String },
        #[error(transparent)]
        Host(#[from] HostError),
    }

    /// 新建类型失败，附带可供用户参考的替代建议。
    ///
    /// `created` 不为空时宿主中已留下一个未完成的类型，只能靠外层事务回滚撤销。
    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("创建类型失败: {cause}")]
    pub struct CreationError {
        pub cause: CreationCause,
        pub suggestions: Vec<String>,
        pub created: Option<SymbolId>,
    }

    impl CreationError {
        pub fn new(cause: CreationCause) -> Self {
            Self {
                cause,
                suggestions: Vec::new(),
                created: None,
            }
        }

        pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
            self.suggestions.push(suggestion.into());
            self
        }

        pub fn with_created(mut self, symbol: SymbolId) -> Self {
            self.created = Some(symbol);
            self
        }

        #[inline]
        pub fn left_partial_symbol(&self) -> bool {
            self.created.is_some()
        }

        #[inline]
        pub fn is_fatal(&self) -> bool {
            matches!(&self.cause, CreationCause::Host(err) if err.is_fatal())
        }
    }

    impl From<HostError> for CreationError {
        fn from(value: HostError) -> Self {
            Self::new(CreationCause::Host(value))
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ResolutionError {
        #[error("无法为 {key} 找到或创建可用类型: {source}")]
        Unresolved {
            key: String,
            #[source]
            source: CreationError,
        },
        #[error("指定的类型 #{0} 不在类型目录中")]
        UnknownSymbol(u64),
        #[error("没有可用于 {0:?} 截面的模板")]
        NoTemplate(ShapeKind),
        #[error(transparent)]
        Host(#[from] HostError),
    }

    impl ResolutionError {
        #[inline]
        pub fn is_fatal(&self) -> bool {
            match self {
                ResolutionError::Unresolved { source, .. } => source.is_fatal(),
                ResolutionError::Host(err) => err.is_fatal(),
                ResolutionError::UnknownSymbol(_) | ResolutionError::NoTemplate(_) => false,
            }
        }
    }

    /// 单个工作项失败的原因，记录到该项的处理结果中。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ItemError {
        #[error("尺寸校验失败: {0}")]
        Validation(#[from] ValidationError),
        #[error("类型解析失败: {0}")]
        Resolution(#[from] ResolutionError),
        #[error("构件放置失败: {0}")]
        Instantiation(#[source] HostError),
        #[error("事务执行失败: {0}")]
        Transaction(#[source] HostError),
    }

    impl ItemError {
        #[inline]
        pub fn is_fatal(&self) -> bool {
            match self {
                ItemError::Validation(_) => false,
                ItemError::Resolution(err) => err.is_fatal(),
                ItemError::Instantiation(err) | ItemError::Transaction(err) => err.is_fatal(),
            }
        }
    }

    impl From<HostError> for ItemError {
        fn from(value: HostError) -> Self {
            ItemError::Transaction(value)
        }
    }

    #[derive(Debug, Error)]
    pub enum BatchError {
        #[error("批处理只能启动一次，当前状态为 {0:?}")]
        AlreadyStarted(BatchStatus),
    }
}
