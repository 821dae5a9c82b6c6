use colplace_core::document::{
    Document, ElementId, ShapeTemplate, Symbol, SymbolDimensions, SymbolId,
};
use colplace_core::geometry::Point2;
use tracing::debug;

use crate::errors::HostError;

/// 模板名称过滤规则：要么精确匹配名称，要么包含全部关键字（不区分大小写）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    exact: Option<String>,
    keywords: Vec<String>,
}

impl TemplateFilter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            exact: Some(name.into()),
            keywords: Vec::new(),
        }
    }

    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            exact: None,
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, template_name: &str) -> bool {
        if let Some(exact) = &self.exact {
            return exact == template_name;
        }
        let name = template_name.to_lowercase();
        self.keywords
            .iter()
            .all(|keyword| name.contains(keyword.as_str()))
    }
}

/// 批处理核心对宿主文档的全部依赖。
pub trait HostDocument {
    fn list_templates(&self) -> Result<Vec<ShapeTemplate>, HostError>;

    fn list_existing_symbols(
        &self,
        filter: Option<&TemplateFilter>,
    ) -> Result<Vec<Symbol>, HostError>;

    fn create_symbol_with_dimensions(
        &mut self,
        template: &str,
        dimensions: SymbolDimensions,
    ) -> Result<Symbol, HostError>;

    fn activate_symbol(&mut self, symbol: SymbolId) -> Result<(), HostError>;

    fn instantiate_element(
        &mut self,
        symbol: SymbolId,
        point: Point2,
        level: &str,
    ) -> Result<ElementId, HostError>;

    /// 在单个事务中执行 `action`：成功则提交，失败则回滚该事务内的全部修改。
    /// 不支持嵌套事务。
    fn run_in_transaction<T, E, F>(&mut self, name: &str, action: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<HostError>;
}

/// 基于内存 `Document` 的宿主实现，事务通过快照与恢复实现。
#[derive(Debug, Default)]
pub struct MemoryHost {
    document: Document,
    in_transaction: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            document,
            in_transaction: false,
        }
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[inline]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    #[inline]
    fn ensure_usable(&self) -> Result<(), HostError> {
        if self.document.is_valid() {
            Ok(())
        } else {
            Err(HostError::DocumentUnavailable)
        }
    }
}

impl HostDocument for MemoryHost {
    fn list_templates(&self) -> Result<Vec<ShapeTemplate>, HostError> {
        self.ensure_usable()?;
        Ok(self.document.templates().cloned().collect())
    }

    fn list_existing_symbols(
        &self,
        filter: Option<&TemplateFilter>,
    ) -> Result<Vec<Symbol>, HostError> {
        self.ensure_usable()?;
        Ok(self
            .document
            .symbols()
            .filter(|symbol| filter.is_none_or(|filter| filter.matches(&symbol.template)))
            .cloned()
            .collect())
    }

    fn create_symbol_with_dimensions(
        &mut self,
        template: &str,
        dimensions: SymbolDimensions,
    ) -> Result<Symbol, HostError> {
        self.ensure_usable()?;
        let definition = self
            .document
            .template(template)
            .ok_or_else(|| HostError::TemplateNotFound(template.to_string()))?;
        if definition.kind != dimensions.kind() {
            return Err(HostError::KindMismatch {
                template: template.to_string(),
                expected: definition.kind,
                actual: dimensions.kind(),
            });
        }
        let id = self.document.add_symbol(template, dimensions, false);
        self.document
            .symbol(id)
            .cloned()
            .ok_or(HostError::SymbolNotFound(id.get()))
    }

    fn activate_symbol(&mut self, symbol: SymbolId) -> Result<(), HostError> {
        self.ensure_usable()?;
        if self.document.activate_symbol(symbol) {
            Ok(())
        } else {
            Err(HostError::SymbolNotFound(symbol.get()))
        }
    }

    fn instantiate_element(
        &mut self,
        symbol: SymbolId,
        point: Point2,
        level: &str,
    ) -> Result<ElementId, HostError> {
        self.ensure_usable()?;
        let definition = self
            .document
            .symbol(symbol)
            .ok_or(HostError::SymbolNotFound(symbol.get()))?;
        if !definition.is_active {
            return Err(HostError::Rejected(format!(
                "类型 {} 尚未激活",
                definition.name
            )));
        }
        if self.document.level(level).is_none() {
            return Err(HostError::LevelNotFound(level.to_string()));
        }
        Ok(self.document.add_element(symbol, point, level))
    }

    fn run_in_transaction<T, E, F>(&mut self, name: &str, action: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<HostError>,
    {
        self.ensure_usable()?;
        if self.in_transaction {
            return Err(HostError::NestedTransaction.into());
        }

        let snapshot = self.document.clone();
        self.in_transaction = true;
        let outcome = action(self);
        self.in_transaction = false;

        match outcome {
            Ok(value) => {
                debug!(transaction = name, "事务已提交");
                Ok(value)
            }
            Err(err) => {
                let still_valid = self.document.is_valid();
                self.document = snapshot;
                if !still_valid {
                    self.document.invalidate();
                }
                debug!(transaction = name, "事务已回滚");
                Err(err)
            }
        }
    }
}
