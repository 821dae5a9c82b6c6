use colplace_core::document::Symbol;
use tracing::{debug, info, warn};

use crate::errors::{CreationCause, CreationError};
use crate::host::HostDocument;
use crate::shape::ShapeParameters;

/// 新建类型的尺寸与请求尺寸之间允许的偏差。
pub const DIMENSION_TOLERANCE: f64 = 1e-3;

/// 在模板中按精确尺寸新建类型并激活。登记到类型目录由调用方负责。
///
/// 宿主没有删除类型的操作，新建之后的失败会在错误中带回已创建的类型，
/// 调用方必须让外层事务回滚。
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolFactory;

impl SymbolFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create_symbol<H: HostDocument>(
        &self,
        host: &mut H,
        template_name: &str,
        target: &ShapeParameters,
    ) -> Result<Symbol, CreationError> {
        let templates = host.list_templates()?;
        let Some(template) = templates.iter().find(|t| t.name == template_name) else {
            return Err(
                CreationError::new(CreationCause::TemplateNotFound(template_name.to_string()))
                    .with_suggestion("确认模板已载入当前文档"),
            );
        };

        if template.kind != target.kind() {
            return Err(CreationError::new(CreationCause::KindMismatch {
                template: template_name.to_string(),
                kind: target.kind(),
            })
            .with_suggestion("选择截面类型一致的模板"));
        }

        if let Some(value) = target
            .dimensions()
            .values()
            .into_iter()
            .find(|value| !template.supports(*value))
        {
            return Err(CreationError::new(CreationCause::OutOfRange {
                template: template_name.to_string(),
                value,
                min: template.min_dimension,
                max: template.max_dimension,
            })
            .with_suggestion(format!(
                "将尺寸调整到 [{:.3}, {:.3}] 范围内",
                template.min_dimension, template.max_dimension
            )));
        }

        let mut symbol = host.create_symbol_with_dimensions(template_name, *target.dimensions())?;
        if !symbol
            .dimensions
            .approx_eq(target.dimensions(), DIMENSION_TOLERANCE)
        {
            warn!(symbol = symbol.id.get(), "新建类型尺寸不符，需回滚事务撤销");
            return Err(CreationError::new(CreationCause::DimensionMismatch {
                requested: target.dimensions().label(),
                actual: symbol.dimensions.label(),
            })
            .with_created(symbol.id));
        }
        debug!(symbol = symbol.id.get(), name = %symbol.name, "已新建类型，准备激活");

        if let Err(err) = host.activate_symbol(symbol.id) {
            warn!(symbol = symbol.id.get(), error = %err, "激活新类型失败，需回滚事务撤销");
            return Err(CreationError::from(err).with_created(symbol.id));
        }
        symbol.is_active = true;
        info!(
            symbol = symbol.id.get(),
            template = template_name,
            dimensions = %symbol.dimensions.label(),
            "已创建并激活新类型"
        );
        Ok(symbol)
    }
}
