use std::fmt;

use colplace_config::ResolverConfig;
use colplace_core::document::{ShapeKind, SymbolDimensions};
use serde::Serialize;

use crate::errors::ValidationError;

/// 截面尺寸的默认上限（长度单位），与配置 `resolver.max_dimension` 的缺省值一致。
pub const DEFAULT_MAX_DIMENSION: f64 = ResolverConfig::DEFAULT_MAX_DIMENSION;

/// 经过校验的目标截面尺寸，`key()` 是缓存与去重使用的标识。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeParameters {
    template: String,
    dimensions: SymbolDimensions,
}

impl ShapeParameters {
    pub fn create(
        width: f64,
        height: f64,
        template: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::create_with_limit(width, height, template, DEFAULT_MAX_DIMENSION)
    }

    pub fn create_with_limit(
        width: f64,
        height: f64,
        template: impl Into<String>,
        max_dimension: f64,
    ) -> Result<Self, ValidationError> {
        check_dimension("width", width, max_dimension)?;
        check_dimension("height", height, max_dimension)?;
        Ok(Self {
            template: template.into(),
            dimensions: SymbolDimensions::Rectangular { width, height },
        })
    }

    pub fn circular(diameter: f64, template: impl Into<String>) -> Result<Self, ValidationError> {
        Self::circular_with_limit(diameter, template, DEFAULT_MAX_DIMENSION)
    }

    pub fn circular_with_limit(
        diameter: f64,
        template: impl Into<String>,
        max_dimension: f64,
    ) -> Result<Self, ValidationError> {
        check_dimension("diameter", diameter, max_dimension)?;
        Ok(Self {
            template: template.into(),
            dimensions: SymbolDimensions::Circular { diameter },
        })
    }

    #[inline]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[inline]
    pub fn dimensions(&self) -> &SymbolDimensions {
        &self.dimensions
    }

    #[inline]
    pub fn kind(&self) -> ShapeKind {
        self.dimensions.kind()
    }

    #[inline]
    pub fn primary(&self) -> f64 {
        self.dimensions.primary()
    }

    /// 保持尺寸不变，改挂到另一个模板下。
    pub fn with_template(&self, template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            dimensions: self.dimensions,
        }
    }

    /// 形如 `{模板}_{宽:.3}x{高:.3}` 或 `{模板}_D{直径:.3}`。
    /// 舍入到三位小数后相同的尺寸会得到同一个键。
    pub fn key(&self) -> String {
        format!("{}_{}", self.template, self.dimensions.label())
    }
}

impl fmt::Display for ShapeParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.template, self.dimensions.label())
    }
}

fn check_dimension(
    dimension: &'static str,
    value: f64,
    max_dimension: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { dimension });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositive { dimension, value });
    }
    if value > max_dimension {
        return Err(ValidationError::ExceedsMaximum {
            dimension,
            value,
            max: max_dimension,
        });
    }
    Ok(())
}
