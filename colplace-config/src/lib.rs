use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `COLPLACE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("COLPLACE_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "FrontendConfig::default_show_progress")]
    pub show_progress: bool,
}

impl FrontendConfig {
    fn default_show_progress() -> bool {
        true
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            show_progress: Self::default_show_progress(),
        }
    }
}

/// 类型匹配与尺寸校验参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// 自动复用现有类型的容差，默认 0 即只复用精确匹配。
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default = "ResolverConfig::default_max_dimension")]
    pub max_dimension: f64,
}

impl ResolverConfig {
    pub const DEFAULT_MAX_DIMENSION: f64 = 10.0;

    fn default_max_dimension() -> f64 {
        Self::DEFAULT_MAX_DIMENSION
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
        }
    }
}

/// 仅有一条线长时如何推断截面尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthInference {
    /// 按正方形处理，宽高都取线长。
    #[default]
    Square,
    /// 线长作为短边，长边 = 线长 × `aspect_ratio`。
    Aspect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "BatchConfig::default_level")]
    pub default_level: String,
    #[serde(default)]
    pub preferred_template: Option<String>,
    #[serde(default = "BatchConfig::default_keywords")]
    pub template_keywords: Vec<String>,
    #[serde(default)]
    pub length_inference: LengthInference,
    #[serde(default = "BatchConfig::default_aspect_ratio")]
    pub aspect_ratio: f64,
}

impl BatchConfig {
    fn default_level() -> String {
        "Level 1".to_string()
    }

    fn default_keywords() -> Vec<String> {
        vec!["Concrete".to_string(), "Column".to_string()]
    }

    fn default_aspect_ratio() -> f64 {
        1.0
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_level: Self::default_level(),
            preferred_template: None,
            template_keywords: Self::default_keywords(),
            length_inference: LengthInference::default(),
            aspect_ratio: Self::default_aspect_ratio(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
