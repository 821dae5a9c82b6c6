use std::path::PathBuf;

use colplace_engine::errors::BatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("读取工作项文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析工作项文件失败: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("工作项 `{label}` 无效: {message}")]
    InvalidItem { label: String, message: String },
    #[error(transparent)]
    Batch(#[from] BatchError),
}
