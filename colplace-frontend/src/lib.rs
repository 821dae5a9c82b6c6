pub mod cli;
pub mod errors;
pub mod loader;

use cli::{BatchRun, RunOptions};
use colplace_config::AppConfig;
use errors::FrontendError;
use tracing::info;

/// 启动无界面前端：读取工作项、执行批处理并打印汇总。
pub fn run_cli(config: &AppConfig, options: &RunOptions) -> Result<BatchRun, FrontendError> {
    info!(items = ?options.items, cancel_after = ?options.cancel_after, "启动 CLI 前端");
    cli::run_batch(config, options)
}
