use std::fs;
use std::path::{Path, PathBuf};

use colplace_config::{AppConfig, ConfigError};
use colplace_engine::batch::{BatchResult, BatchStatus};
use colplace_frontend::cli::RunOptions;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut report_path: Option<PathBuf> = None;
    let mut options = RunOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_override = Some(PathBuf::from(require_value(&mut args, &arg))),
            "--items" => options.items = Some(PathBuf::from(require_value(&mut args, &arg))),
            "--report" => report_path = Some(PathBuf::from(require_value(&mut args, &arg))),
            "--cancel-after" => {
                let value = require_value(&mut args, &arg);
                match value.parse::<usize>() {
                    Ok(n) => options.cancel_after = Some(n),
                    Err(_) => {
                        eprintln!("`--cancel-after` 需要非负整数，实际为 {value}");
                        std::process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);
    info!("启动柱构件批量放置");

    let run = match colplace_frontend::run_cli(&config, &options) {
        Ok(run) => run,
        Err(err) => {
            error!(error = %err, "批处理执行失败");
            std::process::exit(1);
        }
    };

    if let Some(path) = report_path {
        if let Err(err) = write_report(&path, &run.result) {
            error!(path = %path.display(), error = %err, "写入报告失败");
            std::process::exit(1);
        }
        info!(path = %path.display(), "已写入 JSON 报告");
    }

    if run.result.status == BatchStatus::Failed {
        std::process::exit(2);
    }
}

fn require_value(args: &mut impl Iterator<Item = String>, flag: &str) -> String {
    match args.next() {
        Some(value) => value,
        None => {
            eprintln!("`{flag}` 需要提供参数值");
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Error)]
enum ReportError {
    #[error("序列化批处理结果失败: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("写入报告文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn write_report(path: &Path, result: &BatchResult) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
