use std::path::PathBuf;

use colplace_config::AppConfig;
use colplace_core::document::{Document, ShapeKind, ShapeTemplate, SymbolDimensions};
use colplace_engine::batch::{
    BatchOptions, BatchOrchestrator, BatchProgress, BatchResult, CancelSignal, WorkItem,
};
use colplace_engine::host::MemoryHost;
use colplace_engine::resolver::{ResolverOptions, SymbolResolver};
use tracing::info;

use crate::errors::FrontendError;
use crate::loader::{ItemSource, load_items_or_demo};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 工作项文件，缺省时读取环境变量或使用内置示例。
    pub items: Option<PathBuf>,
    /// 处理完第 n 项后请求取消，用于演示协作式取消。
    pub cancel_after: Option<usize>,
}

/// 一次运行的结果与运行后的文档。
#[derive(Debug)]
pub struct BatchRun {
    pub result: BatchResult,
    pub document: Document,
    pub source: ItemSource,
}

/// 内置示例文档：一个木柱模板、一个限定尺寸范围的矩形混凝土柱模板和一个圆柱模板，
/// 矩形模板中预置了一个未激活的 0.4x0.4 类型。
pub fn demo_document() -> Document {
    let mut document = Document::new();
    document.add_level("Level 2", 3.6);
    document.add_template(ShapeTemplate::new("Timber-Post", ShapeKind::Rectangular));
    document.add_template(
        ShapeTemplate::new("Concrete-Rectangular-Column", ShapeKind::Rectangular)
            .with_range(0.2, 1.5),
    );
    document.add_template(ShapeTemplate::new("Concrete-Round-Column", ShapeKind::Circular));
    document.add_symbol(
        "Concrete-Rectangular-Column",
        SymbolDimensions::Rectangular {
            width: 0.4,
            height: 0.4,
        },
        false,
    );
    document
}

/// 读取工作项后在示例文档上执行一次批处理。
pub fn run_batch(config: &AppConfig, options: &RunOptions) -> Result<BatchRun, FrontendError> {
    let loaded = load_items_or_demo(options.items.as_deref())?;
    match &loaded.source {
        ItemSource::File(path) => println!("工作项来源: {}", path.display()),
        ItemSource::Demo => println!("工作项来源: 内置示例"),
    }
    let (result, document) = run_items(config, &loaded.items, options.cancel_after)?;
    Ok(BatchRun {
        result,
        document,
        source: loaded.source,
    })
}

/// 对给定工作项执行批处理，打印进度与汇总，返回结果和运行后的文档。
pub fn run_items(
    config: &AppConfig,
    items: &[WorkItem],
    cancel_after: Option<usize>,
) -> Result<(BatchResult, Document), FrontendError> {
    let mut host = MemoryHost::with_document(demo_document());
    let resolver = SymbolResolver::new(ResolverOptions::from(&config.resolver));
    let batch_options = BatchOptions::from_config(config);
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let show_progress = config.frontend.show_progress;
    let mut progress = |progress: &BatchProgress| {
        if show_progress {
            println!(
                "[{}/{}] {:>5.1}% {}",
                progress.current_index,
                progress.total,
                progress.fraction() * 100.0,
                progress.current_item_label
            );
        }
        if cancel_after.is_some_and(|limit| progress.current_index >= limit) {
            trigger.cancel();
        }
    };

    let result = {
        let mut orchestrator = BatchOrchestrator::new(&mut host, resolver, batch_options);
        orchestrator.start(items, &mut progress, &cancel)?
    };
    info!(status = ?result.status, "CLI 批处理完成");
    print_summary(&result);
    Ok((result, host.into_document()))
}

fn print_summary(result: &BatchResult) {
    println!("{}", result.summary());
    for item in result.degraded() {
        for warning in &item.warnings {
            println!("  [回退] {}: {warning}", item.label);
        }
    }
    for item in result.failures() {
        println!("  [失败] {}", item.label);
        for err in &item.errors {
            println!("      {err}");
        }
    }
    let stats = &result.resolver_stats;
    println!(
        "类型解析: 缓存命中 {}，复用 {}，新建 {}，回退 {}，失败 {}",
        stats.cache_hits, stats.matched, stats.created, stats.fallbacks, stats.failures
    );
}

#[cfg(test)]
mod tests {
    use colplace_engine::batch::BatchStatus;

    use super::*;
    use crate::loader::demo_items;

    #[test]
    fn demo_batch_places_valid_items() {
        let config = AppConfig::default();
        let items = demo_items();
        let (result, document) = run_items(&config, &items, None).expect("run demo");

        assert_eq!(result.status, BatchStatus::Completed);
        assert_eq!(result.total_items_processed, items.len());
        assert_eq!(result.failed_items, 1);
        assert_eq!(result.degraded().count(), 1);
        assert_eq!(document.elements().count(), result.successful_items);
        // C4 与 C2 尺寸相同，只新建一次
        assert!(result.resolver_stats.cache_hits >= 2);
    }

    #[test]
    fn cancel_after_stops_early() {
        let config = AppConfig::default();
        let (result, _) = run_items(&config, &demo_items(), Some(2)).expect("run demo");
        assert!(result.was_cancelled);
        assert_eq!(result.total_items_processed, 2);
        assert_eq!(result.status, BatchStatus::Cancelled);
    }

    #[test]
    fn explicit_item_file_is_used() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[[items]]\nlabel = \"only\"\ndiameter = 0.45").expect("write items");
        let options = RunOptions {
            items: Some(file.path().to_path_buf()),
            cancel_after: None,
        };
        let run = run_batch(&AppConfig::default(), &options).expect("run file");
        assert_eq!(run.source, ItemSource::File(file.path().to_path_buf()));
        assert_eq!(run.result.total_items_processed, 1);
        assert_eq!(run.result.successful_items, 1);
    }
}
