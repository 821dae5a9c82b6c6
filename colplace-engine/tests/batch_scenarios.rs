
use colplace_core::document::SymbolDimensions;
use colplace_core::geometry::Point2;
use colplace_engine::batch::{
    BatchOptions, BatchOrchestrator, BatchProgress, BatchResult, BatchStatus, CancelSignal,
    NullProgress, ProgressSink, WorkItem,
};
use colplace_engine::resolver::{ResolutionSource, ResolverOptions, SymbolResolver};
use colplace_engine::shape::ShapeParameters;

use recording_host::{RECT, RecordingHost};

fn run_batch(
    host: &mut RecordingHost,
    items: &[WorkItem],
    progress: &mut dyn ProgressSink,
    cancel: &CancelSignal,
) -> BatchResult {
    let resolver = SymbolResolver::new(ResolverOptions::default());
    let mut orchestrator = BatchOrchestrator::new(host, resolver, BatchOptions::default());
    orchestrator
        .start(items, progress, cancel)
        .expect("批处理启动失败")
}

fn assert_counts_consistent(result: &BatchResult) {
    assert_eq!(result.total_items_processed, result.results.len());
    assert_eq!(
        result.successful_items + result.failed_items,
        result.total_items_processed
    );
}

fn column(index: usize, width: f64, height: f64) -> WorkItem {
    WorkItem::rectangle(
        format!("C{index}"),
        Point2::new(index as f64 * 3.0, 0.0),
        width,
        height,
    )
}

#[test]
fn identical_keys_resolve_to_one_symbol_and_one_creation() {
    let mut host = RecordingHost::with_column_templates();
    let items = vec![
        column(1, 0.4, 0.6),
        column(2, 0.5, 0.5),
        column(3, 0.40004, 0.59996),
        column(4, 0.4, 0.6),
    ];
    let result = run_batch(&mut host, &items, &mut NullProgress, &CancelSignal::new());

    assert_counts_consistent(&result);
    assert_eq!(result.successful_items, 4);
    let first = result.results[0].symbol.expect("应有类型");
    assert_eq!(result.results[2].symbol, Some(first));
    assert_eq!(result.results[3].symbol, Some(first));
    assert_eq!(result.results[2].source, Some(ResolutionSource::Cached));

    assert_eq!(host.create_calls, 2);
    assert!(host.create_calls_by_dimensions.values().all(|count| *count == 1));
    assert_eq!(result.resolver_stats.cache_hits, 2);
}

#[test]
fn rejected_creation_falls_back_to_nearest_existing_symbol() {
    let mut host = RecordingHost::with_column_templates();
    let existing = host.document_mut().add_symbol(
        RECT,
        SymbolDimensions::Rectangular {
            width: 0.5,
            height: 0.5,
        },
        true,
    );
    host.reject_creation_in.insert(RECT.to_string());

    let items = vec![column(1, 0.8, 0.8)];
    let result = run_batch(&mut host, &items, &mut NullProgress, &CancelSignal::new());

    let outcome = &result.results[0];
    assert!(outcome.success);
    assert_eq!(outcome.symbol, Some(existing));
    assert_eq!(outcome.source, Some(ResolutionSource::Fallback));
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.errors.is_empty());
    assert_eq!(result.degraded().count(), 1);
    assert!(result.summary().contains("回退"));
}

#[test]
fn rejected_creation_without_candidates_fails_the_item() {
    let mut host = RecordingHost::with_column_templates();
    host.reject_creation_in.insert(RECT.to_string());

    let items = vec![column(1, 0.8, 0.8), WorkItem::round("R1", Point2::new(0.0, 9.0), 0.6)];
    let result = run_batch(&mut host, &items, &mut NullProgress, &CancelSignal::new());

    assert_counts_consistent(&result);
    assert!(!result.results[0].success);
    assert!(result.results[0].errors.len() >= 2);
    assert!(result.results[1].success);
    assert_eq!(result.status, BatchStatus::Completed);
}

#[test]
fn failed_activation_leaves_no_half_created_symbol() {
    let mut host = RecordingHost::with_column_templates();
    let existing = host.document_mut().add_symbol(
        RECT,
        SymbolDimensions::Rectangular {
            width: 0.5,
            height: 0.5,
        },
        true,
    );
    host.reject_activation_of_created = true;

    let items = vec![column(1, 0.8, 0.8), column(2, 0.5, 0.5)];
    let resolver = SymbolResolver::new(ResolverOptions::default());
    let mut orchestrator = BatchOrchestrator::new(&mut host, resolver, BatchOptions::default());
    let result = orchestrator
        .start(&items, &mut NullProgress, &CancelSignal::new())
        .expect("批处理启动失败");
    let resolver = orchestrator.into_resolver();

    assert_counts_consistent(&result);
    assert!(!result.results[0].success);
    assert!(result.results[0].warnings.is_empty());
    assert_eq!(result.results[1].symbol, Some(existing));
    assert_eq!(result.status, BatchStatus::Completed);

    assert_eq!(host.create_calls, 1);
    let symbols: Vec<_> = host.document().symbols().map(|s| s.id).collect();
    assert_eq!(symbols, vec![existing]);
    assert_eq!(host.document().elements().count(), 1);
    let key = ShapeParameters::create(0.8, 0.8, RECT).unwrap().key();
    assert!(resolver.cached(&key).is_none());
    assert_eq!(resolver.stats().created, 0);
    assert_eq!(resolver.stats().fallbacks, 0);
}

#[test]
fn invalid_item_does_not_abort_the_batch() {
    let mut host = RecordingHost::with_column_templates();
    let items = vec![
        column(1, 0.4, 0.4),
        column(2, 0.5, 0.5),
        column(3, -0.5, 0.5),
        column(4, 0.6, 0.6),
        column(5, 0.7, 0.7),
    ];
    let mut labels = Vec::new();
    let mut progress = |progress: &BatchProgress| labels.push(progress.current_item_label.clone());
    let result = run_batch(&mut host, &items, &mut progress, &CancelSignal::new());

    assert_counts_consistent(&result);
    assert_eq!(result.total_items_processed, 5);
    assert_eq!(result.successful_items, 4);
    assert_eq!(result.failed_items, 1);
    assert!(!result.results[2].success);
    assert!(result.results[2].errors[0].contains("width"));
    assert!(result.results[3].success);
    assert!(result.results[4].success);
    assert_eq!(result.failures().count(), 1);
    assert_eq!(labels, vec!["C1", "C2", "C3", "C4", "C5"]);
}

#[test]
fn cancellation_stops_at_the_next_item_boundary() {
    let mut host = RecordingHost::with_column_templates();
    let items: Vec<_> = (0..10)
        .map(|i| column(i, 0.3 + i as f64 * 0.05, 0.6))
        .collect();
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let mut progress = |progress: &BatchProgress| {
        if progress.current_index == 2 {
            trigger.cancel();
        }
    };
    let result = run_batch(&mut host, &items, &mut progress, &cancel);

    assert_counts_consistent(&result);
    assert!(result.was_cancelled);
    assert_eq!(result.status, BatchStatus::Cancelled);
    assert!((2..=3).contains(&result.total_items_processed));
    assert!(result.summary().contains("取消"));
    assert_eq!(host.document().elements().count(), result.successful_items);
}

#[test]
fn cancelled_before_start_processes_nothing() {
    let mut host = RecordingHost::with_column_templates();
    let cancel = CancelSignal::new();
    cancel.cancel();
    let result = run_batch(&mut host, &[column(1, 0.4, 0.4)], &mut NullProgress, &cancel);
    assert!(result.was_cancelled);
    assert_eq!(result.total_items_processed, 0);
    assert_eq!(host.create_calls, 0);
}

#[test]
fn sixty_six_items_with_three_duplicates_create_sixty_three_symbols() {
    let mut host = RecordingHost::with_column_templates();
    let mut items: Vec<_> = (0..63)
        .map(|i| {
            let width = 0.2 + i as f64 * 0.01;
            column(i, width, width + 0.1)
        })
        .collect();
    for source in [0usize, 10, 20] {
        let width = 0.2 + source as f64 * 0.01;
        items.push(column(100 + source, width, width + 0.1));
    }
    assert_eq!(items.len(), 66);

    let result = run_batch(&mut host, &items, &mut NullProgress, &CancelSignal::new());

    assert_counts_consistent(&result);
    assert_eq!(host.create_calls, 63);
    assert_eq!(result.successful_items, 66);
    assert_eq!(result.failed_items, 0);
    assert_eq!(result.resolver_stats.created, 63);
    assert_eq!(result.resolver_stats.cache_hits, 3);
    assert_eq!(host.document().symbols().count(), 63);
    assert_eq!(host.document().elements().count(), 66);
}

#[test]
fn document_failure_stops_batch_and_keeps_partial_results() {
    let mut host = RecordingHost::with_column_templates();
    host.break_document_on_instantiation = Some(3);
    let items: Vec<_> = (1..=5).map(|i| column(i, 0.4, 0.4)).collect();
    let result = run_batch(&mut host, &items, &mut NullProgress, &CancelSignal::new());

    assert_counts_consistent(&result);
    assert_eq!(result.status, BatchStatus::Failed);
    assert_eq!(result.total_items_processed, 3);
    assert_eq!(result.successful_items, 2);
    assert!(result.fatal_error.is_some());
    assert_eq!(host.instantiate_calls, 3);
    assert_eq!(host.document().elements().count(), 2);
}

#[test]
fn resolver_cache_survives_between_batches() {
    let mut host = RecordingHost::with_column_templates();
    let items = vec![column(1, 0.45, 0.45)];
    let resolver = {
        let mut orchestrator = BatchOrchestrator::new(
            &mut host,
            SymbolResolver::new(ResolverOptions::default()),
            BatchOptions::default(),
        );
        orchestrator
            .start(&items, &mut NullProgress, &CancelSignal::new())
            .unwrap();
        orchestrator.into_resolver()
    };
    let key = ShapeParameters::create(0.45, 0.45, RECT).unwrap().key();
    assert!(resolver.cached(&key).is_some());

    let mut orchestrator = BatchOrchestrator::new(&mut host, resolver, BatchOptions::default());
    let result = orchestrator
        .start(&items, &mut NullProgress, &CancelSignal::new())
        .unwrap();
    assert_eq!(result.results[0].source, Some(ResolutionSource::Cached));
    assert_eq!(host.create_calls, 1);
}

#[test]
fn batch_result_serializes_to_json() {
    let mut host = RecordingHost::with_column_templates();
    let items = vec![column(1, 0.4, 0.4), column(2, 0.0, 0.4)];
    let result = run_batch(&mut host, &items, &mut NullProgress, &CancelSignal::new());

    let json = serde_json::to_value(&result).expect("序列化失败");
    assert_eq!(json["total_items_processed"], 2);
    assert_eq!(json["successful_items"], 1);
    assert_eq!(json["status"], "Completed");
    assert_eq!(json["results"][1]["success"], false);
    assert!(json["started_at"].is_string());
}
