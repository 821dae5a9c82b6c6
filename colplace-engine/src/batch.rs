use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use colplace_config::{AppConfig, BatchConfig};
use colplace_core::document::{DEFAULT_LEVEL, ElementId, ShapeKind, SymbolId};
use colplace_core::geometry::Point2;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::errors::{BatchError, ItemError, ResolutionError, ValidationError};
use crate::host::HostDocument;
use crate::resolver::{Resolution, ResolutionSource, ResolverStats, SymbolResolver};
use crate::shape::{DEFAULT_MAX_DIMENSION, ShapeParameters};

/// 工作项携带的尺寸来源。
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionHint {
    Explicit { width: f64, height: f64 },
    Diameter(f64),
    /// 只知道一条线段，截面尺寸按 [`LengthInference`] 推断。
    Line { start: Point2, end: Point2 },
}

impl DimensionHint {
    #[inline]
    pub fn kind(&self) -> ShapeKind {
        match self {
            DimensionHint::Diameter(_) => ShapeKind::Circular,
            DimensionHint::Explicit { .. } | DimensionHint::Line { .. } => ShapeKind::Rectangular,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOverride {
    /// 在指定模板内解析。
    Template(String),
    /// 直接使用指定类型。
    Symbol(SymbolId),
}

/// 一次放置请求，批处理期间不会被修改。
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub label: String,
    pub insert: Point2,
    pub hint: DimensionHint,
    pub symbol_override: Option<SymbolOverride>,
    pub level: Option<String>,
}

impl WorkItem {
    pub fn new(label: impl Into<String>, insert: Point2, hint: DimensionHint) -> Self {
        Self {
            label: label.into(),
            insert,
            hint,
            symbol_override: None,
            level: None,
        }
    }

    pub fn rectangle(label: impl Into<String>, insert: Point2, width: f64, height: f64) -> Self {
        Self::new(label, insert, DimensionHint::Explicit { width, height })
    }

    pub fn round(label: impl Into<String>, insert: Point2, diameter: f64) -> Self {
        Self::new(label, insert, DimensionHint::Diameter(diameter))
    }

    /// 以线段中点为插入点。
    pub fn from_line(label: impl Into<String>, start: Point2, end: Point2) -> Self {
        Self::new(label, start.midpoint(end), DimensionHint::Line { start, end })
    }

    pub fn with_override(mut self, symbol_override: SymbolOverride) -> Self {
        self.symbol_override = Some(symbol_override);
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn shape_parameters(
        &self,
        template: &str,
        inference: LengthInference,
        max_dimension: f64,
    ) -> Result<ShapeParameters, ValidationError> {
        match self.hint {
            DimensionHint::Explicit { width, height } => {
                ShapeParameters::create_with_limit(width, height, template, max_dimension)
            }
            DimensionHint::Diameter(diameter) => {
                ShapeParameters::circular_with_limit(diameter, template, max_dimension)
            }
            DimensionHint::Line { start, end } => {
                let (width, height) = inference.infer(start.distance(end));
                ShapeParameters::create_with_limit(width, height, template, max_dimension)
            }
        }
    }
}

/// 单线长推断规则，线长始终作为短边。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LengthInference {
    #[default]
    Square,
    /// 长边 = 线长 × 比例，比例小于 1 时按 1 处理。
    FixedAspect(f64),
}

impl LengthInference {
    pub fn infer(&self, length: f64) -> (f64, f64) {
        match *self {
            LengthInference::Square => (length, length),
            LengthInference::FixedAspect(ratio) => (length, length * ratio.max(1.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub default_level: String,
    pub preferred_template: Option<String>,
    pub template_keywords: Vec<String>,
    pub length_inference: LengthInference,
    pub max_dimension: f64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_LEVEL.to_string(),
            preferred_template: None,
            template_keywords: vec!["Concrete".to_string(), "Column".to_string()],
            length_inference: LengthInference::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let BatchConfig {
            default_level,
            preferred_template,
            template_keywords,
            length_inference,
            aspect_ratio,
        } = config.batch.clone();
        let length_inference = match length_inference {
            colplace_config::LengthInference::Square => LengthInference::Square,
            colplace_config::LengthInference::Aspect => LengthInference::FixedAspect(aspect_ratio),
        };
        Self {
            default_level,
            preferred_template,
            template_keywords,
            length_inference,
            max_dimension: config.resolver.max_dimension,
        }
    }
}

/// 每处理完一项后发送的进度快照。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub current_index: usize,
    pub total: usize,
    pub current_item_label: String,
    pub elapsed: Duration,
}

impl BatchProgress {
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.current_index as f64 / self.total as f64
        }
    }
}

/// 进度接收方，实现不应长时间阻塞。
pub trait ProgressSink {
    fn report(&mut self, progress: &BatchProgress);
}

impl<F> ProgressSink for F
where
    F: FnMut(&BatchProgress),
{
    fn report(&mut self, progress: &BatchProgress) {
        self(progress)
    }
}

/// 通过通道转发进度，发送不会阻塞批处理线程。
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub Sender<BatchProgress>);

impl ProgressSink for ChannelProgress {
    fn report(&mut self, progress: &BatchProgress) {
        // 接收端已关闭时直接丢弃
        let _ = self.0.send(progress.clone());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&mut self, _progress: &BatchProgress) {}
}

/// 协作式取消标志，在工作项之间检查。
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub label: String,
    pub success: bool,
    pub elements_processed: usize,
    pub elements_skipped: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub elapsed: Duration,
    pub message: String,
    pub symbol: Option<SymbolId>,
    pub element: Option<ElementId>,
    pub source: Option<ResolutionSource>,
}

impl ProcessingResult {
    fn placed(item: &WorkItem, placed: PlacedItem, elapsed: Duration) -> Self {
        let PlacedItem {
            resolution,
            element,
        } = placed;
        let message = format!(
            "已使用类型 {} 放置构件 #{}",
            resolution.symbol.name,
            element.get()
        );
        Self {
            label: item.label.clone(),
            success: true,
            elements_processed: 1,
            elements_skipped: 0,
            warnings: resolution.warning.into_iter().collect(),
            errors: Vec::new(),
            elapsed,
            message,
            symbol: Some(resolution.symbol.id),
            element: Some(element),
            source: Some(resolution.source),
        }
    }

    fn failed(item: &WorkItem, err: &ItemError, elapsed: Duration) -> Self {
        let mut errors = vec![err.to_string()];
        if let ItemError::Resolution(ResolutionError::Unresolved { source, .. }) = err {
            errors.extend(source.suggestions.iter().map(|s| format!("建议: {s}")));
        }
        Self {
            label: item.label.clone(),
            success: false,
            elements_processed: 0,
            elements_skipped: 1,
            warnings: Vec::new(),
            errors,
            elapsed,
            message: format!("{} 未能放置", item.label),
            symbol: None,
            element: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    NotStarted,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// 整个批处理的汇总结果。计数只通过 `record` 更新，始终满足
/// `total_items_processed == results.len()` 与 `successful + failed == total`。
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub total_items_processed: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub was_cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<ProcessingResult>,
    pub resolver_stats: ResolverStats,
    pub fatal_error: Option<String>,
}

impl BatchResult {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            status: BatchStatus::Running,
            total_items_processed: 0,
            successful_items: 0,
            failed_items: 0,
            was_cancelled: false,
            started_at,
            finished_at: None,
            results: Vec::new(),
            resolver_stats: ResolverStats::default(),
            fatal_error: None,
        }
    }

    fn record(&mut self, result: ProcessingResult) {
        if result.success {
            self.successful_items += 1;
        } else {
            self.failed_items += 1;
        }
        self.results.push(result);
        self.total_items_processed = self.results.len();
    }

    fn finalize(&mut self, status: BatchStatus, stats: ResolverStats) {
        self.status = status;
        self.resolver_stats = stats;
        self.finished_at = Some(Utc::now());
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|result| !result.success)
    }

    pub fn degraded(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results
            .iter()
            .filter(|result| result.success && !result.warnings.is_empty())
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "共处理 {} 项：成功 {}，失败 {}",
            self.total_items_processed, self.successful_items, self.failed_items
        );
        let degraded = self.degraded().count();
        if degraded > 0 {
            summary.push_str(&format!("，其中 {degraded} 项使用了回退类型"));
        }
        if self.was_cancelled {
            summary.push_str("；批处理已被取消，剩余项目未处理");
        }
        if let Some(err) = &self.fatal_error {
            summary.push_str(&format!("；批处理因文档错误中止: {err}"));
        }
        summary
    }
}

#[derive(Debug, Clone)]
struct PlacedItem {
    resolution: Resolution,
    element: ElementId,
}

enum ItemPlan {
    Override(SymbolId),
    Resolve {
        target: ShapeParameters,
        template: String,
    },
}

/// 逐项顺序处理工作项：解析类型、放置构件，单项失败不影响其余项。
///
/// 每个工作项的所有修改都在一个宿主事务内完成，失败时只回滚该项。
pub struct BatchOrchestrator<'h, H: HostDocument> {
    host: &'h mut H,
    resolver: SymbolResolver,
    options: BatchOptions,
    state: BatchStatus,
}

impl<'h, H: HostDocument> BatchOrchestrator<'h, H> {
    pub fn new(host: &'h mut H, resolver: SymbolResolver, options: BatchOptions) -> Self {
        Self {
            host,
            resolver,
            options,
            state: BatchStatus::NotStarted,
        }
    }

    #[inline]
    pub fn state(&self) -> BatchStatus {
        self.state
    }

    #[inline]
    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    pub fn into_resolver(self) -> SymbolResolver {
        self.resolver
    }

    pub fn start(
        &mut self,
        items: &[WorkItem],
        progress: &mut dyn ProgressSink,
        cancel: &CancelSignal,
    ) -> Result<BatchResult, BatchError> {
        if self.state != BatchStatus::NotStarted {
            return Err(BatchError::AlreadyStarted(self.state));
        }
        self.state = BatchStatus::Running;

        let started = Instant::now();
        let total = items.len();
        let mut result = BatchResult::new(Utc::now());
        info!(total, "开始批量放置构件");

        if let Err(err) = self.resolver.sync_catalog(&*self.host) {
            error!(error = %err, "无法读取类型目录，批处理中止");
            result.fatal_error = Some(err.to_string());
            return Ok(self.finish(result, BatchStatus::Failed));
        }

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = index, total, "批处理已取消");
                result.was_cancelled = true;
                break;
            }

            let item_started = Instant::now();
            let outcome = self.process_item(item);
            let elapsed = item_started.elapsed();
            let mut fatal = None;
            match outcome {
                Ok(placed) => {
                    debug!(
                        index,
                        label = %item.label,
                        element = placed.element.get(),
                        "工作项已完成"
                    );
                    result.record(ProcessingResult::placed(item, placed, elapsed));
                }
                Err(err) => {
                    warn!(index, label = %item.label, error = %err, "工作项失败，继续处理后续项");
                    if err.is_fatal() {
                        fatal = Some(err.to_string());
                    }
                    result.record(ProcessingResult::failed(item, &err, elapsed));
                }
            }

            progress.report(&BatchProgress {
                current_index: index + 1,
                total,
                current_item_label: item.label.clone(),
                elapsed: started.elapsed(),
            });

            if let Some(err) = fatal {
                error!(error = %err, "文档不可用，批处理中止");
                result.fatal_error = Some(err);
                return Ok(self.finish(result, BatchStatus::Failed));
            }
        }

        let status = if result.was_cancelled {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
        Ok(self.finish(result, status))
    }

    fn finish(&mut self, mut result: BatchResult, status: BatchStatus) -> BatchResult {
        self.state = status;
        result.finalize(status, self.resolver.stats().clone());
        info!(
            status = ?status,
            processed = result.total_items_processed,
            succeeded = result.successful_items,
            failed = result.failed_items,
            "批处理结束"
        );
        result
    }

    fn process_item(&mut self, item: &WorkItem) -> Result<PlacedItem, ItemError> {
        let plan = self.plan_item(item)?;
        let level = item
            .level
            .clone()
            .unwrap_or_else(|| self.options.default_level.clone());

        let checkpoint = self.resolver.checkpoint();
        let resolver = &mut self.resolver;
        let outcome = self.host.run_in_transaction(&item.label, |host| {
            let resolution = match &plan {
                ItemPlan::Override(id) => resolver.resolve_override(host, *id)?,
                ItemPlan::Resolve { target, template } => {
                    resolver.resolve(host, target, template)?
                }
            };
            let element = host
                .instantiate_element(resolution.symbol.id, item.insert, &level)
                .map_err(ItemError::Instantiation)?;
            Ok(PlacedItem {
                resolution,
                element,
            })
        });

        if outcome.is_err() {
            self.resolver.rollback(checkpoint);
        }
        outcome
    }

    fn plan_item(&self, item: &WorkItem) -> Result<ItemPlan, ItemError> {
        if let Some(SymbolOverride::Symbol(id)) = &item.symbol_override {
            return Ok(ItemPlan::Override(*id));
        }
        let template = self.select_template(item)?;
        let target = item.shape_parameters(
            &template,
            self.options.length_inference,
            self.options.max_dimension,
        )?;
        Ok(ItemPlan::Resolve { target, template })
    }

    fn select_template(&self, item: &WorkItem) -> Result<String, ResolutionError> {
        if let Some(SymbolOverride::Template(name)) = &item.symbol_override {
            return Ok(name.clone());
        }
        let kind = item.hint.kind();
        let catalog = self.resolver.catalog();
        if let Some(name) = &self.options.preferred_template {
            if catalog
                .template(name)
                .is_some_and(|template| template.kind == kind)
            {
                return Ok(name.clone());
            }
        }
        catalog
            .preferred_template(kind, &self.options.template_keywords)
            .map(|template| template.name.clone())
            .ok_or(ResolutionError::NoTemplate(kind))
    }
}
