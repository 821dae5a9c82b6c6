use std::collections::HashMap;

use colplace_config::ResolverConfig;
use colplace_core::document::{Symbol, SymbolId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::errors::{HostError, ResolutionError};
use crate::factory::SymbolFactory;
use crate::host::{HostDocument, TemplateFilter};
use crate::matcher::{MatchScore, SymbolMatcher};
use crate::shape::ShapeParameters;

/// 尺寸上限由 `BatchOptions` 在生成目标尺寸时校验，这里只保留匹配容差。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResolverOptions {
    pub tolerance: f64,
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            tolerance: config.tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionSource {
    Cached,
    Matched,
    Created,
    Fallback,
    Override,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub symbol: Symbol,
    pub source: ResolutionSource,
    pub score: Option<MatchScore>,
    /// 回退到最接近类型时的降级提示。
    pub warning: Option<String>,
}

impl Resolution {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

/// 只统计已提交的解析结果，事务回滚时一并撤销；`failures` 记录解析失败次数，回滚后保留。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub cache_hits: usize,
    pub matched: usize,
    pub created: usize,
    pub fallbacks: usize,
    pub failures: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    symbol: Symbol,
    degraded: Option<String>,
}

/// 事务开始前的解析器状态，回滚时据此丢弃未提交的缓存与登记。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverCheckpoint {
    catalog_len: usize,
    journal_len: usize,
    activations_len: usize,
    stats: ResolverStats,
}

/// 组合匹配与新建，按尺寸键缓存结果：同一个键最多新建一次类型。
///
/// 解析顺序为：缓存 → 容差内匹配 → 新建 → 最接近的现有类型（降级成功）→ 失败。
/// 不做内部加锁，同一时刻只应由一个批处理使用。
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    catalog: SymbolCatalog,
    matcher: SymbolMatcher,
    factory: SymbolFactory,
    options: ResolverOptions,
    cache: HashMap<String, CacheEntry>,
    journal: Vec<String>,
    activations: Vec<SymbolId>,
    stats: ResolverStats,
}

impl SymbolResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self::with_catalog(options, SymbolCatalog::new())
    }

    pub fn with_catalog(options: ResolverOptions, catalog: SymbolCatalog) -> Self {
        Self {
            catalog,
            matcher: SymbolMatcher::new(options.tolerance),
            factory: SymbolFactory::new(),
            options,
            cache: HashMap::new(),
            journal: Vec::new(),
            activations: Vec::new(),
            stats: ResolverStats::default(),
        }
    }

    #[inline]
    pub fn catalog(&self) -> &SymbolCatalog {
        &self.catalog
    }

    #[inline]
    pub fn options(&self) -> ResolverOptions {
        self.options
    }

    #[inline]
    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    #[inline]
    pub fn cached(&self, key: &str) -> Option<&Symbol> {
        self.cache.get(key).map(|entry| &entry.symbol)
    }

    #[inline]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn sync_catalog<H: HostDocument>(&mut self, host: &H) -> Result<usize, HostError> {
        self.catalog.refresh(host)
    }

    /// 为目标尺寸解析出可用类型。`preferred_template` 为空时使用目标自带的模板名，
    /// 缓存键始终按实际使用的模板生成。
    pub fn resolve<H: HostDocument>(
        &mut self,
        host: &mut H,
        target: &ShapeParameters,
        preferred_template: &str,
    ) -> Result<Resolution, ResolutionError> {
        let retargeted;
        let target = if preferred_template.is_empty() || preferred_template == target.template() {
            target
        } else {
            retargeted = target.with_template(preferred_template);
            &retargeted
        };
        let template = target.template();
        let key = target.key();
        if let Some(entry) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            debug!(key = %key, symbol = entry.symbol.id.get(), "命中类型缓存");
            return Ok(Resolution {
                symbol: entry.symbol.clone(),
                source: ResolutionSource::Cached,
                score: None,
                warning: entry.degraded.clone(),
            });
        }

        let filter = TemplateFilter::named(template);
        let best = self
            .matcher
            .find_best_match(target, self.catalog.list_symbols(Some(&filter)));

        if let Some(found) = best.as_ref().filter(|found| found.within_tolerance) {
            let symbol = self.ensure_active(host, found.symbol.clone())?;
            debug!(
                key = %key,
                symbol = symbol.id.get(),
                score = found.score.value(),
                "复用容差内的现有类型"
            );
            self.remember(key, symbol.clone(), None);
            self.stats.matched += 1;
            return Ok(Resolution {
                symbol,
                source: ResolutionSource::Matched,
                score: Some(found.score),
                warning: None,
            });
        }

        let creation_error = match self.factory.create_symbol(host, template, target) {
            Ok(symbol) => {
                self.catalog.register(symbol.clone());
                self.remember(key, symbol.clone(), None);
                self.stats.created += 1;
                return Ok(Resolution {
                    symbol,
                    source: ResolutionSource::Created,
                    score: None,
                    warning: None,
                });
            }
            Err(err) => err,
        };

        // 新建后失败的类型已留在宿主中，只能让外层事务回滚，不能降级提交
        let near = match best {
            Some(near) if !creation_error.is_fatal() && !creation_error.left_partial_symbol() => {
                near
            }
            Some(_) => {
                self.stats.failures += 1;
                return Err(ResolutionError::Unresolved {
                    key,
                    source: creation_error,
                });
            }
            None => {
                self.stats.failures += 1;
                return Err(ResolutionError::Unresolved {
                    key,
                    source: creation_error
                        .with_suggestion(format!("先在模板 {template} 中手动创建所需类型")),
                });
            }
        };

        let symbol = self.ensure_active(host, near.symbol)?;
        let warning = format!(
            "{}: 无法新建类型（{}），已改用最接近的类型 {}（偏差 {:.3}）",
            target,
            creation_error.cause,
            symbol.name,
            near.score.value()
        );
        warn!(key = %key, symbol = symbol.id.get(), cause = %creation_error.cause, "降级使用最接近的类型");
        self.remember(key, symbol.clone(), Some(warning.clone()));
        self.stats.fallbacks += 1;
        Ok(Resolution {
            symbol,
            source: ResolutionSource::Fallback,
            score: Some(near.score),
            warning: Some(warning),
        })
    }

    /// 直接使用指定类型，跳过匹配与新建。
    pub fn resolve_override<H: HostDocument>(
        &mut self,
        host: &mut H,
        id: SymbolId,
    ) -> Result<Resolution, ResolutionError> {
        let symbol = self
            .catalog
            .symbol(id)
            .cloned()
            .ok_or(ResolutionError::UnknownSymbol(id.get()))?;
        let symbol = self.ensure_active(host, symbol)?;
        Ok(Resolution {
            symbol,
            source: ResolutionSource::Override,
            score: None,
            warning: None,
        })
    }

    pub fn checkpoint(&self) -> ResolverCheckpoint {
        ResolverCheckpoint {
            catalog_len: self.catalog.len(),
            journal_len: self.journal.len(),
            activations_len: self.activations.len(),
            stats: self.stats.clone(),
        }
    }

    /// 宿主事务回滚后调用，使缓存与目录不再引用已被撤销的类型。
    pub fn rollback(&mut self, checkpoint: ResolverCheckpoint) {
        let journal_len = checkpoint.journal_len.min(self.journal.len());
        for key in self.journal.drain(journal_len..) {
            self.cache.remove(&key);
        }
        let activations_len = checkpoint.activations_len.min(self.activations.len());
        for id in self.activations.drain(activations_len..) {
            self.catalog.set_active(id, false);
        }
        self.catalog.truncate(checkpoint.catalog_len);
        let failures = self.stats.failures;
        self.stats = ResolverStats {
            failures,
            ..checkpoint.stats
        };
        debug!(cache = self.cache.len(), catalog = self.catalog.len(), "解析器已回滚");
    }

    fn ensure_active<H: HostDocument>(
        &mut self,
        host: &mut H,
        mut symbol: Symbol,
    ) -> Result<Symbol, HostError> {
        if !symbol.is_active {
            host.activate_symbol(symbol.id)?;
            self.catalog.set_active(symbol.id, true);
            self.activations.push(symbol.id);
            symbol.is_active = true;
        }
        Ok(symbol)
    }

    fn remember(&mut self, key: String, symbol: Symbol, degraded: Option<String>) {
        self.journal.push(key.clone());
        self.cache.insert(key, CacheEntry { symbol, degraded });
    }
}

#[cfg(test)]
mod tests {
    use colplace_core::document::{ShapeKind, ShapeTemplate, SymbolDimensions};

    use super::*;
    use crate::host::MemoryHost;

    const RECT: &str = "Concrete-Rectangular-Column";

    fn host() -> MemoryHost {
        let mut host = MemoryHost::new();
        let doc = host.document_mut();
        doc.add_template(ShapeTemplate::new(RECT, ShapeKind::Rectangular).with_range(0.2, 1.0));
        doc.add_symbol(
            RECT,
            SymbolDimensions::Rectangular {
                width: 0.4,
                height: 0.4,
            },
            false,
        );
        host
    }

    fn resolver(host: &MemoryHost, tolerance: f64) -> SymbolResolver {
        let catalog = SymbolCatalog::load(host).expect("load catalog");
        SymbolResolver::with_catalog(
            ResolverOptions { tolerance },
            catalog,
        )
    }

    #[test]
    fn exact_existing_symbol_is_activated_and_cached() {
        let mut host = host();
        let mut resolver = resolver(&host, 0.0);
        let target = ShapeParameters::create(0.4, 0.4, RECT).unwrap();

        let first = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(first.source, ResolutionSource::Matched);
        assert!(first.symbol.is_active);
        assert!(host.document().symbol(first.symbol.id).unwrap().is_active);

        let second = resolver.resolve(&mut host, &target, "").unwrap();
        assert_eq!(second.source, ResolutionSource::Cached);
        assert_eq!(second.symbol.id, first.symbol.id);
        assert_eq!(resolver.stats().cache_hits, 1);
    }

    #[test]
    fn missing_dimensions_are_created_once() {
        let mut host = host();
        let mut resolver = resolver(&host, 0.0);
        let target = ShapeParameters::create(0.45, 0.6, RECT).unwrap();

        let created = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(created.source, ResolutionSource::Created);
        let again = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(again.symbol.id, created.symbol.id);
        assert_eq!(host.document().symbols().count(), 2);
        assert_eq!(resolver.stats().created, 1);
        assert_eq!(resolver.catalog().len(), 2);
        assert_eq!(resolver.cached(&target.key()).map(|s| s.id), Some(created.symbol.id));
    }

    #[test]
    fn tolerance_allows_reuse_of_close_symbol() {
        let mut host = host();
        let mut resolver = resolver(&host, 0.05);
        let target = ShapeParameters::create(0.42, 0.42, RECT).unwrap();
        let resolution = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(resolution.source, ResolutionSource::Matched);
        assert_eq!(host.document().symbols().count(), 1);
    }

    #[test]
    fn creation_failure_falls_back_to_nearest_with_warning() {
        let mut host = host();
        let mut resolver = resolver(&host, 0.0);
        let target = ShapeParameters::create(2.0, 2.0, RECT).unwrap();

        let resolution = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback);
        assert!(resolution.is_degraded());
        assert!((resolution.symbol.dimensions.primary() - 0.4).abs() < 1e-9);

        let cached = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(cached.source, ResolutionSource::Cached);
        assert!(cached.is_degraded());
        assert_eq!(resolver.stats().fallbacks, 1);
    }

    #[test]
    fn no_candidates_and_failed_creation_is_an_error() {
        let mut host = MemoryHost::new();
        let mut resolver = resolver(&host, 0.0);
        let target = ShapeParameters::create(0.4, 0.4, "Missing").unwrap();
        let err = resolver.resolve(&mut host, &target, "").unwrap_err();
        match err {
            ResolutionError::Unresolved { key, source } => {
                assert_eq!(key, "Missing_0.400x0.400");
                assert!(!source.suggestions.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(resolver.stats().failures, 1);
    }

    #[test]
    fn rollback_discards_uncommitted_work() {
        let mut host = host();
        let mut resolver = resolver(&host, 0.0);
        let checkpoint = resolver.checkpoint();

        let existing = ShapeParameters::create(0.4, 0.4, RECT).unwrap();
        let fresh = ShapeParameters::create(0.5, 0.5, RECT).unwrap();
        let matched = resolver.resolve(&mut host, &existing, RECT).unwrap();
        resolver.resolve(&mut host, &fresh, RECT).unwrap();
        assert_eq!(resolver.cache_len(), 2);

        resolver.rollback(checkpoint);
        assert_eq!(resolver.cache_len(), 0);
        assert_eq!(resolver.catalog().len(), 1);
        assert!(!resolver.catalog().symbol(matched.symbol.id).unwrap().is_active);
        assert_eq!(resolver.stats(), &ResolverStats::default());
    }

    #[test]
    fn rollback_keeps_failure_count() {
        let mut host = MemoryHost::new();
        let mut resolver = resolver(&host, 0.0);
        let checkpoint = resolver.checkpoint();
        let target = ShapeParameters::create(0.4, 0.4, "Missing").unwrap();
        assert!(resolver.resolve(&mut host, &target, "").is_err());
        resolver.rollback(checkpoint);
        assert_eq!(resolver.stats().failures, 1);
    }

    #[test]
    fn cache_key_follows_effective_template() {
        let mut host = host();
        host.document_mut()
            .add_template(ShapeTemplate::new("Steel-Column", ShapeKind::Rectangular));
        let mut resolver = resolver(&host, 0.0);
        let target = ShapeParameters::create(0.4, 0.4, "Steel-Column").unwrap();

        let resolution = resolver.resolve(&mut host, &target, RECT).unwrap();
        assert_eq!(resolution.symbol.template, RECT);
        assert!(resolver.cached(&target.key()).is_none());
        assert_eq!(
            resolver.cached(&target.with_template(RECT).key()).map(|s| s.id),
            Some(resolution.symbol.id)
        );

        let steel = resolver.resolve(&mut host, &target, "").unwrap();
        assert_eq!(steel.source, ResolutionSource::Created);
        assert_eq!(steel.symbol.template, "Steel-Column");
    }

    #[test]
    fn override_uses_catalog_symbol() {
        let mut host = host();
        let mut resolver = resolver(&host, 0.0);
        let id = host.document().symbols().next().unwrap().id;
        let resolution = resolver.resolve_override(&mut host, id).unwrap();
        assert_eq!(resolution.source, ResolutionSource::Override);
        assert!(resolution.symbol.is_active);

        let err = resolver
            .resolve_override(&mut host, SymbolId::new(99))
            .unwrap_err();
        assert_eq!(err, ResolutionError::UnknownSymbol(99));
    }
}
