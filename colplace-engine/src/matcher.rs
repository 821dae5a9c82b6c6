use colplace_core::document::{Symbol, SymbolDimensions};
use serde::Serialize;

use crate::shape::ShapeParameters;

/// 浮点比较用的容差，低于此值的偏差视为 0。
pub const SCORE_EPSILON: f64 = 1e-9;

/// 候选类型与目标尺寸的偏差，越小越好。
///
/// `primary` 比较短边（圆形为直径）；`secondary` 比较长边，用于区分短边相同的候选。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchScore {
    pub primary: f64,
    pub secondary: f64,
}

impl MatchScore {
    pub fn between(candidate: &SymbolDimensions, target: &SymbolDimensions) -> Self {
        Self {
            primary: (candidate.primary() - target.primary()).abs(),
            secondary: (candidate.secondary() - target.secondary()).abs(),
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.primary
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        self.primary <= SCORE_EPSILON && self.secondary <= SCORE_EPSILON
    }

    #[inline]
    pub fn within(&self, tolerance: f64) -> bool {
        self.primary <= tolerance + SCORE_EPSILON && self.secondary <= tolerance + SCORE_EPSILON
    }

    /// 严格优于：先比主偏差，再比次偏差。相等时不替换，保证先登记者胜出。
    fn better_than(&self, other: &MatchScore) -> bool {
        if self.primary < other.primary - SCORE_EPSILON {
            return true;
        }
        (self.primary - other.primary).abs() <= SCORE_EPSILON
            && self.secondary < other.secondary - SCORE_EPSILON
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMatch {
    pub symbol: Symbol,
    pub score: MatchScore,
    /// 偏差超出容差时仍返回最接近的候选，供调用方回退使用。
    pub within_tolerance: bool,
}

/// 在候选中找出最接近目标尺寸的类型。候选列表为空（或没有同类截面）时返回 `None`。
pub fn find_best_match<'a, I>(
    target: &ShapeParameters,
    candidates: I,
    tolerance: f64,
) -> Option<SymbolMatch>
where
    I: IntoIterator<Item = &'a Symbol>,
{
    let mut best: Option<SymbolMatch> = None;
    for candidate in candidates {
        if candidate.dimensions.kind() != target.kind() {
            continue;
        }
        let score = MatchScore::between(&candidate.dimensions, target.dimensions());
        let replace = best
            .as_ref()
            .is_none_or(|current| score.better_than(&current.score));
        if replace {
            best = Some(SymbolMatch {
                symbol: candidate.clone(),
                score,
                within_tolerance: score.within(tolerance),
            });
            if score.is_exact() {
                break;
            }
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolMatcher {
    tolerance: f64,
}

impl SymbolMatcher {
    /// 负数容差按 0 处理。
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
        }
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn find_best_match<'a, I>(&self, target: &ShapeParameters, candidates: I) -> Option<SymbolMatch>
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        find_best_match(target, candidates, self.tolerance)
    }
}

impl Default for SymbolMatcher {
    fn default() -> Self {
        Self::new(0.0)
    }
}
