use std::collections::HashSet;

use colplace_core::document::{ShapeKind, ShapeTemplate, Symbol, SymbolId};
use tracing::debug;

use crate::errors::HostError;
use crate::host::{HostDocument, TemplateFilter};

/// 会话内已知的模板与类型。只增不减，类型按登记顺序保存。
#[derive(Debug, Clone, Default)]
pub struct SymbolCatalog {
    templates: Vec<ShapeTemplate>,
    symbols: Vec<Symbol>,
    known: HashSet<SymbolId>,
}

impl SymbolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<H: HostDocument>(host: &H) -> Result<Self, HostError> {
        let mut catalog = Self::new();
        catalog.refresh(host)?;
        Ok(catalog)
    }

    /// 从宿主重新读取模板，并登记尚未见过的类型，返回新登记的数量。
    pub fn refresh<H: HostDocument>(&mut self, host: &H) -> Result<usize, HostError> {
        self.templates = host.list_templates()?;
        let registered = host
            .list_existing_symbols(None)?
            .into_iter()
            .filter(|symbol| self.register(symbol.clone()))
            .count();
        debug!(
            templates = self.templates.len(),
            symbols = self.symbols.len(),
            registered,
            "类型目录已同步"
        );
        Ok(registered)
    }

    /// 返回可用的类型：已激活，或其模板已载入因而可以激活。
    pub fn list_symbols(&self, filter: Option<&TemplateFilter>) -> Vec<&Symbol> {
        self.symbols
            .iter()
            .filter(|symbol| filter.is_none_or(|filter| filter.matches(&symbol.template)))
            .filter(|symbol| symbol.is_active || self.template(&symbol.template).is_some())
            .collect()
    }

    /// 幂等登记，返回是否为新类型。
    pub fn register(&mut self, symbol: Symbol) -> bool {
        if !self.known.insert(symbol.id) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    #[inline]
    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.iter().find(|symbol| symbol.id == id)
    }

    #[inline]
    pub fn template(&self, name: &str) -> Option<&ShapeTemplate> {
        self.templates.iter().find(|template| template.name == name)
    }

    #[inline]
    pub fn templates(&self) -> impl Iterator<Item = &ShapeTemplate> {
        self.templates.iter()
    }

    /// 在指定截面类型的模板中挑选首选模板：优先名称包含全部关键字的，
    /// 否则取宿主顺序中第一个同类模板。
    pub fn preferred_template(&self, kind: ShapeKind, keywords: &[String]) -> Option<&ShapeTemplate> {
        let filter = TemplateFilter::keywords(keywords);
        let mut same_kind = self.templates.iter().filter(|template| template.kind == kind);
        let first = same_kind.clone().next();
        same_kind
            .find(|template| filter.matches(&template.name))
            .or(first)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub(crate) fn set_active(&mut self, id: SymbolId, active: bool) {
        if let Some(symbol) = self.symbols.iter_mut().find(|symbol| symbol.id == id) {
            symbol.is_active = active;
        }
    }

    /// 丢弃 `len` 之后登记的类型，仅用于事务回滚后的同步。
    pub(crate) fn truncate(&mut self, len: usize) {
        for symbol in self.symbols.drain(len.min(self.symbols.len())..) {
            self.known.remove(&symbol.id);
        }
    }
}
