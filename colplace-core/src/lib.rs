pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 两点连线的中点，线段放置时用作插入点。
        #[inline]
        pub fn midpoint(self, other: Point2) -> Point2 {
            Self((self.0 + other.0) * 0.5)
        }
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::Point2;

    /// 新建文档时自动创建的标高名称。
    pub const DEFAULT_LEVEL: &str = "Level 1";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SymbolId(u64);

    impl SymbolId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ElementId(u64);

    impl ElementId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Level {
        pub name: String,
        pub elevation: f64,
    }

    impl Level {
        #[inline]
        pub fn new(name: impl Into<String>, elevation: f64) -> Self {
            Self {
                name: name.into(),
                elevation,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ShapeKind {
        Rectangular,
        Circular,
    }

    /// 类型的尺寸向量：矩形为宽高，圆形为直径。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub enum SymbolDimensions {
        Rectangular { width: f64, height: f64 },
        Circular { diameter: f64 },
    }

    impl SymbolDimensions {
        #[inline]
        pub fn kind(&self) -> ShapeKind {
            match self {
                SymbolDimensions::Rectangular { .. } => ShapeKind::Rectangular,
                SymbolDimensions::Circular { .. } => ShapeKind::Circular,
            }
        }

        /// 主尺寸：矩形取短边，圆形取直径。
        #[inline]
        pub fn primary(&self) -> f64 {
            match *self {
                SymbolDimensions::Rectangular { width, height } => width.min(height),
                SymbolDimensions::Circular { diameter } => diameter,
            }
        }

        /// 次尺寸：矩形取长边，圆形仍为直径。
        #[inline]
        pub fn secondary(&self) -> f64 {
            match *self {
                SymbolDimensions::Rectangular { width, height } => width.max(height),
                SymbolDimensions::Circular { diameter } => diameter,
            }
        }

        pub fn values(&self) -> Vec<f64> {
            match *self {
                SymbolDimensions::Rectangular { width, height } => vec![width, height],
                SymbolDimensions::Circular { diameter } => vec![diameter],
            }
        }

        /// 逐项比较尺寸，差值均不超过 `tolerance` 时视为相等。
        pub fn approx_eq(&self, other: &SymbolDimensions, tolerance: f64) -> bool {
            match (*self, *other) {
                (
                    SymbolDimensions::Rectangular { width, height },
                    SymbolDimensions::Rectangular {
                        width: other_width,
                        height: other_height,
                    },
                ) => {
                    (width - other_width).abs() <= tolerance
                        && (height - other_height).abs() <= tolerance
                }
                (
                    SymbolDimensions::Circular { diameter },
                    SymbolDimensions::Circular {
                        diameter: other_diameter,
                    },
                ) => (diameter - other_diameter).abs() <= tolerance,
                _ => false,
            }
        }

        /// 生成类型名称用的尺寸标签，例如 `0.400x0.600` 或 `D0.500`。
        pub fn label(&self) -> String {
            match *self {
                SymbolDimensions::Rectangular { width, height } => {
                    format!("{width:.3}x{height:.3}")
                }
                SymbolDimensions::Circular { diameter } => format!("D{diameter:.3}"),
            }
        }
    }

    /// 参数化族模板，只被引用，不修改其结构定义。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ShapeTemplate {
        pub name: String,
        pub kind: ShapeKind,
        pub min_dimension: f64,
        pub max_dimension: f64,
    }

    impl ShapeTemplate {
        pub fn new(name: impl Into<String>, kind: ShapeKind) -> Self {
            Self {
                name: name.into(),
                kind,
                min_dimension: 0.0,
                max_dimension: f64::INFINITY,
            }
        }

        pub fn with_range(mut self, min_dimension: f64, max_dimension: f64) -> Self {
            self.min_dimension = min_dimension;
            self.max_dimension = max_dimension;
            self
        }

        #[inline]
        pub fn supports(&self, value: f64) -> bool {
            value >= self.min_dimension && value <= self.max_dimension
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Symbol {
        pub id: SymbolId,
        pub template: String,
        pub name: String,
        pub dimensions: SymbolDimensions,
        pub is_active: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PlacedElement {
        pub id: ElementId,
        pub symbol: SymbolId,
        pub insert: Point2,
        pub level: String,
    }

    /// 宿主文档的内存实现：模板、类型、标高与已放置构件。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Document {
        levels: HashMap<String, Level>,
        templates: Vec<ShapeTemplate>,
        symbols: Vec<Symbol>,
        elements: Vec<PlacedElement>,
        next_symbol_id: u64,
        next_element_id: u64,
        #[serde(default = "Document::default_valid")]
        is_valid: bool,
    }

    impl Default for Document {
        fn default() -> Self {
            Self {
                levels: HashMap::new(),
                templates: Vec::new(),
                symbols: Vec::new(),
                elements: Vec::new(),
                next_symbol_id: 0,
                next_element_id: 0,
                is_valid: true,
            }
        }
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.add_level(DEFAULT_LEVEL, 0.0);
            doc
        }

        fn default_valid() -> bool {
            true
        }

        pub fn add_level(&mut self, name: impl AsRef<str>, elevation: f64) {
            let key = name.as_ref();
            self.levels
                .entry(key.to_string())
                .or_insert_with(|| Level::new(key, elevation));
        }

        #[inline]
        pub fn level(&self, name: &str) -> Option<&Level> {
            self.levels.get(name)
        }

        #[inline]
        pub fn levels(&self) -> impl Iterator<Item = &Level> {
            self.levels.values()
        }

        /// 添加模板；同名模板会被替换，但保留原有顺序。
        pub fn add_template(&mut self, template: ShapeTemplate) {
            if let Some(existing) = self
                .templates
                .iter_mut()
                .find(|existing| existing.name == template.name)
            {
                *existing = template;
            } else {
                self.templates.push(template);
            }
        }

        #[inline]
        pub fn template(&self, name: &str) -> Option<&ShapeTemplate> {
            self.templates.iter().find(|template| template.name == name)
        }

        #[inline]
        pub fn templates(&self) -> impl Iterator<Item = &ShapeTemplate> {
            self.templates.iter()
        }

        /// 在模板下登记一个类型，名称由模板名与尺寸标签组成。
        pub fn add_symbol(
            &mut self,
            template: impl Into<String>,
            dimensions: SymbolDimensions,
            is_active: bool,
        ) -> SymbolId {
            let template = template.into();
            let id = SymbolId(self.next_symbol_id);
            self.next_symbol_id += 1;
            let name = format!("{template} {}", dimensions.label());
            self.symbols.push(Symbol {
                id,
                template,
                name,
                dimensions,
                is_active,
            });
            id
        }

        #[inline]
        pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
            self.symbols.iter().find(|symbol| symbol.id == id)
        }

        #[inline]
        pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
            self.symbols.iter()
        }

        /// 激活类型，返回类型是否存在。
        pub fn activate_symbol(&mut self, id: SymbolId) -> bool {
            match self.symbols.iter_mut().find(|symbol| symbol.id == id) {
                Some(symbol) => {
                    symbol.is_active = true;
                    true
                }
                None => false,
            }
        }

        pub fn add_element(
            &mut self,
            symbol: SymbolId,
            insert: Point2,
            level: impl Into<String>,
        ) -> ElementId {
            let id = ElementId(self.next_element_id);
            self.next_element_id += 1;
            self.elements.push(PlacedElement {
                id,
                symbol,
                insert,
                level: level.into(),
            });
            id
        }

        #[inline]
        pub fn element(&self, id: ElementId) -> Option<&PlacedElement> {
            self.elements.iter().find(|element| element.id == id)
        }

        #[inline]
        pub fn elements(&self) -> impl Iterator<Item = &PlacedElement> {
            self.elements.iter()
        }

        /// 标记文档不可用，之后宿主层的所有调用都会失败。
        #[inline]
        pub fn invalidate(&mut self) {
            self.is_valid = false;
        }

        #[inline]
        pub fn is_valid(&self) -> bool {
            self.is_valid
        }
    }

}
