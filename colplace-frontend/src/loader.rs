use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use colplace_core::document::SymbolId;
use colplace_core::geometry::Point2;
use colplace_engine::batch::{DimensionHint, SymbolOverride, WorkItem};
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::FrontendError;

/// 未显式指定文件时读取的环境变量。
pub const ITEMS_ENV: &str = "COLPLACE_ITEMS";

/// 工作项来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq)]
pub enum ItemSource {
    File(PathBuf),
    Demo,
}

#[derive(Debug, Clone)]
pub struct LoadedItems {
    pub items: Vec<WorkItem>,
    pub source: ItemSource,
}

#[derive(Debug, Deserialize)]
struct ItemsFile {
    #[serde(default)]
    items: Vec<ItemEntry>,
}

/// 文件中的单条记录：`width`+`height`、`diameter`、`line` 三选一。
#[derive(Debug, Deserialize)]
struct ItemEntry {
    label: String,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    width: Option<f64>,
    height: Option<f64>,
    diameter: Option<f64>,
    line: Option<[f64; 4]>,
    template: Option<String>,
    symbol: Option<u64>,
    level: Option<String>,
}

impl ItemEntry {
    fn into_work_item(self) -> Result<WorkItem, FrontendError> {
        let invalid = |label: &str, message: &str| FrontendError::InvalidItem {
            label: label.to_string(),
            message: message.to_string(),
        };
        let insert = Point2::new(self.x, self.y);
        let mut item = match (self.width, self.height, self.diameter, self.line) {
            (Some(width), Some(height), None, None) => {
                WorkItem::rectangle(self.label.clone(), insert, width, height)
            }
            (None, None, Some(diameter), None) => {
                WorkItem::round(self.label.clone(), insert, diameter)
            }
            (None, None, None, Some([x1, y1, x2, y2])) => WorkItem::new(
                self.label.clone(),
                insert,
                DimensionHint::Line {
                    start: Point2::new(x1, y1),
                    end: Point2::new(x2, y2),
                },
            ),
            (Some(_), None, None, None) | (None, Some(_), None, None) => {
                return Err(invalid(&self.label, "width 与 height 必须同时提供"));
            }
            _ => {
                return Err(invalid(
                    &self.label,
                    "需要且只能提供 width+height、diameter、line 其中之一",
                ));
            }
        };

        match (self.template, self.symbol) {
            (Some(_), Some(_)) => {
                return Err(invalid(&self.label, "template 与 symbol 不能同时指定"));
            }
            (Some(template), None) => {
                item = item.with_override(SymbolOverride::Template(template));
            }
            (None, Some(id)) => {
                item = item.with_override(SymbolOverride::Symbol(SymbolId::new(id)));
            }
            (None, None) => {}
        }
        if let Some(level) = self.level {
            item = item.with_level(level);
        }
        Ok(item)
    }
}

/// 从 TOML 文件读取 `[[items]]` 工作项。
pub fn load_items(path: impl AsRef<Path>) -> Result<Vec<WorkItem>, FrontendError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| FrontendError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ItemsFile = toml::from_str(&content).map_err(|source| FrontendError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.items
        .into_iter()
        .map(ItemEntry::into_work_item)
        .collect()
}

/// 优先读取显式路径，其次是环境变量 `COLPLACE_ITEMS`，都没有时使用内置示例。
/// 显式路径读取失败直接返回错误；环境变量指向的文件失败时回退到示例。
pub fn load_items_or_demo(explicit: Option<&Path>) -> Result<LoadedItems, FrontendError> {
    if let Some(path) = explicit {
        let items = load_items(path)?;
        info!(path = %path.display(), count = items.len(), "已读取工作项文件");
        return Ok(LoadedItems {
            items,
            source: ItemSource::File(path.to_path_buf()),
        });
    }

    if let Some(path) = env::var_os(ITEMS_ENV) {
        let path = PathBuf::from(path);
        match load_items(&path) {
            Ok(items) => {
                info!(path = %path.display(), count = items.len(), "已读取工作项文件");
                return Ok(LoadedItems {
                    items,
                    source: ItemSource::File(path),
                });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "读取工作项失败，回退到内置示例");
            }
        }
    }

    Ok(LoadedItems {
        items: demo_items(),
        source: ItemSource::Demo,
    })
}

/// 内置示例：一排矩形柱、两根圆柱、一根按线长推断的柱，以及一个无效项。
pub fn demo_items() -> Vec<WorkItem> {
    let mut items: Vec<WorkItem> = [(0.4, 0.4), (0.4, 0.6), (0.5, 0.5), (0.4, 0.6)]
        .into_iter()
        .enumerate()
        .map(|(i, (width, height))| {
            WorkItem::rectangle(
                format!("C{}", i + 1),
                Point2::new(i as f64 * 6.0, 0.0),
                width,
                height,
            )
        })
        .collect();
    items.push(WorkItem::round("R1", Point2::new(0.0, 8.0), 0.6));
    items.push(WorkItem::round("R2", Point2::new(6.0, 8.0), 0.6));
    items.push(WorkItem::from_line(
        "L1",
        Point2::new(12.0, 8.0),
        Point2::new(12.35, 8.0),
    ));
    items.push(WorkItem::rectangle("C-wide", Point2::new(18.0, 8.0), 1.8, 0.6));
    items.push(WorkItem::rectangle("C-bad", Point2::new(24.0, 8.0), -0.3, 0.3));
    items
}
