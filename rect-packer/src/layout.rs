use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LevelSet, RectId, Result};

/// A serializable picture of where everything sits. Payloads are left out;
/// callers key their own data by [`RectId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
    pub used_height: i32,
    pub levels: Vec<LevelLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelLayout {
    pub y: i32,
    pub height: i32,
    pub next_add_x: i32,
    pub rects: Vec<PlacedRect>,
    /// Free spans as `(x, width)`; they always span the full level height.
    pub free: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedRect {
    pub id: RectId,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Layout {
    pub fn of<P>(set: &LevelSet<P>) -> Self {
        let levels = set
            .levels()
            .iter()
            .map(|level| LevelLayout {
                y: level.y(),
                height: level.height(),
                next_add_x: level.next_add_x(),
                rects: level
                    .rects()
                    .iter()
                    .filter_map(|&id| {
                        set.get(id).map(|r| PlacedRect {
                            id,
                            x: r.x(),
                            y: r.y(),
                            w: r.w(),
                            h: r.h(),
                        })
                    })
                    .collect(),
                free: level.free_list().iter().map(|s| (s.x(), s.w())).collect(),
            })
            .collect();
        Self {
            width: set.width(),
            height: set.height(),
            used_height: set.used_height(),
            levels,
        }
    }

    pub fn rects(&self) -> impl Iterator<Item = &PlacedRect> + '_ {
        self.levels.iter().flat_map(|l| l.rects.iter())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
