use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How a [`crate::RectanglePacker`] starts out and how far it may grow.
///
/// Every field has a default, so a JSON file only needs the keys it changes:
///
/// ```json
/// { "width": 512, "height": 512, "max_height": 4096 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerOptions {
    pub width: i32,
    pub height: i32,
    /// Growth never goes past these. `None` means unbounded.
    pub max_width: Option<i32>,
    pub max_height: Option<i32>,
    /// Fraction of the current height added per growth step.
    pub expansion_factor: f32,
    /// When the vertical fragmentation ratio is above this, a same-size
    /// re-layout is tried before growing.
    pub compaction_threshold: Option<f32>,
}

impl Default for PackerOptions {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            max_width: None,
            max_height: None,
            expansion_factor: 0.5,
            compaction_threshold: None,
        }
    }
}

impl PackerOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width < 0 || self.height < 0 {
            return Err(Error::InvalidGeometry {
                x: 0,
                y: 0,
                w: self.width,
                h: self.height,
            });
        }
        if self.max_width.map_or(false, |m| m < 0) || self.max_height.map_or(false, |m| m < 0) {
            return Err(Error::InvalidOptions("maximum size must not be negative"));
        }
        if !(self.expansion_factor > 0.0) {
            return Err(Error::InvalidOptions("expansion_factor must be positive"));
        }
        Ok(())
    }

    /// The cap growth respects, filling in `i32::MAX` for unbounded axes.
    pub(crate) fn max_size(&self) -> (i32, i32) {
        (
            self.max_width.unwrap_or(i32::MAX),
            self.max_height.unwrap_or(i32::MAX),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options = PackerOptions::from_json(r#"{ "width": 64, "max_height": 1024 }"#).unwrap();
        assert_eq!(options.width, 64);
        assert_eq!(options.height, 256);
        assert_eq!(options.max_height, Some(1024));
        assert_eq!(options.max_size(), (i32::MAX, 1024));
        assert_eq!(options.expansion_factor, 0.5);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            PackerOptions::from_json(r#"{ "height": -1 }"#),
            Err(Error::InvalidGeometry { h: -1, .. })
        ));
        assert!(matches!(
            PackerOptions::from_json(r#"{ "expansion_factor": 0.0 }"#),
            Err(Error::InvalidOptions(_))
        ));
        assert!(matches!(
            PackerOptions::from_json(r#"{ "width": "wide" }"#),
            Err(Error::Json(_))
        ));
    }
}
