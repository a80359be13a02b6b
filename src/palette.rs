//! Cube colors by value

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Color used for values without an entry
pub const FALLBACK_COLOR: Vec3 = Vec3::ONE;

/// One value → color mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub value: u32,
    pub color: Vec3,
}

/// Value → RGB lookup shared by all cubes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PaletteEntry>", into = "Vec<PaletteEntry>")]
pub struct CubePalette {
    colors: HashMap<u32, Vec3>,
}

impl Default for CubePalette {
    fn default() -> Self {
        Self::from(vec![
            PaletteEntry { value: 2, color: Vec3::new(0.8, 0.8, 0.8) },
            PaletteEntry { value: 4, color: Vec3::new(0.7, 0.7, 0.7) },
            PaletteEntry { value: 8, color: Vec3::new(1.0, 0.8, 0.6) },
            PaletteEntry { value: 16, color: Vec3::new(1.0, 0.6, 0.4) },
            PaletteEntry { value: 32, color: Vec3::new(1.0, 0.4, 0.2) },
            PaletteEntry { value: 64, color: Vec3::new(1.0, 0.2, 0.0) },
            PaletteEntry { value: 128, color: Vec3::new(1.0, 0.0, 0.0) },
            PaletteEntry { value: 256, color: Vec3::new(1.0, 0.6, 0.0) },
            PaletteEntry { value: 512, color: Vec3::new(1.0, 0.8, 0.0) },
            PaletteEntry { value: 1024, color: Vec3::new(0.0, 0.8, 1.0) },
            PaletteEntry { value: 2048, color: Vec3::new(0.0, 0.6, 1.0) },
        ])
    }
}

impl From<Vec<PaletteEntry>> for CubePalette {
    fn from(entries: Vec<PaletteEntry>) -> Self {
        // Later entries win on duplicate values
        let colors = entries.into_iter().map(|e| (e.value, e.color)).collect();
        Self { colors }
    }
}

impl From<CubePalette> for Vec<PaletteEntry> {
    fn from(palette: CubePalette) -> Self {
        let mut entries: Vec<PaletteEntry> = palette
            .colors
            .into_iter()
            .map(|(value, color)| PaletteEntry { value, color })
            .collect();
        entries.sort_by_key(|e| e.value);
        entries
    }
}

impl CubePalette {
    pub fn color_for(&self, value: u32) -> Vec3 {
        self.colors.get(&value).copied().unwrap_or(FALLBACK_COLOR)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
