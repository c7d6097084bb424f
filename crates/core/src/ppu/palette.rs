//! Shade-to-host-color palettes.
//!
//! The DMG only produces four shades; the host decides what they look like.

/// Maps small color indices to RGBA.
pub trait IndexedPalette {
    /// Color as 0xAARRGGBB.
    fn get_color(&self, index: usize) -> u32;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rgba(&self, index: usize) -> [u8; 4] {
        let [a, r, g, b] = self.get_color(index).to_be_bytes();
        [r, g, b, a]
    }
}

/// Palette held in memory; unknown indices read as opaque black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamPalette {
    colors: Vec<u32>,
}

const OPAQUE_BLACK: u32 = 0xFF00_0000;

impl RamPalette {
    pub fn from_rgba(colors: &[[u8; 4]]) -> Self {
        Self {
            colors: colors
                .iter()
                .map(|&[r, g, b, a]| u32::from_be_bytes([a, r, g, b]))
                .collect(),
        }
    }
}

impl IndexedPalette for RamPalette {
    fn get_color(&self, index: usize) -> u32 {
        self.colors.get(index).copied().unwrap_or(OPAQUE_BLACK)
    }

    fn len(&self) -> usize {
        self.colors.len()
    }
}
