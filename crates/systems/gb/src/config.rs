//! Machine configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration.

use emu_core::ppu::RamPalette;
use serde::{Deserialize, Serialize};

use crate::camera::dither::DitherPattern;

/// Classic four greens of the original screen, lightest first.
pub const DMG_GREEN: [[u8; 4]; 4] = [
    [0x9B, 0xBC, 0x0F, 0xFF],
    [0x8B, 0xAC, 0x0F, 0xFF],
    [0x30, 0x62, 0x30, 0xFF],
    [0x0F, 0x38, 0x0F, 0xFF],
];

/// Neutral grays, lightest first.
pub const GRAYSCALE: [[u8; 4]; 4] = [
    [0xFF, 0xFF, 0xFF, 0xFF],
    [0xAA, 0xAA, 0xAA, 0xFF],
    [0x55, 0x55, 0x55, 0xFF],
    [0x00, 0x00, 0x00, 0xFF],
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbConfig {
    /// RGBA for shades 0 (lightest) to 3 (darkest)
    pub palette: [[u8; 4]; 4],
    /// Camera exposure to use instead of the A002-A003 registers
    pub camera_exposure: Option<u16>,
    /// Cell order of the camera's built-in dither matrix
    pub camera_dither_pattern: DitherPattern,
    /// Frame loop bound, in frames' worth of cycles
    pub max_frame_multiplier: u32,
}

impl Default for GbConfig {
    fn default() -> Self {
        Self {
            palette: GRAYSCALE,
            camera_exposure: None,
            camera_dither_pattern: DitherPattern::Standard,
            max_frame_multiplier: 2,
        }
    }
}

impl GbConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn shade_palette(&self) -> RamPalette {
        RamPalette::from_rgba(&self.palette)
    }

    /// Cycle cap for one `step_frame`; never below one frame.
    pub fn frame_cycle_limit(&self, frame_cycles: u32) -> u64 {
        frame_cycles as u64 * self.max_frame_multiplier.max(1) as u64
    }
}
