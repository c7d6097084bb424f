//! Ordered dithering for the camera sensor.
//!
//! The sensor compares every pixel against three thresholds taken from a
//! 4x4 matrix (48 bytes at A006-A035) and outputs one of four shades. Camera
//! software computes that matrix from a Bayer pattern and one row of a
//! contrast table; [`DitherMatrix::generate`] does the same so captures made
//! without a program-supplied matrix look like the real thing. Other cell
//! orders are available through [`DitherPattern`].
//!
//! Thresholds live in the sensor-voltage domain (0x80 = black, 0xFF = white).
//! Sensor output is mapped into it with `0x80 + v / 2`. Host pictures go
//! through a [`LumaRamp`] instead, which spreads luma over the matrix's own
//! threshold span so the four shades survive a decode/encode round trip.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Standard 4x4 Bayer order used by camera software.
pub const BAYER_4X4: [u8; 16] = [
    0x00, 0x0C, 0x03, 0x0F, 0x08, 0x04, 0x0B, 0x07, 0x02, 0x0E, 0x01, 0x0D, 0x0A, 0x06, 0x09, 0x05,
];

const BLOCK_2X2: [u8; 16] = [
    0x01, 0x01, 0x0A, 0x0A, 0x01, 0x01, 0x0A, 0x0A, 0x0D, 0x0D, 0x03, 0x03, 0x0D, 0x0D, 0x03, 0x03,
];
const GRID: [u8; 16] = [
    0x0C, 0x08, 0x07, 0x0C, 0x07, 0x01, 0x02, 0x07, 0x07, 0x07, 0x02, 0x08, 0x0D, 0x08, 0x08, 0x0C,
];
const MAZE: [u8; 16] = [
    0x00, 0x01, 0x03, 0x05, 0x02, 0x0A, 0x0B, 0x0D, 0x04, 0x0C, 0x07, 0x08, 0x06, 0x0E, 0x09, 0x0F,
];
const NEST: [u8; 16] = [
    0x00, 0x01, 0x08, 0x0B, 0x02, 0x06, 0x0A, 0x0C, 0x09, 0x0E, 0x03, 0x04, 0x0D, 0x0F, 0x05, 0x07,
];
const FUZZ: [u8; 16] = [
    0x00, 0x09, 0x0E, 0x07, 0x04, 0x0D, 0x02, 0x0B, 0x08, 0x01, 0x06, 0x0F, 0x0C, 0x05, 0x0A, 0x03,
];
const VERTICAL: [u8; 16] = [
    0x00, 0x0A, 0x07, 0x0D, 0x01, 0x0B, 0x04, 0x0E, 0x02, 0x08, 0x05, 0x0F, 0x03, 0x09, 0x06, 0x0C,
];
const HORIZONTAL: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x08, 0x09, 0x07, 0x04, 0x05, 0x06, 0x0D, 0x0E, 0x0F, 0x0C,
];
const DIAGONAL: [u8; 16] = [
    0x00, 0x08, 0x04, 0x0C, 0x0D, 0x01, 0x09, 0x05, 0x06, 0x0E, 0x02, 0x0A, 0x0B, 0x07, 0x0F, 0x03,
];

/// Cell order used when no program matrix is present.
///
/// Each pattern ranks the 16 cells of a 4x4 tile; rank 0 takes the row's
/// own thresholds and rank 15 sits just below the next band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherPattern {
    #[default]
    Standard,
    #[serde(rename = "2x2")]
    Block2x2,
    Grid,
    Maze,
    Nest,
    Fuzz,
    Vertical,
    Horizontal,
    Diagonal,
}

impl DitherPattern {
    pub const ALL: [DitherPattern; 9] = [
        DitherPattern::Standard,
        DitherPattern::Block2x2,
        DitherPattern::Grid,
        DitherPattern::Maze,
        DitherPattern::Nest,
        DitherPattern::Fuzz,
        DitherPattern::Vertical,
        DitherPattern::Horizontal,
        DitherPattern::Diagonal,
    ];

    pub fn order(self) -> &'static [u8; 16] {
        match self {
            DitherPattern::Standard => &BAYER_4X4,
            DitherPattern::Block2x2 => &BLOCK_2X2,
            DitherPattern::Grid => &GRID,
            DitherPattern::Maze => &MAZE,
            DitherPattern::Nest => &NEST,
            DitherPattern::Fuzz => &FUZZ,
            DitherPattern::Vertical => &VERTICAL,
            DitherPattern::Horizontal => &HORIZONTAL,
            DitherPattern::Diagonal => &DIAGONAL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DitherPattern::Standard => "standard",
            DitherPattern::Block2x2 => "2x2",
            DitherPattern::Grid => "grid",
            DitherPattern::Maze => "maze",
            DitherPattern::Nest => "nest",
            DitherPattern::Fuzz => "fuzz",
            DitherPattern::Vertical => "vertical",
            DitherPattern::Horizontal => "horizontal",
            DitherPattern::Diagonal => "diagonal",
        }
    }
}

impl fmt::Display for DitherPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dither pattern '{0}' (expected standard, 2x2, grid, maze, nest, fuzz, vertical, horizontal or diagonal)")]
pub struct ParsePatternError(String);

impl FromStr for DitherPattern {
    type Err = ParsePatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "bayer" => Ok(DitherPattern::Standard),
            "2x2" | "block" => Ok(DitherPattern::Block2x2),
            "grid" => Ok(DitherPattern::Grid),
            "maze" => Ok(DitherPattern::Maze),
            "nest" => Ok(DitherPattern::Nest),
            "fuzz" => Ok(DitherPattern::Fuzz),
            "vertical" => Ok(DitherPattern::Vertical),
            "horizontal" => Ok(DitherPattern::Horizontal),
            "diagonal" => Ok(DitherPattern::Diagonal),
            _ => Err(ParsePatternError(s.to_string())),
        }
    }
}

/// Threshold rows for bright scenes, indexed by contrast level.
pub const HIGH_LIGHT_THRESHOLDS: [[u8; 4]; 16] = [
    [0x80, 0x8F, 0xD0, 0xE6],
    [0x82, 0x90, 0xC8, 0xE3],
    [0x84, 0x90, 0xC0, 0xE0],
    [0x85, 0x91, 0xB8, 0xDD],
    [0x86, 0x91, 0xB1, 0xDB],
    [0x87, 0x92, 0xAA, 0xD8],
    [0x88, 0x92, 0xA5, 0xD5],
    [0x89, 0x92, 0xA2, 0xD2],
    [0x8A, 0x92, 0xA1, 0xC8],
    [0x8B, 0x92, 0xA0, 0xBE],
    [0x8C, 0x92, 0x9E, 0xB4],
    [0x8D, 0x92, 0x9C, 0xAC],
    [0x8E, 0x92, 0x9B, 0xA5],
    [0x8F, 0x92, 0x99, 0xA0],
    [0x90, 0x92, 0x97, 0x9A],
    [0x92, 0x92, 0x92, 0x92],
];

/// Threshold rows for dim scenes, indexed by contrast level.
pub const LOW_LIGHT_THRESHOLDS: [[u8; 4]; 16] = [
    [0x80, 0x94, 0xDC, 0xFF],
    [0x82, 0x95, 0xD2, 0xFF],
    [0x84, 0x96, 0xCA, 0xFF],
    [0x86, 0x96, 0xC4, 0xFF],
    [0x88, 0x97, 0xBE, 0xFF],
    [0x8A, 0x97, 0xB8, 0xFF],
    [0x8B, 0x98, 0xB2, 0xF5],
    [0x8C, 0x98, 0xAC, 0xEB],
    [0x8D, 0x98, 0xAA, 0xDD],
    [0x8E, 0x98, 0xA8, 0xD0],
    [0x8F, 0x98, 0xA6, 0xC4],
    [0x90, 0x98, 0xA4, 0xBA],
    [0x92, 0x98, 0xA1, 0xB2],
    [0x94, 0x98, 0x9D, 0xA8],
    [0x96, 0x98, 0x99, 0xA0],
    [0x98, 0x98, 0x98, 0x98],
];

pub const MAX_CONTRAST: u8 = 15;

/// Size of the matrix in the register window.
pub const MATRIX_BYTES: usize = 48;

/// Which threshold table a capture uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightTable {
    High,
    Low,
}

impl LightTable {
    /// Gain bits 00/01 are the high-gain settings software picks for dim scenes.
    pub fn from_gain_bits(gain_bits: u8) -> Self {
        if gain_bits & 0x03 < 2 {
            LightTable::Low
        } else {
            LightTable::High
        }
    }

    fn row(self, contrast: u8) -> &'static [u8; 4] {
        let level = contrast.min(MAX_CONTRAST) as usize;
        match self {
            LightTable::High => &HIGH_LIGHT_THRESHOLDS[level],
            LightTable::Low => &LOW_LIGHT_THRESHOLDS[level],
        }
    }
}

/// Three thresholds for each of the 16 cells of a 4x4 tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DitherMatrix {
    cells: [[u8; 3]; 16],
}

impl DitherMatrix {
    /// Matrix as written by cartridge code; `None` when the window is all zero.
    pub fn from_registers(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MATRIX_BYTES || bytes[..MATRIX_BYTES].iter().all(|&b| b == 0) {
            return None;
        }
        let mut cells = [[0u8; 3]; 16];
        for (cell, chunk) in cells.iter_mut().zip(bytes.chunks_exact(3)) {
            cell.copy_from_slice(chunk);
        }
        Some(Self { cells })
    }

    /// Matrix for `contrast` (0-15) built from the Bayer order.
    pub fn generate(table: LightTable, contrast: u8) -> Self {
        Self::with_pattern(DitherPattern::Standard, table, contrast)
    }

    pub fn with_pattern(pattern: DitherPattern, table: LightTable, contrast: u8) -> Self {
        let row = table.row(contrast);
        let mut cells = [[0u8; 3]; 16];
        for (cell, &order) in cells.iter_mut().zip(pattern.order().iter()) {
            let idx = order as i32;
            *cell = [
                interpolate(row[0], row[1], idx),
                interpolate(row[1], row[2], idx),
                interpolate(row[2], row[3], idx),
            ];
        }
        Self { cells }
    }

    pub fn to_registers(&self) -> [u8; MATRIX_BYTES] {
        let mut out = [0u8; MATRIX_BYTES];
        for (chunk, cell) in out.chunks_exact_mut(3).zip(self.cells.iter()) {
            chunk.copy_from_slice(cell);
        }
        out
    }

    /// Shade (0 = white .. 3 = black) for one sensor pixel at (x, y).
    #[inline]
    pub fn quantize(&self, x: usize, y: usize, brightness: u8) -> u8 {
        self.quantize_level(x, y, 0x80 + brightness as u16 / 2)
    }

    /// Shade for a pixel already mapped into the threshold domain.
    #[inline]
    pub fn quantize_level(&self, x: usize, y: usize, level: u16) -> u8 {
        let [t0, t1, t2] = self.cells[(y & 3) * 4 + (x & 3)].map(u16::from);
        if level <= t0 {
            3
        } else if level <= t1 {
            2
        } else if level <= t2 {
            1
        } else {
            0
        }
    }
}

/// Luma values that decode from the four shades (3 = black .. 0 = white).
const SHADE_LUMA_STEP: u16 = 0x55;

/// Piecewise-linear map from 8-bit luma onto a matrix's threshold span.
///
/// The knots sit at the lowest threshold of each band, plus one past the
/// highest white threshold. Luma 0x00/0x55/0xAA/0xFF lands exactly on them,
/// so every cell agrees on the shade and decoded photos re-encode unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumaRamp {
    knots: [u16; 4],
}

impl LumaRamp {
    pub fn for_matrix(matrix: &DitherMatrix) -> Self {
        let lowest = |band: usize| {
            matrix.cells.iter().map(|cell| cell[band] as u16).min().unwrap_or(0)
        };
        let highest_white = matrix.cells.iter().map(|cell| cell[2] as u16).max().unwrap_or(0);

        let k0 = lowest(0);
        let k1 = lowest(1).max(k0);
        let k2 = lowest(2).max(k1);
        let k3 = (highest_white + 1).max(k2);
        Self {
            knots: [k0, k1, k2, k3],
        }
    }

    pub fn level(&self, luma: u8) -> u16 {
        let luma = luma as u16;
        let segment = (luma / SHADE_LUMA_STEP).min(2) as usize;
        let (low, high) = (self.knots[segment], self.knots[segment + 1]);
        let offset = luma - segment as u16 * SHADE_LUMA_STEP;
        low + (high - low) * offset / SHADE_LUMA_STEP
    }
}

fn interpolate(low: u8, high: u8, idx: i32) -> u8 {
    let range = high as i32 - low as i32;
    (low as i32 + range * idx / 16).clamp(0, 255) as u8
}
