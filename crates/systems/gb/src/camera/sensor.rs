//! Sensor register decoding and the capture pipeline.
//!
//! Capture turns a host-supplied 128x112 grayscale frame into 2-bit shades:
//! exposure scaling, black-level offset, gain around mid-grey, optional edge
//! boost, then ordered dithering. Everything is integer arithmetic, so the
//! same registers and source image always develop into the same picture.

use super::dither::{DitherMatrix, DitherPattern, LightTable, MATRIX_BYTES, MAX_CONTRAST};
use super::{SENSOR_HEIGHT, SENSOR_PIXELS, SENSOR_WIDTH};

/// Register offsets inside the A000-A07F window.
pub const REG_CONTROL: usize = 0x00;
pub const REG_GAIN: usize = 0x01;
pub const REG_EXPOSURE_HI: usize = 0x02;
pub const REG_EXPOSURE_LO: usize = 0x03;
pub const REG_EDGE: usize = 0x04;
pub const REG_VOLTAGE: usize = 0x05;
pub const REG_MATRIX: usize = 0x06;

/// A000 bit 0: capture start / busy.
pub const CONTROL_CAPTURE: u8 = 0x01;
/// A000 bit 1: negative output.
pub const CONTROL_INVERT: u8 = 0x02;

/// Neutral exposure; registers holding 0 fall back to it.
pub const DEFAULT_EXPOSURE: u16 = 0x1000;
pub const DEFAULT_CONTRAST: u8 = 9;
/// Exposure change that moves contrast by one level.
const EXPOSURE_PER_CONTRAST_STEP: i32 = 0x0400;

/// Contrast level (0-15) implied by an exposure value.
pub fn contrast_for_exposure(exposure: u16) -> u8 {
    let steps = (exposure as i32 - DEFAULT_EXPOSURE as i32) / EXPOSURE_PER_CONTRAST_STEP;
    (DEFAULT_CONTRAST as i32 + steps).clamp(0, MAX_CONTRAST as i32) as u8
}

/// Everything one capture needs, decoded from the register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub exposure: u16,
    /// A001 bits 4-5; 0 is the highest gain
    pub gain_bits: u8,
    /// A001 bit 7 ("N"): skips the 512-cycle pre-charge
    pub skip_precharge: bool,
    /// A004 bits 4-6
    pub edge_mode: u8,
    pub voltage_offset: u8,
    pub negative: bool,
    pub matrix: DitherMatrix,
}

impl CaptureSettings {
    /// Decode the register window; `exposure_override` replaces A002-A003
    /// and is taken as is, zero included. `pattern` orders the built-in
    /// matrix when the program left A006-A035 blank.
    pub fn from_registers(
        regs: &[u8],
        exposure_override: Option<u16>,
        pattern: DitherPattern,
    ) -> Self {
        let reg = |i: usize| regs.get(i).copied().unwrap_or(0);
        let register_exposure = u16::from_be_bytes([reg(REG_EXPOSURE_HI), reg(REG_EXPOSURE_LO)]);
        let exposure = exposure_override.unwrap_or(match register_exposure {
            0 => DEFAULT_EXPOSURE,
            e => e,
        });
        let gain_bits = (reg(REG_GAIN) >> 4) & 0x03;
        let matrix = regs
            .get(REG_MATRIX..REG_MATRIX + MATRIX_BYTES)
            .and_then(DitherMatrix::from_registers)
            .unwrap_or_else(|| {
                DitherMatrix::with_pattern(
                    pattern,
                    LightTable::from_gain_bits(gain_bits),
                    contrast_for_exposure(exposure),
                )
            });

        Self {
            exposure,
            gain_bits,
            skip_precharge: reg(REG_GAIN) & 0x80 != 0,
            edge_mode: (reg(REG_EDGE) >> 4) & 0x07,
            voltage_offset: reg(REG_VOLTAGE),
            negative: reg(REG_CONTROL) & CONTROL_INVERT != 0 || reg(REG_GAIN) & 0x02 != 0,
            matrix,
        }
    }

    pub fn contrast(&self) -> u8 {
        contrast_for_exposure(self.exposure)
    }

    /// Length of a program-triggered capture in T-cycles.
    pub fn capture_cycles(&self) -> u32 {
        let precharge = if self.skip_precharge { 0 } else { 512 };
        4 * (32_446 + precharge + 16 * self.exposure as u32)
    }

    /// Gain as a fraction of 4 (x2, x1.5, x1, x0.75).
    fn gain_quarters(&self) -> i32 {
        match self.gain_bits {
            0 => 8,
            1 => 6,
            2 => 4,
            _ => 3,
        }
    }
}

/// Develop `source` (row-major, [`SENSOR_PIXELS`] bytes) into shades 0-3.
pub fn develop(source: &[u8], settings: &CaptureSettings) -> Vec<u8> {
    let offset = settings.voltage_offset as i32 * 64 / 255;
    let gain = settings.gain_quarters();
    let exposure = settings.exposure as u32;

    let mut levels: Vec<u8> = (0..SENSOR_PIXELS)
        .map(|i| {
            let raw = source.get(i).copied().unwrap_or(0x80) as u32;
            let exposed = (raw * exposure / DEFAULT_EXPOSURE as u32).min(255) as i32;
            let centered = exposed - offset - 128;
            (centered * gain / 4 + 128).clamp(0, 255) as u8
        })
        .collect();

    if settings.edge_mode > 0 {
        levels = enhance_edges(&levels, settings.edge_mode);
    }

    let mut shades = Vec::with_capacity(SENSOR_PIXELS);
    for y in 0..SENSOR_HEIGHT {
        for x in 0..SENSOR_WIDTH {
            let shade = settings.matrix.quantize(x, y, levels[y * SENSOR_WIDTH + x]);
            shades.push(if settings.negative { 3 - shade } else { shade });
        }
    }
    shades
}

/// Boost each interior pixel by its difference from the 4-neighbour mean.
fn enhance_edges(levels: &[u8], edge_mode: u8) -> Vec<u8> {
    let mut out = levels.to_vec();
    let strength = edge_mode as i32;
    for y in 1..SENSOR_HEIGHT - 1 {
        for x in 1..SENSOR_WIDTH - 1 {
            let idx = y * SENSOR_WIDTH + x;
            let center = levels[idx] as i32;
            let neighbours = levels[idx - SENSOR_WIDTH] as i32
                + levels[idx + SENSOR_WIDTH] as i32
                + levels[idx - 1] as i32
                + levels[idx + 1] as i32;
            let edge = center - neighbours / 4;
            out[idx] = (center + edge * strength * 2 / 7).clamp(0, 255) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> [u8; 0x80] {
        [0; 0x80]
    }

    fn settings_for(regs: &[u8], exposure: Option<u16>) -> CaptureSettings {
        CaptureSettings::from_registers(regs, exposure, DitherPattern::Standard)
    }

    #[test]
    fn pattern_only_shapes_the_built_in_matrix() {
        let maze = CaptureSettings::from_registers(&regs(), None, DitherPattern::Maze);
        assert_eq!(
            maze.matrix,
            DitherMatrix::with_pattern(DitherPattern::Maze, LightTable::Low, DEFAULT_CONTRAST)
        );

        let mut r = regs();
        r[REG_MATRIX..REG_MATRIX + MATRIX_BYTES].fill(0x90);
        let program = CaptureSettings::from_registers(&r, None, DitherPattern::Maze);
        assert_eq!(program.matrix.to_registers(), [0x90; MATRIX_BYTES]);
    }

    #[test]
    fn contrast_follows_exposure() {
        assert_eq!(contrast_for_exposure(DEFAULT_EXPOSURE), DEFAULT_CONTRAST);
        assert_eq!(contrast_for_exposure(0x1400), 10);
        assert_eq!(contrast_for_exposure(0x0C00), 8);
        assert_eq!(contrast_for_exposure(0x0000), 5);
        assert_eq!(contrast_for_exposure(0xFFFF), MAX_CONTRAST);
    }

    #[test]
    fn zero_exposure_register_is_neutral() {
        let settings = settings_for(&regs(), None);
        assert_eq!(settings.exposure, DEFAULT_EXPOSURE);
        assert_eq!(settings.contrast(), DEFAULT_CONTRAST);
        assert_eq!(
            settings.matrix,
            DitherMatrix::generate(LightTable::Low, DEFAULT_CONTRAST)
        );
    }

    #[test]
    fn override_replaces_register_exposure() {
        let mut r = regs();
        r[REG_EXPOSURE_HI] = 0x08;
        r[REG_EXPOSURE_LO] = 0x00;
        assert_eq!(settings_for(&r, None).exposure, 0x0800);
        assert_eq!(settings_for(&r, Some(0x2000)).exposure, 0x2000);
    }

    #[test]
    fn zero_override_is_taken_literally() {
        let settings = settings_for(&regs(), Some(0));
        assert_eq!(settings.exposure, 0);
        assert_eq!(settings.contrast(), 5);
        assert_eq!(settings.matrix, DitherMatrix::generate(LightTable::Low, 5));
    }

    #[test]
    fn capture_time_depends_on_exposure_and_precharge() {
        let mut r = regs();
        r[REG_EXPOSURE_HI] = 0x00;
        r[REG_EXPOSURE_LO] = 0x10;
        let settings = settings_for(&r, None);
        assert_eq!(settings.capture_cycles(), 4 * (32_446 + 512 + 256));
        r[REG_GAIN] = 0x80;
        let settings = settings_for(&r, None);
        assert_eq!(settings.capture_cycles(), 4 * (32_446 + 256));
    }

    #[test]
    fn develop_black_and_white_sources() {
        let settings = settings_for(&regs(), None);
        let black = develop(&[0u8; SENSOR_PIXELS], &settings);
        assert!(black.iter().all(|&s| s == 3));
        let white = develop(&[255u8; SENSOR_PIXELS], &settings);
        assert!(white.iter().all(|&s| s == 0));
    }

    #[test]
    fn negative_flips_shades() {
        let mut r = regs();
        r[REG_CONTROL] = CONTROL_INVERT;
        let settings = settings_for(&r, None);
        let out = develop(&[0u8; SENSOR_PIXELS], &settings);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn develop_is_deterministic() {
        let mut r = regs();
        r[REG_EDGE] = 0x50;
        r[REG_GAIN] = 0x20;
        let settings = settings_for(&r, None);
        let source: Vec<u8> = (0..SENSOR_PIXELS).map(|i| (i * 7 % 256) as u8).collect();
        let a = develop(&source, &settings);
        let b = develop(&source, &settings);
        assert_eq!(a.len(), SENSOR_PIXELS);
        assert_eq!(a, b);
        assert!(a.iter().all(|&s| s <= 3));
    }
}
