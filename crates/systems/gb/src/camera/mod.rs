//! Camera peripheral: sensor registers, capture timing and the photo album.
//!
//! The peripheral does not own SRAM; the camera mapper passes its RAM in
//! for every operation that touches stored pictures.

pub mod dither;
pub mod photo;
pub mod sensor;

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use dither::{DitherMatrix, DitherPattern, LightTable, LumaRamp};
use sensor::{CaptureSettings, CONTROL_CAPTURE, REG_CONTROL};

pub const SENSOR_WIDTH: usize = 128;
pub const SENSOR_HEIGHT: usize = 112;
pub const SENSOR_PIXELS: usize = SENSOR_WIDTH * SENSOR_HEIGHT;
/// Size of an RGBA picture (live buffer, decoded or encoded photos).
pub const SENSOR_RGBA_BYTES: usize = SENSOR_PIXELS * 4;
/// Size of the register window at A000.
pub const REGISTER_COUNT: usize = 0x80;

const MID_GREY: u8 = 0x80;

fn blank_live() -> Vec<u8> {
    vec![0; SENSOR_RGBA_BYTES]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    regs: Vec<u8>,
    exposure_override: Option<u16>,
    #[serde(default)]
    pattern: DitherPattern,
    /// T-cycles left on a program-triggered capture
    capture_remaining: u32,
    capture_dirty: bool,
    #[serde(skip)]
    source: Option<Box<[u8]>>,
    #[serde(skip, default = "blank_live")]
    live: Vec<u8>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            regs: vec![0; REGISTER_COUNT],
            exposure_override: None,
            pattern: DitherPattern::Standard,
            capture_remaining: 0,
            capture_dirty: false,
            source: None,
            live: blank_live(),
        }
    }

    /// Register power-on state; keeps the host image, exposure override and
    /// dither pattern.
    pub fn reset(&mut self) {
        self.regs.fill(0);
        self.capture_remaining = 0;
        self.capture_dirty = false;
    }

    /// Only A000 reads back; the rest of the window is write-only.
    pub fn read_register(&self, offset: usize) -> u8 {
        if offset & (REGISTER_COUNT - 1) == REG_CONTROL {
            let busy = if self.capturing() { CONTROL_CAPTURE } else { 0 };
            (self.regs[REG_CONTROL] & !CONTROL_CAPTURE) | busy
        } else {
            0x00
        }
    }

    pub fn write_register(&mut self, offset: usize, value: u8) {
        let offset = offset & (REGISTER_COUNT - 1);
        self.regs[offset] = value;
        if offset == REG_CONTROL && value & CONTROL_CAPTURE != 0 && !self.capturing() {
            self.capture_remaining = self.settings().capture_cycles();
            log(LogCategory::Camera, LogLevel::Debug, || {
                format!("capture started, {} cycles", self.capture_remaining)
            });
        }
    }

    pub fn capturing(&self) -> bool {
        self.capture_remaining > 0
    }

    /// Advance a running capture; develops into `ram` when it finishes.
    pub fn tick(&mut self, cycles: u32, ram: &mut [u8]) -> bool {
        if !self.capturing() {
            return false;
        }
        self.capture_remaining = self.capture_remaining.saturating_sub(cycles);
        if self.capturing() {
            return false;
        }
        self.develop_into(ram);
        true
    }

    /// Host-triggered capture: develops immediately, cancelling any pending one.
    pub fn capture_now(&mut self, ram: &mut [u8]) {
        self.capture_remaining = 0;
        self.develop_into(ram);
    }

    fn develop_into(&mut self, ram: &mut [u8]) {
        let settings = self.settings();
        let shades = match self.source.as_deref() {
            Some(source) => sensor::develop(source, &settings),
            None => sensor::develop(&[MID_GREY; SENSOR_PIXELS], &settings),
        };
        photo::write_shades(ram, photo::CAPTURE_OFFSET, &shades);
        self.regs[REG_CONTROL] &= !CONTROL_CAPTURE;
        self.capture_dirty = true;
        log(LogCategory::Camera, LogLevel::Debug, || {
            format!(
                "capture developed: exposure {:#06x}, contrast {}",
                settings.exposure,
                settings.contrast()
            )
        });
    }

    /// Replace the sensor image (128x112, one grayscale byte per pixel).
    pub fn set_source_image(&mut self, image: &[u8]) -> bool {
        if image.len() != SENSOR_PIXELS {
            log(LogCategory::Camera, LogLevel::Warn, || {
                format!(
                    "camera image rejected: {} bytes, expected {}",
                    image.len(),
                    SENSOR_PIXELS
                )
            });
            return false;
        }
        self.source = Some(image.into());
        true
    }

    pub(crate) fn take_source(&mut self) -> Option<Box<[u8]>> {
        self.source.take()
    }

    pub(crate) fn restore_source(&mut self, source: Option<Box<[u8]>>) {
        self.source = source;
    }

    pub fn is_ready(&self) -> bool {
        self.source.is_some() && !self.capturing()
    }

    /// Copy slot 0 into the live buffer if a capture finished since last time.
    pub fn update_live(&mut self, ram: &[u8]) -> bool {
        if !self.capture_dirty {
            return false;
        }
        let Some(rgba) = photo::decode(ram, 0) else {
            return false;
        };
        self.live = rgba;
        self.capture_dirty = false;
        true
    }

    pub fn live_buffer(&self) -> &[u8] {
        &self.live
    }

    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings::from_registers(&self.regs, self.exposure_override, self.pattern)
    }

    /// Effective exposure after the host override and zero fallback.
    pub fn exposure(&self) -> u16 {
        self.settings().exposure
    }

    pub fn set_exposure(&mut self, exposure: i32) {
        self.exposure_override = Some(exposure.clamp(0, u16::MAX as i32) as u16);
    }

    pub fn contrast(&self) -> u8 {
        self.settings().contrast()
    }

    pub fn dither_pattern(&self) -> DitherPattern {
        self.pattern
    }

    /// Cell order for built-in matrices, used by captures and `encode`.
    pub fn set_dither_pattern(&mut self, pattern: DitherPattern) {
        self.pattern = pattern;
    }

    /// Dither an RGBA picture into album slot 1-30.
    pub fn encode(&self, ram: &mut [u8], slot: u8, rgba: &[u8]) -> bool {
        if rgba.len() != SENSOR_RGBA_BYTES || !(1..=photo::PHOTO_SLOTS).contains(&slot) {
            return false;
        }
        let settings = self.settings();
        let matrix = DitherMatrix::with_pattern(
            self.pattern,
            LightTable::from_gain_bits(settings.gain_bits),
            settings.contrast(),
        );
        let ramp = LumaRamp::for_matrix(&matrix);
        let luma = photo::rgba_to_luma(rgba);
        let shades: Vec<u8> = luma
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                matrix.quantize_level(i % SENSOR_WIDTH, i / SENSOR_WIDTH, ramp.level(v))
            })
            .collect();
        photo::store(ram, slot, &shades)
    }
}
