//! Game Boy (DMG) system with camera cartridge support.
//!
//! [`GbSystem`] owns the whole machine: the CPU, which owns the bus, which
//! owns the cartridge, video pipeline, timer, interrupts and joypad. The
//! host drives it one frame at a time.

pub mod bus;
pub mod camera;
pub mod cartridge;
pub mod config;
pub mod ffi;
pub mod interrupts;
pub mod joypad;
pub mod mappers;
pub mod ppu;
pub mod timer;

use emu_core::cpu_lr35902::{CpuLr35902, CpuState, IllegalOpcode, MemoryLr35902};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::ppu::{IndexedPalette, RamPalette};
use emu_core::types::Frame;
use emu_core::{Cpu, System};
use serde::{Deserialize, Serialize};

use bus::{BusState, GbBus};
use camera::SENSOR_RGBA_BYTES;
use cartridge::{Cartridge, CartridgeError};
use joypad::Button;
use mappers::PocketCamera;
use ppu::FRAME_DOTS;

pub use camera::dither::DitherPattern;
pub use config::GbConfig;

pub const SCREEN_WIDTH: usize = ppu::SCREEN_WIDTH;
pub const SCREEN_HEIGHT: usize = ppu::SCREEN_HEIGHT;
/// Size of the RGBA frame buffer.
pub const FRAME_BUFFER_BYTES: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 4;
/// Size of the camera live buffer and of photo images.
pub const CAMERA_IMAGE_BYTES: usize = SENSOR_RGBA_BYTES;

const STATE_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum GbError {
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
    #[error("Cartridge has no battery RAM")]
    NoSaveRam,
    #[error("Save data is {actual} bytes, cartridge RAM is {expected}")]
    SaveSizeMismatch { expected: usize, actual: usize },
    #[error("Invalid save state: {0}")]
    InvalidState(String),
}

#[derive(Serialize, Deserialize)]
struct MachineState {
    system: String,
    version: u32,
    frame_count: u64,
    cpu: CpuState,
    bus: BusState,
}

pub struct GbSystem {
    cpu: CpuLr35902<GbBus>,
    config: GbConfig,
    palette: RamPalette,
    frame: Frame,
    frame_count: u64,
    /// Host button state, latched at the start of the next frame
    buttons: u8,
}

impl Default for GbSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl GbSystem {
    pub fn new() -> Self {
        Self::with_config(GbConfig::default())
    }

    pub fn with_config(config: GbConfig) -> Self {
        let palette = config.shade_palette();
        let mut system = Self {
            cpu: CpuLr35902::new(GbBus::new()),
            config,
            palette,
            frame: Frame::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32),
            frame_count: 0,
            buttons: 0,
        };
        system.present();
        system
    }

    pub fn config(&self) -> &GbConfig {
        &self.config
    }

    fn bus(&self) -> &GbBus {
        &self.cpu.memory
    }

    fn camera(&self) -> Option<&PocketCamera> {
        self.bus().cartridge().and_then(|c| c.mapper.camera())
    }

    fn camera_mut(&mut self) -> Option<&mut PocketCamera> {
        self.cpu
            .memory
            .cartridge_mut()
            .and_then(|c| c.mapper.camera_mut())
    }

    /// Convert the visible shades to RGBA through the configured palette.
    fn present(&mut self) {
        let shades = self.cpu.memory.ppu.front_buffer();
        for (px, &shade) in self.frame.pixels.chunks_exact_mut(4).zip(shades) {
            px.copy_from_slice(&self.palette.rgba(shade as usize));
        }
    }

    /// Current RGBA frame, `SCREEN_WIDTH * SCREEN_HEIGHT * 4` bytes.
    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame.pixels
    }

    /// Set a host button (0=A 1=B 2=Select 3=Start 4=Right 5=Left 6=Up
    /// 7=Down); takes effect at the next frame start.
    pub fn set_button(&mut self, index: u8, pressed: bool) -> bool {
        let Some(button) = Button::from_index(index) else {
            return false;
        };
        if pressed {
            self.buttons |= button.mask();
        } else {
            self.buttons &= !button.mask();
        }
        true
    }

    /// Peek at the bus without side effects.
    pub fn read_memory(&self, addr: u16) -> u8 {
        self.bus().read(addr)
    }

    pub fn title(&self) -> Option<&str> {
        self.bus().cartridge().map(|c| c.header.title.as_str())
    }

    pub fn serial_output(&self) -> &[u8] {
        self.bus().serial_output()
    }

    pub fn cpu_state(&self) -> CpuState {
        self.cpu.state()
    }

    pub fn illegal_opcode_count(&self) -> u64 {
        self.cpu.illegal_opcodes
    }

    pub fn last_illegal_opcode(&self) -> Option<IllegalOpcode> {
        self.cpu.last_illegal_opcode
    }

    // Save RAM

    pub fn save_data_size(&self) -> usize {
        self.save_data().len()
    }

    /// Battery RAM contents; empty without a cartridge or RAM.
    pub fn save_data(&self) -> &[u8] {
        self.bus()
            .cartridge()
            .map(|c| c.mapper.ram())
            .unwrap_or(&[])
    }

    pub fn load_save_data(&mut self, data: &[u8]) -> Result<(), GbError> {
        let cart = self.cpu.memory.cartridge_mut().ok_or(GbError::NoCartridge)?;
        let expected = cart.mapper.ram().len();
        if expected == 0 {
            return Err(GbError::NoSaveRam);
        }
        if !cart.mapper.load_ram(data) {
            return Err(GbError::SaveSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!("loaded {} bytes of save data", data.len())
        });
        Ok(())
    }

    // Camera

    pub fn is_camera_cartridge(&self) -> bool {
        self.camera().is_some()
    }

    /// Supply the sensor image: 128x112 grayscale, one byte per pixel.
    pub fn set_camera_image(&mut self, image: &[u8]) -> bool {
        self.camera_mut()
            .is_some_and(|cam| cam.camera_mut().set_source_image(image))
    }

    pub fn is_camera_ready(&self) -> bool {
        self.camera().is_some_and(|cam| cam.camera().is_ready())
    }

    /// Develop the current image into the capture buffer right away.
    pub fn trigger_camera_capture(&mut self) -> bool {
        match self.camera_mut() {
            Some(cam) => {
                cam.capture_now();
                true
            }
            None => false,
        }
    }

    /// Refresh the live buffer from the last capture; true if it changed.
    pub fn update_camera_live(&mut self) -> bool {
        self.camera_mut().is_some_and(|cam| cam.update_live())
    }

    pub fn camera_live_buffer(&self) -> Option<&[u8]> {
        self.camera().map(|cam| cam.camera().live_buffer())
    }

    /// Slot 0 is the last capture, 1-30 the album.
    pub fn decode_camera_photo(&self, slot: u8) -> Option<Vec<u8>> {
        self.camera()?.decode_photo(slot)
    }

    pub fn encode_camera_photo(&mut self, slot: u8, rgba: &[u8]) -> bool {
        self.camera_mut()
            .is_some_and(|cam| cam.encode_photo(slot, rgba))
    }

    pub fn clear_camera_photo(&mut self, slot: u8) -> bool {
        self.camera_mut().is_some_and(|cam| cam.clear_photo(slot))
    }

    pub fn camera_photo_count(&self) -> usize {
        self.camera().map_or(0, |cam| cam.photo_count())
    }

    pub fn camera_exposure(&self) -> u16 {
        self.camera().map_or(0, |cam| cam.camera().exposure())
    }

    pub fn set_camera_exposure(&mut self, exposure: i32) -> bool {
        match self.camera_mut() {
            Some(cam) => {
                cam.camera_mut().set_exposure(exposure);
                true
            }
            None => false,
        }
    }

    pub fn camera_contrast(&self) -> u8 {
        self.camera().map_or(0, |cam| cam.camera().contrast())
    }

    pub fn camera_dither_pattern(&self) -> Option<DitherPattern> {
        self.camera().map(|cam| cam.camera().dither_pattern())
    }

    pub fn set_camera_dither_pattern(&mut self, pattern: DitherPattern) -> bool {
        match self.camera_mut() {
            Some(cam) => {
                cam.camera_mut().set_dither_pattern(pattern);
                true
            }
            None => false,
        }
    }
}

impl System for GbSystem {
    type Error = GbError;

    fn reset(&mut self) {
        self.cpu.memory.reset();
        Cpu::reset(&mut self.cpu);
        self.buttons = 0;
        self.present();
    }

    fn load_rom(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let mut cartridge = Cartridge::from_rom(data)?;
        if let Some(cam) = cartridge.mapper.camera_mut() {
            let camera = cam.camera_mut();
            camera.set_dither_pattern(self.config.camera_dither_pattern);
            if let Some(exposure) = self.config.camera_exposure {
                camera.set_exposure(exposure as i32);
            }
        }

        let mut bus = GbBus::new();
        bus.insert_cartridge(cartridge);
        self.cpu = CpuLr35902::new(bus);
        self.buttons = 0;
        self.present();
        Ok(())
    }

    fn step_frame(&mut self) -> Result<(), Self::Error> {
        if self.bus().cartridge().is_none() {
            return Err(GbError::NoCartridge);
        }

        self.cpu.memory.latch_buttons(self.buttons);

        let limit = self.config.frame_cycle_limit(FRAME_DOTS);
        let mut elapsed: u64 = 0;
        loop {
            let cycles = self.cpu.step();
            elapsed += cycles as u64;
            if self.cpu.memory.tick(cycles) {
                break;
            }
            if elapsed >= limit {
                log(LogCategory::Ppu, LogLevel::Warn, || {
                    format!("frame did not complete within {limit} cycles")
                });
                break;
            }
        }

        self.present();
        self.frame_count += 1;
        Ok(())
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn save_state(&self) -> serde_json::Value {
        let state = MachineState {
            system: "gb".to_string(),
            version: STATE_VERSION,
            frame_count: self.frame_count,
            cpu: self.cpu.state(),
            bus: self.cpu.memory.snapshot(),
        };
        serde_json::to_value(state).unwrap_or_else(|e| {
            log(LogCategory::Bus, LogLevel::Error, || {
                format!("save state serialization failed: {e}")
            });
            serde_json::Value::Null
        })
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), Self::Error> {
        let state = MachineState::deserialize(v)
            .map_err(|e| GbError::InvalidState(e.to_string()))?;
        if state.system != "gb" || state.version != STATE_VERSION {
            return Err(GbError::InvalidState(format!(
                "expected gb v{STATE_VERSION}, got {} v{}",
                state.system, state.version
            )));
        }
        if !self.cpu.memory.restore(state.bus) {
            return Err(GbError::InvalidState(
                "state does not match the loaded cartridge".to_string(),
            ));
        }
        self.cpu.restore(&state.cpu);
        self.frame_count = state.frame_count;
        self.present();
        Ok(())
    }
}
