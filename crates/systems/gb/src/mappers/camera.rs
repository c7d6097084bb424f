//! Pocket camera cartridge controller.
//!
//! - 0x0000-0x1FFF: RAM enable, accepted and ignored (SRAM is always mapped)
//! - 0x2000-0x3FFF: ROM bank, 6 bits (0 reads as 1)
//! - 0x4000-0x5FFF: RAM bank 0-15; with bit 4 set, A000-BFFF shows the
//!   sensor registers instead of SRAM
//!
//! In register mode A000-A07F is the sensor register window and A100-AEFF
//! shows the capture buffer, which lives at SRAM 0x0100. The overlay is not
//! shifted: A100 is SRAM 0x0100, the same byte bank 0 shows there, and
//! A080-A0FF reads 0x00.

use serde::{Deserialize, Serialize};

use super::CartMemory;
use crate::camera::{photo, Camera};

/// SRAM on every camera cartridge.
pub const CAMERA_RAM_SIZE: usize = 0x20000;
const REGISTER_BANK: u8 = 0x10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRegisters {
    pub rom_bank: u8,
    pub ram_bank: u8,
    pub camera: Camera,
}

#[derive(Debug)]
pub struct PocketCamera {
    pub(super) mem: CartMemory,
    rom_bank: u8,
    ram_bank: u8,
    camera: Camera,
}

impl PocketCamera {
    /// Wraps `mem`, growing RAM to the full 128 KiB; a blank RAM gets an
    /// empty album.
    pub fn new(mem: CartMemory) -> Self {
        let CartMemory { rom, mut ram, .. } = mem;
        let blank = ram.iter().all(|&b| b == 0);
        ram.resize(CAMERA_RAM_SIZE, 0);
        if blank {
            photo::format_album(&mut ram);
        }
        Self {
            mem: CartMemory::new(rom, ram),
            rom_bank: 1,
            ram_bank: 0,
            camera: Camera::new(),
        }
    }

    pub fn reset(&mut self) {
        self.rom_bank = 1;
        self.ram_bank = 0;
        self.camera.reset();
    }

    fn register_mode(&self) -> bool {
        self.ram_bank & REGISTER_BANK != 0
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            match self.rom_bank {
                0 => 1,
                n => n as usize,
            }
        };
        self.mem.rom_byte(bank, addr)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x2000..=0x3FFF => self.rom_bank = val & 0x3F,
            0x4000..=0x5FFF => self.ram_bank = val & 0x1F,
            _ => {}
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.register_mode() {
            return self.mem.ram_byte(self.ram_bank as usize, addr);
        }
        match addr {
            0xA000..=0xA07F => self.camera.read_register((addr - 0xA000) as usize),
            0xA100..=0xAEFF => self.mem.ram_byte(0, addr),
            _ => 0x00,
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !self.register_mode() {
            self.mem.set_ram_byte(self.ram_bank as usize, addr, val);
            return;
        }
        match addr {
            0xA000..=0xA07F => self.camera.write_register((addr - 0xA000) as usize, val),
            0xA100..=0xAEFF => self.mem.set_ram_byte(0, addr, val),
            _ => {}
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        self.camera.tick(cycles, self.mem.ram_mut());
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn capture_now(&mut self) {
        self.camera.capture_now(self.mem.ram_mut());
    }

    pub fn update_live(&mut self) -> bool {
        self.camera.update_live(self.mem.ram())
    }

    pub fn encode_photo(&mut self, slot: u8, rgba: &[u8]) -> bool {
        self.camera.encode(self.mem.ram_mut(), slot, rgba)
    }

    pub fn decode_photo(&self, slot: u8) -> Option<Vec<u8>> {
        photo::decode(self.mem.ram(), slot)
    }

    pub fn clear_photo(&mut self, slot: u8) -> bool {
        photo::clear(self.mem.ram_mut(), slot)
    }

    pub fn photo_count(&self) -> usize {
        photo::photo_count(self.mem.ram())
    }

    pub(super) fn registers(&self) -> CameraRegisters {
        CameraRegisters {
            rom_bank: self.rom_bank,
            ram_bank: self.ram_bank,
            camera: self.camera.clone(),
        }
    }

    pub(super) fn restore_registers(&mut self, regs: &CameraRegisters) {
        self.rom_bank = regs.rom_bank;
        self.ram_bank = regs.ram_bank;
        // The host image is not part of the state.
        let source = self.camera.take_source();
        self.camera = regs.camera.clone();
        self.camera.restore_source(source);
    }
}
