//! MBC1
//!
//! - 0x0000-0x1FFF: RAM enable (0x0A in the low nibble)
//! - 0x2000-0x3FFF: ROM bank, low 5 bits (0 reads as 1)
//! - 0x4000-0x5FFF: 2-bit upper register: ROM bank bits 5-6, or RAM bank in mode 1
//! - 0x6000-0x7FFF: banking mode

use serde::{Deserialize, Serialize};

use super::CartMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbc1Registers {
    pub ram_enabled: bool,
    pub rom_bank: u8,
    pub upper: u8,
    pub mode: u8,
}

impl Default for Mbc1Registers {
    fn default() -> Self {
        Self {
            ram_enabled: false,
            rom_bank: 1,
            upper: 0,
            mode: 0,
        }
    }
}

#[derive(Debug)]
pub struct Mbc1 {
    pub(super) mem: CartMemory,
    pub(super) regs: Mbc1Registers,
}

impl Mbc1 {
    pub fn new(mem: CartMemory) -> Self {
        Self {
            mem,
            regs: Mbc1Registers::default(),
        }
    }

    pub fn reset(&mut self) {
        self.regs = Mbc1Registers::default();
    }

    /// Bank visible at 0x0000-0x3FFF; mode 1 lets the upper bits reach it.
    fn low_bank(&self) -> usize {
        if self.regs.mode == 1 {
            (self.regs.upper as usize) << 5
        } else {
            0
        }
    }

    fn high_bank(&self) -> usize {
        let low = match self.regs.rom_bank & 0x1F {
            0 => 1,
            n => n as usize,
        };
        low | ((self.regs.upper as usize) << 5)
    }

    fn ram_bank(&self) -> usize {
        if self.regs.mode == 1 {
            self.regs.upper as usize
        } else {
            0
        }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            self.low_bank()
        } else {
            self.high_bank()
        };
        self.mem.rom_byte(bank, addr)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.regs.ram_enabled = val & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.regs.rom_bank = val & 0x1F,
            0x4000..=0x5FFF => self.regs.upper = val & 0x03,
            0x6000..=0x7FFF => self.regs.mode = val & 0x01,
            _ => {}
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.regs.ram_enabled {
            return 0xFF;
        }
        self.mem.ram_byte(self.ram_bank(), addr)
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if self.regs.ram_enabled {
            self.mem.set_ram_byte(self.ram_bank(), addr, val);
        }
    }
}
