//! MBC5
//!
//! - 0x0000-0x1FFF: RAM enable (0x0A in the low nibble)
//! - 0x2000-0x2FFF: ROM bank bits 0-7
//! - 0x3000-0x3FFF: ROM bank bit 8
//! - 0x4000-0x5FFF: RAM bank, 4 bits
//!
//! Unlike the older controllers, bank 0 can be mapped at 0x4000.

use serde::{Deserialize, Serialize};

use super::CartMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbc5Registers {
    pub ram_enabled: bool,
    pub rom_bank: u16,
    pub ram_bank: u8,
}

impl Default for Mbc5Registers {
    fn default() -> Self {
        Self {
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
        }
    }
}

#[derive(Debug)]
pub struct Mbc5 {
    pub(super) mem: CartMemory,
    pub(super) regs: Mbc5Registers,
}

impl Mbc5 {
    pub fn new(mem: CartMemory) -> Self {
        Self {
            mem,
            regs: Mbc5Registers::default(),
        }
    }

    pub fn reset(&mut self) {
        self.regs = Mbc5Registers::default();
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            self.regs.rom_bank as usize
        };
        self.mem.rom_byte(bank, addr)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        let regs = &mut self.regs;
        match addr {
            0x0000..=0x1FFF => regs.ram_enabled = val & 0x0F == 0x0A,
            0x2000..=0x2FFF => regs.rom_bank = (regs.rom_bank & 0x100) | val as u16,
            0x3000..=0x3FFF => regs.rom_bank = (regs.rom_bank & 0x0FF) | ((val as u16 & 1) << 8),
            0x4000..=0x5FFF => regs.ram_bank = val & 0x0F,
            _ => {}
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.regs.ram_enabled {
            return 0xFF;
        }
        self.mem.ram_byte(self.regs.ram_bank as usize, addr)
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if self.regs.ram_enabled {
            self.mem.set_ram_byte(self.regs.ram_bank as usize, addr, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::{RAM_BANK_SIZE, ROM_BANK_SIZE};

    fn cart(rom_banks: usize, ram_banks: usize) -> Mbc5 {
        let mut rom = vec![0; rom_banks * ROM_BANK_SIZE];
        for bank in 0..rom_banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
            rom[bank * ROM_BANK_SIZE + 1] = (bank >> 8) as u8;
        }
        Mbc5::new(CartMemory::new(rom, vec![0; ram_banks * RAM_BANK_SIZE]))
    }

    #[test]
    fn bank_zero_is_selectable() {
        let mut mbc = cart(4, 0);
        mbc.write_rom(0x2000, 0);
        assert_eq!(mbc.read_rom(0x4000), 0);
        mbc.write_rom(0x2000, 3);
        assert_eq!(mbc.read_rom(0x4000), 3);
    }

    #[test]
    fn ninth_bank_bit() {
        let mut mbc = cart(512, 0);
        mbc.write_rom(0x2000, 0x05);
        mbc.write_rom(0x3000, 0x01);
        assert_eq!(mbc.read_rom(0x4000), 0x05);
        assert_eq!(mbc.read_rom(0x4001), 0x01);
        mbc.write_rom(0x3000, 0x00);
        assert_eq!(mbc.read_rom(0x4001), 0x00);
    }

    #[test]
    fn sixteen_ram_banks() {
        let mut mbc = cart(2, 16);
        mbc.write_rom(0x0000, 0x0A);
        mbc.write_rom(0x4000, 0x0F);
        mbc.write_ram(0xA000, 0xEE);
        mbc.write_rom(0x4000, 0x00);
        assert_eq!(mbc.read_ram(0xA000), 0x00);
        mbc.write_rom(0x4000, 0x1F);
        assert_eq!(mbc.read_ram(0xA000), 0xEE);
    }
}
