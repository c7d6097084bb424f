//! Plain 32 KiB cartridge, optionally with up to 8 KiB of unbanked RAM.

use super::CartMemory;

#[derive(Debug)]
pub struct RomOnly {
    pub(super) mem: CartMemory,
}

impl RomOnly {
    pub fn new(mem: CartMemory) -> Self {
        Self { mem }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        self.mem.rom_byte((addr as usize) >> 14, addr)
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        self.mem.ram_byte(0, addr)
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        self.mem.set_ram_byte(0, addr, val);
    }
}
