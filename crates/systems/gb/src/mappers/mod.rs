//! Cartridge memory bank controllers.
//!
//! Every controller keeps its ROM and RAM in a [`CartMemory`] and only adds
//! the register logic that picks banks. Bank numbers are always reduced
//! modulo the number of banks physically present.

mod camera;
mod mbc1;
mod mbc3;
mod mbc5;
mod rom_only;

pub use camera::{CameraRegisters, PocketCamera};
pub use mbc1::{Mbc1, Mbc1Registers};
pub use mbc3::{Mbc3, Mbc3Registers, Rtc, RTC_SAVE_BYTES};
pub use mbc5::{Mbc5, Mbc5Registers};
pub use rom_only::RomOnly;

use serde::{Deserialize, Serialize};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

/// Raw cartridge storage with bank-relative accessors.
///
/// A controller with battery-backed state beyond RAM keeps it in a footer
/// after the banked area, so the whole buffer is the save blob.
#[derive(Debug, Clone)]
pub struct CartMemory {
    rom: Vec<u8>,
    ram: Vec<u8>,
    footer: usize,
}

impl CartMemory {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>) -> Self {
        Self { rom, ram, footer: 0 }
    }

    /// Storage with `footer` extra save bytes appended after the banked RAM.
    pub fn with_footer(rom: Vec<u8>, mut ram: Vec<u8>, footer: usize) -> Self {
        ram.resize(ram.len() + footer, 0);
        Self { rom, ram, footer }
    }

    pub fn rom_banks(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    fn banked_len(&self) -> usize {
        self.ram.len() - self.footer
    }

    pub fn ram_banks(&self) -> usize {
        self.banked_len().div_ceil(RAM_BANK_SIZE)
    }

    /// Byte at `addr` (any ROM-range address) in ROM bank `bank`.
    #[inline]
    pub fn rom_byte(&self, bank: usize, addr: u16) -> u8 {
        let bank = bank % self.rom_banks();
        let offset = bank * ROM_BANK_SIZE + (addr as usize & (ROM_BANK_SIZE - 1));
        self.rom.get(offset).copied().unwrap_or(0xFF)
    }

    /// Byte at `addr` (A000-BFFF) in RAM bank `bank`; 0xFF without RAM.
    #[inline]
    pub fn ram_byte(&self, bank: usize, addr: u16) -> u8 {
        self.ram_offset(bank, addr)
            .map(|offset| self.ram[offset])
            .unwrap_or(0xFF)
    }

    #[inline]
    pub fn set_ram_byte(&mut self, bank: usize, addr: u16, val: u8) {
        if let Some(offset) = self.ram_offset(bank, addr) {
            self.ram[offset] = val;
        }
    }

    fn ram_offset(&self, bank: usize, addr: u16) -> Option<usize> {
        let banks = self.ram_banks();
        if banks == 0 {
            return None;
        }
        let offset = (bank % banks) * RAM_BANK_SIZE + (addr as usize & (RAM_BANK_SIZE - 1));
        (offset < self.banked_len()).then_some(offset)
    }

    /// Banked RAM followed by the footer.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn footer(&self) -> &[u8] {
        &self.ram[self.banked_len()..]
    }

    pub fn footer_mut(&mut self) -> &mut [u8] {
        let start = self.banked_len();
        &mut self.ram[start..]
    }
}

/// Bank registers of whichever controller is fitted, for save states.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapperRegisters {
    RomOnly,
    Mbc1(Mbc1Registers),
    Mbc3(Mbc3Registers),
    Mbc5(Mbc5Registers),
    Camera(CameraRegisters),
}

/// Fitted controller, chosen from the header type byte.
#[derive(Debug)]
pub enum Mapper {
    RomOnly(RomOnly),
    Mbc1(Mbc1),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
    Camera(PocketCamera),
}

impl Mapper {
    /// Controller for a header type byte; `None` when unsupported.
    pub fn from_cart(rom: Vec<u8>, ram: Vec<u8>, cart_type: u8) -> Option<Self> {
        let mapper = match cart_type {
            0x00 | 0x08 | 0x09 => Mapper::RomOnly(RomOnly::new(CartMemory::new(rom, ram))),
            0x01..=0x03 => Mapper::Mbc1(Mbc1::new(CartMemory::new(rom, ram))),
            0x0F | 0x10 => Mapper::Mbc3(Mbc3::with_clock(rom, ram)),
            0x11..=0x13 => Mapper::Mbc3(Mbc3::new(CartMemory::new(rom, ram))),
            0x19..=0x1E => Mapper::Mbc5(Mbc5::new(CartMemory::new(rom, ram))),
            0xFC => Mapper::Camera(PocketCamera::new(CartMemory::new(rom, ram))),
            _ => return None,
        };
        Some(mapper)
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        match self {
            Mapper::RomOnly(m) => m.read_rom(addr),
            Mapper::Mbc1(m) => m.read_rom(addr),
            Mapper::Mbc3(m) => m.read_rom(addr),
            Mapper::Mbc5(m) => m.read_rom(addr),
            Mapper::Camera(m) => m.read_rom(addr),
        }
    }

    /// ROM-range writes only ever reach bank registers.
    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::RomOnly(_) => {}
            Mapper::Mbc1(m) => m.write_rom(addr, val),
            Mapper::Mbc3(m) => m.write_rom(addr, val),
            Mapper::Mbc5(m) => m.write_rom(addr, val),
            Mapper::Camera(m) => m.write_rom(addr, val),
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        match self {
            Mapper::RomOnly(m) => m.read_ram(addr),
            Mapper::Mbc1(m) => m.read_ram(addr),
            Mapper::Mbc3(m) => m.read_ram(addr),
            Mapper::Mbc5(m) => m.read_ram(addr),
            Mapper::Camera(m) => m.read_ram(addr),
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::RomOnly(m) => m.write_ram(addr, val),
            Mapper::Mbc1(m) => m.write_ram(addr, val),
            Mapper::Mbc3(m) => m.write_ram(addr, val),
            Mapper::Mbc5(m) => m.write_ram(addr, val),
            Mapper::Camera(m) => m.write_ram(addr, val),
        }
    }

    /// Advance cartridge-side hardware: the camera sensor and the MBC3 clock.
    pub fn tick(&mut self, cycles: u32) {
        match self {
            Mapper::Camera(m) => m.tick(cycles),
            Mapper::Mbc3(m) => m.tick(cycles),
            _ => {}
        }
    }

    /// Bank registers back to power-on values; RAM contents survive.
    pub fn reset(&mut self) {
        match self {
            Mapper::RomOnly(_) => {}
            Mapper::Mbc1(m) => m.reset(),
            Mapper::Mbc3(m) => m.reset(),
            Mapper::Mbc5(m) => m.reset(),
            Mapper::Camera(m) => m.reset(),
        }
    }

    fn memory(&self) -> &CartMemory {
        match self {
            Mapper::RomOnly(m) => &m.mem,
            Mapper::Mbc1(m) => &m.mem,
            Mapper::Mbc3(m) => &m.mem,
            Mapper::Mbc5(m) => &m.mem,
            Mapper::Camera(m) => &m.mem,
        }
    }

    fn memory_mut(&mut self) -> &mut CartMemory {
        match self {
            Mapper::RomOnly(m) => &mut m.mem,
            Mapper::Mbc1(m) => &mut m.mem,
            Mapper::Mbc3(m) => &mut m.mem,
            Mapper::Mbc5(m) => &mut m.mem,
            Mapper::Camera(m) => &mut m.mem,
        }
    }

    /// Battery-backed RAM, the save blob.
    pub fn ram(&self) -> &[u8] {
        self.memory().ram()
    }

    /// Replace RAM with `data`; fails unless the sizes match exactly.
    pub fn load_ram(&mut self, data: &[u8]) -> bool {
        let ram = self.memory_mut().ram_mut();
        if ram.len() != data.len() {
            return false;
        }
        ram.copy_from_slice(data);
        if let Mapper::Mbc3(m) = self {
            m.reload_clock();
        }
        true
    }

    pub fn camera(&self) -> Option<&PocketCamera> {
        match self {
            Mapper::Camera(m) => Some(m),
            _ => None,
        }
    }

    pub fn camera_mut(&mut self) -> Option<&mut PocketCamera> {
        match self {
            Mapper::Camera(m) => Some(m),
            _ => None,
        }
    }

    pub fn registers(&self) -> MapperRegisters {
        match self {
            Mapper::RomOnly(_) => MapperRegisters::RomOnly,
            Mapper::Mbc1(m) => MapperRegisters::Mbc1(m.regs),
            Mapper::Mbc3(m) => MapperRegisters::Mbc3(m.registers()),
            Mapper::Mbc5(m) => MapperRegisters::Mbc5(m.regs),
            Mapper::Camera(m) => MapperRegisters::Camera(m.registers()),
        }
    }

    /// Restore bank registers; fails when they belong to another controller.
    pub fn restore_registers(&mut self, regs: &MapperRegisters) -> bool {
        match (self, regs) {
            (Mapper::RomOnly(_), MapperRegisters::RomOnly) => {}
            (Mapper::Mbc1(m), MapperRegisters::Mbc1(r)) => m.regs = *r,
            (Mapper::Mbc3(m), MapperRegisters::Mbc3(r)) => m.restore_registers(r),
            (Mapper::Mbc5(m), MapperRegisters::Mbc5(r)) => m.regs = *r,
            (Mapper::Camera(m), MapperRegisters::Camera(r)) => m.restore_registers(r),
            _ => return false,
        }
        true
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mapper::RomOnly(_) => "ROM",
            Mapper::Mbc1(_) => "MBC1",
            Mapper::Mbc3(_) => "MBC3",
            Mapper::Mbc5(_) => "MBC5",
            Mapper::Camera(_) => "POCKET CAMERA",
        }
    }
}
