//! Cartridge header parsing and mapper construction.

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;
use thiserror::Error;

use crate::mappers::Mapper;

const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0144;
const TYPE_ADDR: usize = 0x0147;
const ROM_SIZE_ADDR: usize = 0x0148;
const RAM_SIZE_ADDR: usize = 0x0149;
const CHECKSUM_ADDR: usize = 0x014D;
/// Smallest image that still carries a complete header.
pub const MIN_ROM_SIZE: usize = 0x0150;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartridgeError {
    #[error("ROM image is empty")]
    Empty,
    #[error("ROM image is {0} bytes, too small to hold a header")]
    TooSmall(usize),
    #[error("unknown ROM size code {0:#04x}")]
    InvalidRomSize(u8),
    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedMapper(u8),
}

/// Fields of the header at 0x0134-0x014F that the emulator uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartridgeHeader {
    pub title: String,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub header_checksum: u8,
    pub checksum_valid: bool,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.is_empty() {
            return Err(CartridgeError::Empty);
        }
        if rom.len() < MIN_ROM_SIZE {
            return Err(CartridgeError::TooSmall(rom.len()));
        }

        let title = rom[TITLE_START..TITLE_END]
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|&b| b as char)
            .collect::<String>()
            .trim_end()
            .to_string();

        let computed = rom[TITLE_START..CHECKSUM_ADDR]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));

        let header = Self {
            title,
            cart_type: rom[TYPE_ADDR],
            rom_size_code: rom[ROM_SIZE_ADDR],
            ram_size_code: rom[RAM_SIZE_ADDR],
            header_checksum: rom[CHECKSUM_ADDR],
            checksum_valid: computed == rom[CHECKSUM_ADDR],
        };
        if header.rom_size_code > 0x08 {
            return Err(CartridgeError::InvalidRomSize(header.rom_size_code));
        }
        Ok(header)
    }

    /// Declared ROM size: 32 KiB shifted by the size code.
    pub fn rom_size(&self) -> usize {
        0x8000 << self.rom_size_code
    }

    /// External RAM size from the header; unknown codes mean no RAM.
    pub fn ram_size(&self) -> usize {
        match self.ram_size_code {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }
}

#[derive(Debug)]
pub struct Cartridge {
    pub header: CartridgeHeader,
    pub mapper: Mapper,
}

impl Cartridge {
    pub fn from_rom(data: &[u8]) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(data)?;
        if !header.checksum_valid {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "header checksum mismatch (stored {:#04x}), loading anyway",
                    header.header_checksum
                )
            });
        }
        if data.len() != header.rom_size() {
            log(LogCategory::Cartridge, LogLevel::Info, || {
                format!(
                    "ROM is {} bytes, header declares {}",
                    data.len(),
                    header.rom_size()
                )
            });
        }

        let ram = vec![0u8; header.ram_size()];
        let mapper = Mapper::from_cart(data.to_vec(), ram, header.cart_type)
            .ok_or(CartridgeError::UnsupportedMapper(header.cart_type))?;

        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "loaded \"{}\": {}, {} KiB ROM, {} bytes RAM",
                header.title,
                mapper.name(),
                data.len() / 1024,
                mapper.ram().len()
            )
        });
        Ok(Self { header, mapper })
    }

    pub fn is_camera(&self) -> bool {
        self.mapper.camera().is_some()
    }
}
