//! IF/IE interrupt registers.

use serde::{Deserialize, Serialize};

/// Interrupt sources, in priority order; the discriminant is the IF/IE bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    Stat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptController {
    /// IF (FF0F)
    flags: u8,
    /// IE (FFFF)
    enable: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.flags |= interrupt.mask();
    }

    /// Request several sources at once from an IF-style mask.
    pub fn request_mask(&mut self, mask: u8) {
        self.flags |= mask & 0x1F;
    }

    /// Requested and enabled sources.
    pub fn pending(&self) -> u8 {
        self.flags & self.enable & 0x1F
    }

    pub fn acknowledge(&mut self, bit: u8) {
        self.flags &= !(1 << bit);
    }

    pub fn read_flags(&self) -> u8 {
        self.flags | 0xE0
    }

    pub fn write_flags(&mut self, val: u8) {
        self.flags = val & 0x1F;
    }

    pub fn read_enable(&self) -> u8 {
        self.enable
    }

    pub fn write_enable(&mut self, val: u8) {
        self.enable = val;
    }
}
