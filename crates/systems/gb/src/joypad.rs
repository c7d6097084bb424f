//! Joypad matrix at FF00.
//!
//! Bit 4 low selects the direction keys, bit 5 low the action buttons; the
//! low nibble then reads the selected group active-low.

use serde::{Deserialize, Serialize};

/// Host button indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub const fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Joypad {
    /// Group select bits 4-5 as last written
    select: u8,
    /// Latched buttons, one bit per [`Button`], 1 = pressed
    pressed: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            pressed: 0,
        }
    }

    /// Latch a new button set; returns true if any button went down.
    pub fn latch(&mut self, buttons: u8) -> bool {
        let newly_pressed = buttons & !self.pressed;
        self.pressed = buttons;
        newly_pressed != 0
    }

    pub fn pressed(&self) -> u8 {
        self.pressed
    }

    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            low &= !(self.pressed >> 4);
        }
        if self.select & 0x20 == 0 {
            low &= !self.pressed;
        }
        0xC0 | self.select | (low & 0x0F)
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }
}
