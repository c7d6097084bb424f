//! Divider and programmable timer.
//!
//! - `$FF04 (DIV)`: high byte of a free-running 16-bit counter; any write clears the counter
//! - `$FF05 (TIMA)`: counts at the TAC rate, reloads from TMA on overflow
//! - `$FF06 (TMA)`: reload value
//! - `$FF07 (TAC)`: bit 2 enable, bits 0-1 clock select
//!
//! | TAC & 3 | Frequency  | Period (cycles) |
//! |---------|------------|-----------------|
//! | 00      | 4096 Hz    | 1024            |
//! | 01      | 262144 Hz  | 16              |
//! | 10      | 65536 Hz   | 64              |
//! | 11      | 16384 Hz   | 256             |
//!
//! TIMA ticks whenever the internal counter crosses a multiple of the
//! selected period, so clearing DIV also restarts the TIMA phase.

use serde::{Deserialize, Serialize};

const TAC_ENABLE: u8 = 0x04;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timer {
    counter: u16,
    tima: u8,
    tma: u8,
    tac: u8,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn period(&self) -> u32 {
        match self.tac & 0x03 {
            0 => 1024,
            1 => 16,
            2 => 64,
            _ => 256,
        }
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.counter >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.counter = 0,
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & 0x07,
            _ => {}
        }
    }

    /// Advance by `cycles`; returns true when TIMA overflowed at least once.
    pub fn step(&mut self, cycles: u32) -> bool {
        let start = self.counter as u32;
        let end = start + cycles;
        self.counter = end as u16;

        if self.tac & TAC_ENABLE == 0 {
            return false;
        }
        let period = self.period();
        let ticks = end / period - start / period;

        let mut overflowed = false;
        for _ in 0..ticks {
            let (next, carry) = self.tima.overflowing_add(1);
            self.tima = if carry { self.tma } else { next };
            overflowed |= carry;
        }
        overflowed
    }
}
