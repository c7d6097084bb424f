//! MBC3
//!
//! - 0x0000-0x1FFF: RAM and clock enable (0x0A in the low nibble)
//! - 0x2000-0x3FFF: ROM bank, 7 bits (0 reads as 1)
//! - 0x4000-0x5FFF: RAM bank 0-3, or clock register select 0x08-0x0C
//! - 0x6000-0x7FFF: clock latch (write 0x00 then 0x01)
//!
//! Cartridge types 0x0F and 0x10 carry the real-time clock. It counts
//! emulated cycles, not host time, and its registers are saved in a footer
//! after the RAM banks. On other MBC3 boards the clock selects read 0xFF.

use serde::{Deserialize, Serialize};

use super::CartMemory;
use emu_core::logging::{log, LogCategory, LogLevel};

/// Clock input; the counters advance once per this many cycles.
pub const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

/// Save footer: live and latched registers as ten little-endian u32s, then
/// the cycles into the current second as a little-endian u64.
pub const RTC_SAVE_BYTES: usize = 48;

const SECONDS: usize = 0;
const MINUTES: usize = 1;
const HOURS: usize = 2;
const DAY_LOW: usize = 3;
const DAY_HIGH: usize = 4;

/// Writable bits of each register.
const REGISTER_MASKS: [u8; 5] = [0x3F, 0x3F, 0x1F, 0xFF, 0xC1];

const DAY_HIGH_BIT: u8 = 0x01;
const HALT: u8 = 0x40;
const DAY_CARRY: u8 = 0x80;

/// MBC3 real-time clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rtc {
    /// Seconds, minutes, hours, day low, day high (bit 0 day bit 8, bit 6
    /// halt, bit 7 day carry).
    pub live: [u8; 5],
    /// Snapshot the game reads back.
    pub latched: [u8; 5],
    pub subsecond: u32,
    /// Last latch write was 0x00.
    pub latch_armed: bool,
}

impl Rtc {
    /// Clock restored from a save footer; a short footer reads as zero.
    pub fn from_save(bytes: &[u8]) -> Self {
        let word = |i: usize| -> u32 {
            bytes
                .get(i * 4..i * 4 + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .unwrap_or(0)
        };
        let mut rtc = Self::default();
        for (i, mask) in REGISTER_MASKS.iter().enumerate() {
            rtc.live[i] = word(i) as u8 & mask;
            rtc.latched[i] = word(i + 5) as u8 & mask;
        }
        let subsecond = bytes
            .get(40..48)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .unwrap_or(0);
        rtc.subsecond = (subsecond % RTC_CYCLES_PER_SECOND as u64) as u32;
        rtc
    }

    pub fn write_save(&self, out: &mut [u8]) {
        let words = self.live.iter().chain(&self.latched);
        for (chunk, &reg) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&u32::from(reg).to_le_bytes());
        }
        if let Some(tail) = out.get_mut(40..48) {
            tail.copy_from_slice(&u64::from(self.subsecond).to_le_bytes());
        }
    }

    pub fn halted(&self) -> bool {
        self.live[DAY_HIGH] & HALT != 0
    }

    pub fn day(&self) -> u16 {
        (u16::from(self.live[DAY_HIGH] & DAY_HIGH_BIT) << 8) | u16::from(self.live[DAY_LOW])
    }

    /// Count `cycles`; true when a second boundary was crossed.
    pub fn tick(&mut self, cycles: u32) -> bool {
        if self.halted() {
            return false;
        }
        self.subsecond += cycles;
        let mut changed = false;
        while self.subsecond >= RTC_CYCLES_PER_SECOND {
            self.subsecond -= RTC_CYCLES_PER_SECOND;
            self.advance_second();
            changed = true;
        }
        changed
    }

    // Out-of-range values count up to the register width and wrap to zero
    // without carrying.
    fn advance_second(&mut self) {
        let regs = &mut self.live;
        regs[SECONDS] = (regs[SECONDS] + 1) & REGISTER_MASKS[SECONDS];
        if regs[SECONDS] != 60 {
            return;
        }
        regs[SECONDS] = 0;
        regs[MINUTES] = (regs[MINUTES] + 1) & REGISTER_MASKS[MINUTES];
        if regs[MINUTES] != 60 {
            return;
        }
        regs[MINUTES] = 0;
        regs[HOURS] = (regs[HOURS] + 1) & REGISTER_MASKS[HOURS];
        if regs[HOURS] != 24 {
            return;
        }
        regs[HOURS] = 0;

        let day = self.day() + 1;
        let regs = &mut self.live;
        let mut high = regs[DAY_HIGH] & !DAY_HIGH_BIT;
        if day > 0x1FF {
            high |= DAY_CARRY;
        }
        regs[DAY_LOW] = day as u8;
        regs[DAY_HIGH] = high | ((day >> 8) as u8 & DAY_HIGH_BIT);
    }

    pub fn write_latch(&mut self, val: u8) {
        if val == 0x01 && self.latch_armed {
            self.latched = self.live;
        }
        self.latch_armed = val == 0x00;
    }

    /// Latched value for a clock select (0x08-0x0C).
    pub fn read(&self, select: u8) -> u8 {
        register_index(select).map_or(0xFF, |i| self.latched[i])
    }

    pub fn write(&mut self, select: u8, val: u8) {
        let Some(i) = register_index(select) else {
            return;
        };
        self.live[i] = val & REGISTER_MASKS[i];
        if i == SECONDS {
            self.subsecond = 0;
        }
    }
}

fn register_index(select: u8) -> Option<usize> {
    match select {
        0x08..=0x0C => Some((select - 0x08) as usize),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbc3Registers {
    pub ram_enabled: bool,
    pub rom_bank: u8,
    /// RAM bank or clock register select
    pub select: u8,
    #[serde(default)]
    pub clock: Option<Rtc>,
}

impl Default for Mbc3Registers {
    fn default() -> Self {
        Self {
            ram_enabled: false,
            rom_bank: 1,
            select: 0,
            clock: None,
        }
    }
}

#[derive(Debug)]
pub struct Mbc3 {
    pub(super) mem: CartMemory,
    regs: Mbc3Registers,
}

impl Mbc3 {
    pub fn new(mem: CartMemory) -> Self {
        Self {
            mem,
            regs: Mbc3Registers::default(),
        }
    }

    /// Board with the real-time clock; its save footer follows `ram`.
    pub fn with_clock(rom: Vec<u8>, ram: Vec<u8>) -> Self {
        Self {
            mem: CartMemory::with_footer(rom, ram, RTC_SAVE_BYTES),
            regs: Mbc3Registers {
                clock: Some(Rtc::default()),
                ..Mbc3Registers::default()
            },
        }
    }

    /// Bank registers to power-on values; the clock keeps running.
    pub fn reset(&mut self) {
        self.regs = Mbc3Registers {
            clock: self.regs.clock,
            ..Mbc3Registers::default()
        };
    }

    pub fn clock(&self) -> Option<&Rtc> {
        self.regs.clock.as_ref()
    }

    pub fn registers(&self) -> Mbc3Registers {
        self.regs
    }

    /// Clock state is only taken on a board that has a clock.
    pub fn restore_registers(&mut self, regs: &Mbc3Registers) {
        let clock = self.regs.clock;
        self.regs = Mbc3Registers {
            clock: clock.and(regs.clock.or(clock)),
            ..*regs
        };
        self.sync_footer();
    }

    /// Re-read the clock after the save blob was replaced.
    pub fn reload_clock(&mut self) {
        if let Some(clock) = &mut self.regs.clock {
            *clock = Rtc::from_save(self.mem.footer());
        }
    }

    fn sync_footer(&mut self) {
        if let Some(clock) = &self.regs.clock {
            clock.write_save(self.mem.footer_mut());
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        let crossed = self
            .regs
            .clock
            .as_mut()
            .is_some_and(|clock| clock.tick(cycles));
        if crossed {
            self.sync_footer();
        }
    }

    fn selected_ram_bank(&self) -> Option<usize> {
        match self.regs.select {
            0x00..=0x07 => Some((self.regs.select & 0x03) as usize),
            _ => None,
        }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            match self.regs.rom_bank {
                0 => 1,
                n => n as usize,
            }
        };
        self.mem.rom_byte(bank, addr)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.regs.ram_enabled = val & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.regs.rom_bank = val & 0x7F,
            0x4000..=0x5FFF => {
                if (0x08..=0x0C).contains(&val) {
                    log(LogCategory::Cartridge, LogLevel::Trace, || {
                        format!("MBC3 clock register {val:#04x} selected")
                    });
                }
                self.regs.select = val;
            }
            0x6000..=0x7FFF => {
                if let Some(clock) = &mut self.regs.clock {
                    clock.write_latch(val);
                    self.sync_footer();
                }
            }
            _ => {}
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.regs.ram_enabled {
            return 0xFF;
        }
        match self.selected_ram_bank() {
            Some(bank) => self.mem.ram_byte(bank, addr),
            None => self
                .regs
                .clock
                .map_or(0xFF, |clock| clock.read(self.regs.select)),
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !self.regs.ram_enabled {
            return;
        }
        match self.selected_ram_bank() {
            Some(bank) => self.mem.set_ram_byte(bank, addr, val),
            None => {
                if let Some(clock) = &mut self.regs.clock {
                    clock.write(self.regs.select, val);
                    self.sync_footer();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::{RAM_BANK_SIZE, ROM_BANK_SIZE};

    fn cart(rom_banks: usize, ram_banks: usize) -> Mbc3 {
        let mut rom = vec![0; rom_banks * ROM_BANK_SIZE];
        for bank in 0..rom_banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        Mbc3::new(CartMemory::new(rom, vec![0; ram_banks * RAM_BANK_SIZE]))
    }

    fn timer_cart() -> Mbc3 {
        let mut mbc = Mbc3::with_clock(vec![0; 2 * ROM_BANK_SIZE], vec![0; RAM_BANK_SIZE]);
        mbc.write_rom(0x0000, 0x0A);
        mbc
    }

    fn set_clock(mbc: &mut Mbc3, regs: [u8; 5]) {
        for (select, val) in (0x08..=0x0C).zip(regs) {
            mbc.write_rom(0x4000, select);
            mbc.write_ram(0xA000, val);
        }
    }

    fn read_clock(mbc: &mut Mbc3) -> [u8; 5] {
        mbc.write_rom(0x6000, 0x00);
        mbc.write_rom(0x6000, 0x01);
        let mut out = [0; 5];
        for (select, slot) in (0x08..=0x0C).zip(out.iter_mut()) {
            mbc.write_rom(0x4000, select);
            *slot = mbc.read_ram(0xA000);
        }
        out
    }

    #[test]
    fn seven_bit_rom_bank() {
        let mut mbc = cart(128, 0);
        assert_eq!(mbc.read_rom(0x4000), 1);
        mbc.write_rom(0x2000, 0x7F);
        assert_eq!(mbc.read_rom(0x4000), 127);
        mbc.write_rom(0x2000, 0x80);
        assert_eq!(mbc.read_rom(0x4000), 1);
        mbc.write_rom(0x3FFF, 0x21);
        assert_eq!(mbc.read_rom(0x4000), 0x21);
    }

    #[test]
    fn ram_banks_are_separate() {
        let mut mbc = cart(2, 4);
        mbc.write_rom(0x0000, 0x0A);
        for bank in 0..4u8 {
            mbc.write_rom(0x4000, bank);
            mbc.write_ram(0xB000, 0x10 + bank);
        }
        for bank in 0..4u8 {
            mbc.write_rom(0x4000, bank);
            assert_eq!(mbc.read_ram(0xB000), 0x10 + bank);
        }
    }

    #[test]
    fn clockless_board_reads_open_bus() {
        let mut mbc = cart(2, 1);
        mbc.write_rom(0x0000, 0x0A);
        mbc.write_ram(0xA000, 0x99);
        for select in 0x08..=0x0C {
            mbc.write_rom(0x4000, select);
            mbc.write_ram(0xA000, 0x12);
            assert_eq!(mbc.read_ram(0xA000), 0xFF);
        }
        mbc.write_rom(0x4000, 0);
        assert_eq!(mbc.read_ram(0xA000), 0x99);
        assert!(mbc.clock().is_none());
    }

    #[test]
    fn reads_come_from_the_latch() {
        let mut mbc = timer_cart();
        set_clock(&mut mbc, [30, 45, 12, 0xFF, 0x01]);
        mbc.write_rom(0x4000, 0x08);
        assert_eq!(mbc.read_ram(0xA000), 0);

        assert_eq!(read_clock(&mut mbc), [30, 45, 12, 0xFF, 0x01]);

        set_clock(&mut mbc, [10, 0, 0, 0, 0]);
        mbc.write_rom(0x4000, 0x08);
        assert_eq!(mbc.read_ram(0xA000), 30);
        assert_eq!(read_clock(&mut mbc)[0], 10);
    }

    #[test]
    fn latch_needs_zero_then_one() {
        let mut rtc = Rtc::default();
        rtc.write(0x08, 42);
        rtc.write_latch(0x01);
        assert_eq!(rtc.read(0x08), 0);
        rtc.write_latch(0x00);
        rtc.write_latch(0x02);
        rtc.write_latch(0x01);
        assert_eq!(rtc.read(0x08), 0);
        rtc.write_latch(0x00);
        rtc.write_latch(0x01);
        assert_eq!(rtc.read(0x08), 42);
    }

    #[test]
    fn writes_keep_only_register_bits() {
        let mut mbc = timer_cart();
        set_clock(&mut mbc, [0xFF; 5]);
        assert_eq!(read_clock(&mut mbc), [0x3F, 0x3F, 0x1F, 0xFF, 0xC1]);
    }

    #[test]
    fn clock_follows_emulated_cycles() {
        let mut mbc = timer_cart();
        set_clock(&mut mbc, [58, 0, 0, 0, 0]);
        mbc.tick(RTC_CYCLES_PER_SECOND - 4);
        assert_eq!(read_clock(&mut mbc)[0], 58);
        mbc.tick(4);
        assert_eq!(read_clock(&mut mbc)[0], 59);
        mbc.tick(RTC_CYCLES_PER_SECOND * 4);
        assert_eq!(read_clock(&mut mbc)[..2], [3, 1]);
    }

    #[test]
    fn rollover_reaches_the_day_counter() {
        let mut rtc = Rtc::default();
        for (select, val) in (0x08..=0x0C).zip([59, 59, 23, 0xFF, 0x00]) {
            rtc.write(select, val);
        }
        assert!(rtc.tick(RTC_CYCLES_PER_SECOND));
        assert_eq!(rtc.live, [0, 0, 0, 0x00, 0x01]);
        assert_eq!(rtc.day(), 256);
    }

    #[test]
    fn day_overflow_sets_carry() {
        let mut rtc = Rtc::default();
        for (select, val) in (0x08..=0x0C).zip([59, 59, 23, 0xFF, 0x01]) {
            rtc.write(select, val);
        }
        rtc.tick(RTC_CYCLES_PER_SECOND);
        assert_eq!(rtc.day(), 0);
        assert_eq!(rtc.live[DAY_HIGH], DAY_CARRY);

        // Carry stays until the game clears it.
        rtc.tick(RTC_CYCLES_PER_SECOND);
        assert_eq!(rtc.live[SECONDS], 1);
        assert_eq!(rtc.live[DAY_HIGH], DAY_CARRY);
        rtc.write(0x0C, 0x00);
        assert_eq!(rtc.live[DAY_HIGH], 0);
    }

    #[test]
    fn out_of_range_values_wrap_without_carry() {
        let mut rtc = Rtc::default();
        rtc.write(0x08, 63);
        rtc.write(0x09, 7);
        rtc.tick(RTC_CYCLES_PER_SECOND);
        assert_eq!(rtc.live[SECONDS], 0);
        assert_eq!(rtc.live[MINUTES], 7);
    }

    #[test]
    fn halt_stops_the_clock() {
        let mut mbc = timer_cart();
        set_clock(&mut mbc, [10, 0, 0, 0, HALT]);
        mbc.tick(RTC_CYCLES_PER_SECOND * 3);
        assert_eq!(read_clock(&mut mbc)[0], 10);

        mbc.write_rom(0x4000, 0x0C);
        mbc.write_ram(0xA000, 0x00);
        mbc.tick(RTC_CYCLES_PER_SECOND);
        assert_eq!(read_clock(&mut mbc)[0], 11);
    }

    #[test]
    fn clock_lives_in_the_save_footer() {
        let mut mbc = timer_cart();
        set_clock(&mut mbc, [5, 6, 7, 8, 0x01]);
        mbc.tick(RTC_CYCLES_PER_SECOND + 100);
        read_clock(&mut mbc);
        let clock = *mbc.clock().unwrap();

        let footer = mbc.mem.footer().to_vec();
        assert_eq!(footer.len(), RTC_SAVE_BYTES);
        assert_eq!(footer[0..4], [6, 0, 0, 0]);
        assert_eq!(footer[16..20], [1, 0, 0, 0]);
        assert_eq!(footer[20..24], [6, 0, 0, 0]);
        assert_eq!(Rtc::from_save(&footer).live, clock.live);
        assert_eq!(Rtc::from_save(&footer).latched, clock.latched);

        let mut other = timer_cart();
        other.mem.footer_mut().copy_from_slice(&footer);
        other.reload_clock();
        assert_eq!(read_clock(&mut other), [6, 6, 7, 8, 0x01]);
    }

    #[test]
    fn restored_registers_keep_board_clock() {
        let mut mbc = timer_cart();
        set_clock(&mut mbc, [1, 2, 3, 4, 0]);
        let regs = mbc.registers();

        let mut plain = cart(2, 1);
        plain.restore_registers(&regs);
        assert!(plain.clock().is_none());

        let mut other = timer_cart();
        other.restore_registers(&Mbc3Registers::default());
        assert!(other.clock().is_some());
        other.restore_registers(&regs);
        assert_eq!(other.clock(), mbc.clock());
        assert_eq!(other.mem.footer(), mbc.mem.footer());
    }
}
