//! Memory bus: address decoding for the whole 16-bit space.
//!
//! ```text
//! $0000-$7FFF  Cartridge ROM (writes go to the mapper's bank registers)
//! $8000-$9FFF  Video RAM
//! $A000-$BFFF  Cartridge RAM / camera registers
//! $C000-$DFFF  Work RAM
//! $E000-$FDFF  Echo of $C000-$DDFF
//! $FE00-$FE9F  OAM
//! $FEA0-$FEFF  Unusable: reads 0xFF, writes dropped
//! $FF00-$FF7F  I/O registers
//! $FF80-$FFFE  High RAM
//! $FFFF        Interrupt enable
//! ```
//!
//! I/O registers without a modelled device (sound, CGB) keep the last value
//! written so programs can read them back.

use emu_core::cpu_lr35902::MemoryLr35902;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use crate::cartridge::Cartridge;
use crate::interrupts::{Interrupt, InterruptController};
use crate::joypad::Joypad;
use crate::mappers::MapperRegisters;
use crate::ppu::Ppu;
use crate::timer::Timer;

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const IO_SIZE: usize = 0x80;
const OAM_SIZE: usize = 0xA0;

/// SC value that starts a transfer on the internal clock.
const SERIAL_START_INTERNAL: u8 = 0x81;

pub struct GbBus {
    wram: Vec<u8>,
    hram: Vec<u8>,
    /// Backing store for I/O registers no device claims
    io: Vec<u8>,
    pub(crate) cartridge: Option<Cartridge>,
    pub ppu: Ppu,
    pub timer: Timer,
    pub interrupts: InterruptController,
    pub joypad: Joypad,
    serial_data: u8,
    serial_control: u8,
    serial_output: Vec<u8>,
    dma: u8,
}

/// Everything on the bus except cartridge ROM/RAM and the serial log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusState {
    pub wram: Vec<u8>,
    pub hram: Vec<u8>,
    pub io: Vec<u8>,
    pub ppu: Ppu,
    pub timer: Timer,
    pub interrupts: InterruptController,
    pub joypad: Joypad,
    pub serial_data: u8,
    pub serial_control: u8,
    pub dma: u8,
    pub mapper: Option<MapperRegisters>,
}

impl Default for GbBus {
    fn default() -> Self {
        Self::new()
    }
}

impl GbBus {
    pub fn new() -> Self {
        Self {
            wram: vec![0; WRAM_SIZE],
            hram: vec![0; HRAM_SIZE],
            io: vec![0xFF; IO_SIZE],
            cartridge: None,
            ppu: Ppu::new(),
            timer: Timer::new(),
            interrupts: InterruptController::new(),
            joypad: Joypad::new(),
            serial_data: 0,
            serial_control: 0,
            serial_output: Vec::new(),
            dma: 0xFF,
        }
    }

    /// Power-on state for everything but the cartridge's RAM.
    pub fn reset(&mut self) {
        let cartridge = self.cartridge.take();
        *self = Self::new();
        self.cartridge = cartridge;
        if let Some(cart) = &mut self.cartridge {
            cart.mapper.reset();
        }
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cartridge.as_mut()
    }

    /// Bytes shifted out over the serial port so far.
    pub fn serial_output(&self) -> &[u8] {
        &self.serial_output
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("request {interrupt:?}")
        });
        self.interrupts.request(interrupt);
    }

    /// Latch the host's buttons into the joypad.
    pub fn latch_buttons(&mut self, buttons: u8) {
        if self.joypad.latch(buttons) {
            self.request_interrupt(Interrupt::Joypad);
        }
    }

    /// Run every clocked device for `cycles`; returns true on frame completion.
    pub fn tick(&mut self, cycles: u32) -> bool {
        if self.timer.step(cycles) {
            self.request_interrupt(Interrupt::Timer);
        }
        let frame_done = self.ppu.step(cycles);
        let requests = self.ppu.take_requests();
        if requests != 0 {
            self.interrupts.request_mask(requests);
        }
        if let Some(cart) = &mut self.cartridge {
            cart.mapper.tick(cycles);
        }
        frame_done
    }

    /// OAM DMA: copy 160 bytes from `page << 8` at once.
    fn oam_dma(&mut self, page: u8) {
        self.dma = page;
        let base = (page as u16) << 8;
        for i in 0..OAM_SIZE as u16 {
            let val = self.read(base.wrapping_add(i));
            self.ppu.write_oam(i as usize, val);
        }
        log(LogCategory::Bus, LogLevel::Trace, || {
            format!("OAM DMA from {base:#06x}")
        });
    }

    fn write_serial_control(&mut self, val: u8) {
        self.serial_control = val;
        // No link partner: an internally clocked transfer finishes at once
        // and shifts in all ones.
        if val & SERIAL_START_INTERNAL == SERIAL_START_INTERNAL {
            self.serial_output.push(self.serial_data);
            self.serial_data = 0xFF;
            self.serial_control &= 0x7F;
            self.request_interrupt(Interrupt::Serial);
        }
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01 => self.serial_data,
            0xFF02 => self.serial_control | 0x7E,
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            0xFF0F => self.interrupts.read_flags(),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_register(addr),
            0xFF46 => self.dma,
            _ => self.io[(addr - 0xFF00) as usize],
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write(val),
            0xFF01 => self.serial_data = val,
            0xFF02 => self.write_serial_control(val),
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            0xFF0F => self.interrupts.write_flags(val),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.write_register(addr, val),
            0xFF46 => self.oam_dma(val),
            _ => self.io[(addr - 0xFF00) as usize] = val,
        }
    }

    pub fn snapshot(&self) -> BusState {
        BusState {
            wram: self.wram.clone(),
            hram: self.hram.clone(),
            io: self.io.clone(),
            ppu: self.ppu.clone(),
            timer: self.timer.clone(),
            interrupts: self.interrupts.clone(),
            joypad: self.joypad.clone(),
            serial_data: self.serial_data,
            serial_control: self.serial_control,
            dma: self.dma,
            mapper: self.cartridge.as_ref().map(|c| c.mapper.registers()),
        }
    }

    /// Restore a snapshot; returns false (changing nothing) if it does not
    /// fit this machine.
    pub fn restore(&mut self, state: BusState) -> bool {
        let sizes_ok = state.wram.len() == WRAM_SIZE
            && state.hram.len() == HRAM_SIZE
            && state.io.len() == IO_SIZE
            && state.ppu.memory_sizes_ok();
        if !sizes_ok {
            return false;
        }
        match (&mut self.cartridge, &state.mapper) {
            (Some(cart), Some(regs)) => {
                if !cart.mapper.restore_registers(regs) {
                    return false;
                }
            }
            (None, None) => {}
            _ => return false,
        }

        // Frame buffers are not serialized; keep what is on screen.
        let mut ppu = state.ppu;
        ppu.adopt_buffers(&mut self.ppu);

        self.wram = state.wram;
        self.hram = state.hram;
        self.io = state.io;
        self.ppu = ppu;
        self.timer = state.timer;
        self.interrupts = state.interrupts;
        self.joypad = state.joypad;
        self.serial_data = state.serial_data;
        self.serial_control = state.serial_control;
        self.dma = state.dma;
        true
    }
}

impl MemoryLr35902 for GbBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self
                .cartridge
                .as_ref()
                .map_or(0xFF, |c| c.mapper.read_rom(addr)),
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xA000..=0xBFFF => self
                .cartridge
                .as_ref()
                .map_or(0xFF, |c| c.mapper.read_ram(addr)),
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.read_oam((addr - 0xFE00) as usize),
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.read_enable(),
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(cart) = &mut self.cartridge {
                    cart.mapper.write_rom(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xA000..=0xBFFF => {
                if let Some(cart) = &mut self.cartridge {
                    cart.mapper.write_ram(addr, val);
                }
            }
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.write_oam((addr - 0xFE00) as usize, val),
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.interrupts.write_enable(val),
        }
    }

    fn pending_interrupts(&self) -> u8 {
        self.interrupts.pending()
    }

    fn acknowledge_interrupt(&mut self, bit: u8) {
        self.interrupts.acknowledge(bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::rom_image;

    fn bus_with(cart_type: u8, ram_code: u8) -> GbBus {
        let mut bus = GbBus::new();
        let mut rom = rom_image(cart_type, 0x01, ram_code);
        rom[0x0100] = 0x3C;
        rom[0x4000] = 0x77;
        bus.insert_cartridge(Cartridge::from_rom(&rom).unwrap());
        bus
    }

    #[test]
    fn empty_bus_reads_open() {
        let bus = GbBus::new();
        assert_eq!(bus.read(0x0100), 0xFF);
        assert_eq!(bus.read(0xA000), 0xFF);
    }

    #[test]
    fn cartridge_rom_and_ram() {
        let mut bus = bus_with(0x03, 0x02);
        assert_eq!(bus.read(0x0100), 0x3C);
        assert_eq!(bus.read(0x4000), 0x77);
        // ROM writes never change ROM.
        bus.write(0x0100, 0x00);
        assert_eq!(bus.read(0x0100), 0x3C);
        bus.write(0x0000, 0x0A);
        bus.write(0xA010, 0x99);
        assert_eq!(bus.read(0xA010), 0x99);
    }

    #[test]
    fn echo_ram_mirrors_wram() {
        let mut bus = GbBus::new();
        bus.write(0xC123, 0xAB);
        assert_eq!(bus.read(0xE123), 0xAB);
        bus.write(0xFDFF, 0xCD);
        assert_eq!(bus.read(0xDDFF), 0xCD);
    }

    #[test]
    fn unusable_region() {
        let mut bus = GbBus::new();
        bus.write(0xFEA0, 0x12);
        assert_eq!(bus.read(0xFEA0), 0xFF);
        assert_eq!(bus.read(0xFEFF), 0xFF);
    }

    #[test]
    fn hram_and_ie() {
        let mut bus = GbBus::new();
        bus.write(0xFF80, 0x11);
        bus.write(0xFFFE, 0x22);
        bus.write(0xFFFF, 0x1F);
        assert_eq!(bus.read(0xFF80), 0x11);
        assert_eq!(bus.read(0xFFFE), 0x22);
        assert_eq!(bus.read(0xFFFF), 0x1F);
    }

    #[test]
    fn unmapped_io_reads_back() {
        let mut bus = GbBus::new();
        bus.write(0xFF26, 0x80);
        bus.write(0xFF30, 0x5A);
        assert_eq!(bus.read(0xFF26), 0x80);
        assert_eq!(bus.read(0xFF30), 0x5A);
    }

    #[test]
    fn oam_dma_copies_a_page() {
        let mut bus = GbBus::new();
        for i in 0..0xA0u16 {
            bus.write(0xC100 + i, i as u8);
        }
        bus.write(0xFF46, 0xC1);
        assert_eq!(bus.read(0xFE00), 0x00);
        assert_eq!(bus.read(0xFE9F), 0x9F);
        assert_eq!(bus.read(0xFF46), 0xC1);
    }

    #[test]
    fn serial_without_partner() {
        let mut bus = GbBus::new();
        bus.write(0xFFFF, 0x1F);
        bus.write(0xFF01, b'O');
        bus.write(0xFF02, 0x81);
        bus.write(0xFF01, b'K');
        bus.write(0xFF02, 0x81);
        assert_eq!(bus.serial_output(), b"OK");
        assert_eq!(bus.read(0xFF01), 0xFF);
        assert_eq!(bus.read(0xFF02) & 0x80, 0);
        assert_eq!(bus.pending_interrupts(), Interrupt::Serial.mask());

        // Externally clocked transfers never finish.
        bus.write(0xFF02, 0x80);
        assert_eq!(bus.serial_output().len(), 2);
    }

    #[test]
    fn interrupt_flags_through_bus() {
        let mut bus = GbBus::new();
        bus.write(0xFF0F, 0x04);
        assert_eq!(bus.read(0xFF0F), 0xE4);
        assert_eq!(bus.pending_interrupts(), 0);
        bus.write(0xFFFF, 0x04);
        assert_eq!(bus.pending_interrupts(), 0x04);
        bus.acknowledge_interrupt(2);
        assert_eq!(bus.read(0xFF0F), 0xE0);
    }

    #[test]
    fn tick_drives_timer_and_vblank() {
        let mut bus = GbBus::new();
        bus.write(0xFF05, 0xFF);
        bus.write(0xFF07, 0x05);
        bus.tick(16);
        assert_ne!(bus.read(0xFF0F) & Interrupt::Timer.mask(), 0);

        let mut frames = 0;
        for _ in 0..(70224 / 4) {
            if bus.tick(4) {
                frames += 1;
            }
        }
        assert_eq!(frames, 1);
        assert_ne!(bus.read(0xFF0F) & Interrupt::VBlank.mask(), 0);
    }

    #[test]
    fn joypad_latch_requests_interrupt() {
        let mut bus = GbBus::new();
        bus.latch_buttons(0x01);
        assert_ne!(bus.read(0xFF0F) & Interrupt::Joypad.mask(), 0);
        bus.write(0xFF00, 0x10);
        assert_eq!(bus.read(0xFF00) & 0x0F, 0x0E);
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let mut bus = bus_with(0x01, 0x00);
        bus.write(0xC000, 0x42);
        bus.write(0x2000, 0x03);
        let state = bus.snapshot();
        let json = serde_json::to_string(&state).unwrap();

        let mut other = bus_with(0x01, 0x00);
        let state: BusState = serde_json::from_str(&json).unwrap();
        assert!(other.restore(state));
        assert_eq!(other.read(0xC000), 0x42);
        assert_eq!(other.mapper_registers_json(), bus.mapper_registers_json());

        let mut plain = bus_with(0x00, 0x00);
        assert!(!plain.restore(bus.snapshot()));
        assert_eq!(plain.read(0xC000), 0x00);
    }

    #[test]
    fn color_registers_are_plain_io() {
        let mut bus = GbBus::new();
        bus.write(0xC000, 0x11);
        // VBK, SVBK, KEY1 and BCPS store bytes and switch nothing.
        for (addr, val) in [(0xFF4F, 0x01), (0xFF70, 0x02), (0xFF4D, 0x01), (0xFF68, 0x80)] {
            bus.write(addr, val);
            assert_eq!(bus.read(addr), val);
        }
        assert_eq!(bus.read(0xC000), 0x11);
        bus.write(0xD000, 0x22);
        bus.write(0xFF70, 0x03);
        assert_eq!(bus.read(0xD000), 0x22);
    }

    impl GbBus {
        fn mapper_registers_json(&self) -> String {
            serde_json::to_string(&self.cartridge.as_ref().map(|c| c.mapper.registers())).unwrap()
        }
    }
}
