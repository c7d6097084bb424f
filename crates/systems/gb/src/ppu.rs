//! DMG video pipeline.
//!
//! A per-dot mode state machine drives LY and the STAT flags; each visible
//! line is composited at the end of pixel transfer into the back buffer of
//! 2-bit shades, which becomes the front buffer at V-blank entry.

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::ppu::tile::{self, TILE_BYTES};
use serde::{Deserialize, Serialize};

use crate::interrupts::Interrupt;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const SCREEN_PIXELS: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

const OAM_SCAN_DOTS: u32 = 80;
const TRANSFER_DOTS: u32 = 172;
pub const LINE_DOTS: u32 = 456;
const LINES_PER_FRAME: u8 = 154;
pub const FRAME_DOTS: u32 = LINE_DOTS * LINES_PER_FRAME as u32;

const MAX_SPRITES_PER_LINE: usize = 10;
const OAM_ENTRIES: usize = 40;

// LCDC bits
const LCDC_ENABLE: u8 = 0x80;
const LCDC_WIN_TILEMAP: u8 = 0x40;
const LCDC_WIN_ENABLE: u8 = 0x20;
const LCDC_BG_WIN_TILES: u8 = 0x10;
const LCDC_BG_TILEMAP: u8 = 0x08;
const LCDC_OBJ_SIZE: u8 = 0x04;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_BG_WIN_ENABLE: u8 = 0x01;

// STAT interrupt source enables
const STAT_HBLANK: u8 = 0x08;
const STAT_VBLANK: u8 = 0x10;
const STAT_OAM: u8 = 0x20;
const STAT_LYC: u8 = 0x40;

// Sprite attribute flags
const OBJ_BEHIND_BG: u8 = 0x80;
const OBJ_FLIP_Y: u8 = 0x40;
const OBJ_FLIP_X: u8 = 0x20;
const OBJ_PALETTE_1: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

fn blank_screen() -> Vec<u8> {
    vec![0; SCREEN_PIXELS]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ppu {
    vram: Vec<u8>,
    oam: Vec<u8>,

    pub lcdc: u8,
    /// Interrupt source enables (bits 3-6); mode and LYC flag are computed on read
    stat: u8,
    pub scy: u8,
    pub scx: u8,
    ly: u8,
    lyc: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub wy: u8,
    pub wx: u8,

    mode: Mode,
    /// Dot within the current line
    line_dot: u32,
    /// Dots since the LCD was switched off
    off_dots: u32,
    window_line: u8,
    stat_line: bool,
    /// Interrupt requests not yet collected by the bus
    requests: u8,

    #[serde(skip, default = "blank_screen")]
    back: Vec<u8>,
    #[serde(skip, default = "blank_screen")]
    front: Vec<u8>,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: vec![0; 0x2000],
            oam: vec![0; 0xA0],
            lcdc: 0x91,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0xFC,
            obp0: 0xFF,
            obp1: 0xFF,
            wy: 0,
            wx: 0,
            mode: Mode::OamScan,
            line_dot: 0,
            off_dots: 0,
            window_line: 0,
            stat_line: false,
            requests: 0,
            back: blank_screen(),
            front: blank_screen(),
        }
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[(addr & 0x1FFF) as usize]
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.vram[(addr & 0x1FFF) as usize] = val;
    }

    pub fn read_oam(&self, index: usize) -> u8 {
        self.oam.get(index).copied().unwrap_or(0xFF)
    }

    pub fn write_oam(&mut self, index: usize, val: u8) {
        if let Some(byte) = self.oam.get_mut(index) {
            *byte = val;
        }
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    /// Last completed picture as shades 0-3, row-major.
    pub fn front_buffer(&self) -> &[u8] {
        &self.front
    }

    /// VRAM and OAM have their hardware sizes (deserialized state may not).
    pub(crate) fn memory_sizes_ok(&self) -> bool {
        self.vram.len() == 0x2000 && self.oam.len() == 0xA0
    }

    /// Take over another pipeline's frame buffers (they are not serialized).
    pub(crate) fn adopt_buffers(&mut self, other: &mut Ppu) {
        std::mem::swap(&mut self.front, &mut other.front);
        std::mem::swap(&mut self.back, &mut other.back);
    }

    /// Collect requested interrupts as an IF mask.
    pub fn take_requests(&mut self) -> u8 {
        std::mem::take(&mut self.requests)
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
                0x80 | (self.stat & 0x78) | coincidence | self.mode as u8
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => self.write_lcdc(val),
            0xFF41 => {
                self.stat = val & 0x78;
                self.update_stat_line();
            }
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            // LY is read-only
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                self.update_stat_line();
            }
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    fn write_lcdc(&mut self, val: u8) {
        let was_on = self.lcd_enabled();
        self.lcdc = val;
        match (was_on, self.lcd_enabled()) {
            (true, false) => {
                self.ly = 0;
                self.line_dot = 0;
                self.off_dots = 0;
                self.mode = Mode::HBlank;
                self.back.fill(0);
                self.front.fill(0);
                self.stat_line = false;
                log(LogCategory::Ppu, LogLevel::Debug, || "LCD off".to_string());
            }
            (false, true) => {
                self.ly = 0;
                self.line_dot = 0;
                self.window_line = 0;
                self.mode = Mode::OamScan;
                self.update_stat_line();
                log(LogCategory::Ppu, LogLevel::Debug, || "LCD on".to_string());
            }
            _ => {}
        }
    }

    /// Advance by `cycles` dots; returns true when a frame completed.
    pub fn step(&mut self, cycles: u32) -> bool {
        if !self.lcd_enabled() {
            self.off_dots += cycles;
            if self.off_dots >= FRAME_DOTS {
                self.off_dots -= FRAME_DOTS;
                return true;
            }
            return false;
        }

        let mut frame_done = false;
        let mut remaining = cycles;
        while remaining > 0 {
            let boundary = match self.mode {
                Mode::OamScan => OAM_SCAN_DOTS,
                Mode::Transfer => OAM_SCAN_DOTS + TRANSFER_DOTS,
                Mode::HBlank | Mode::VBlank => LINE_DOTS,
            };
            let run = remaining.min(boundary - self.line_dot);
            self.line_dot += run;
            remaining -= run;
            if self.line_dot == boundary {
                frame_done |= self.advance_mode();
            }
        }
        frame_done
    }

    fn advance_mode(&mut self) -> bool {
        let mut frame_done = false;
        match self.mode {
            Mode::OamScan => self.mode = Mode::Transfer,
            Mode::Transfer => {
                self.render_line();
                self.mode = Mode::HBlank;
            }
            Mode::HBlank | Mode::VBlank => {
                self.line_dot = 0;
                self.ly += 1;
                if self.ly == SCREEN_HEIGHT as u8 {
                    self.mode = Mode::VBlank;
                    std::mem::swap(&mut self.front, &mut self.back);
                    self.requests |= Interrupt::VBlank.mask();
                } else if self.ly == LINES_PER_FRAME {
                    self.ly = 0;
                    self.window_line = 0;
                    self.mode = Mode::OamScan;
                    frame_done = true;
                } else if self.ly < SCREEN_HEIGHT as u8 {
                    self.mode = Mode::OamScan;
                }
            }
        }
        self.update_stat_line();
        frame_done
    }

    /// Re-evaluate the STAT interrupt line; requests on its rising edge.
    fn update_stat_line(&mut self) {
        if !self.lcd_enabled() {
            return;
        }
        let line = match self.mode {
            Mode::HBlank => self.stat & STAT_HBLANK != 0,
            Mode::VBlank => self.stat & STAT_VBLANK != 0,
            Mode::OamScan => self.stat & STAT_OAM != 0,
            Mode::Transfer => false,
        } || (self.ly == self.lyc && self.stat & STAT_LYC != 0);

        if line && !self.stat_line {
            self.requests |= Interrupt::Stat.mask();
        }
        self.stat_line = line;
    }

    /// Address (VRAM-relative) of a BG/window tile, honouring LCDC bit 4.
    fn bg_tile_addr(&self, tile_index: u8) -> usize {
        if self.lcdc & LCDC_BG_WIN_TILES != 0 {
            tile_index as usize * 16
        } else {
            (0x1000 + (tile_index as i8 as isize) * 16) as usize
        }
    }

    fn tile_color(&self, tile_addr: usize, x: u8, y: u8) -> u8 {
        tile::pixel(&self.vram[tile_addr..tile_addr + TILE_BYTES], x, y)
    }

    fn map_color(&self, map_base: usize, x: u8, y: u8) -> u8 {
        let entry = map_base + (y as usize / 8) * 32 + (x as usize / 8);
        let tile_addr = self.bg_tile_addr(self.vram[entry]);
        self.tile_color(tile_addr, x % 8, y % 8)
    }

    fn render_line(&mut self) {
        let ly = self.ly;
        if ly as usize >= SCREEN_HEIGHT {
            return;
        }
        let mut bg_colors = [0u8; SCREEN_WIDTH];
        let mut shades = [0u8; SCREEN_WIDTH];

        if self.lcdc & LCDC_BG_WIN_ENABLE != 0 {
            let bg_map = if self.lcdc & LCDC_BG_TILEMAP != 0 { 0x1C00 } else { 0x1800 };
            let y = ly.wrapping_add(self.scy);
            for (x, color) in bg_colors.iter_mut().enumerate() {
                *color = self.map_color(bg_map, (x as u8).wrapping_add(self.scx), y);
            }

            let window_visible =
                self.lcdc & LCDC_WIN_ENABLE != 0 && ly >= self.wy && self.wx <= 166;
            if window_visible {
                let win_map = if self.lcdc & LCDC_WIN_TILEMAP != 0 { 0x1C00 } else { 0x1800 };
                let start = (self.wx as usize).saturating_sub(7);
                let shift = 7usize.saturating_sub(self.wx as usize);
                for x in start..SCREEN_WIDTH {
                    let win_x = (x - start + shift) as u8;
                    bg_colors[x] = self.map_color(win_map, win_x, self.window_line);
                }
                self.window_line = self.window_line.wrapping_add(1);
            }

            for (shade, &color) in shades.iter_mut().zip(bg_colors.iter()) {
                *shade = apply_palette(self.bgp, color);
            }
        }

        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            self.render_sprites(ly, &bg_colors, &mut shades);
        }

        let row = ly as usize * SCREEN_WIDTH;
        self.back[row..row + SCREEN_WIDTH].copy_from_slice(&shades);
    }

    fn render_sprites(
        &self,
        ly: u8,
        bg_colors: &[u8; SCREEN_WIDTH],
        shades: &mut [u8; SCREEN_WIDTH],
    ) {
        let height: i16 = if self.lcdc & LCDC_OBJ_SIZE != 0 { 16 } else { 8 };

        // First ten in OAM order, then drawing priority: lower X, then OAM index.
        let mut visible: Vec<usize> = (0..OAM_ENTRIES)
            .filter(|&i| {
                let top = self.oam[i * 4] as i16 - 16;
                (top..top + height).contains(&(ly as i16))
            })
            .take(MAX_SPRITES_PER_LINE)
            .collect();
        visible.sort_by_key(|&i| (self.oam[i * 4 + 1], i));

        let mut owned = [false; SCREEN_WIDTH];
        for &i in &visible {
            let [y, x, tile, flags] = [
                self.oam[i * 4],
                self.oam[i * 4 + 1],
                self.oam[i * 4 + 2],
                self.oam[i * 4 + 3],
            ];
            let mut row = (ly as i16 - (y as i16 - 16)) as u8;
            if flags & OBJ_FLIP_Y != 0 {
                row = height as u8 - 1 - row;
            }
            let tile = if height == 16 {
                (tile & 0xFE) + row / 8
            } else {
                tile
            };
            let tile_addr = tile as usize * 16;
            let palette = if flags & OBJ_PALETTE_1 != 0 { self.obp1 } else { self.obp0 };

            for px in 0..8u8 {
                let screen_x = x as i16 - 8 + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&screen_x) {
                    continue;
                }
                let sx = screen_x as usize;
                if owned[sx] {
                    continue;
                }
                let col = if flags & OBJ_FLIP_X != 0 { 7 - px } else { px };
                let color = self.tile_color(tile_addr, col, row % 8);
                if color == 0 {
                    continue;
                }
                owned[sx] = true;
                if flags & OBJ_BEHIND_BG != 0 && bg_colors[sx] != 0 {
                    continue;
                }
                shades[sx] = apply_palette(palette, color);
            }
        }
    }
}

#[inline]
fn apply_palette(palette: u8, color: u8) -> u8 {
    (palette >> (color * 2)) & 0x03
}
