//! Photo storage layout in camera SRAM.
//!
//! ```text
//! bank 0   0x0100-0x0EFF  last capture (slot 0), 16x14 tiles
//!          0x11B2-0x11CF  album state vector, one byte per slot 1-30
//! bank n   0x0000 / 0x1000 slots 2n-1 and 2n
//! ```
//!
//! A state byte of 0xFF marks an empty slot; otherwise it holds the photo's
//! position in the album.

use emu_core::ppu::tile::{decode_row_pixel, encode_row, TILE_BYTES};

use super::{SENSOR_HEIGHT, SENSOR_PIXELS, SENSOR_RGBA_BYTES, SENSOR_WIDTH};

pub const PHOTO_SLOTS: u8 = 30;
pub const CAPTURE_OFFSET: usize = 0x0100;
pub const STATE_VECTOR_OFFSET: usize = 0x11B2;
pub const EMPTY_SLOT: u8 = 0xFF;

const TILES_X: usize = SENSOR_WIDTH / 8;
const TILES_Y: usize = SENSOR_HEIGHT / 8;
/// Tile data of one picture.
pub const PHOTO_BYTES: usize = TILES_X * TILES_Y * TILE_BYTES;

const BANK_SIZE: usize = 0x2000;

/// Gray levels for shades 0-3.
const SHADE_GRAY: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

/// SRAM offset of a slot's tile data; `None` outside 0-30.
pub fn slot_offset(slot: u8) -> Option<usize> {
    match slot {
        0 => Some(CAPTURE_OFFSET),
        1..=PHOTO_SLOTS => {
            let n = (slot - 1) as usize;
            Some((n / 2 + 1) * BANK_SIZE + (n % 2) * 0x1000)
        }
        _ => None,
    }
}

/// Whether a stored slot (1-30) holds a photo.
pub fn is_occupied(ram: &[u8], slot: u8) -> bool {
    if !(1..=PHOTO_SLOTS).contains(&slot) {
        return false;
    }
    ram.get(STATE_VECTOR_OFFSET + (slot - 1) as usize)
        .is_some_and(|&state| state != EMPTY_SLOT)
}

pub fn photo_count(ram: &[u8]) -> usize {
    (1..=PHOTO_SLOTS).filter(|&slot| is_occupied(ram, slot)).count()
}

/// Mark every album slot empty.
pub fn format_album(ram: &mut [u8]) {
    let end = (STATE_VECTOR_OFFSET + PHOTO_SLOTS as usize).min(ram.len());
    if let Some(states) = ram.get_mut(STATE_VECTOR_OFFSET..end) {
        states.fill(EMPTY_SLOT);
    }
}

/// Pack shades (row-major, one per pixel) into tiles at `offset`.
pub fn write_shades(ram: &mut [u8], offset: usize, shades: &[u8]) {
    let Some(dest) = ram.get_mut(offset..offset + PHOTO_BYTES) else {
        return;
    };
    for tile_y in 0..TILES_Y {
        for tile_x in 0..TILES_X {
            let tile = (tile_y * TILES_X + tile_x) * TILE_BYTES;
            for row in 0..8 {
                let start = (tile_y * 8 + row) * SENSOR_WIDTH + tile_x * 8;
                let mut pixels = [0u8; 8];
                for (px, &shade) in pixels.iter_mut().zip(shades.iter().skip(start)) {
                    *px = shade & 0x03;
                }
                let (lo, hi) = encode_row(&pixels);
                dest[tile + row * 2] = lo;
                dest[tile + row * 2 + 1] = hi;
            }
        }
    }
}

/// Unpack the tiles at `offset` into row-major shades.
pub fn read_shades(ram: &[u8], offset: usize) -> Option<Vec<u8>> {
    let src = ram.get(offset..offset + PHOTO_BYTES)?;
    let mut shades = vec![0u8; SENSOR_PIXELS];
    for (tile_index, tile) in src.chunks_exact(TILE_BYTES).enumerate() {
        let tile_x = tile_index % TILES_X;
        let tile_y = tile_index / TILES_X;
        for row in 0..8 {
            let (lo, hi) = (tile[row * 2], tile[row * 2 + 1]);
            let line = (tile_y * 8 + row) * SENSOR_WIDTH + tile_x * 8;
            for x in 0..8u8 {
                shades[line + x as usize] = decode_row_pixel(lo, hi, x);
            }
        }
    }
    Some(shades)
}

pub fn shades_to_rgba(shades: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(SENSOR_RGBA_BYTES);
    for &shade in shades {
        let gray = SHADE_GRAY[(shade & 0x03) as usize];
        rgba.extend_from_slice(&[gray, gray, gray, 0xFF]);
    }
    rgba
}

/// ITU-R 601 luma of each RGBA pixel; alpha is ignored.
pub fn rgba_to_luma(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .map(|px| ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8)
        .collect()
}

/// Decode a slot into RGBA; `None` for empty or out-of-range slots.
pub fn decode(ram: &[u8], slot: u8) -> Option<Vec<u8>> {
    if slot != 0 && !is_occupied(ram, slot) {
        return None;
    }
    let shades = read_shades(ram, slot_offset(slot)?)?;
    Some(shades_to_rgba(&shades))
}

/// Store already dithered shades into album slot 1-30 and mark it occupied.
pub fn store(ram: &mut [u8], slot: u8, shades: &[u8]) -> bool {
    if !(1..=PHOTO_SLOTS).contains(&slot) || shades.len() != SENSOR_PIXELS {
        return false;
    }
    let Some(offset) = slot_offset(slot) else {
        return false;
    };
    if offset + PHOTO_BYTES > ram.len() || STATE_VECTOR_OFFSET + PHOTO_SLOTS as usize > ram.len() {
        return false;
    }
    let position = if is_occupied(ram, slot) {
        ram[STATE_VECTOR_OFFSET + (slot - 1) as usize]
    } else {
        photo_count(ram) as u8
    };
    write_shades(ram, offset, shades);
    ram[STATE_VECTOR_OFFSET + (slot - 1) as usize] = position;
    true
}

/// Mark album slot 1-30 empty. Returns false when there was nothing to clear.
pub fn clear(ram: &mut [u8], slot: u8) -> bool {
    if !is_occupied(ram, slot) {
        return false;
    }
    ram[STATE_VECTOR_OFFSET + (slot - 1) as usize] = EMPTY_SLOT;
    true
}
