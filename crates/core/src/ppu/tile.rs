//! 2bpp planar tiles, as used by DMG VRAM and the camera's SRAM.
//!
//! A tile is 8x8 pixels in 16 bytes: two bytes per row, low plane first.
//! Bit 7 of each plane byte is the leftmost pixel.

pub const TILE_BYTES: usize = 16;

/// Color index (0-3) of pixel (`x`, `y`) in `tile`.
///
/// Coordinates wrap at 8; a short slice reads as color 0.
pub fn pixel(tile: &[u8], x: u8, y: u8) -> u8 {
    let row = (y as usize & 7) * 2;
    match tile.get(row..row + 2) {
        Some(&[lo, hi]) => decode_row_pixel(lo, hi, x),
        _ => 0,
    }
}

#[inline]
pub fn decode_row_pixel(lo: u8, hi: u8, x: u8) -> u8 {
    let bit = 7 - (x & 7);
    (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
}

/// Pack eight color indices, leftmost first, into (low, high) plane bytes.
pub fn encode_row(pixels: &[u8; 8]) -> (u8, u8) {
    pixels
        .iter()
        .enumerate()
        .fold((0u8, 0u8), |(lo, hi), (x, &color)| {
            let bit = 7 - x;
            (lo | ((color & 1) << bit), hi | (((color >> 1) & 1) << bit))
        })
}
