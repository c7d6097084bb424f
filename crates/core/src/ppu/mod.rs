//! Tile and palette helpers shared by the video pipeline and the camera.

pub mod palette;
pub mod tile;

pub use palette::{IndexedPalette, RamPalette};
