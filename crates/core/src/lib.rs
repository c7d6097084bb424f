//! Core emulator primitives and traits.

pub mod cpu_lr35902;
pub mod logging;
pub mod ppu;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// Host pixel format: one RGBA8888 quadruple per pixel.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// A finished picture in host pixel format, row-major.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u8>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            }
        }

        pub fn byte_len(&self) -> usize {
            self.pixels.len()
        }

        /// RGBA of one pixel; out-of-range coordinates read as transparent black.
        pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
            if x >= self.width || y >= self.height {
                return [0; 4];
            }
            let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
            [
                self.pixels[i],
                self.pixels[i + 1],
                self.pixels[i + 2],
                self.pixels[i + 3],
            ]
        }

        pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
            if x >= self.width || y >= self.height {
                return;
            }
            let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
            self.pixels[i..i + BYTES_PER_PIXEL].copy_from_slice(&rgba);
        }
    }
}

use serde_json::Value;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self) -> u32;
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to the power-on state, keeping the loaded cartridge.
    fn reset(&mut self);

    /// Replace the cartridge. On failure the previous one stays active.
    fn load_rom(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Emulate until one complete frame has been produced.
    fn step_frame(&mut self) -> Result<(), Self::Error>;

    /// The last completed frame.
    fn frame(&self) -> &types::Frame;

    /// Frames completed since the instance was created.
    fn frame_count(&self) -> u64;

    /// Return a JSON-serializable save state for debugging.
    /// Save states never include ROM data.
    fn save_state(&self) -> Value;

    /// Load a JSON save state.
    fn load_state(&mut self, v: &Value) -> Result<(), Self::Error>;
}
