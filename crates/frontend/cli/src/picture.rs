//! PNG input/output for screenshots and camera images.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Write an RGBA8888 buffer as a PNG file.
pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer
        .write_image_data(rgba)
        .with_context(|| format!("encoding {}", path.display()))?;
    Ok(())
}

/// Load a camera sensor image: one grayscale byte per pixel.
///
/// PNG files are converted to luma and must match the sensor size; any other
/// file is taken as raw grayscale bytes.
pub fn read_grayscale(path: &Path, width: u32, height: u32) -> Result<Vec<u8>> {
    let is_png = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if !is_png {
        return std::fs::read(path).with_context(|| format!("reading {}", path.display()));
    }

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut decoder = png::Decoder::new(file);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("decoding {}", path.display()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    if info.width != width || info.height != height {
        bail!(
            "{} is {}x{}, camera images must be {}x{}",
            path.display(),
            info.width,
            info.height,
            width,
            height
        );
    }

    let channels = info.color_type.samples();
    let pixels = &buf[..info.buffer_size()];
    Ok(pixels
        .chunks_exact(channels)
        .map(|px| match channels {
            1 | 2 => px[0],
            _ => luma(px[0], px[1], px[2]),
        })
        .collect())
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}
