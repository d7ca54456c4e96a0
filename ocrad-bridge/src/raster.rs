//! Pixel normalization into the binary greymap (PGM, `P5`) raster the engine reads.
//!
//! Interleaved RGBA buffers are reduced to one 8-bit luma sample per pixel with
//! 14-bit fixed-point weights; pre-encoded PNM buffers pass through untouched.

use std::path::Path;

use image::{DynamicImage, RgbaImage};

use crate::error::{OcradError, Result};

const LUMA_RED: u32 = 4899;
const LUMA_GREEN: u32 = 9617;
const LUMA_BLUE: u32 = 1868;
const LUMA_ROUND: u32 = 8192;
const LUMA_SHIFT: u32 = 14;

const CHANNELS: usize = 4;

/// Interleaved RGBA pixels tagged with their dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// Image handed to a recognition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Width/height-tagged interleaved RGBA samples.
    Pixels(PixelBuffer),
    /// An already encoded PNM buffer.
    Encoded(Vec<u8>),
}

impl ImageInput {
    /// Load an image file. PNM files are passed through as encoded bytes,
    /// anything else is decoded to RGBA.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pnm" | "pgm" | "pbm" | "ppm") => Ok(ImageInput::Encoded(std::fs::read(path)?)),
            _ => Ok(image::open(path)?.into()),
        }
    }
}

impl From<PixelBuffer> for ImageInput {
    fn from(pixels: PixelBuffer) -> Self {
        ImageInput::Pixels(pixels)
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Encoded(bytes)
    }
}

impl From<RgbaImage> for ImageInput {
    fn from(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        ImageInput::Pixels(PixelBuffer::new(width, height, img.into_raw()))
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(img: DynamicImage) -> Self {
        img.into_rgba8().into()
    }
}

/// Header of a binary greymap with 8-bit samples.
pub fn pnm_header(width: u32, height: u32) -> String {
    format!("P5\n{width} {height}\n255\n")
}

/// Fixed-point luma of one pixel, rounded to nearest.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * LUMA_RED + g as u32 * LUMA_GREEN + b as u32 * LUMA_BLUE + LUMA_ROUND)
        >> LUMA_SHIFT) as u8
}

/// Turn any supported input into the raster bytes staged for the engine.
pub fn normalize(input: ImageInput) -> Result<Vec<u8>> {
    match input {
        ImageInput::Pixels(pixels) => rgba_to_pgm(&pixels),
        ImageInput::Encoded(bytes) => {
            if bytes.is_empty() {
                return Err(OcradError::UnsupportedInput(
                    "encoded image buffer is empty".to_string(),
                ));
            }
            Ok(bytes)
        }
    }
}

/// Encode an RGBA buffer as a `P5` greymap. The alpha sample is ignored.
pub fn rgba_to_pgm(pixels: &PixelBuffer) -> Result<Vec<u8>> {
    let pixel_count = pixels.width as usize * pixels.height as usize;
    if pixel_count == 0 {
        return Err(OcradError::UnsupportedInput(format!(
            "pixel buffer has no pixels ({}x{})",
            pixels.width, pixels.height
        )));
    }
    let expected = pixel_count * CHANNELS;
    if pixels.data.len() != expected {
        return Err(OcradError::UnsupportedInput(format!(
            "pixel buffer holds {} bytes, expected {}x{}x{} = {}",
            pixels.data.len(),
            pixels.width,
            pixels.height,
            CHANNELS,
            expected
        )));
    }

    let header = pnm_header(pixels.width, pixels.height);
    let mut raster = Vec::with_capacity(header.len() + pixel_count);
    raster.extend_from_slice(header.as_bytes());
    raster.resize(header.len() + pixel_count, 0);

    let (_, samples) = raster.split_at_mut(header.len());
    for (dst, px) in samples
        .iter_mut()
        .zip(pixels.data.chunks_exact(CHANNELS))
    {
        *dst = luma(px[0], px[1], px[2]);
    }

    Ok(raster)
}
