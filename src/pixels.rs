//! Pixel reassembly: decompress image and soft-mask samples, interleave them
//! into one of the PNG color modes and encode the result.

use flate2::read::ZlibDecoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use std::io::Read;
use thiserror::Error;

use crate::scan::{ImageKind, ImageRecord};

/// Failure while turning one image record into PNG bytes
#[derive(Debug, Error)]
pub enum PixelError {
    #[error("failed to inflate stream: {0}")]
    Decompress(#[from] std::io::Error),
    #[error("failed to decode soft mask: {0}")]
    MaskDecode(String),
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("{what} data too short: need {needed} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// PNG color type of the reassembled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    Rgb,
    GrayscaleAlpha,
    RgbAlpha,
}

impl ColorMode {
    pub fn select(is_grayscale: bool, has_alpha: bool) -> Self {
        match (is_grayscale, has_alpha) {
            (true, false) => ColorMode::Grayscale,
            (false, false) => ColorMode::Rgb,
            (true, true) => ColorMode::GrayscaleAlpha,
            (false, true) => ColorMode::RgbAlpha,
        }
    }

    pub fn components(&self) -> usize {
        match self {
            ColorMode::Grayscale => 1,
            ColorMode::Rgb => 3,
            ColorMode::GrayscaleAlpha => 2,
            ColorMode::RgbAlpha => 4,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, ColorMode::GrayscaleAlpha | ColorMode::RgbAlpha)
    }

    fn color_type(&self) -> ExtendedColorType {
        match self {
            ColorMode::Grayscale => ExtendedColorType::L8,
            ColorMode::Rgb => ExtendedColorType::Rgb8,
            ColorMode::GrayscaleAlpha => ExtendedColorType::La8,
            ColorMode::RgbAlpha => ExtendedColorType::Rgba8,
        }
    }
}

/// Inflate a zlib stream
pub fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Expand a sample to full intensity based on its most significant bit
fn threshold(sample: u8) -> u8 {
    if sample >> 7 == 0 {
        0x00
    } else {
        0xFF
    }
}

fn check_len(what: &'static str, data: &[u8], needed: usize) -> Result<(), PixelError> {
    if data.len() < needed {
        return Err(PixelError::Truncated {
            what,
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Interleave color and alpha samples into a `width * height * components`
/// buffer. Alpha is read one byte per pixel.
pub fn interleave(
    mode: ColorMode,
    width: u32,
    height: u32,
    color: &[u8],
    alpha: Option<&[u8]>,
) -> Result<Vec<u8>, PixelError> {
    let color_components = match mode {
        ColorMode::Grayscale | ColorMode::GrayscaleAlpha => 1,
        ColorMode::Rgb | ColorMode::RgbAlpha => 3,
    };
    let too_large = || PixelError::InvalidDimensions { width, height };
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(too_large)?;
    let out_len = pixels.checked_mul(mode.components()).ok_or_else(too_large)?;
    check_len("color", color, pixels * color_components)?;

    let alpha: &[u8] = if mode.has_alpha() {
        let alpha = alpha.unwrap_or_default();
        check_len("alpha", alpha, pixels)?;
        alpha
    } else {
        &[]
    };

    let mut out = Vec::with_capacity(out_len);
    match mode {
        ColorMode::Rgb => out.extend_from_slice(&color[..pixels * 3]),
        ColorMode::RgbAlpha => {
            for (rgb, a) in color.chunks_exact(3).zip(alpha).take(pixels) {
                out.extend_from_slice(rgb);
                out.push(*a);
            }
        }
        ColorMode::Grayscale => out.extend(color[..pixels].iter().map(|g| threshold(*g))),
        ColorMode::GrayscaleAlpha => {
            for (g, a) in color.iter().zip(alpha).take(pixels) {
                out.push(threshold(*g));
                out.push(*a);
            }
        }
    }

    Ok(out)
}

/// Encode an interleaved buffer as a PNG file
pub fn encode_png(
    mode: ColorMode,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<Vec<u8>, PixelError> {
    let mut png_bytes = Vec::new();
    PngEncoder::new(&mut png_bytes).write_image(pixels, width, height, mode.color_type())?;
    Ok(png_bytes)
}

/// One 8-bit alpha sample per pixel from a soft-mask record
fn mask_samples(mask: &ImageRecord) -> Result<Vec<u8>, PixelError> {
    match mask.kind {
        ImageKind::Png => Ok(inflate(&mask.raw_data)?),
        ImageKind::Jpeg => {
            let img = image::load_from_memory_with_format(&mask.raw_data, ImageFormat::Jpeg)
                .map_err(|e| PixelError::MaskDecode(e.to_string()))?;
            Ok(img.to_luma8().into_raw())
        }
    }
}

/// Rebuild a PNG file from a PNG-kind record and its optional soft mask
pub fn reassemble(record: &ImageRecord, mask: Option<&ImageRecord>) -> Result<Vec<u8>, PixelError> {
    if record.width == 0 || record.height == 0 {
        return Err(PixelError::InvalidDimensions {
            width: record.width,
            height: record.height,
        });
    }

    let color = inflate(&record.raw_data)?;
    let alpha = mask.map(mask_samples).transpose()?;

    let mode = ColorMode::select(record.is_grayscale(), alpha.is_some());
    let pixels = interleave(mode, record.width, record.height, &color, alpha.as_deref())?;

    encode_png(mode, record.width, record.height, &pixels)
}

/// Final file bytes for a record: JPEG streams pass through unchanged
pub fn image_bytes(record: &ImageRecord, mask: Option<&ImageRecord>) -> Result<Vec<u8>, PixelError> {
    match record.kind {
        ImageKind::Jpeg => Ok(record.raw_data.clone()),
        ImageKind::Png => reassemble(record, mask),
    }
}
