//! Clipboard image encoding and decoding
//!
//! Converts between the in-memory RGBA snapshot, PNG blobs on disk and the
//! raw device-independent bitmap written back to the clipboard.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use super::types::CapturedImage;
use crate::error::Result;

/// Size of the `BITMAPFILEHEADER` that precedes the DIB in a .bmp file.
#[cfg(any(windows, test))]
const BMP_FILE_HEADER_LEN: usize = 14;

pub fn to_rgba_image(image: &CapturedImage) -> Option<RgbaImage> {
    RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
}

pub fn from_rgba_image(rgba: RgbaImage) -> Option<CapturedImage> {
    let (width, height) = rgba.dimensions();
    CapturedImage::new(width, height, rgba.into_raw())
}

pub fn from_arboard(data: arboard::ImageData<'_>) -> Option<CapturedImage> {
    CapturedImage::new(
        u32::try_from(data.width).ok()?,
        u32::try_from(data.height).ok()?,
        data.bytes.into_owned(),
    )
}

pub fn to_arboard(image: &CapturedImage) -> arboard::ImageData<'static> {
    arboard::ImageData {
        width: image.width as usize,
        height: image.height as usize,
        bytes: image.rgba.clone().into(),
    }
}

/// Encode as PNG bytes.
pub fn encode_png(image: &CapturedImage) -> Result<Vec<u8>> {
    let rgba = to_rgba_image(image).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "pixel buffer does not match image dimensions",
        )
    })?;
    let mut png = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Raw bitmap for the clipboard: BMP-encode the RGB pixels and drop the file header.
#[cfg(any(windows, test))]
pub fn encode_dib(image: &CapturedImage) -> Result<Vec<u8>> {
    let rgba = to_rgba_image(image).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "pixel buffer does not match image dimensions",
        )
    })?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();
    let mut bmp = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bmp), ImageFormat::Bmp)?;
    Ok(bmp.split_off(BMP_FILE_HEADER_LEN))
}
