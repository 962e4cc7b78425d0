use std::io::Cursor;

use image::{ImageBuffer, ImageFormat, ImageOutputFormat, Luma, Pixel, RgbaImage};
use structures::Dimensions;

use crate::{constants::BLANK_CANVAS_PIXEL, errors::CanvasError};

/// Per-pixel contribution record, one 16-bit value per cell.
pub type RecordImage = ImageBuffer<Luma<u16>, Vec<u16>>;

pub fn blank_canvas(dimensions: Dimensions) -> RgbaImage {
    RgbaImage::from_pixel(dimensions.width, dimensions.height, BLANK_CANVAS_PIXEL)
}

pub fn blank_record(dimensions: Dimensions) -> RecordImage {
    RecordImage::new(dimensions.width, dimensions.height)
}

pub fn dimensions_of<P: Pixel>(image: &ImageBuffer<P, Vec<P::Subpixel>>) -> Dimensions {
    Dimensions::new(image.width(), image.height())
}

pub fn encode_canvas(canvas: &RgbaImage) -> Result<Vec<u8>, CanvasError> {
    let mut buf = Cursor::new(Vec::new());
    // needs a seekable writer
    canvas
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(CanvasError::Encode)?;
    Ok(buf.into_inner())
}

pub fn encode_record(record: &RecordImage) -> Result<Vec<u8>, CanvasError> {
    let mut buf = Cursor::new(Vec::new());
    record
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(CanvasError::Encode)?;
    Ok(buf.into_inner())
}

/// Decodes any png into 8-bit RGBA.
pub fn decode_canvas(bytes: &[u8]) -> Result<RgbaImage, image::ImageError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgba8())
}

/// Decodes any png into 16-bit grayscale.
pub fn decode_record(bytes: &[u8]) -> Result<RecordImage, image::ImageError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_luma16())
}
