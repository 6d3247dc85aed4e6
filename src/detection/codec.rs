//! Conversions between data-URL blobs and decoded images.

use super::primitive::FaceRegion;
use crate::record::ImageBlob;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

const PNG_MIME: &str = "image/png";

/// Decodes a blob into a renderable image. The format is sniffed from the
/// payload bytes, so a mislabeled mime type does not matter.
pub fn decode_blob(blob: &ImageBlob) -> Result<DynamicImage> {
    let bytes = blob.decode()?;
    image::load_from_memory(&bytes).context("image payload could not be decoded")
}

/// Clamps `region` to the image bounds and returns an independent copy of it.
/// Regions that fall entirely outside the image yield `None`.
pub fn crop_region(image: &DynamicImage, region: &FaceRegion) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();
    if region.x >= width || region.y >= height {
        return None;
    }

    let crop_width = region.width.min(width - region.x);
    let crop_height = region.height.min(height - region.y);
    if crop_width == 0 || crop_height == 0 {
        return None;
    }

    Some(image.crop_imm(region.x, region.y, crop_width, crop_height))
}

pub fn encode_png(image: &DynamicImage) -> Result<ImageBlob> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("failed to encode crop as PNG")?;
    Ok(ImageBlob::from_bytes(PNG_MIME, buffer.get_ref()))
}
