//! Per-face JPEG thumbnails, base64-encoded for JSON transport.

use crate::types::FaceBox;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

/// Thumbnail edge length in pixels.
pub const THUMBNAIL_SIZE: u32 = 200;
const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("face region {left},{top}..{right},{bottom} is empty inside a {width}x{height} image")]
    EmptyRegion {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        width: u32,
        height: u32,
    },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Crop `face` out of `image`, resize to a 200×200 square and return the JPEG
/// as standard base64.
///
/// The crop is clipped to the image bounds; the face box itself is left
/// untouched.
pub fn face_thumbnail(image: &DynamicImage, face: &FaceBox) -> Result<String, ThumbnailError> {
    let (width, height) = image.dimensions();

    let clip = |v: i32, max: u32| v.clamp(0, i32::try_from(max).unwrap_or(i32::MAX)) as u32;
    let (x0, x1) = (clip(face.left, width), clip(face.right, width));
    let (y0, y1) = (clip(face.top, height), clip(face.bottom, height));

    if x1 <= x0 || y1 <= y0 {
        return Err(ThumbnailError::EmptyRegion {
            left: face.left,
            top: face.top,
            right: face.right,
            bottom: face.bottom,
            width,
            height,
        });
    }

    // JPEG has no alpha; flatten whatever the source layout is to RGB8.
    let crop = image.crop_imm(x0, y0, x1 - x0, y1 - y0).to_rgb8();
    let resized = imageops::resize(&crop, THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&resized)?;

    Ok(BASE64.encode(&jpeg))
}
