//! Image encoding: `DynamicImage` → PNG or JPEG bytes.
//!
//! Converted HEIC/HEIF photos must land in a format both the preview and the
//! generation service accept. PNG is the default because it is lossless;
//! JPEG trades a little fidelity for much smaller uploads.

use crate::config::ConversionFormat;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a decoded photo in the requested standard format.
///
/// `quality` is in `0.0..=1.0` and only affects JPEG.
pub fn encode_image(
    img: &DynamicImage,
    format: ConversionFormat,
    quality: f32,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        ConversionFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        ConversionFormat::Jpeg => {
            let q = jpeg_quality(quality);
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, q))?;
        }
    }

    debug!(
        "Encoded {}x{} image → {} bytes {:?}",
        img.width(),
        img.height(),
        buf.len(),
        format
    );
    Ok(buf)
}

/// Map a `0.0..=1.0` quality factor onto the JPEG encoder's `1..=100` scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png() {
        let bytes = encode_image(&red_square(), ConversionFormat::Png, 0.9).expect("encode");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn encode_jpeg() {
        let bytes = encode_image(&red_square(), ConversionFormat::Jpeg, 0.9).expect("encode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn quality_mapping() {
        assert_eq!(jpeg_quality(0.9), 90);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(3.0), 100);
    }
}
