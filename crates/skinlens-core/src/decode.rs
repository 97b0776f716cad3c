//! Upload decoding — raw bytes to an RGB8 pixel grid.

use image::{ImageFormat, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty upload")]
    Empty,
    #[error("unrecognized image data")]
    UnknownFormat,
    #[error("unsupported image format {0:?} — upload a JPEG or PNG")]
    UnsupportedFormat(ImageFormat),
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("failed to decode image: {0}")]
    Corrupt(#[from] image::ImageError),
}

/// Decode JPEG or PNG bytes into an RGB image, dropping any alpha channel.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let format = image::guess_format(bytes).map_err(|_| DecodeError::UnknownFormat)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(DecodeError::UnsupportedFormat(format));
    }

    let rgb = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(DecodeError::ZeroDimensions);
    }

    tracing::debug!(?format, width = rgb.width(), height = rgb.height(), "decoded upload");
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn encode(img: &image::DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png_rgba_drops_alpha() {
        let rgba = ImageBuffer::from_pixel(8, 4, Rgba([10u8, 20, 30, 128]));
        let bytes = encode(&image::DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let rgb = decode_image(&bytes).unwrap();
        assert_eq!(rgb.dimensions(), (8, 4));
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_jpeg() {
        let rgb = RgbImage::from_pixel(16, 16, image::Rgb([200, 100, 50]));
        let bytes = encode(&image::DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg);
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
    }

    #[test]
    fn test_decode_empty() {
        assert!(matches!(decode_image(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownFormat));
    }

    #[test]
    fn test_decode_truncated_png() {
        let rgb = RgbImage::from_pixel(32, 32, image::Rgb([1, 2, 3]));
        let bytes = encode(&image::DynamicImage::ImageRgb8(rgb), ImageFormat::Png);
        let err = decode_image(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupt(_)));
    }
}
