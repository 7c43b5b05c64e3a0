//! Image encoding: source photo bytes → base64 PNG for the extraction request.
//!
//! The extraction request declares its inline data as `image/png`, but note
//! folders hold a mix of PNG, JPEG, GIF and BMP photos. PNG input is passed
//! through untouched; anything else is decoded and re-encoded as PNG so the
//! declared MIME type is always true. PNG is lossless, which matters more
//! than size when the model has to read faint pencil strokes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

/// MIME type of every payload produced by [`encode_png`].
pub const PNG_MIME: &str = "image/png";

/// Encode a source image as base64 PNG.
pub fn encode_png(bytes: &[u8]) -> Result<String, image::ImageError> {
    let png = match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => bytes.to_vec(),
        _ => {
            let img = image::load_from_memory(bytes)?;
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            debug!("Re-encoded {} source bytes → {} PNG bytes", bytes.len(), buf.len());
            buf
        }
    };

    let b64 = STANDARD.encode(&png);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn sample(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn png_passes_through() {
        let png = sample(ImageFormat::Png);
        let b64 = encode_png(&png).expect("encode should succeed");
        assert_eq!(STANDARD.decode(b64).unwrap(), png);
    }

    #[test]
    fn jpeg_is_reencoded_as_png() {
        let jpeg = sample(ImageFormat::Jpeg);
        let b64 = encode_png(&jpeg).expect("encode should succeed");
        let decoded = STANDARD.decode(b64).expect("valid base64");
        assert_eq!(image::guess_format(&decoded).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(encode_png(b"definitely not an image").is_err());
    }
}
