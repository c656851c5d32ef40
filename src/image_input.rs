use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;

/// Decodes a base64 payload, optionally wrapped as a `data:` URL, into RGB pixels.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage> {
    let bytes = STANDARD
        .decode(strip_data_url(payload.trim()))
        .context("invalid base64 image data")?;
    decode_image(&bytes)
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("unsupported or corrupt image")?;
    Ok(image.to_rgb8())
}

fn strip_data_url(payload: &str) -> &str {
    match payload.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((_, data)) => data,
        None => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_base64(image: &RgbImage) -> String {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        STANDARD.encode(bytes.into_inner())
    }

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        let image = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));
        let encoded = png_base64(&image);

        assert_eq!(decode_base64_image(&encoded).unwrap(), image);
        let url = format!("data:image/png;base64,{encoded}\n");
        assert_eq!(decode_base64_image(&url).unwrap(), image);
    }

    #[test]
    fn bad_base64_is_reported() {
        let err = decode_base64_image("not base64 !!").unwrap_err();
        assert!(format!("{err:#}").contains("invalid base64 image data"));
    }

    #[test]
    fn non_image_bytes_are_reported() {
        let err = decode_base64_image(&STANDARD.encode(b"hello world")).unwrap_err();
        assert!(format!("{err:#}").contains("unsupported or corrupt image"));
    }
}
