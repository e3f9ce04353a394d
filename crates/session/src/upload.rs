use crate::error::SessionError;
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Accepted upload families. `.jpg` and `.jpeg` are the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Jpeg,
    Png,
}

impl ImageType {
    /// Declared type from the file-name extension, case-insensitive.
    pub fn from_file_name(file_name: &str) -> Result<Self, SessionError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            _ => Err(SessionError::UnsupportedType(file_name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpeg",
            ImageType::Png => "png",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageType::Jpeg => ImageFormat::Jpeg,
            ImageType::Png => ImageFormat::Png,
        }
    }
}

/// A successfully decoded upload, normalized to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub image_type: ImageType,
    pub pixels: Arc<RgbImage>,
}

impl UploadedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Check the declared type, then decode the bytes into an RGB image.
///
/// The sniffed content format must belong to the declared family.
pub fn decode_upload(file_name: &str, bytes: &[u8]) -> Result<UploadedImage, SessionError> {
    let image_type = ImageType::from_file_name(file_name)?;
    let decode_error = |reason: String| SessionError::Decode {
        file_name: file_name.to_string(),
        reason,
    };

    let sniffed = image::guess_format(bytes)
        .map_err(|_| decode_error("content is not a recognizable image".to_string()))?;
    if sniffed != image_type.format() {
        return Err(decode_error(format!(
            "content is {:?}, expected {}",
            sniffed,
            image_type.as_str()
        )));
    }

    let decoded = image::load_from_memory_with_format(bytes, image_type.format())
        .map_err(|e| decode_error(e.to_string()))?;
    let pixels = decoded.into_rgb8();

    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(decode_error(format!(
            "image is empty ({}x{})",
            pixels.width(),
            pixels.height()
        )));
    }

    tracing::debug!(
        file_name,
        width = pixels.width(),
        height = pixels.height(),
        image_type = image_type.as_str(),
        "Decoded upload"
    );

    Ok(UploadedImage {
        file_name: file_name.to_string(),
        image_type,
        pixels: Arc::new(pixels),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    pub(crate) fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_declared_type_from_extension() {
        assert_eq!(ImageType::from_file_name("a.jpg").unwrap(), ImageType::Jpeg);
        assert_eq!(ImageType::from_file_name("a.JPEG").unwrap(), ImageType::Jpeg);
        assert_eq!(ImageType::from_file_name("dir/b.Png").unwrap(), ImageType::Png);

        for name in ["c.gif", "noext", "d.png.exe", ""] {
            assert!(
                matches!(
                    ImageType::from_file_name(name),
                    Err(SessionError::UnsupportedType(_))
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_png_and_jpeg() {
        let image = RgbImage::from_pixel(64, 48, Rgb([200, 10, 10]));

        let png = decode_upload("x.png", &encode(&image, ImageFormat::Png)).unwrap();
        assert_eq!(png.dimensions(), (64, 48));
        assert_eq!(png.image_type, ImageType::Png);
        assert_eq!(*png.pixels, image, "PNG is lossless");

        let jpeg = decode_upload("x.jpg", &encode(&image, ImageFormat::Jpeg)).unwrap();
        assert_eq!(jpeg.dimensions(), (64, 48));
        assert_eq!(jpeg.file_name, "x.jpg");
    }

    #[test]
    fn test_ten_garbage_bytes_are_a_decode_error() {
        let err = decode_upload("x.png", b"0123456789").unwrap_err();
        assert!(matches!(err, SessionError::Decode { .. }));
    }

    #[test]
    fn test_truncated_png_is_a_decode_error() {
        let bytes = encode(&RgbImage::new(32, 32), ImageFormat::Png);
        let err = decode_upload("x.png", &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, SessionError::Decode { .. }));
    }

    #[test]
    fn test_content_must_match_declared_family() {
        let png = encode(&RgbImage::new(8, 8), ImageFormat::Png);
        let err = decode_upload("photo.jpeg", &png).unwrap_err();
        assert!(matches!(err, SessionError::Decode { .. }));
        assert!(err.to_string().contains("expected jpeg"));
    }

    #[test]
    fn test_unsupported_type_is_checked_before_decoding() {
        let png = encode(&RgbImage::new(8, 8), ImageFormat::Png);
        assert!(matches!(
            decode_upload("image.bmp", &png),
            Err(SessionError::UnsupportedType(_))
        ));
    }
}
