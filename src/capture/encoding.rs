//! Still-image encoding and the resulting artifact.
//!
//! Supports:
//! - JPEG (with quality control, the default)
//! - PNG (lossless, quality is ignored)

use base64::Engine as _;
use image::{ExtendedColorType, RgbaImage};
use serde::{Deserialize, Serialize};

use super::pipeline::CaptureError;

/// Raster formats an artifact can be encoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossy JPEG.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    /// MIME type used in data URLs.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(format!("unsupported image format: {other}")),
        }
    }
}

/// Requested output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Encoding {
    /// Output format.
    pub format: ImageFormat,
    /// Quality in `(0.0, 1.0]`. Only JPEG uses it.
    pub quality: f32,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: 0.9,
        }
    }
}

impl Encoding {
    /// Lossless PNG.
    pub fn png() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 1.0,
        }
    }

    /// JPEG at the given quality.
    pub fn jpeg(quality: f32) -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality,
        }
    }

    /// Returns true if `quality` is a usable value.
    pub fn is_valid(&self) -> bool {
        self.quality.is_finite() && self.quality > 0.0 && self.quality <= 1.0
    }

    /// JPEG encoder quality (1-100).
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Encodes an RGBA raster.
    pub fn encode(&self, raster: RgbaImage) -> Result<ImageArtifact, CaptureError> {
        let (width, height) = raster.dimensions();
        let bytes = match self.format {
            ImageFormat::Jpeg => encode_jpeg(raster, self.jpeg_quality())?,
            ImageFormat::Png => encode_png(&raster)?,
        };

        Ok(ImageArtifact {
            bytes,
            format: self.format,
            width,
            height,
        })
    }
}

fn encode_jpeg(raster: RgbaImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgba8(raster).into_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::Encoding(format!("JPEG encoding failed: {e}")))?;
    Ok(buffer)
}

fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>, CaptureError> {
    let mut buffer = Vec::new();
    raster
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .map_err(|e| CaptureError::Encoding(format!("PNG encoding failed: {e}")))?;
    Ok(buffer)
}

/// An encoded still image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl ImageArtifact {
    /// Encoded bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoding format.
    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Pixel width of the encoded image.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Pixel height of the encoded image.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Self-contained `data:` URL of the image.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// BLAKE3 digest of the encoded bytes, hex encoded.
    pub fn digest(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }

    /// Decodes the artifact back into an RGBA raster.
    pub fn decode(&self) -> Result<RgbaImage, CaptureError> {
        image::load_from_memory_with_format(&self.bytes, self.format.codec())
            .map(|img| img.into_rgba8())
            .map_err(|e| CaptureError::Encoding(format!("decoding failed: {e}")))
    }
}

impl std::fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
