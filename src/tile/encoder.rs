//! Tile codec for on-disk persistence.
//!
//! Tiles are stored either as PNG (lossless, the default) or JPEG.
//!
//! # Design Decisions
//!
//! - **PNG by default**: a tile loaded back from disk must be pixel-identical
//!   to the one that was generated, which only a lossless format guarantees.
//!
//! - **JPEG drops alpha**: JPEG has no alpha channel, so tiles are flattened to
//!   RGB before encoding and decoded back as fully opaque RGBA.
//!
//! - **Format is fixed per store**: the extension is part of the file name,
//!   so switching formats starts a fresh cache.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader, RgbaImage};

use crate::error::TileError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Tile Format
// =============================================================================

/// Encoding used for persisted tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileFormat {
    #[default]
    Png,
    Jpeg {
        quality: u8,
    },
}

impl TileFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg { .. } => "jpg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            TileFormat::Png => ImageFormat::Png,
            TileFormat::Jpeg { .. } => ImageFormat::Jpeg,
        }
    }
}

impl std::str::FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            }),
            other => Err(format!("unknown tile format '{}' (expected png or jpeg)", other)),
        }
    }
}

// =============================================================================
// Tile Codec
// =============================================================================

/// Encodes tiles to, and decodes tiles from, their persisted form.
///
/// # Example
///
/// ```
/// use image::RgbaImage;
/// use worldmap_tiles::tile::{TileCodec, TileFormat};
///
/// let codec = TileCodec::new(TileFormat::Png);
/// let tile = RgbaImage::new(16, 16);
///
/// let bytes = codec.encode(&tile).unwrap();
/// let decoded = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, tile);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TileCodec {
    format: TileFormat,
}

impl TileCodec {
    /// Create a codec for `format`.
    pub fn new(format: TileFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Encode a tile.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidQuality`] for a JPEG quality outside 1-100
    /// and [`TileError::EncodeError`] if the encoder fails.
    pub fn encode(&self, image: &RgbaImage) -> Result<Bytes, TileError> {
        let mut output = Vec::new();

        match self.format {
            TileFormat::Png => {
                PngEncoder::new(&mut output)
                    .write_image(
                        image.as_raw(),
                        image.width(),
                        image.height(),
                        image::ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| TileError::EncodeError {
                        message: e.to_string(),
                    })?;
            }
            TileFormat::Jpeg { quality } => {
                if !is_valid_quality(quality) {
                    return Err(TileError::InvalidQuality { quality });
                }
                let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut output, quality)
                    .encode_image(&rgb)
                    .map_err(|e| TileError::EncodeError {
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(Bytes::from(output))
    }

    /// Decode a persisted tile into RGBA pixels.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::DecodeError`] if the bytes are not a valid image of
    /// the codec's format.
    pub fn decode(&self, source: &[u8]) -> Result<RgbaImage, TileError> {
        let reader = ImageReader::with_format(Cursor::new(source), self.format.image_format());

        let image = reader.decode().map_err(|e| TileError::DecodeError {
            message: e.to_string(),
        })?;

        Ok(image.into_rgba8())
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
