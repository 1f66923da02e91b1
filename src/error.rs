use std::path::Path;

use thiserror::Error;

use crate::geo::TileKey;

/// Errors raised while producing, encoding, or persisting tiles.
///
/// None of these abort a view: the coordinator and compositor log them and
/// fall back to placeholders, keeping failures isolated per tile key.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// A requested raster is zero-sized or exceeds the platform limits
    #[error("Invalid dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u64,
        height: u64,
        reason: String,
    },

    /// A persisted tile could not be decoded
    #[error("Corrupt cache file {path}: {message}")]
    CorruptCacheFile { path: String, message: String },

    /// The content generator failed or produced nothing usable
    #[error("Generation failed for tile {key}: {message}")]
    GenerationFailure { key: TileKey, message: String },

    /// Writing a tile to disk failed
    #[error("Failed to persist {path}: {message}")]
    PersistFailure { path: String, message: String },

    /// Encoded bytes could not be turned back into pixels
    #[error("Decode error: {message}")]
    DecodeError { message: String },

    /// Pixels could not be encoded
    #[error("Encode error: {message}")]
    EncodeError { message: String },

    /// JPEG quality outside 1-100
    #[error("Invalid quality: {quality} (must be 1-100)")]
    InvalidQuality { quality: u8 },
}

impl TileError {
    /// Build a `PersistFailure` for `path`.
    pub fn persist(path: &Path, err: impl std::fmt::Display) -> Self {
        TileError::PersistFailure {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Build a `CorruptCacheFile` for `path`.
    pub fn corrupt(path: &Path, err: impl std::fmt::Display) -> Self {
        TileError::CorruptCacheFile {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Build a `GenerationFailure` for `key`.
    pub fn generation(key: TileKey, message: impl Into<String>) -> Self {
        TileError::GenerationFailure {
            key,
            message: message.into(),
        }
    }
}

/// Errors in the static map configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The zoom anchor table has no entries
    #[error("Zoom anchor table is empty")]
    EmptyAnchorTable,

    /// Anchor levels must be strictly increasing
    #[error("Zoom anchor levels must be strictly increasing: {previous} is followed by {next}")]
    UnorderedAnchors { previous: u32, next: u32 },

    /// An anchor maps to zero pixels per cell
    #[error("Zoom anchor at level {level} has zero pixels per cell")]
    ZeroPixelsPerCell { level: u32 },

    /// The base map has a zero dimension
    #[error("Base map dimensions must be non-zero, got {width}x{height}")]
    InvalidBaseDimensions { width: u32, height: u32 },

    /// Raster limits leave no room for even one pixel per cell
    #[error("Raster limits ({max_dimension} px per side, {max_pixels} px total) cannot hold a {width}x{height} base map")]
    RasterLimitsTooSmall {
        width: u32,
        height: u32,
        max_dimension: u64,
        max_pixels: u64,
    },

    /// Tile edge length must be non-zero
    #[error("Tile size must be greater than 0")]
    ZeroTileSize,
}
