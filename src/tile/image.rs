//! Shared, immutable tile pixels.

use std::ops::Deref;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

/// A decoded tile.
///
/// Cloning is cheap and yields another handle to the same pixels. The pixels
/// are never mutated after construction, so a handle stays valid even after
/// the cache evicts its own copy.
#[derive(Debug, Clone)]
pub struct TileImage {
    pixels: Arc<RgbaImage>,
    placeholder: bool,
}

impl TileImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
            placeholder: false,
        }
    }

    /// A 1x1 transparent image standing in for a tile that failed to generate.
    pub fn placeholder() -> Self {
        Self {
            pixels: Arc::new(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]))),
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Whether both handles point at the same pixel buffer.
    pub fn ptr_eq(&self, other: &TileImage) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl Deref for TileImage {
    type Target = RgbaImage;

    fn deref(&self) -> &Self::Target {
        &self.pixels
    }
}

impl From<RgbaImage> for TileImage {
    fn from(pixels: RgbaImage) -> Self {
        TileImage::new(pixels)
    }
}
