//! Test utilities for integration tests.
//!
//! This module provides instrumented content generators and helpers for
//! wiring a tile pipeline onto a temporary cache directory.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use tokio::runtime::Handle;

use worldmap_tiles::geo::{TileAddressSpace, TileKey};
use worldmap_tiles::tile::{
    ContentGenerator, GenerateRequest, GenerationCoordinator, TileCache, TileFormat, TileStore,
};
use worldmap_tiles::TileError;

// =============================================================================
// Counting Generator
// =============================================================================

/// A generator that counts its invocations and paints each tile a colour
/// derived from its key.
pub struct CountingGenerator {
    calls: AtomicUsize,
    delay: Duration,
    full_tiles: bool,
}

impl CountingGenerator {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Sleep for `delay` inside every call, widening race windows.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            full_tiles: false,
        })
    }

    /// Paint a whole 64x64 tile regardless of the requested size.
    pub fn full_tiles() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            full_tiles: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentGenerator for CountingGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, TileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let (width, height) = if self.full_tiles {
            (64, 64)
        } else {
            (request.width, request.height)
        };
        Ok(RgbaImage::from_pixel(width, height, tile_color(request.key)))
    }
}

/// Colour `CountingGenerator` paints `key` with.
pub fn tile_color(key: TileKey) -> Rgba<u8> {
    Rgba([
        (key.x * 40 % 256) as u8,
        (key.y * 40 % 256) as u8,
        (key.cell_size % 256) as u8,
        255,
    ])
}

// =============================================================================
// Flaky Generator
// =============================================================================

/// A generator whose first `failures` calls fail. Every call takes a little
/// while so concurrent requests reliably overlap.
pub struct FlakyGenerator {
    calls: AtomicUsize,
    failures: usize,
}

impl FlakyGenerator {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentGenerator for FlakyGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, TileError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        if call < self.failures {
            return Err(TileError::generation(request.key, "terrain synthesis failed"));
        }
        Ok(RgbaImage::from_pixel(
            request.width,
            request.height,
            Rgba([90, 90, 90, 255]),
        ))
    }
}

// =============================================================================
// Pipeline Helpers
// =============================================================================

/// Build a coordinator over a PNG store rooted at `root`.
pub fn build_coordinator(
    root: &Path,
    space: TileAddressSpace,
    capacity: usize,
    generator: Arc<dyn ContentGenerator>,
) -> GenerationCoordinator {
    GenerationCoordinator::new(
        space,
        Arc::new(TileCache::with_capacity(capacity)),
        Arc::new(TileStore::new(root, TileFormat::Png)),
        generator,
        Handle::current(),
    )
}
