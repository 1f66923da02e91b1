//! Continuous zoom to discrete cell size.
//!
//! The zoom value is read as a position on a piecewise-linear curve defined by
//! an anchor table of `(level, pixels_per_cell)` pairs. Named detail tiers
//! ("global", "country", "city") are nothing more than rows of that table.
//!
//! The interpolated size is then clamped so the full raster at that size stays
//! within the platform raster limits:
//!
//! ```text
//! max_cell = floor(min(max_dimension / max(base_w, base_h),
//!                      sqrt(max_pixels / (base_w * base_h))))
//! ```

use serde::Serialize;

use crate::error::ConfigError;

/// Default maximum raster edge length (signed 32-bit pixel coordinates).
pub const DEFAULT_MAX_RASTER_DIMENSION: u64 = i32::MAX as u64;

/// Default maximum raster area in pixels.
pub const DEFAULT_MAX_TOTAL_PIXELS: u64 = 1 << 46;

/// Default anchor table: levels 1..=10.
pub const DEFAULT_ZOOM_ANCHORS: [ZoomAnchor; 10] = [
    ZoomAnchor::new(1, 3),
    ZoomAnchor::new(2, 4),
    ZoomAnchor::new(3, 6),
    ZoomAnchor::new(4, 10),
    ZoomAnchor::new(5, 40),
    ZoomAnchor::new(6, 80),
    ZoomAnchor::new(7, 160),
    ZoomAnchor::new(8, 320),
    ZoomAnchor::new(9, 640),
    ZoomAnchor::new(10, 1280),
];

/// One point of the zoom curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomAnchor {
    /// Zoom level at which this anchor applies
    pub level: u32,

    /// Pixels per map cell at that level
    pub pixels_per_cell: u32,
}

impl ZoomAnchor {
    pub const fn new(level: u32, pixels_per_cell: u32) -> Self {
        Self {
            level,
            pixels_per_cell,
        }
    }
}

impl std::str::FromStr for ZoomAnchor {
    type Err = String;

    /// Parse `level:pixels_per_cell`, e.g. `5:40`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, pixels) = s
            .split_once(':')
            .ok_or_else(|| format!("expected LEVEL:PIXELS, got '{}'", s))?;
        let level = level
            .trim()
            .parse()
            .map_err(|e| format!("invalid level '{}': {}", level, e))?;
        let pixels_per_cell = pixels
            .trim()
            .parse()
            .map_err(|e| format!("invalid pixels per cell '{}': {}", pixels, e))?;
        Ok(ZoomAnchor::new(level, pixels_per_cell))
    }
}

/// Platform ceilings on a single raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterLimits {
    /// Maximum width or height in pixels
    pub max_dimension: u64,

    /// Maximum width * height
    pub max_total_pixels: u64,
}

impl Default for RasterLimits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_RASTER_DIMENSION,
            max_total_pixels: DEFAULT_MAX_TOTAL_PIXELS,
        }
    }
}

impl RasterLimits {
    /// Whether a `width` x `height` raster fits.
    pub fn admits(&self, width: u64, height: u64) -> bool {
        width > 0
            && height > 0
            && width <= self.max_dimension
            && height <= self.max_dimension
            && width.saturating_mul(height) <= self.max_total_pixels
    }
}

// =============================================================================
// Zoom Mapper
// =============================================================================

/// Maps continuous zoom values to integer cell sizes.
///
/// Immutable after construction; safe to share between threads.
#[derive(Debug, Clone)]
pub struct ZoomMapper {
    anchors: Vec<ZoomAnchor>,
    max_cell_size: u32,
}

impl ZoomMapper {
    /// Build a mapper for a `base_width` x `base_height` base map.
    ///
    /// # Errors
    ///
    /// Fails if the anchor table is empty, not strictly increasing by level,
    /// contains a zero size, or if the limits cannot hold the base map at one
    /// pixel per cell.
    pub fn new(
        anchors: &[ZoomAnchor],
        base_width: u32,
        base_height: u32,
        limits: RasterLimits,
    ) -> Result<Self, ConfigError> {
        validate_anchors(anchors)?;

        if base_width == 0 || base_height == 0 {
            return Err(ConfigError::InvalidBaseDimensions {
                width: base_width,
                height: base_height,
            });
        }

        let max_cell_size = max_cell_size(base_width, base_height, limits);
        if max_cell_size == 0 {
            return Err(ConfigError::RasterLimitsTooSmall {
                width: base_width,
                height: base_height,
                max_dimension: limits.max_dimension,
                max_pixels: limits.max_total_pixels,
            });
        }

        Ok(Self {
            anchors: anchors.to_vec(),
            max_cell_size,
        })
    }

    pub fn anchors(&self) -> &[ZoomAnchor] {
        &self.anchors
    }

    /// Largest cell size the raster limits allow.
    pub fn max_cell_size(&self) -> u32 {
        self.max_cell_size
    }

    /// Resolve `zoom` to pixels per cell.
    ///
    /// Values at or below the first anchor map to its size, values at or above
    /// the last anchor map to its size, anything in between is interpolated
    /// linearly and rounded to the nearest integer, halves to even. NaN is
    /// treated as the lowest zoom.
    pub fn cell_size(&self, zoom: f64) -> u32 {
        let size = self.interpolate(zoom).round_ties_even();
        let size = if size.is_finite() { size as u64 } else { 1 };
        size.clamp(1, self.max_cell_size as u64) as u32
    }

    fn interpolate(&self, zoom: f64) -> f64 {
        let first = self.anchors[0];
        let last = self.anchors[self.anchors.len() - 1];

        if zoom.is_nan() || zoom <= first.level as f64 {
            return first.pixels_per_cell as f64;
        }
        if zoom >= last.level as f64 {
            return last.pixels_per_cell as f64;
        }

        for pair in self.anchors.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if zoom < upper.level as f64 {
                let span = (upper.level - lower.level) as f64;
                let t = (zoom - lower.level as f64) / span;
                let from = lower.pixels_per_cell as f64;
                let to = upper.pixels_per_cell as f64;
                return from + t * (to - from);
            }
        }

        last.pixels_per_cell as f64
    }
}

fn validate_anchors(anchors: &[ZoomAnchor]) -> Result<(), ConfigError> {
    if anchors.is_empty() {
        return Err(ConfigError::EmptyAnchorTable);
    }
    for anchor in anchors {
        if anchor.pixels_per_cell == 0 {
            return Err(ConfigError::ZeroPixelsPerCell {
                level: anchor.level,
            });
        }
    }
    for pair in anchors.windows(2) {
        if pair[1].level <= pair[0].level {
            return Err(ConfigError::UnorderedAnchors {
                previous: pair[0].level,
                next: pair[1].level,
            });
        }
    }
    Ok(())
}

fn max_cell_size(base_width: u32, base_height: u32, limits: RasterLimits) -> u32 {
    let longest = base_width.max(base_height) as f64;
    let area = base_width as f64 * base_height as f64;

    let by_dimension = limits.max_dimension as f64 / longest;
    let by_area = (limits.max_total_pixels as f64 / area).sqrt();

    by_dimension.min(by_area).floor().min(u32::MAX as f64) as u32
}
