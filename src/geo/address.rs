//! Tile addressing within the full-resolution map raster.
//!
//! At a given cell size the base map (one cell per base pixel) is scaled to a
//! raster of `base_width * cell_size` by `base_height * cell_size` pixels. That
//! raster is cut into square tiles of `tile_size` pixels, addressed from the
//! top-left corner. Tiles on the right and bottom edges are clipped and may be
//! smaller than `tile_size`.
//!
//! The raster is interpreted as an equirectangular projection spanning
//! -180..180 longitude and 90..-90 latitude (north at the top).

use std::fmt;

use serde::Serialize;

// =============================================================================
// Tile Key
// =============================================================================

/// Identifies one tile of the raster produced at a specific cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey {
    /// Pixels per map cell
    pub cell_size: u32,

    /// Tile column (0-indexed from the left)
    pub x: u32,

    /// Tile row (0-indexed from the top)
    pub y: u32,
}

impl TileKey {
    pub const fn new(cell_size: u32, x: u32, y: u32) -> Self {
        Self { cell_size, x, y }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}_{}", self.cell_size, self.x, self.y)
    }
}

// =============================================================================
// Rectangles
// =============================================================================

/// A rectangle inside the map raster, in raster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }
}

/// A viewport requested by the caller.
///
/// Unlike [`PixelRect`] the origin may be negative or lie outside the map, as
/// happens while panning past an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl ViewRect {
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect the view with a `map_width` x `map_height` raster.
    ///
    /// Returns `None` when nothing of the map is visible.
    pub fn clip(&self, map_width: u32, map_height: u32) -> Option<PixelRect> {
        let left = self.x.max(0);
        let top = self.y.max(0);
        let right = (self.x + self.width as i64).min(map_width as i64);
        let bottom = (self.y + self.height as i64).min(map_height as i64);

        if right <= left || bottom <= top {
            return None;
        }

        Some(PixelRect::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

// =============================================================================
// Geo Bounds
// =============================================================================

/// Longitude/latitude rectangle covered by a raster region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    /// The whole globe.
    pub const WORLD: GeoBounds = GeoBounds {
        min_lon: -180.0,
        max_lon: 180.0,
        min_lat: -90.0,
        max_lat: 90.0,
    };

    pub fn width_degrees(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height_degrees(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude/latitude of the centre of pixel (`px`, `py`) when the bounds
    /// are rasterised to `width` x `height` pixels.
    pub fn pixel_center(&self, px: u32, py: u32, width: u32, height: u32) -> (f64, f64) {
        let lon = self.min_lon + (px as f64 + 0.5) * self.width_degrees() / width as f64;
        let lat = self.max_lat - (py as f64 + 0.5) * self.height_degrees() / height as f64;
        (lon, lat)
    }
}

// =============================================================================
// Tile Range
// =============================================================================

/// Inclusive range of tile indices at one cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub cell_size: u32,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Number of tiles in the range.
    pub fn len(&self) -> usize {
        let across = (self.max_x - self.min_x + 1) as usize;
        let down = (self.max_y - self.min_y + 1) as usize;
        across * down
    }

    /// Always false; a range covers at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Grow the range by `radius` tiles in every direction, staying inside a
    /// grid of `tiles_x` x `tiles_y` tiles.
    pub fn expand(&self, radius: u32, tiles_x: u32, tiles_y: u32) -> TileRange {
        TileRange {
            cell_size: self.cell_size,
            min_x: self.min_x.saturating_sub(radius),
            max_x: self.max_x.saturating_add(radius).min(tiles_x.saturating_sub(1)),
            min_y: self.min_y.saturating_sub(radius),
            max_y: self.max_y.saturating_add(radius).min(tiles_y.saturating_sub(1)),
        }
    }

    /// Tile keys in row-major order.
    pub fn keys(&self) -> impl Iterator<Item = TileKey> {
        let TileRange {
            cell_size,
            min_x,
            max_x,
            min_y,
            max_y,
        } = *self;
        (min_y..=max_y).flat_map(move |y| (min_x..=max_x).map(move |x| TileKey::new(cell_size, x, y)))
    }
}

// =============================================================================
// Tile Address Space
// =============================================================================

/// Pure geometry of the tiled raster for a fixed base map and tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAddressSpace {
    base_width: u32,
    base_height: u32,
    tile_size: u32,
}

impl TileAddressSpace {
    /// Create an address space. A zero `tile_size` is treated as 1.
    pub fn new(base_width: u32, base_height: u32, tile_size: u32) -> Self {
        Self {
            base_width,
            base_height,
            tile_size: tile_size.max(1),
        }
    }

    pub fn base_width(&self) -> u32 {
        self.base_width
    }

    pub fn base_height(&self) -> u32 {
        self.base_height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Full raster size at `cell_size`, saturating at `u32::MAX`.
    pub fn map_size(&self, cell_size: u32) -> (u32, u32) {
        let scale = |base: u32| u32::try_from(base as u64 * cell_size as u64).unwrap_or(u32::MAX);
        (scale(self.base_width), scale(self.base_height))
    }

    /// Number of tile columns and rows at `cell_size`.
    pub fn tile_grid(&self, cell_size: u32) -> (u32, u32) {
        let (width, height) = self.map_size(cell_size);
        (width.div_ceil(self.tile_size), height.div_ceil(self.tile_size))
    }

    /// Pixel rectangle of a tile, clipped against the raster.
    ///
    /// Returns `None` for tiles that lie entirely outside the raster.
    pub fn tile_rect(&self, key: TileKey) -> Option<PixelRect> {
        let (map_width, map_height) = self.map_size(key.cell_size);
        let x = key.x as u64 * self.tile_size as u64;
        let y = key.y as u64 * self.tile_size as u64;

        if x >= map_width as u64 || y >= map_height as u64 {
            return None;
        }

        let width = (self.tile_size as u64).min(map_width as u64 - x);
        let height = (self.tile_size as u64).min(map_height as u64 - y);
        Some(PixelRect::new(x as u32, y as u32, width as u32, height as u32))
    }

    /// Geographic bounds of a tile under the equirectangular projection.
    pub fn geo_bounds(&self, key: TileKey) -> Option<GeoBounds> {
        let rect = self.tile_rect(key)?;
        let (map_width, map_height) = self.map_size(key.cell_size);
        let lon = |px: u64| -180.0 + px as f64 * 360.0 / map_width as f64;
        let lat = |py: u64| 90.0 - py as f64 * 180.0 / map_height as f64;

        Some(GeoBounds {
            min_lon: lon(rect.x as u64),
            max_lon: lon(rect.right()),
            min_lat: lat(rect.bottom()),
            max_lat: lat(rect.y as u64),
        })
    }

    /// Tiles covering a non-empty rectangle of the raster at `cell_size`.
    pub fn tile_range(&self, cell_size: u32, rect: PixelRect) -> Option<TileRange> {
        if rect.is_empty() {
            return None;
        }
        let (tiles_x, tiles_y) = self.tile_grid(cell_size);
        if tiles_x == 0 || tiles_y == 0 {
            return None;
        }

        let last = |edge: u64, tiles: u32| (((edge - 1) / self.tile_size as u64) as u32).min(tiles - 1);
        let min_x = rect.x / self.tile_size;
        let min_y = rect.y / self.tile_size;
        if min_x >= tiles_x || min_y >= tiles_y {
            return None;
        }

        Some(TileRange {
            cell_size,
            min_x,
            max_x: last(rect.right(), tiles_x),
            min_y,
            max_y: last(rect.bottom(), tiles_y),
        })
    }

    /// Every tile of the raster at `cell_size`.
    pub fn full_range(&self, cell_size: u32) -> Option<TileRange> {
        let (width, height) = self.map_size(cell_size);
        self.tile_range(cell_size, PixelRect::new(0, 0, width, height))
    }
}
