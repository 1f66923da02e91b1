//! Pure geometry: zoom resolution and tile addressing.
//!
//! Nothing in this module performs I/O or holds locks, so every function can
//! be called from the render loop and from background workers alike.
//!
//! - [`ZoomMapper`]: continuous zoom value → integer cell size
//! - [`TileAddressSpace`]: raster size, tile rectangles, and geographic bounds
//! - [`TileKey`]: `(cell_size, x, y)` identity of one tile

mod address;
mod zoom;

pub use address::{GeoBounds, PixelRect, TileAddressSpace, TileKey, TileRange, ViewRect};
pub use zoom::{
    RasterLimits, ZoomAnchor, ZoomMapper, DEFAULT_MAX_RASTER_DIMENSION, DEFAULT_MAX_TOTAL_PIXELS,
    DEFAULT_ZOOM_ANCHORS,
};
