//! Configuration for the tile pipeline and the command-line tool.
//!
//! [`MapConfig`] is what the library consumes. The binary builds one from
//! command-line arguments, every one of which can also be set through a
//! `WORLDMAP_` environment variable:
//!
//! - `WORLDMAP_CACHE_DIR` - Tile cache root (default: map_tiles)
//! - `WORLDMAP_BASE_WIDTH` / `WORLDMAP_BASE_HEIGHT` - Base map size in cells (default: 360x180)
//! - `WORLDMAP_TILE_SIZE` - Tile edge length in pixels (default: 512)
//! - `WORLDMAP_CACHE_CAPACITY` - Tiles kept in memory (default: 256)
//! - `WORLDMAP_ZOOM_ANCHORS` - Comma-separated `level:pixels` pairs
//! - `WORLDMAP_MAX_RASTER_DIMENSION` / `WORLDMAP_MAX_TOTAL_PIXELS` - Raster ceilings
//! - `WORLDMAP_TILE_FORMAT` - `png` or `jpeg` (default: png)
//! - `WORLDMAP_JPEG_QUALITY` - Quality for JPEG tiles (default: 90)
//! - `WORLDMAP_PRELOAD_PARALLELISM` - Tiles warmed at once (default: 4)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::ConfigError;
use crate::geo::{
    RasterLimits, ViewRect, ZoomAnchor, ZoomMapper, DEFAULT_MAX_RASTER_DIMENSION,
    DEFAULT_MAX_TOTAL_PIXELS, DEFAULT_ZOOM_ANCHORS,
};
use crate::tile::{is_valid_quality, TileFormat, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY};
use crate::view::DEFAULT_PRELOAD_PARALLELISM;

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default cache root, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "map_tiles";

/// Default base map width in cells (one cell per degree).
pub const DEFAULT_BASE_WIDTH: u32 = 360;

/// Default base map height in cells.
pub const DEFAULT_BASE_HEIGHT: u32 = 180;

// =============================================================================
// Map Configuration
// =============================================================================

/// Static configuration of one map's tile pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    /// Base map width in cells
    pub base_width: u32,

    /// Base map height in cells
    pub base_height: u32,

    /// Edge length of one tile in pixels
    pub tile_size_px: u32,

    /// Maximum number of tiles kept in memory
    pub cache_capacity: usize,

    /// Zoom curve, ordered by level
    pub zoom_anchors: Vec<ZoomAnchor>,

    /// Largest raster width or height
    pub max_raster_dimension: u64,

    /// Largest raster area
    pub max_total_pixels: u64,

    /// Root of the on-disk tile cache
    pub cache_dir: PathBuf,

    /// Encoding of persisted tiles
    pub tile_format: TileFormat,

    /// Tiles awaited at once by region preloads
    pub preload_parallelism: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            base_width: DEFAULT_BASE_WIDTH,
            base_height: DEFAULT_BASE_HEIGHT,
            tile_size_px: DEFAULT_TILE_SIZE,
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            zoom_anchors: DEFAULT_ZOOM_ANCHORS.to_vec(),
            max_raster_dimension: DEFAULT_MAX_RASTER_DIMENSION,
            max_total_pixels: DEFAULT_MAX_TOTAL_PIXELS,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            tile_format: TileFormat::Png,
            preload_parallelism: DEFAULT_PRELOAD_PARALLELISM,
        }
    }
}

impl MapConfig {
    /// Defaults for a `base_width` x `base_height` map cached under `cache_dir`.
    pub fn new(base_width: u32, base_height: u32, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_width,
            base_height,
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn raster_limits(&self) -> RasterLimits {
        RasterLimits {
            max_dimension: self.max_raster_dimension,
            max_total_pixels: self.max_total_pixels,
        }
    }

    /// Build the zoom mapper described by this configuration.
    pub fn zoom_mapper(&self) -> Result<ZoomMapper, ConfigError> {
        if self.tile_size_px == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        ZoomMapper::new(
            &self.zoom_anchors,
            self.base_width,
            self.base_height,
            self.raster_limits(),
        )
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.zoom_mapper().map_err(|e| e.to_string())?;

        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }
        if self.preload_parallelism == 0 {
            return Err("preload_parallelism must be greater than 0".to_string());
        }
        if let TileFormat::Jpeg { quality } = self.tile_format {
            if !is_valid_quality(quality) {
                return Err("jpeg_quality must be between 1 and 100".to_string());
            }
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Worldmap Tiles - multi-resolution tile cache for procedural world maps.
#[derive(Parser, Debug, Clone)]
#[command(name = "worldmap-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compose one view at a zoom level into a PNG file
    Render(RenderConfig),

    /// Generate and persist the tiles of a zoom level
    Warm(WarmConfig),

    /// Report the state of the disk cache at a zoom level
    Check(CheckConfig),

    /// Delete cached tiles
    Clear(ClearConfig),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    /// Root directory of the tile cache.
    #[arg(long, default_value = DEFAULT_CACHE_DIR, env = "WORLDMAP_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Base map width in cells.
    #[arg(long, default_value_t = DEFAULT_BASE_WIDTH, env = "WORLDMAP_BASE_WIDTH")]
    pub base_width: u32,

    /// Base map height in cells.
    #[arg(long, default_value_t = DEFAULT_BASE_HEIGHT, env = "WORLDMAP_BASE_HEIGHT")]
    pub base_height: u32,

    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WORLDMAP_TILE_SIZE")]
    pub tile_size: u32,

    /// Maximum number of tiles kept in memory.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "WORLDMAP_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Zoom curve as comma-separated `level:pixels_per_cell` pairs.
    ///
    /// Defaults to 1:3,2:4,3:6,4:10,5:40,6:80,7:160,8:320,9:640,10:1280.
    #[arg(long, env = "WORLDMAP_ZOOM_ANCHORS", value_delimiter = ',')]
    pub zoom_anchors: Option<Vec<ZoomAnchor>>,

    /// Largest raster width or height in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_RASTER_DIMENSION, env = "WORLDMAP_MAX_RASTER_DIMENSION")]
    pub max_raster_dimension: u64,

    /// Largest raster area in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_TOTAL_PIXELS, env = "WORLDMAP_MAX_TOTAL_PIXELS")]
    pub max_total_pixels: u64,

    /// Encoding of persisted tiles (png or jpeg).
    #[arg(long, default_value = "png", env = "WORLDMAP_TILE_FORMAT")]
    pub tile_format: TileFormat,

    /// JPEG quality (1-100), used when the tile format is jpeg.
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WORLDMAP_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Tiles warmed at once.
    #[arg(long, default_value_t = DEFAULT_PRELOAD_PARALLELISM, env = "WORLDMAP_PRELOAD_PARALLELISM")]
    pub preload_parallelism: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl MapArgs {
    pub fn to_map_config(&self) -> MapConfig {
        let tile_format = match self.tile_format {
            TileFormat::Jpeg { .. } => TileFormat::Jpeg {
                quality: self.jpeg_quality,
            },
            TileFormat::Png => TileFormat::Png,
        };

        MapConfig {
            base_width: self.base_width,
            base_height: self.base_height,
            tile_size_px: self.tile_size,
            cache_capacity: self.cache_capacity,
            zoom_anchors: self
                .zoom_anchors
                .clone()
                .unwrap_or_else(|| DEFAULT_ZOOM_ANCHORS.to_vec()),
            max_raster_dimension: self.max_raster_dimension,
            max_total_pixels: self.max_total_pixels,
            cache_dir: self.cache_dir.clone(),
            tile_format,
            preload_parallelism: self.preload_parallelism,
        }
    }
}

/// Options for `render`.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub map: MapArgs,

    /// Continuous zoom value.
    #[arg(short, long, default_value_t = 1.0)]
    pub zoom: f64,

    /// View as `x,y,width,height` in raster pixels.
    #[arg(long, default_value = "0,0,1024,768", value_parser = parse_view, allow_hyphen_values = true)]
    pub view: ViewRect,

    /// Output PNG path.
    #[arg(short, long, default_value = "map.png")]
    pub output: PathBuf,
}

/// Options for `warm`.
#[derive(Args, Debug, Clone)]
pub struct WarmConfig {
    #[command(flatten)]
    pub map: MapArgs,

    /// Continuous zoom value.
    #[arg(short, long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Warm only this view (`x,y,width,height`); the whole level otherwise.
    #[arg(long, value_parser = parse_view, allow_hyphen_values = true)]
    pub view: Option<ViewRect>,

    /// Extra ring of tiles around the view.
    #[arg(long, default_value_t = 0)]
    pub radius: u32,
}

/// Output format for `check`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Options for `check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub map: MapArgs,

    /// Continuous zoom value.
    #[arg(short, long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Options for `clear`.
#[derive(Args, Debug, Clone)]
pub struct ClearConfig {
    #[command(flatten)]
    pub map: MapArgs,

    /// Clear only the level this zoom resolves to; everything otherwise.
    #[arg(short, long)]
    pub zoom: Option<f64>,
}

/// Parse `x,y,width,height`.
pub fn parse_view(s: &str) -> Result<ViewRect, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got '{}'", s));
    };

    let x = x.parse().map_err(|e| format!("invalid x '{}': {}", x, e))?;
    let y = y.parse().map_err(|e| format!("invalid y '{}': {}", y, e))?;
    let width = width
        .parse()
        .map_err(|e| format!("invalid width '{}': {}", width, e))?;
    let height = height
        .parse()
        .map_err(|e| format!("invalid height '{}': {}", height, e))?;

    Ok(ViewRect::new(x, y, width, height))
}

// =============================================================================
// Tests
// =============================================================================
