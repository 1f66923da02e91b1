//! Content generation seam.
//!
//! The pipeline does not know how map art is made. It hands a
//! [`GenerateRequest`] to a [`ContentGenerator`] on a blocking worker thread
//! and expects back an RGBA buffer of exactly the requested size.
//!
//! Generators must be callable from any thread, must not cache on their own
//! (the pipeline does that), and may be non-deterministic.

use image::{Rgba, RgbaImage};

use crate::error::TileError;
use crate::geo::{GeoBounds, TileKey};

/// Everything a generator needs to paint one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateRequest {
    /// Tile being generated
    pub key: TileKey,

    /// Longitude/latitude covered by the tile
    pub bounds: GeoBounds,

    /// Pixels per map cell
    pub cell_size: u32,

    /// Output width; smaller than the tile size on the right edge
    pub width: u32,

    /// Output height; smaller than the tile size on the bottom edge
    pub height: u32,
}

/// Produces tile pixels for a geographic region.
pub trait ContentGenerator: Send + Sync + 'static {
    /// Paint the tile described by `request`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the caller and the tile is retried on the next
    /// request.
    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, TileError>;
}

impl<F> ContentGenerator for F
where
    F: Fn(&GenerateRequest) -> Result<RgbaImage, TileError> + Send + Sync + 'static,
{
    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, TileError> {
        self(request)
    }
}

// =============================================================================
// Graticule Generator
// =============================================================================

const OCEAN: Rgba<u8> = Rgba([38, 84, 140, 255]);
const SHALLOWS: Rgba<u8> = Rgba([70, 130, 180, 255]);
const LOWLAND: Rgba<u8> = Rgba([96, 142, 74, 255]);
const HIGHLAND: Rgba<u8> = Rgba([150, 128, 88, 255]);
const ICE: Rgba<u8> = Rgba([232, 238, 242, 255]);
const GRID: Rgba<u8> = Rgba([20, 30, 40, 255]);

/// Deterministic stand-in world: a smooth land/sea field with ice caps and
/// graticule lines.
///
/// Used by the command-line tool, which has no terrain synthesiser attached.
#[derive(Debug, Clone, Copy)]
pub struct GraticuleGenerator {
    /// Degrees between graticule lines; 0 disables them
    pub spacing_degrees: f64,
}

impl Default for GraticuleGenerator {
    fn default() -> Self {
        Self {
            spacing_degrees: 30.0,
        }
    }
}

impl GraticuleGenerator {
    fn elevation(lon: f64, lat: f64) -> f64 {
        let (lon, lat) = (lon.to_radians(), lat.to_radians());
        0.55 * (2.0 * lon).sin() * (3.0 * lat).cos()
            + 0.30 * (5.0 * lon + 1.3).cos() * (4.0 * lat + 0.7).sin()
            + 0.15 * (11.0 * lon - 2.1).sin() * (9.0 * lat).cos()
    }

    fn on_grid(&self, value: f64, half_pixel: f64) -> bool {
        if self.spacing_degrees <= 0.0 {
            return false;
        }
        let offset = value.rem_euclid(self.spacing_degrees);
        offset <= half_pixel || self.spacing_degrees - offset <= half_pixel
    }

    fn color(&self, lon: f64, lat: f64, lon_step: f64, lat_step: f64) -> Rgba<u8> {
        if self.on_grid(lon, lon_step / 2.0) || self.on_grid(lat, lat_step / 2.0) {
            return GRID;
        }
        if lat.abs() > 75.0 {
            return ICE;
        }
        match Self::elevation(lon, lat) {
            e if e < -0.05 => OCEAN,
            e if e < 0.05 => SHALLOWS,
            e if e < 0.45 => LOWLAND,
            _ => HIGHLAND,
        }
    }
}

impl ContentGenerator for GraticuleGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, TileError> {
        if request.width == 0 || request.height == 0 {
            return Err(TileError::generation(request.key, "empty tile requested"));
        }

        let bounds = request.bounds;
        let lon_step = bounds.width_degrees() / request.width as f64;
        let lat_step = bounds.height_degrees() / request.height as f64;

        Ok(RgbaImage::from_fn(request.width, request.height, |px, py| {
            let (lon, lat) = bounds.pixel_center(px, py, request.width, request.height);
            self.color(lon, lat, lon_step, lat_step)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: u32, height: u32) -> GenerateRequest {
        GenerateRequest {
            key: TileKey::new(1, 0, 0),
            bounds: GeoBounds::WORLD,
            cell_size: 1,
            width,
            height,
        }
    }

    #[test]
    fn test_output_matches_request() {
        let image = GraticuleGenerator::default()
            .generate(&request(360, 180))
            .unwrap();
        assert_eq!(image.dimensions(), (360, 180));
    }

    #[test]
    fn test_deterministic() {
        let generator = GraticuleGenerator::default();
        let a = generator.generate(&request(90, 45)).unwrap();
        let b = generator.generate(&request(90, 45)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_poles_are_ice() {
        let generator = GraticuleGenerator {
            spacing_degrees: 0.0,
        };
        let image = generator.generate(&request(360, 180)).unwrap();
        assert_eq!(*image.get_pixel(100, 2), ICE);
        assert_eq!(*image.get_pixel(100, 177), ICE);
    }

    #[test]
    fn test_graticule_lines() {
        let image = GraticuleGenerator::default()
            .generate(&request(360, 180))
            .unwrap();
        // Pixels 179 and 180 straddle the prime meridian
        assert_eq!(*image.get_pixel(180, 100), GRID);
        // The equator lies between rows 89 and 90
        assert_eq!(*image.get_pixel(45, 90), GRID);
    }

    #[test]
    fn test_rejects_empty_request() {
        let result = GraticuleGenerator::default().generate(&request(0, 10));
        assert!(matches!(result, Err(TileError::GenerationFailure { .. })));
    }

    #[test]
    fn test_closure_generator() {
        let generator = |request: &GenerateRequest| {
            Ok::<_, TileError>(RgbaImage::from_pixel(
                request.width,
                request.height,
                Rgba([1, 2, 3, 255]),
            ))
        };
        let image = generator.generate(&request(4, 4)).unwrap();
        assert_eq!(*image.get_pixel(3, 3), Rgba([1, 2, 3, 255]));
    }
}
