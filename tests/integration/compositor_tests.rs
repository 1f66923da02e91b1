//! View composition integration tests.
//!
//! Tests verify:
//! - A cold viewport returns at once and back-fills through ready-callbacks
//! - Re-assembling after the callbacks yields a complete view
//! - A failing tile leaves only its own region blank

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use worldmap_tiles::geo::{TileKey, ViewRect, ZoomAnchor};
use worldmap_tiles::tile::{ContentGenerator, GenerateRequest, TileImage};
use worldmap_tiles::view::BACKGROUND;
use worldmap_tiles::{MapConfig, TileError, TileReadyCallback, WorldMap};

use super::test_utils::{tile_color, CountingGenerator};

const TIMEOUT: Duration = Duration::from_secs(30);

/// 256x256 base map; zoom 3 resolves to 4 pixels per cell (a 1024x1024 raster).
fn map_config(dir: &TempDir) -> MapConfig {
    MapConfig {
        zoom_anchors: vec![
            ZoomAnchor::new(1, 1),
            ZoomAnchor::new(2, 2),
            ZoomAnchor::new(3, 4),
        ],
        ..MapConfig::new(256, 256, dir.path())
    }
}

fn channel_callback() -> (
    TileReadyCallback,
    tokio::sync::mpsc::UnboundedReceiver<(TileKey, bool)>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let callback: TileReadyCallback = Arc::new(move |key: TileKey, image: &TileImage| {
        let _ = tx.send((key, image.is_placeholder()));
    });
    (callback, rx)
}

// =============================================================================
// Cold Viewport
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cold_viewport_fills_in() {
    let dir = TempDir::new().unwrap();
    let generator = CountingGenerator::with_delay(Duration::from_millis(50));
    let map = WorldMap::with_runtime(
        map_config(&dir),
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
        tokio::runtime::Handle::current(),
    )
    .unwrap();
    let view = ViewRect::new(0, 0, 1024, 1024);
    let (callback, mut ready) = channel_callback();

    let first = map.assemble_view(3.0, view, Some(callback));

    assert_eq!(first.cell_size, 4);
    assert_eq!(first.image.dimensions(), (1024, 1024));
    assert_eq!(first.missing, 4);
    assert_eq!(*first.image.get_pixel(0, 0), BACKGROUND);

    let mut resolved = HashSet::new();
    while resolved.len() < 4 {
        let (key, placeholder) = tokio::time::timeout(TIMEOUT, ready.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!placeholder);
        resolved.insert(key);
    }
    let expected: HashSet<_> = [(0, 0), (1, 0), (0, 1), (1, 1)]
        .into_iter()
        .map(|(x, y)| TileKey::new(4, x, y))
        .collect();
    assert_eq!(resolved, expected);

    let second = map.assemble_view(3.0, view, None);
    assert!(second.is_complete());
    for key in &expected {
        let (x, y) = (key.x * 512 + 100, key.y * 512 + 100);
        assert_eq!(*second.image.get_pixel(x, y), tile_color(*key));
    }
    assert_eq!(generator.calls(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panned_view_is_offset() {
    let dir = TempDir::new().unwrap();
    let generator = CountingGenerator::new();
    let map = WorldMap::with_runtime(
        map_config(&dir),
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
        tokio::runtime::Handle::current(),
    )
    .unwrap();
    let view = ViewRect::new(500, 0, 100, 100);

    tokio::time::timeout(TIMEOUT, futures::future::join_all(map.preload_visible(3.0, view)))
        .await
        .unwrap();

    let composed = map.assemble_view(3.0, view, None);
    assert!(composed.is_complete());
    // Raster column 511 is the last of tile (0,0); 512 starts tile (1,0)
    assert_eq!(*composed.image.get_pixel(11, 5), tile_color(TileKey::new(4, 0, 0)));
    assert_eq!(*composed.image.get_pixel(12, 5), tile_color(TileKey::new(4, 1, 0)));
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_tile_leaves_only_its_region_blank() {
    let dir = TempDir::new().unwrap();
    let generator = |request: &GenerateRequest| {
        if request.key.x == 1 && request.key.y == 1 {
            return Err(TileError::generation(request.key, "bad terrain"));
        }
        Ok(image::RgbaImage::from_pixel(
            request.width,
            request.height,
            tile_color(request.key),
        ))
    };
    let map = WorldMap::new(map_config(&dir), generator).unwrap();
    let view = ViewRect::new(0, 0, 1024, 1024);

    let tiles = tokio::time::timeout(TIMEOUT, futures::future::join_all(map.preload_visible(3.0, view)))
        .await
        .unwrap();
    assert_eq!(tiles.iter().filter(|tile| tile.is_placeholder()).count(), 1);

    let (callback, mut ready) = channel_callback();
    let composed = map.assemble_view(3.0, view, Some(callback));
    assert_eq!(composed.missing, 1);
    assert_eq!(*composed.image.get_pixel(100, 100), tile_color(TileKey::new(4, 0, 0)));
    assert_eq!(*composed.image.get_pixel(900, 900), BACKGROUND);

    let (key, placeholder) = tokio::time::timeout(TIMEOUT, ready.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(key, TileKey::new(4, 1, 1));
    assert!(placeholder);
}
