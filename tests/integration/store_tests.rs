//! Disk store integration tests.
//!
//! Tests verify:
//! - Tiles survive a restart (a fresh pipeline over the same directory)
//! - Corrupt files are deleted and regenerated
//! - Overlapping saves leave exactly one decodable file

use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

use worldmap_tiles::geo::{TileAddressSpace, TileKey};
use worldmap_tiles::tile::{ContentGenerator, TileFormat, TileImage, TileStore};

use super::test_utils::{build_coordinator, tile_color, CountingGenerator};

const TIMEOUT: Duration = Duration::from_secs(30);

fn space() -> TileAddressSpace {
    TileAddressSpace::new(64, 32, 64)
}

// =============================================================================
// Warm Restart
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tiles_survive_restart() {
    let dir = TempDir::new().unwrap();
    let key = TileKey::new(2, 1, 0);

    let first_run = CountingGenerator::new();
    let coordinator = build_coordinator(
        dir.path(),
        space(),
        8,
        Arc::clone(&first_run) as Arc<dyn ContentGenerator>,
    );
    let original = coordinator.request_tile(key).await;
    drop(coordinator);

    assert!(dir.path().join("2").join("1_0.png").is_file());

    let second_run = CountingGenerator::new();
    let coordinator = build_coordinator(
        dir.path(),
        space(),
        8,
        Arc::clone(&second_run) as Arc<dyn ContentGenerator>,
    );
    let reloaded = coordinator.request_tile(key).await;

    assert_eq!(reloaded.pixels(), original.pixels());
    assert_eq!(first_run.calls(), 1);
    assert_eq!(second_run.calls(), 0);
}

// =============================================================================
// Corrupt File Recovery
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_corrupt_file_is_regenerated() {
    let dir = TempDir::new().unwrap();
    let key = TileKey::new(4, 0, 0);
    let path = dir.path().join("4").join("0_0.png");

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nthis is not a complete image").unwrap();

    let store = TileStore::new(dir.path(), TileFormat::Png);
    assert!(store.try_load(key).await.is_none());
    assert!(!path.exists());

    std::fs::write(&path, b"garbage").unwrap();

    let generator = CountingGenerator::new();
    let coordinator = build_coordinator(
        dir.path(),
        space(),
        8,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );
    let image = tokio::time::timeout(TIMEOUT, coordinator.request_tile(key))
        .await
        .unwrap();

    assert!(!image.is_placeholder());
    assert_eq!(image.dimensions(), (64, 64));
    assert_eq!(generator.calls(), 1);

    let persisted = store.load_blocking(key).unwrap().unwrap();
    assert_eq!(*persisted.get_pixel(0, 0), tile_color(key));
}

// =============================================================================
// Overlapping Saves
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_saves_leave_one_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(TileStore::new(dir.path(), TileFormat::Png));
    let key = TileKey::new(8, 3, 2);

    let mut handles = Vec::new();
    for shade in 0..16u8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let image = TileImage::new(RgbaImage::from_pixel(
                128,
                128,
                Rgba([shade, shade, shade, 255]),
            ));
            store.save(key, &image).await.unwrap()
        }));
    }

    let mut written = 0;
    for handle in handles {
        if tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap() {
            written += 1;
        }
    }
    assert_eq!(written, 1);

    let files: Vec<_> = std::fs::read_dir(dir.path().join("8"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("3_2.png")]);

    let loaded = store.try_load(key).await.unwrap();
    assert_eq!(loaded.dimensions(), (128, 128));
    assert_eq!(store.active_locks(), 0);
}
