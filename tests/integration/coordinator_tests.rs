//! Single-flight and failure handling integration tests.
//!
//! Tests verify:
//! - Many concurrent requests for one tile run the generator once
//! - Every concurrent caller receives the same image instance
//! - Failed generations are not cached and are retried
//! - Full-tile generator output is cropped to edge tiles
//! - A failed disk write still leaves the tile in memory
//! - Evicted tiles come back from disk instead of the generator

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use worldmap_tiles::geo::{TileAddressSpace, TileKey};
use worldmap_tiles::tile::ContentGenerator;

use super::test_utils::{build_coordinator, tile_color, CountingGenerator, FlakyGenerator};

const TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_fifty_concurrent_requests_generate_once() {
    let dir = TempDir::new().unwrap();
    let generator = CountingGenerator::with_delay(Duration::from_millis(100));
    let coordinator = build_coordinator(
        dir.path(),
        TileAddressSpace::new(64, 32, 256),
        16,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );
    let key = TileKey::new(4, 0, 0);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(
            async move { coordinator.request_tile(key).await },
        ));
    }

    let mut images = Vec::new();
    for handle in handles {
        images.push(tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap());
    }

    assert_eq!(generator.calls(), 1);
    assert_eq!(images.len(), 50);
    assert!(images.iter().all(|image| image.ptr_eq(&images[0])));
    assert!(!images[0].is_placeholder());
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_generate_independently() {
    let dir = TempDir::new().unwrap();
    let generator = CountingGenerator::with_delay(Duration::from_millis(20));
    let coordinator = build_coordinator(
        dir.path(),
        TileAddressSpace::new(64, 32, 64),
        16,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );

    // 64x32 at cell size 2 is 128x64: a 2x1 grid
    let keys = [TileKey::new(2, 0, 0), TileKey::new(2, 1, 0)];
    let futures: Vec<_> = keys
        .iter()
        .flat_map(|&key| (0..5).map(move |_| key))
        .map(|key| coordinator.request_tile(key))
        .collect();

    let images = tokio::time::timeout(TIMEOUT, futures::future::join_all(futures))
        .await
        .unwrap();

    assert_eq!(generator.calls(), 2);
    assert_eq!(*images[0].get_pixel(0, 0), tile_color(keys[0]));
    assert_eq!(*images[9].get_pixel(0, 0), tile_color(keys[1]));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_generation_is_shared_then_retried() {
    let dir = TempDir::new().unwrap();
    let generator = FlakyGenerator::new(1);
    let coordinator = build_coordinator(
        dir.path(),
        TileAddressSpace::new(64, 32, 64),
        16,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );
    let key = TileKey::new(1, 0, 0);

    let first = coordinator.request_tile(key);
    let second = coordinator.request_tile(key);
    let (first, second) = tokio::time::timeout(TIMEOUT, futures::future::join(first, second))
        .await
        .unwrap();

    assert!(first.is_placeholder());
    assert!(first.ptr_eq(&second));
    assert!(!coordinator.cache().contains(&key));
    assert!(!coordinator.store().contains(key).await);
    assert!(!coordinator.is_in_flight(&key));

    let retried = tokio::time::timeout(TIMEOUT, coordinator.request_tile(key))
        .await
        .unwrap();
    assert!(!retried.is_placeholder());
    assert_eq!(retried.dimensions(), (64, 32));
    assert_eq!(generator.calls(), 2);
    assert!(coordinator.store().contains(key).await);

    let stats = coordinator.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.generated, 1);
}

#[tokio::test]
async fn test_unusable_output_is_a_failure() {
    let dir = TempDir::new().unwrap();
    // 64px tiles: 65 is past a full tile, 0 is empty
    let generator = |request: &worldmap_tiles::GenerateRequest| {
        let side = if request.key.x == 0 { 65 } else { 0 };
        Ok::<_, worldmap_tiles::TileError>(image::RgbaImage::new(side, side))
    };
    let coordinator = build_coordinator(
        dir.path(),
        TileAddressSpace::new(128, 32, 64),
        16,
        Arc::new(generator),
    );

    for key in [TileKey::new(1, 0, 0), TileKey::new(1, 1, 0)] {
        let image = coordinator.request_tile(key).await;
        assert!(image.is_placeholder());
        assert!(!coordinator.cache().contains(&key));
        assert!(!coordinator.store().contains(key).await);
    }
    assert_eq!(coordinator.stats().failed, 2);
}

#[tokio::test]
async fn test_full_tiles_fill_edge_keys() {
    let dir = TempDir::new().unwrap();
    let generator = CountingGenerator::full_tiles();
    let coordinator = build_coordinator(
        dir.path(),
        // 100x50 with 64px tiles: every tile is clipped on some axis
        TileAddressSpace::new(100, 50, 64),
        16,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );
    let interior = TileKey::new(1, 0, 0);
    let edge = TileKey::new(1, 1, 0);

    let (first, second) = futures::future::join(
        coordinator.request_tile(interior),
        coordinator.request_tile(edge),
    )
    .await;

    assert!(!first.is_placeholder());
    assert!(!second.is_placeholder());
    assert_eq!(first.dimensions(), (64, 50));
    assert_eq!(second.dimensions(), (36, 50));
    assert_eq!(*second.get_pixel(35, 49), tile_color(edge));

    let stats = coordinator.stats();
    assert_eq!(stats.generated, 2);
    assert_eq!(stats.failed, 0);

    coordinator.request_tile(edge).await;
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_persist_failure_keeps_tile_in_memory() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file, not a directory").unwrap();

    let generator = CountingGenerator::new();
    let coordinator = build_coordinator(
        &blocker,
        TileAddressSpace::new(64, 32, 64),
        16,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );
    let key = TileKey::new(1, 0, 0);

    let image = tokio::time::timeout(TIMEOUT, coordinator.request_tile(key))
        .await
        .unwrap();
    assert!(!image.is_placeholder());
    assert!(coordinator.cache().contains(&key));

    let stats = coordinator.stats();
    assert_eq!(stats.persist_failures, 1);
    assert_eq!(stats.persisted, 0);
    assert_eq!(stats.failed, 0);

    let again = coordinator.request_tile(key).await;
    assert!(again.ptr_eq(&image));
    assert_eq!(generator.calls(), 1);
}

// =============================================================================
// Bounded Cache
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_evicted_tiles_reload_from_disk() {
    let dir = TempDir::new().unwrap();
    let generator = CountingGenerator::new();
    let capacity = 4;
    let extra = 3;
    let coordinator = build_coordinator(
        dir.path(),
        // 448x64 at cell size 1 with 64px tiles: a 7x1 grid
        TileAddressSpace::new(448, 64, 64),
        capacity,
        Arc::clone(&generator) as Arc<dyn ContentGenerator>,
    );

    let keys: Vec<_> = (0..(capacity + extra) as u32)
        .map(|x| TileKey::new(1, x, 0))
        .collect();
    for &key in &keys {
        tokio::time::timeout(TIMEOUT, coordinator.request_tile(key))
            .await
            .unwrap();
    }

    let cache = coordinator.cache();
    assert_eq!(cache.len(), capacity);
    for key in &keys[..extra] {
        assert!(!cache.contains(key));
        assert!(coordinator.store().try_load(*key).await.is_some());
    }
    for key in &keys[extra..] {
        assert!(cache.contains(key));
    }

    let reloaded = coordinator.request_tile(keys[0]).await;
    assert_eq!(*reloaded.get_pixel(10, 10), tile_color(keys[0]));
    assert_eq!(generator.calls(), capacity + extra);
    assert_eq!(coordinator.stats().loaded, 1);
}
