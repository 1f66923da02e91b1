//! Viewport assembly from cached tiles.
//!
//! [`ViewCompositor::assemble_view`] never waits for a tile. It draws whatever
//! the memory cache holds, fills the rest with [`BACKGROUND`], and schedules
//! the missing tiles on the runtime. Each scheduled tile invokes every
//! ready-callback attached to it once, after which callers re-assemble their
//! views and the gap is filled.
//!
//! # Coordinates
//!
//! Views are given in raster pixels at the cell size the zoom resolves to.
//! A view larger than the raster on one axis is re-positioned so the raster
//! sits in the middle of the output on that axis.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use image::{imageops, Rgba, RgbaImage};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TileError;
use crate::geo::{RasterLimits, TileAddressSpace, TileKey, TileRange, ViewRect, ZoomMapper};
use crate::tile::{GenerationCoordinator, TileFuture, TileImage};

/// Fill colour for regions with no tile yet.
pub const BACKGROUND: Rgba<u8> = Rgba([169, 169, 169, 255]);

/// Default number of tiles a region preload waits on at once.
pub const DEFAULT_PRELOAD_PARALLELISM: usize = 4;

/// Invoked from a runtime worker when a scheduled tile resolves.
///
/// The image is a placeholder if generation failed.
pub type TileReadyCallback = Arc<dyn Fn(TileKey, &TileImage) + Send + Sync>;

/// Result of [`ViewCompositor::assemble_view`].
#[derive(Debug, Clone)]
pub struct ComposedView {
    /// Composite, sized like the requested view (1x1 for a placeholder)
    pub image: RgbaImage,

    /// Cell size the zoom resolved to
    pub cell_size: u32,

    /// View actually drawn, after centering
    pub view: ViewRect,

    /// Covering tiles that were not in memory
    pub missing: usize,

    /// Whether the view could not be drawn at all
    pub placeholder: bool,
}

impl ComposedView {
    /// Whether every covering tile was drawn.
    pub fn is_complete(&self) -> bool {
        !self.placeholder && self.missing == 0
    }

    fn placeholder(cell_size: u32, view: ViewRect) -> Self {
        Self {
            image: TileImage::placeholder().pixels().clone(),
            cell_size,
            view,
            missing: 0,
            placeholder: true,
        }
    }
}

/// Outcome of [`ViewCompositor::preload_region`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadSummary {
    pub cell_size: u32,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl PreloadSummary {
    pub fn resolved(&self) -> usize {
        self.completed + self.failed
    }
}

/// A tile scheduled by `assemble_view` and the callbacks waiting on it.
struct PendingTile {
    ticket: u64,
    callbacks: Vec<TileReadyCallback>,
}

type PendingTiles = HashMap<TileKey, PendingTile>;

// =============================================================================
// View Compositor
// =============================================================================

/// Assembles views from tiles and warms the cache ahead of them.
pub struct ViewCompositor {
    coordinator: GenerationCoordinator,
    zoom: ZoomMapper,
    limits: RasterLimits,
    parallelism: usize,

    /// Tiles scheduled by `assemble_view` that have not resolved yet
    pending: Arc<Mutex<PendingTiles>>,
    next_ticket: AtomicU64,

    /// Region preloads run one at a time
    preload_gate: Semaphore,
}

impl ViewCompositor {
    /// Create a compositor. A `parallelism` of zero is raised to one.
    pub fn new(
        coordinator: GenerationCoordinator,
        zoom: ZoomMapper,
        limits: RasterLimits,
        parallelism: usize,
    ) -> Self {
        Self {
            coordinator,
            zoom,
            limits,
            parallelism: parallelism.max(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
            preload_gate: Semaphore::new(1),
        }
    }

    pub fn coordinator(&self) -> &GenerationCoordinator {
        &self.coordinator
    }

    pub fn zoom_mapper(&self) -> &ZoomMapper {
        &self.zoom
    }

    pub fn cell_size(&self, zoom: f64) -> u32 {
        self.zoom.cell_size(zoom)
    }

    /// Raster size at the cell size `zoom` resolves to.
    pub fn map_size(&self, zoom: f64) -> (u32, u32) {
        self.space().map_size(self.cell_size(zoom))
    }

    /// Number of tiles scheduled by `assemble_view` and still unresolved.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Compose `view` at `zoom` from the memory cache.
    ///
    /// Returns immediately. Missing tiles are requested in the background and
    /// `on_ready` is called for each once it resolves. A tile that is already
    /// scheduled is not requested again; `on_ready` joins the callbacks
    /// waiting on it.
    ///
    /// An empty or over-limit view, or one that misses the map entirely,
    /// yields a 1x1 placeholder.
    pub fn assemble_view(
        &self,
        zoom: f64,
        view: ViewRect,
        on_ready: Option<TileReadyCallback>,
    ) -> ComposedView {
        let cell_size = self.cell_size(zoom);

        if let Err(e) = self.check_view(view) {
            warn!(error = %e, "Cannot compose view");
            return ComposedView::placeholder(cell_size, view);
        }

        let space = self.space();
        let (map_width, map_height) = space.map_size(cell_size);
        let view = center_view(view, map_width, map_height);

        let Some(range) = covering_range(&space, cell_size, view) else {
            debug!(cell_size, ?view, "View lies outside the map");
            return ComposedView::placeholder(cell_size, view);
        };

        let mut output = RgbaImage::from_pixel(view.width, view.height, BACKGROUND);
        let cache = self.coordinator.cache();
        let mut missing = 0;

        for key in range.keys() {
            let Some(rect) = space.tile_rect(key) else {
                continue;
            };
            match cache.get(&key) {
                Some(tile) => {
                    imageops::replace(
                        &mut output,
                        tile.pixels(),
                        rect.x as i64 - view.x,
                        rect.y as i64 - view.y,
                    );
                }
                None => {
                    missing += 1;
                    self.schedule(key, on_ready.clone());
                }
            }
        }

        debug!(cell_size, tiles = range.len(), missing, "Composed view");

        ComposedView {
            image: output,
            cell_size,
            view,
            missing,
            placeholder: false,
        }
    }

    /// Request every tile covering `view` without compositing.
    ///
    /// The returned futures may be awaited or dropped; dropping them does not
    /// stop generation.
    pub fn preload_visible(&self, zoom: f64, view: ViewRect) -> Vec<TileFuture> {
        let cell_size = self.cell_size(zoom);
        let space = self.space();
        let (map_width, map_height) = space.map_size(cell_size);
        let view = center_view(view, map_width, map_height);

        match covering_range(&space, cell_size, view) {
            Some(range) => range
                .keys()
                .map(|key| self.coordinator.request_tile(key))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Warm the tiles covering `view` plus `radius` tiles around it.
    ///
    /// At most `parallelism` tiles are awaited at once, and overlapping calls
    /// wait for each other. `progress` receives `(resolved, total)` after each
    /// tile. Cancelling `cancel` stops scheduling further tiles and returns;
    /// tiles already started still finish in the background.
    pub async fn preload_region<P>(
        &self,
        zoom: f64,
        view: ViewRect,
        radius: u32,
        cancel: &CancellationToken,
        mut progress: P,
    ) -> PreloadSummary
    where
        P: FnMut(usize, usize) + Send,
    {
        let cell_size = self.cell_size(zoom);
        let space = self.space();
        let (map_width, map_height) = space.map_size(cell_size);
        let view = center_view(view, map_width, map_height);

        let mut summary = PreloadSummary {
            cell_size,
            ..PreloadSummary::default()
        };

        let Some(range) = covering_range(&space, cell_size, view) else {
            return summary;
        };
        let (tiles_x, tiles_y) = space.tile_grid(cell_size);
        let range = range.expand(radius, tiles_x, tiles_y);
        summary.total = range.len();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                summary.cancelled = true;
                return summary;
            }
            permit = self.preload_gate.acquire() => permit.ok(),
        };

        info!(
            cell_size,
            tiles = summary.total,
            parallelism = self.parallelism,
            "Preloading region"
        );

        let mut tiles = pin!(futures::stream::iter(range.keys())
            .map(|key| self.coordinator.request_tile(key))
            .buffer_unordered(self.parallelism));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    info!(
                        resolved = summary.resolved(),
                        total = summary.total,
                        "Preload cancelled"
                    );
                    break;
                }
                next = tiles.next() => match next {
                    Some(tile) => {
                        if tile.is_placeholder() {
                            summary.failed += 1;
                        } else {
                            summary.completed += 1;
                        }
                        progress(summary.resolved(), summary.total);
                    }
                    None => break,
                },
            }
        }

        summary
    }

    /// Forget which tiles were scheduled, dropping their callbacks.
    pub fn reset_pending(&self) {
        self.lock_pending().clear();
    }

    fn space(&self) -> TileAddressSpace {
        self.coordinator.address_space()
    }

    fn check_view(&self, view: ViewRect) -> Result<(), TileError> {
        let (width, height) = (view.width as u64, view.height as u64);
        if width == 0 || height == 0 {
            return Err(TileError::InvalidDimensions {
                width,
                height,
                reason: "view is empty".to_string(),
            });
        }
        if !self.limits.admits(width, height) {
            return Err(TileError::InvalidDimensions {
                width,
                height,
                reason: "view exceeds the raster limits".to_string(),
            });
        }
        Ok(())
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingTiles> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self, key: TileKey, on_ready: Option<TileReadyCallback>) {
        let ticket = {
            let mut pending = self.lock_pending();
            if let Some(entry) = pending.get_mut(&key) {
                entry.callbacks.extend(on_ready);
                return;
            }
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            pending.insert(
                key,
                PendingTile {
                    ticket,
                    callbacks: on_ready.into_iter().collect(),
                },
            );
            ticket
        };

        let tile = self.coordinator.request_tile(key);
        let pending = Arc::clone(&self.pending);

        debug!(tile = %key, "Scheduled missing tile");
        self.coordinator.runtime().spawn(async move {
            let image = tile.await;
            let callbacks = {
                let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
                // Entries replaced after a reset belong to a newer schedule
                let current = pending
                    .get(&key)
                    .is_some_and(|entry| entry.ticket == ticket);
                if current {
                    pending
                        .remove(&key)
                        .map(|entry| entry.callbacks)
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            };
            for on_ready in callbacks {
                on_ready(key, &image);
            }
        });
    }
}

/// Re-position a view that is larger than the map on some axis so the map is
/// centred in it.
fn center_view(view: ViewRect, map_width: u32, map_height: u32) -> ViewRect {
    let center = |origin: i64, length: u32, map: u32| {
        if length > map {
            -(((length - map) / 2) as i64)
        } else {
            origin
        }
    };

    ViewRect::new(
        center(view.x, view.width, map_width),
        center(view.y, view.height, map_height),
        view.width,
        view.height,
    )
}

fn covering_range(space: &TileAddressSpace, cell_size: u32, view: ViewRect) -> Option<TileRange> {
    let (map_width, map_height) = space.map_size(cell_size);
    let visible = view.clip(map_width, map_height)?;
    space.tile_range(cell_size, visible)
}

// =============================================================================
// Tests
// =============================================================================
