//! Worldmap Tiles - command-line access to the tile pipeline.
//!
//! Renders views, warms and inspects the disk cache using the built-in
//! graticule generator.

use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use worldmap_tiles::{
    config::{CheckConfig, ClearConfig, Cli, Command, MapArgs, OutputFormat, RenderConfig, WarmConfig},
    geo::ViewRect,
    tile::GraticuleGenerator,
    WorldMap,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Render(config) => run_render(config).await,
        Command::Warm(config) => run_warm(config).await,
        Command::Check(config) => run_check(config).await,
        Command::Clear(config) => run_clear(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "worldmap_tiles=debug"
    } else {
        "worldmap_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Validate the shared options and build the map.
fn open_map(args: &MapArgs) -> Result<WorldMap, String> {
    let config = args.to_map_config();
    config.validate()?;
    WorldMap::new(config, GraticuleGenerator::default()).map_err(|e| e.to_string())
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.map.verbose);

    let map = match open_map(&config.map) {
        Ok(map) => map,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let started = Instant::now();
    let tiles = futures::future::join_all(map.preload_visible(config.zoom, config.view)).await;
    let failed = tiles.iter().filter(|tile| tile.is_placeholder()).count();
    if failed > 0 {
        warn!(failed, "Some tiles failed to generate and are left blank");
    }

    let composed = map.assemble_view(config.zoom, config.view, None);
    if composed.placeholder {
        error!("View {:?} does not intersect the map", config.view);
        return ExitCode::FAILURE;
    }

    if let Err(e) = composed.image.save(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Rendered {}x{} at cell size {} from {} tile(s) in {:.2?} -> {}",
        composed.image.width(),
        composed.image.height(),
        composed.cell_size,
        tiles.len(),
        started.elapsed(),
        config.output.display()
    );

    ExitCode::SUCCESS
}

// =============================================================================
// Warm Command
// =============================================================================

async fn run_warm(config: WarmConfig) -> ExitCode {
    init_logging(config.map.verbose);

    let map = match open_map(&config.map) {
        Ok(map) => map,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let view = config.view.unwrap_or_else(|| {
        let (width, height) = map.get_map_size(config.zoom);
        ViewRect::new(0, 0, width, height)
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; waiting for started tiles to finish");
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let summary = map
        .preload_region(config.zoom, view, config.radius, &cancel, |done, total| {
            let step = (total / 10).max(1);
            if done == total || done % step == 0 {
                info!("Warmed {}/{} tiles", done, total);
            }
        })
        .await;

    let stats = map.stats();
    info!(
        "Cell size {}: {} tile(s) resolved ({} generated, {} loaded, {} failed) in {:.2?}",
        summary.cell_size,
        summary.resolved(),
        stats.generated,
        stats.loaded,
        summary.failed,
        started.elapsed()
    );

    if summary.cancelled {
        return ExitCode::FAILURE;
    }
    if summary.failed > 0 || stats.persist_failures > 0 {
        warn!(
            "{} tile(s) failed and {} could not be written",
            summary.failed, stats.persist_failures
        );
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.map.verbose {
        init_logging(true);
    }

    let map = match open_map(&config.map) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = map.level_report(config.zoom).await;

    match config.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Text => {
            println!("Worldmap Tile Cache Check");
            println!("═════════════════════════");
            println!();
            println!("  Cache dir:   {}", map.config().cache_dir.display());
            println!("  Zoom:        {}", report.zoom);
            println!("  Cell size:   {}", report.cell_size);
            println!("  Raster:      {}x{}", report.map_width, report.map_height);
            println!(
                "  Tile grid:   {}x{} ({} tiles)",
                report.tiles_x,
                report.tiles_y,
                report.total_tiles()
            );
            println!("  On disk:     {}", report.tiles_on_disk);
            println!();
            if report.complete {
                println!("✓ Level is fully cached");
            } else {
                println!("✗ Level is incomplete");
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Clear Command
// =============================================================================

async fn run_clear(config: ClearConfig) -> ExitCode {
    init_logging(config.map.verbose);

    let map = match open_map(&config.map) {
        Ok(map) => map,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cell_size = config.zoom.map(|zoom| map.cell_size(zoom));

    match map.store().purge(cell_size).await {
        Ok(true) => {
            match cell_size {
                Some(cell_size) => info!("Cleared cached tiles for cell size {}", cell_size),
                None => info!("Cleared {}", map.store().root().display()),
            }
            ExitCode::SUCCESS
        }
        Ok(false) => {
            info!("Nothing to clear");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
