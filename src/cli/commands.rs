//! Command handlers
//!
//! Each subcommand maps to one function here. `browse` is the only one that
//! runs the decode pipeline; the rest manage configuration.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStats;
use crate::cli::args::{Args, Commands};
use crate::cli::progress::{
    format_bytes, print_header, print_info, print_success, print_warning, DecodeProgress,
    ScanSpinner,
};
use crate::core::config::{init_config, Config};
use crate::core::types::CacheTier;
use crate::decoder::{AnimatedImageFactory, FsOpener};
use crate::grid::{
    BindDecision, Candidate, CandidateProvider, CellState, DirectoryCandidates, GridCell,
    GridCounters, PickerGrid, TileKind,
};
use crate::scheduler::{DecodeScheduler, LogTelemetry};

/// How long to wait for low-res placeholders after decoding finishes
const BACKFILL_GRACE: Duration = Duration::from_secs(5);

/// Run the command selected on the command line
pub fn run_command(args: &Args, config: &Config, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
    match &args.command {
        Some(Commands::Browse {
            dir,
            magnified,
            size,
            limit,
            no_recursive,
            rebind,
            json,
            data_urls,
        }) => {
            let options = BrowseOptions {
                magnified: *magnified,
                size: *size,
                limit: *limit,
                recursive: !no_recursive,
                rebind: *rebind,
                json: *json,
                data_urls: *data_urls,
            };
            browse(dir, config, &options, shutdown_flag)?;
        }
        Some(Commands::GenerateConfig { output }) => {
            generate_config_file(output.clone())?;
        }
        Some(Commands::ShowConfig) | None => {
            show_config(config);
        }
    }

    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            std::fs::write(&path, Config::generate_default_config())
                .with_context(|| format!("writing {}", path.display()))?;
            path
        }
        None => init_config()?,
    };

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to tune cache budgets, decode limits and grid sizes.");

    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[cache]");
    info!("  memory_budget_mb = {}", config.cache.memory_budget_mb);
    info!(
        "  low_res_divisor = {} ({})",
        config.cache.low_res_divisor,
        format_bytes(config.cache.low_res_bytes() as u64)
    );
    info!(
        "  high_res_divisor = {} ({})",
        config.cache.high_res_divisor,
        format_bytes(config.cache.high_res_bytes() as u64)
    );
    info!(
        "  full_width_divisor = {} ({})",
        config.cache.full_width_divisor,
        format_bytes(config.cache.full_width_bytes() as u64)
    );
    info!("  low_res_size = {}", config.cache.low_res_size);
    info!("  backfill_threads = {}", config.cache.backfill_threads);
    info!("");
    info!("[decode]");
    info!("  animation_frames = {}", config.decode.animation_frames);
    info!("  frame_interval_ms = {}", config.decode.frame_interval_ms);
    info!(
        "  max_source_bytes = {} ({})",
        config.decode.max_source_bytes,
        format_bytes(config.decode.max_source_bytes)
    );
    info!("");
    info!("[grid]");
    info!("  image_size = {}", config.grid.image_size);
    info!("  full_width_size = {}", config.grid.full_width_size);
    info!("  magnified = {}", config.grid.magnified);
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

// ============================================================================
// Browse
// ============================================================================

/// Options of the `browse` command
#[derive(Debug, Clone, Default)]
pub struct BrowseOptions {
    pub magnified: bool,
    pub size: Option<u32>,
    pub limit: Option<usize>,
    pub recursive: bool,
    pub rebind: bool,
    pub json: bool,
    pub data_urls: bool,
}

/// One tile in the browse report
#[derive(Debug, Serialize)]
pub struct TileReport {
    pub key: String,
    pub kind: TileKind,
    pub decision: BindDecision,
    pub state: CellState,
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    pub ratio: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

/// Everything `browse --json` prints
#[derive(Debug, Serialize)]
pub struct BrowseReport {
    pub directory: PathBuf,
    pub magnified: bool,
    pub interrupted: bool,
    pub tiles: Vec<TileReport>,
    pub counters: GridCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebind_counters: Option<GridCounters>,
    pub cache: CacheStats,
}

/// Enumerate `dir`, bind a grid over it and decode until every tile settles
pub fn browse(
    dir: &Path,
    config: &Config,
    options: &BrowseOptions,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<BrowseReport> {
    let mut config = config.clone();
    if let Some(size) = options.size {
        if options.magnified {
            config.grid.full_width_size = size;
        } else {
            config.grid.image_size = size;
        }
    }

    let spinner = ScanSpinner::new("Listing media...");
    let mut candidates = match DirectoryCandidates::new(dir)
        .recursive(options.recursive)
        .candidates()
    {
        Ok(candidates) => candidates,
        Err(e) => {
            spinner.finish_with_error(&e.to_string());
            return Err(e).with_context(|| format!("listing {}", dir.display()));
        }
    };
    if let Some(limit) = options.limit {
        candidates.truncate(limit);
    }
    spinner.finish(candidates.len());

    let mut scheduler = DecodeScheduler::with_workers(
        &config,
        Arc::new(FsOpener),
        Arc::new(AnimatedImageFactory),
        Box::new(LogTelemetry),
    )
    .context("starting decode workers")?;

    let mut grid = PickerGrid::new(config.grid.clone());
    grid.set_magnified(options.magnified || config.grid.magnified, &mut scheduler);

    let (cells, decisions) = bind_all(&mut grid, &candidates, &mut scheduler);
    let interrupted = decode_until_settled(&mut scheduler, &cells, &decisions, &shutdown_flag);

    scheduler.cache_mut().flush_backfill(BACKFILL_GRACE);
    let counters = grid.counters();
    grid.flush_counters(&mut scheduler);

    let rebind_counters = if options.rebind && !interrupted {
        let (_, rebind_decisions) = bind_all(&mut grid, &candidates, &mut scheduler);
        decode_until_settled(&mut scheduler, &[], &rebind_decisions, &shutdown_flag);
        let counters = grid.counters();
        grid.flush_counters(&mut scheduler);
        Some(counters)
    } else {
        None
    };

    let tiles = candidates
        .iter()
        .zip(cells.iter().zip(decisions.iter()))
        .map(|(candidate, (cell, decision))| {
            tile_report(candidate, cell, *decision, options.data_urls)
        })
        .collect();

    let report = BrowseReport {
        directory: dir.to_path_buf(),
        magnified: grid.is_magnified(),
        interrupted,
        tiles,
        counters,
        rebind_counters,
        cache: scheduler.cache().stats(),
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(report)
}

fn bind_all(
    grid: &mut PickerGrid,
    candidates: &[Candidate],
    scheduler: &mut DecodeScheduler,
) -> (Vec<GridCell>, Vec<BindDecision>) {
    candidates
        .iter()
        .map(|candidate| {
            let cell = GridCell::new();
            let decision = grid.bind_cell(&cell, candidate, scheduler);
            (cell, decision)
        })
        .unzip()
}

/// Pump worker results until the scheduler drains. Returns whether the user
/// interrupted.
fn decode_until_settled(
    scheduler: &mut DecodeScheduler,
    cells: &[GridCell],
    decisions: &[BindDecision],
    shutdown_flag: &AtomicBool,
) -> bool {
    let waiting = decisions
        .iter()
        .filter(|d| **d == BindDecision::Decode)
        .count() as u64;
    let progress = DecodeProgress::new(waiting);

    while !scheduler.is_idle() {
        if shutdown_flag.load(Ordering::SeqCst) {
            progress.abandon("interrupted");
            warn!(
                "Interrupted with {} request(s) still queued",
                scheduler.pending_len()
            );
            scheduler.shutdown();
            return true;
        }
        scheduler.pump_timeout(Duration::from_millis(100));

        let settled = cells
            .iter()
            .zip(decisions)
            .filter(|(cell, decision)| {
                **decision == BindDecision::Decode
                    && matches!(cell.state(), CellState::Loaded | CellState::Failed)
            })
            .count() as u64;
        progress.update(settled, scheduler.pending_len());
    }

    progress.finish();
    false
}

fn tile_report(
    candidate: &Candidate,
    cell: &GridCell,
    decision: BindDecision,
    data_urls: bool,
) -> TileReport {
    let view = cell.snapshot();
    let (width, height) = view.image.as_ref().map(|t| t.dimensions()).unwrap_or((0, 0));
    TileReport {
        key: candidate.key.clone(),
        kind: candidate.kind,
        decision,
        state: view.state,
        width,
        height,
        frames: view.image.as_ref().map(|t| t.frame_count()).unwrap_or(0),
        ratio: view.ratio,
        duration: view.duration.clone(),
        data_url: if data_urls {
            view.image.as_ref().and_then(|t| t.to_data_url())
        } else {
            None
        },
    }
}

fn print_summary(report: &BrowseReport) {
    print_header("PICKER GRID");

    let loaded = report
        .tiles
        .iter()
        .filter(|t| t.state == CellState::Loaded)
        .count();
    let failed: Vec<_> = report
        .tiles
        .iter()
        .filter(|t| t.state == CellState::Failed)
        .collect();
    let animated = report.tiles.iter().filter(|t| t.frames > 1).count();

    print_info(&format!("Folder: {}", report.directory.display()));
    print_info(&format!(
        "Layout: {}",
        if report.magnified { "full width" } else { "square grid" }
    ));
    print_success(&format!(
        "{} of {} tiles loaded ({} animated)",
        loaded,
        report.tiles.len(),
        animated
    ));
    for tile in &failed {
        print_warning(&format!("Failed: {}", tile.key));
    }
    if report.interrupted {
        print_warning("Interrupted before all tiles settled");
    }

    print_info(&format!(
        "First pass: {} from cache, {} decodes",
        report.counters.cache_hits, report.counters.decode_requests
    ));
    if let Some(rebind) = report.rebind_counters {
        print_info(&format!(
            "Second pass: {} from cache, {} decodes",
            rebind.cache_hits, rebind.decode_requests
        ));
    }

    println!();
    for tier in CacheTier::ALL {
        let stats = match tier {
            CacheTier::LowRes => &report.cache.low_res,
            CacheTier::HighRes => &report.cache.high_res,
            CacheTier::FullWidth => &report.cache.full_width,
        };
        print_info(&format!(
            "{:<10} {:>5} entries, {} of {} ({:.0}% hit rate)",
            tier.name(),
            stats.entries,
            format_bytes(stats.bytes as u64),
            format_bytes(stats.max_bytes as u64),
            stats.hit_rate()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::{encode_gif, encode_png};
    use tempfile::TempDir;

    fn library() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.png"), encode_png(64, 32)).unwrap();
        std::fs::write(temp_dir.path().join("b.png"), encode_png(20, 20)).unwrap();
        std::fs::write(temp_dir.path().join("c.gif"), encode_gif(16, 16, 3)).unwrap();
        std::fs::write(temp_dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        temp_dir
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.grid.image_size = 16;
        config.decode.animation_frames = 3;
        config.cache.memory_budget_mb = 8;
        config
    }

    #[test]
    fn test_browse_decodes_every_tile() {
        let dir = library();
        let options = BrowseOptions {
            recursive: true,
            json: true,
            ..Default::default()
        };
        let report = browse(
            dir.path(),
            &test_config(),
            &options,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        assert_eq!(report.tiles.len(), 4);
        assert!(!report.interrupted);
        assert_eq!(report.counters.decode_requests, 4);

        let by_name = |name: &str| {
            report
                .tiles
                .iter()
                .find(|t| t.key.ends_with(name))
                .unwrap()
        };
        assert_eq!(by_name("a.png").state, CellState::Loaded);
        assert_eq!((by_name("a.png").width, by_name("a.png").height), (16, 16));
        assert!((by_name("a.png").ratio - 0.5).abs() < 1e-6);
        assert_eq!(by_name("c.gif").frames, 3);
        assert_eq!(by_name("c.gif").duration.as_deref(), Some("0:00"));
        assert_eq!(by_name("broken.jpg").state, CellState::Failed);
    }

    #[test]
    fn test_browse_rebind_hits_cache() {
        let dir = library();
        let options = BrowseOptions {
            recursive: true,
            rebind: true,
            json: true,
            ..Default::default()
        };
        let report = browse(
            dir.path(),
            &test_config(),
            &options,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        let rebind = report.rebind_counters.unwrap();
        assert_eq!(rebind.cache_hits, 3);
        assert_eq!(rebind.decode_requests, 1);
    }

    #[test]
    fn test_browse_missing_directory() {
        let result = browse(
            Path::new("/nonexistent/library"),
            &test_config(),
            &BrowseOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_config_to_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.toml");
        generate_config_file(Some(path.clone())).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.grid.image_size, Config::default().grid.image_size);
    }
}
