//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Decode, cache and inspect picker-grid thumbnails for a media folder
#[derive(Parser, Debug)]
#[command(name = "picker-thumbs")]
#[command(author = "Vihaan Reddy M")]
#[command(version = "1.0.0")]
#[command(about = "Build picker-grid thumbnails for a folder of photos and animated clips", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bind a picker grid to a folder and decode every tile
    ///
    /// Media is listed newest first. Pictures (JPEG, PNG) are decoded by the
    /// image service; animated GIFs are treated as clips and get a first
    /// frame followed by an animated preview.
    Browse {
        /// Folder to browse
        dir: PathBuf,

        /// Use the single-column full-width layout
        #[arg(short, long)]
        magnified: bool,

        /// Grid cell edge or full-width size in pixels (overrides config)
        #[arg(short, long)]
        size: Option<u32>,

        /// Only bind the first N tiles
        #[arg(long)]
        limit: Option<usize>,

        /// Do not descend into subfolders
        #[arg(long)]
        no_recursive: bool,

        /// Bind the grid a second time after decoding to exercise the cache
        #[arg(long)]
        rebind: bool,

        /// Print a JSON report instead of a summary
        #[arg(long)]
        json: bool,

        /// Include PNG data URLs of each thumbnail in the JSON report
        #[arg(long, requires = "json")]
        data_urls: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,
}
