//! Progress bar utilities for CLI output
//!
//! Key features:
//! - Progress bars that suspend cleanly when logging
//! - Consistent visual styling across all operations

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::{Duration, Instant};

// ============================================================================
// Styles - Consistent visual appearance
// ============================================================================

/// Get the spinner style for enumeration
fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

/// Get the progress bar style for decoding
fn progress_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╾─")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a success message with checkmark
pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

/// Print an info message with bullet
pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

/// Format a byte count for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

// ============================================================================
// Enumeration spinner
// ============================================================================

/// Spinner shown while the library is listed
pub struct ScanSpinner {
    spinner: ProgressBar,
    start_time: Instant,
}

impl ScanSpinner {
    pub fn new(msg: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(msg.to_string());

        Self {
            spinner,
            start_time: Instant::now(),
        }
    }

    /// Finish with a count of what was found
    pub fn finish(&self, found: usize) {
        self.spinner.finish_with_message(format!(
            "✓ Found {} media files ({:.1}s)",
            found,
            self.start_time.elapsed().as_secs_f64()
        ));
    }

    pub fn finish_with_error(&self, msg: &str) {
        self.spinner.finish_with_message(format!("✗ {}", msg));
    }
}

// ============================================================================
// Decode progress tracker
// ============================================================================

/// Progress over the tiles waiting for a decode
pub struct DecodeProgress {
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl DecodeProgress {
    pub fn new(total_tiles: u64) -> Self {
        let progress_bar = ProgressBar::new(total_tiles);
        progress_bar.set_style(progress_bar_style());
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        progress_bar.set_message("Decoding...");

        Self {
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// Set how many tiles have settled and how many requests are queued
    pub fn update(&self, settled: u64, pending: usize) {
        self.progress_bar.set_position(settled);
        self.progress_bar
            .set_message(format!("{} queued", pending));
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed();
        self.progress_bar.finish_with_message(format!(
            "done in {:.1}s",
            elapsed.as_secs_f64()
        ));
    }

    pub fn abandon(&self, msg: &str) {
        self.progress_bar.abandon_with_message(msg.to_string());
    }
}

// ============================================================================
// Log writer
// ============================================================================

/// A writer that writes to both console (stderr) and a file
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================
