//! Output functions for consistent CLI formatting
//!
//! Task logs are printed line by line as `<id>: <line>`, with the id
//! colored from a small rotating palette so interleaved output from
//! parallel tasks stays readable. `--no-color` disables styling through
//! the global console switch.

use console::{style, Style};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Receives each finished node's display logs.
///
/// The executor writes through this seam so scenario tests can capture
/// output instead of scraping stdout.
pub trait OutputSink: Send + Sync {
    fn task_output(&self, id: &str, logs: &str);
}

/// Prints task logs to stdout with rotating id colors
pub struct ConsoleSink {
    palette: [Style; 4],
    index: Mutex<usize>,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            palette: [
                Style::new().yellow(),
                Style::new().blue(),
                Style::new().magenta(),
                Style::new().cyan(),
            ],
            index: Mutex::new(0),
        }
    }
}

impl OutputSink for ConsoleSink {
    fn task_output(&self, id: &str, logs: &str) {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        let color = &self.palette[*index];
        *index = (*index + 1) % self.palette.len();

        for line in logs.lines() {
            println!("{} {}", color.apply_to(format!("{id}:")), line);
        }
    }
}

/// Print a fatal or collected error to stderr
pub fn error(err: &dyn Display) {
    eprintln!("{} {err}", style("error:").red().bold());
}

/// Spinner shown while finalize repacks and publishes cache bundles
pub fn cache_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Updating cache...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print the end-of-run summary
pub fn print_metrics(hits: usize, total: usize, failed: usize, duration: Duration) {
    println!();

    let tasks = if failed > 0 {
        style(format!("{failed} failed")).red().bold()
    } else {
        style(format!("{total} passed")).green().bold()
    };
    println!("{}       {tasks}, {total} total", style("Tasks:").bold());

    let mut hits_text = format!("{hits} hits, {total} total");
    if total > 0 && hits == total {
        hits_text.push_str(&format!(" {}", style("» 100%").green().bold()));
    }
    println!("{}  {hits_text}", style("Cache Hits:").bold());

    let mut duration_text = format_duration(duration);
    if total > 0 && hits == total {
        duration_text.push_str(" 🔥");
    }
    println!("{}    {duration_text}", style("Duration:").bold());
}

/// Format a run duration the way humans read it
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs_f64();
    let total_minutes = (total_seconds / 60.0) as u64;

    if total_minutes >= 1 {
        let seconds = total_seconds % 60.0;
        return format!("{}:{:02} min", total_minutes, seconds as u64);
    }

    if total_seconds < 1.0 {
        return format!("{} ms", duration.as_millis());
    }

    format!("{total_seconds:.3} sec")
}
