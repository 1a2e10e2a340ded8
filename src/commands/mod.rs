// ABOUTME: Command implementations behind the CLI
// ABOUTME: Exports the export and import commands and their shared progress spinner

pub mod export;
pub mod import;

pub use export::export;
pub use import::import;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner on stderr; hidden automatically when stderr is not a terminal
fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
