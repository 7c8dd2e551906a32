//! ANSI progress output for export runs.
//!
//! Status lines are one-shot and newline-terminated; the per-file counter
//! renders in place on a single line.
//!
//! Example output:
//! ```text
//! → Exporting files
//! → [42/128] 1 failed
//! ✓ Export finished
//! ● Watching library for changes (Ctrl+C to stop)
//! ```

use std::io::Write as _;
use std::sync::Mutex;

use chrono::{Local, TimeZone};

use pixport_core::{ExportObserver, ExportProgress, ExportStage, RemoteFile};

/// ANSI escape sequences for terminal control
mod ansi {
    pub const CLEAR_LINE: &str = "\x1b[2K\r";
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Unicode icons for status messages
mod icon {
    pub const SUCCESS: &str = "✓";
    pub const ERROR: &str = "✗";
    pub const ARROW: &str = "→";
    pub const BULLET: &str = "●";
}

/// Get terminal width, defaulting to 80 if unavailable
fn terminal_width() -> usize {
    console::Term::stderr().size().1 as usize
}

fn truncate_to_width(text: &str, max_width: usize) -> std::borrow::Cow<'_, str> {
    if console::measure_text_width(text) <= max_width {
        return std::borrow::Cow::Borrowed(text);
    }
    let target = max_width.saturating_sub(3);
    std::borrow::Cow::Owned(console::truncate_str(text, target, "...").to_string())
}

/// Print success message: ✓ {msg} (green)
pub fn success(msg: &str) {
    let msg = truncate_to_width(msg, terminal_width().saturating_sub(3));
    eprintln!(
        "{}{}{}{} {}{}",
        ansi::CLEAR_LINE,
        ansi::GREEN,
        ansi::BOLD,
        icon::SUCCESS,
        msg,
        ansi::RESET
    );
}

/// Print info message: → {msg} (cyan)
pub fn info(msg: &str) {
    let msg = truncate_to_width(msg, terminal_width().saturating_sub(3));
    eprintln!(
        "{}{}{} {}{}",
        ansi::CLEAR_LINE,
        ansi::CYAN,
        icon::ARROW,
        msg,
        ansi::RESET
    );
}

/// Print error message: ✗ {msg} (red)
pub fn error(msg: &str) {
    let msg = truncate_to_width(msg, terminal_width().saturating_sub(3));
    eprintln!(
        "{}{}{}{} {}{}",
        ansi::CLEAR_LINE,
        ansi::RED,
        ansi::BOLD,
        icon::ERROR,
        msg,
        ansi::RESET
    );
}

/// Print watching message: ● {msg} (magenta)
pub fn watching(msg: &str) {
    let msg = truncate_to_width(msg, terminal_width().saturating_sub(3));
    eprintln!(
        "{}{}{}{} {}{}",
        ansi::CLEAR_LINE,
        ansi::MAGENTA,
        ansi::BOLD,
        icon::BULLET,
        msg,
        ansi::RESET
    );
}

/// Observer rendering run progress to stderr
#[derive(Default)]
pub struct ConsoleObserver {
    /// Progress of the last broadcast, for the final summary line
    last: Mutex<ExportProgress>,
}

impl ConsoleObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExportObserver for ConsoleObserver {
    fn on_stage(&self, stage: ExportStage) {
        match stage {
            ExportStage::Migration => info("Checking export record"),
            ExportStage::Starting => info("Planning export"),
            ExportStage::RenamingCollectionFolders => info("Renaming collection folders"),
            ExportStage::TrashingDeletedFiles => info("Trashing deleted files"),
            ExportStage::ExportingFiles => info("Exporting files"),
            ExportStage::TrashingDeletedCollections => info("Removing emptied collections"),
            ExportStage::Finished => {
                let progress = *self.last.lock().unwrap();
                if progress.failed > 0 {
                    error(&format!(
                        "Export finished: {} exported, {} failed",
                        progress.success, progress.failed
                    ));
                } else {
                    success(&format!("Export finished: {} exported", progress.success));
                }
            }
            ExportStage::Init => error("Export folder is missing, export aborted"),
        }
    }

    fn on_progress(&self, progress: ExportProgress) {
        *self.last.lock().unwrap() = progress;
        let failed = if progress.failed > 0 {
            format!(" {}{} failed{}", ansi::YELLOW, progress.failed, ansi::RESET)
        } else {
            String::new()
        };
        eprint!(
            "{}{}{} [{}/{}]{}{}",
            ansi::CLEAR_LINE,
            ansi::CYAN,
            icon::ARROW,
            progress.success + progress.failed,
            progress.total,
            ansi::RESET,
            failed
        );
        let _ = std::io::stderr().flush();
    }

    fn on_last_export(&self, epoch_ms: i64) {
        if let Some(time) = Local.timestamp_millis_opt(epoch_ms).single() {
            eprintln!(
                "{}{}last export at {}{}",
                ansi::CLEAR_LINE,
                ansi::DIM,
                time.format("%Y-%m-%d %H:%M:%S"),
                ansi::RESET
            );
        }
    }

    fn on_pending_exports(&self, pending: &[RemoteFile]) {
        if !pending.is_empty() {
            info(&format!("{} files pending export", pending.len()));
        }
    }
}
