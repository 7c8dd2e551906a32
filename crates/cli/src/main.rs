//! pixport: incremental photo library mirroring
//!
//! Mirrors a photo library into a local folder:
//! - Incremental: only new, renamed, and deleted items touch the disk
//! - Safe deletes: removed items land in a Trash folder, never unlinked
//! - Resumable: interrupting a run never corrupts the mirror
//! - Watch mode: re-exports automatically when the library changes

mod progress;
mod settings;

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{builder::Styles, Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tracing::{debug, error, info};

use pixport_core::{
    plan_export, EnginePorts, EventBus, ExportEngine, ExportPaths, ExportRecord, ExportStage,
    FsGateway as _, LibraryEvent,
};
use pixport_gateway::{LocalFs, LocalLibrary, PassthroughExif};

use crate::settings::Settings;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "pixport")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Incremental photo library mirroring")]
#[command(long_about = r#"
pixport mirrors a photo library into a local folder.

Features:
  • Incremental   - only new, renamed, and deleted items touch the disk
  • Safe deletes  - removed items land in Trash/, never unlinked
  • Resumable     - interrupting a run never corrupts the mirror
  • Watch mode    - re-exports automatically when the library changes

Examples:
  pixport export --library ~/photos/library --out ~/Photos-mirror
  pixport watch  --library ~/photos/library --out ~/Photos-mirror
  pixport status --out ~/Photos-mirror
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: ./pixport.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one export and exit
    Export {
        /// Library directory holding library.json and blobs
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Export destination folder
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Export continuously while watching the library for changes
    Watch {
        /// Library directory holding library.json and blobs
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Export destination folder
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Debounce delay in milliseconds
        #[arg(short, long, default_value = "500")]
        debounce: u64,
    },

    /// Print the export record summary
    Status {
        /// Export destination folder
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Library directory, for the pending-export count
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Export { library, out } => {
            let library = resolve_library(&settings, library)?;
            let out = resolve_out(&settings, out).await?;
            if settings.continuous_export {
                info!("continuous export enabled in settings, entering watch mode");
                watch_command(library, out, 500)?;
            } else {
                export_command(library, out).await?;
            }
        }
        Commands::Watch {
            library,
            out,
            debounce,
        } => {
            let library = resolve_library(&settings, library)?;
            let out = resolve_out(&settings, out).await?;
            watch_command(library, out, debounce)?;
        }
        Commands::Status { out, library } => {
            let out = resolve_out(&settings, out).await?;
            status_command(out, library.or(settings.library)).await?;
        }
    }

    Ok(())
}

fn resolve_library(settings: &Settings, arg: Option<PathBuf>) -> Result<PathBuf> {
    arg.or_else(|| settings.library.clone()).ok_or_else(|| {
        eyre!("no library directory given; pass --library or set `library` in pixport.toml")
    })
}

async fn resolve_out(settings: &Settings, arg: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(out) = arg.or_else(|| settings.folder.clone()) {
        return Ok(out);
    }
    LocalFs::new()
        .select_directory()
        .await
        .map_err(|_| eyre!("no export folder chosen; pass --out or set `folder` in pixport.toml"))
}

fn build_engine(library: &PathBuf, out: &PathBuf) -> ExportEngine {
    let remote = Arc::new(LocalLibrary::new(library));
    ExportEngine::new(
        EnginePorts {
            fs: Arc::new(LocalFs::new()),
            downloader: remote.clone(),
            exif: Arc::new(PassthroughExif),
            live: remote.clone(),
            inventory: remote,
        },
        ExportPaths::new(out),
        Arc::new(progress::ConsoleObserver::new()),
    )
}

async fn export_command(library: PathBuf, out: PathBuf) -> Result<()> {
    info!("exporting {} -> {}", library.display(), out.display());

    let engine = build_engine(&library, &out);
    engine.schedule();
    engine.wait_idle().await;
    Ok(())
}

fn watch_command(library: PathBuf, out: PathBuf, debounce_ms: u64) -> Result<()> {
    let engine = build_engine(&library, &out);
    let bus = EventBus::new();

    // Setup library watcher
    let (tx, rx) = mpsc::channel();

    let mut debouncer = new_debouncer(
        Duration::from_millis(debounce_ms),
        None,
        move |result: DebounceEventResult| {
            if let Ok(events) = result {
                let _ = tx.send(events);
            }
        },
    )?;

    debouncer.watch(&library, RecursiveMode::Recursive)?;

    // Enabling schedules the first run; an interrupted previous run is
    // thereby caught up as well.
    engine.enable_continuous(&bus);
    progress::watching("Watching library for changes (Ctrl+C to stop)");

    // Process library change events
    loop {
        match rx.recv() {
            Ok(events) => {
                let paths: Vec<_> = events.iter().flat_map(|e| e.paths.iter()).collect();

                if paths.is_empty() {
                    continue;
                }

                debug!("library changed ({} paths), rescheduling", paths.len());
                bus.emit(LibraryEvent::FilesUpdated);
            }
            Err(e) => {
                error!("watch error: {e}");
                break;
            }
        }
    }

    engine.disable_continuous();
    Ok(())
}

async fn status_command(out: PathBuf, library: Option<PathBuf>) -> Result<()> {
    let journal_path = ExportPaths::new(&out).journal_file();
    if !journal_path.exists() {
        progress::info("No export record found; this folder was never exported to");
        return Ok(());
    }

    let record: ExportRecord = serde_json::from_str(&std::fs::read_to_string(&journal_path)?)?;

    let stage = match record.stage {
        ExportStage::Finished => "finished".to_string(),
        ExportStage::Init => "never completed".to_string(),
        other => format!("interrupted ({other:?})"),
    };
    progress::info(&format!("Stage: {stage}"));

    if let Some(epoch_ms) = record.last_attempt_timestamp {
        use chrono::{Local, TimeZone};
        if let Some(time) = Local.timestamp_millis_opt(epoch_ms).single() {
            progress::info(&format!("Last attempt: {}", time.format("%Y-%m-%d %H:%M:%S")));
        }
    }
    progress::info(&format!(
        "Exported: {} files across {} collections",
        record.file_export_names.len(),
        record.collection_export_names.len()
    ));

    if let Some(library) = library {
        let remote = LocalLibrary::new(&library);
        use pixport_core::InventoryProvider as _;
        let user = remote.current_user().await?;
        let files = remote.all_files().await?;
        let collections = remote.all_collections().await?;
        let pending = plan_export(user, &files, &collections, &record).files_to_export;
        progress::info(&format!("Pending export: {} files", pending.len()));
    }

    Ok(())
}
