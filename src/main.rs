use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use cliptrail::clipboard_history::{
    CaptureMonitor, ClipboardBackend, ClipboardEntry, ContentType, ForegroundResolver, History,
    HotkeySetup, SearchQuery, SystemClipboard,
};
use cliptrail::config::{self, ConfigWatcher};
use cliptrail::error::HistoryError;
use cliptrail::logging;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "cliptrail")]
#[command(about = "Clipboard history capture and recall", long_about = None)]
struct Cli {
    /// Directory holding the database, images and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture clipboard changes until killed
    Run,
    /// List recent entries, pinned first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Full-text search with optional filters
    Search {
        /// Text to match; empty lists by filters only
        #[arg(default_value = "")]
        query: String,
        /// text, html, image, file_path or url
        #[arg(long = "type", value_parser = parse_content_type)]
        content_type: Option<ContentType>,
        /// First day to include (YYYY-MM-DD, UTC)
        #[arg(long, value_parser = parse_day)]
        from: Option<NaiveDate>,
        /// Last day to include (YYYY-MM-DD, UTC)
        #[arg(long, value_parser = parse_day)]
        to: Option<NaiveDate>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Pin an entry so retention never removes it
    Pin { id: i64 },
    /// Unpin an entry
    Unpin { id: i64 },
    /// Delete an entry, pinned or not
    Delete { id: i64 },
    /// Delete all non-pinned entries
    Clear,
    /// Put an entry back on the clipboard
    Paste { id: i64 },
    /// Run one retention cycle now
    Cleanup,
    /// Show entry count and image storage use
    Stats,
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

fn parse_content_type(s: &str) -> std::result::Result<ContentType, String> {
    ContentType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = ContentType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown content type '{}', expected one of {}", s, known.join(", "))
    })
}

fn parse_day(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn day_start_ms(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// Turn store errors into the message a user should see.
fn user_facing(e: HistoryError) -> anyhow::Error {
    anyhow!(e.user_message())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(config::default_data_dir);
    let _guard = logging::init(&data_dir.join("logs"));

    match run_command(cli, data_dir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn run_command(cli: Cli, data_dir: PathBuf) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let loaded_config = config::load_config(&config_path);

    if let Commands::Config { write } = cli.command {
        if write {
            config::save_config(&config_path, &loaded_config)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
        }
        println!("{}", serde_json::to_string_pretty(&loaded_config)?);
        return Ok(());
    }

    let history = History::open(&data_dir, loaded_config.into_shared())
        .with_context(|| format!("Failed to open clipboard history in {}", data_dir.display()))?;

    match cli.command {
        Commands::Run => run_daemon(&history, config_path),
        Commands::List {
            limit,
            offset,
            json,
        } => {
            let entries = history.recent(limit, offset).map_err(user_facing)?;
            print_entries(&entries, json)
        }
        Commands::Search {
            query,
            content_type,
            from,
            to,
            limit,
            json,
        } => {
            let query = SearchQuery {
                text: query,
                content_type,
                date_from: from.map(day_start_ms),
                date_to: to.map(|day| day_start_ms(day) + MS_PER_DAY - 1),
                limit,
                offset: 0,
            };
            let entries = history.search(&query).map_err(user_facing)?;
            print_entries(&entries, json)
        }
        Commands::Pin { id } => history.pin(id).map_err(user_facing),
        Commands::Unpin { id } => history.unpin(id).map_err(user_facing),
        Commands::Delete { id } => history.delete_entry(id).map_err(user_facing),
        Commands::Clear => {
            let deleted = history.clear().map_err(user_facing)?;
            println!("Deleted {} entries", deleted);
            Ok(())
        }
        Commands::Paste { id } => {
            let mut clipboard = SystemClipboard::new().map_err(user_facing)?;
            history
                .paste_entry(id, &mut clipboard, None)
                .map_err(user_facing)
        }
        Commands::Cleanup => {
            let report = history.run_cleanup();
            println!(
                "Evicted {} by count, {} by age; removed {} orphaned images",
                report.evicted_by_count, report.evicted_by_age, report.orphans_removed
            );
            Ok(())
        }
        Commands::Stats => {
            let stats = history.stats().map_err(user_facing)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

/// Monitor, retention and hotkey until the process is killed.
fn run_daemon(history: &History, config_path: PathBuf) -> Result<()> {
    let hotkey_config = history.config().read().hotkey.clone();

    // Headless stand-in for the recall window.
    let visible = Arc::new(AtomicBool::new(false));
    let handler = {
        let visible = visible.clone();
        Arc::new(move || {
            let now_visible = !visible.fetch_xor(true, Ordering::AcqRel);
            info!(
                event_type = "recall_toggle",
                visible = now_visible,
                "Recall window toggled"
            );
        })
    };

    let monitor = CaptureMonitor::start(
        history.capture_pipeline(),
        || Ok(Box::new(SystemClipboard::new()?) as Box<dyn ClipboardBackend>),
        Box::new(ForegroundResolver),
        Some(HotkeySetup {
            config: hotkey_config,
            handler,
        }),
    )
    .context("Failed to start clipboard monitor")?;

    let retention = history
        .start_retention()
        .context("Failed to start retention manager")?;

    let reloads = match ConfigWatcher::start(config_path.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "Config watcher unavailable, settings apply on restart");
            None
        }
    };

    info!(data_dir = %history.data_dir().display(), "Capturing clipboard changes");

    if let Some((_watcher, rx)) = &reloads {
        while rx.recv().is_ok() {
            history.apply_settings(config::load_config(&config_path), Some(&monitor));
            retention.reschedule();
        }
    }
    loop {
        std::thread::park();
    }
}

fn print_entries(entries: &[ClipboardEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    for entry in entries {
        let created = DateTime::<Utc>::from_timestamp_millis(entry.created_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let preview = logging::truncate_for_log(&entry.content_preview.replace(['\r', '\n'], " "), 80);
        println!(
            "{:>6} {} {:<9} {} {}",
            entry.id,
            if entry.is_pinned { "*" } else { " " },
            entry.content_type.as_str(),
            created,
            preview
        );
    }
    Ok(())
}
