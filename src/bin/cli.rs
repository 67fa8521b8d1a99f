//! threadvault CLI - command-line interface for the board archive
//!
//! Usage: threadvault [OPTIONS] <COMMAND>
//!
//! Merges pending record batches into canonical per-scope stores and exports
//! reconstructed reply threads. Supports JSON output for scripting.

use chrono::{Datelike, Local, Timelike, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use threadvault_lib::export::{build_view_tree, export_text, ViewNode};
use threadvault_lib::hierarchy::{build_forest, Forest};
use threadvault_lib::identity::IdentityMap;
use threadvault_lib::reconcile::reconcile;
use threadvault_lib::records::{RawMessage, RawReference};
use threadvault_lib::store::{self, MergeReport, ScopeConfig};
use threadvault_lib::utils::preview_line;

// ============================================================================
// Logging Infrastructure
// ============================================================================

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
static QUIET: AtomicBool = AtomicBool::new(false);

/// Initialize logging - creates log file and cleans old logs
fn init_logging() -> Option<PathBuf> {
    let log_dir = dirs::data_dir()
        .map(|p| p.join("com.threadvault.app").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if fs::create_dir_all(&log_dir).is_err() {
        return None;
    }

    // Clean logs older than 7 days
    if let Ok(entries) = fs::read_dir(&log_dir) {
        let cutoff = Local::now() - chrono::Duration::days(7);
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("threadvault-") && name.ends_with(".log") {
                    // Parse date from filename: threadvault-YYYY-MM-DD.log
                    if let Some(date_str) = name
                        .strip_prefix("threadvault-")
                        .and_then(|s| s.strip_suffix(".log"))
                    {
                        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                            if date < cutoff.date_naive() {
                                let _ = fs::remove_file(&path);
                            }
                        }
                    }
                }
            }
        }
    }

    // Create today's log file
    let today = Local::now();
    let log_filename = format!(
        "threadvault-{:04}-{:02}-{:02}.log",
        today.year(),
        today.month(),
        today.day()
    );
    let log_path = log_dir.join(&log_filename);

    if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        *LOG_FILE.lock().unwrap() = Some(file);
        Some(log_path)
    } else {
        None
    }
}

/// Log to terminal (unless --quiet) and to the log file
fn log_both(msg: &str) {
    let now = Local::now();
    let timestamp = format!("[{:02}:{:02}:{:02}]", now.hour(), now.minute(), now.second());

    if !QUIET.load(Ordering::Relaxed) {
        println!("{}", msg);
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "{} {}", timestamp, msg);
        }
    }
}

/// Log error to terminal and file; errors ignore --quiet
fn elog_both(msg: &str) {
    let now = Local::now();
    let timestamp = format!("[{:02}:{:02}:{:02}]", now.hour(), now.minute(), now.second());

    eprintln!("{}", msg);

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "{} [ERROR] {}", timestamp, msg);
        }
    }
}

/// Macro for logging to both terminal and file
macro_rules! log {
    ($($arg:tt)*) => {
        log_both(&format!($($arg)*))
    };
}

/// Macro for error logging to both terminal and file
macro_rules! elog {
    ($($arg:tt)*) => {
        elog_both(&format!($($arg)*))
    };
}

// ============================================================================
// CLI definition
// ============================================================================

#[derive(Parser)]
#[command(name = "threadvault")]
#[command(version, about = "Board-archive merge and thread export CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Archive directory (default: ./archive if present, else app data dir)
    #[arg(long, global = true)]
    archive_dir: Option<PathBuf>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge pending partial batches into each scope's canonical store
    Merge {
        /// Only merge this group
        #[arg(long)]
        group: Option<String>,
    },
    /// Export a group or thread file as a text document
    Export {
        /// Group name from the scope configuration
        #[arg(long, conflicts_with = "thread")]
        group: Option<String>,
        /// Per-thread export input file
        #[arg(long)]
        thread: Option<PathBuf>,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Print the reply tree for a group or thread file
    Tree {
        /// Group name from the scope configuration
        #[arg(long, conflicts_with = "thread")]
        group: Option<String>,
        /// Per-thread export input file
        #[arg(long)]
        thread: Option<PathBuf>,
    },
    /// Show scopes, record counts, and checkpoints
    Status,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRow {
    group_name: String,
    group_id: String,
    messages: usize,
    references: usize,
    pending_batches: usize,
    checkpoint: serde_json::Value,
}

fn main() {
    let cli = Cli::parse();
    QUIET.store(cli.quiet, Ordering::Relaxed);

    if let Some(log_path) = init_logging() {
        if cli.verbose {
            eprintln!("Logging to: {}", log_path.display());
        }
    }

    if let Err(e) = run_cli(cli) {
        elog!("Error: {}", e);
        std::process::exit(1);
    }
}

fn resolve_archive_dir(cli: &Cli) -> PathBuf {
    if let Some(dir) = &cli.archive_dir {
        return dir.clone();
    }
    let local = PathBuf::from("archive");
    if local.is_dir() {
        return local;
    }
    dirs::data_dir()
        .map(|p| p.join("com.threadvault.app").join("archive"))
        .unwrap_or(local)
}

fn run_cli(cli: Cli) -> Result<(), String> {
    // Completions need no archive directory
    if let Commands::Completions { shell } = &cli.command {
        generate(
            *shell,
            &mut Cli::command(),
            "threadvault",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let archive_dir = resolve_archive_dir(&cli);
    if cli.verbose {
        eprintln!("[verbose] Using archive directory: {:?}", archive_dir);
    }

    match &cli.command {
        Commands::Merge { group } => cmd_merge(&cli, &archive_dir, group.as_deref()),
        Commands::Export { group, thread, out } => {
            cmd_export(&archive_dir, group.as_deref(), thread.as_deref(), out.as_deref())
        }
        Commands::Tree { group, thread } => {
            cmd_tree(&cli, &archive_dir, group.as_deref(), thread.as_deref())
        }
        Commands::Status => cmd_status(&cli, &archive_dir),
        Commands::Completions { .. } => unreachable!(),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_merge(cli: &Cli, archive_dir: &std::path::Path, group: Option<&str>) -> Result<(), String> {
    let scopes = store::read_scope_config(archive_dir).map_err(|e| e.to_string())?;
    let selected: Vec<&ScopeConfig> = match group {
        Some(name) => {
            let matched: Vec<&ScopeConfig> =
                scopes.iter().filter(|s| s.group_name == name).collect();
            if matched.is_empty() {
                return Err(format!("no group named '{name}' in the scope configuration"));
            }
            matched
        }
        None => scopes.iter().collect(),
    };

    let mut reports: Vec<MergeReport> = Vec::new();
    let mut failures: Vec<String> = Vec::new();

    // One bad scope never blocks the rest; failures are reported at the end.
    for scope in selected {
        match store::merge_scope(archive_dir, scope) {
            Ok(report) => {
                log!(
                    "Merged {}: {} messages, {} references ({} inserted, {} upgraded, {} replaced, {} duplicates, {} skipped, {} unresolved parents, {} files consumed)",
                    report.scope,
                    report.messages_total,
                    report.references_total,
                    report.stats.inserted,
                    report.stats.stubs_upgraded,
                    report.stats.replaced,
                    report.stats.duplicates_dropped,
                    report.stats.records_skipped,
                    report.missing_parents,
                    report.files_consumed
                );
                reports.push(report);
            }
            Err(e) => {
                elog!("{}", e);
                failures.push(e.to_string());
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).map_err(|e| e.to_string())?
        );
    } else {
        log!(
            "Merge complete: {} scope(s) merged, {} failed",
            reports.len(),
            failures.len()
        );
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("{} scope(s) failed to merge", failures.len()))
    }
}

/// Load records for either a configured group or a standalone thread file,
/// returning the records plus a display name/id for the export header.
fn load_source(
    archive_dir: &std::path::Path,
    group: Option<&str>,
    thread: Option<&std::path::Path>,
) -> Result<(Vec<RawMessage>, Vec<RawReference>, String, String), String> {
    match (group, thread) {
        (Some(name), None) => {
            let (messages, references) =
                store::load_scope(archive_dir, name).map_err(|e| e.to_string())?;
            let scope_id = store::read_scope_config(archive_dir)
                .ok()
                .and_then(|scopes| {
                    scopes
                        .into_iter()
                        .find(|s| s.group_name == name)
                        .map(|s| s.group_id)
                })
                .unwrap_or_else(|| "-".to_string());
            Ok((messages, references, name.to_string(), scope_id))
        }
        (None, Some(path)) => {
            let thread = store::read_thread_file(path).map_err(|e| e.to_string())?;
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("thread")
                .to_string();
            Ok((thread.messages, thread.references, name, "-".to_string()))
        }
        _ => Err("specify exactly one of --group or --thread".to_string()),
    }
}

fn build_thread_view(
    messages: Vec<RawMessage>,
    references: Vec<RawReference>,
) -> (Forest, IdentityMap) {
    let outcome = reconcile(vec![messages], vec![references], serde_json::Value::Null);
    let identities = IdentityMap::from_references(&outcome.references);
    let forest = build_forest(outcome.messages);
    (forest, identities)
}

fn cmd_export(
    archive_dir: &std::path::Path,
    group: Option<&str>,
    thread: Option<&std::path::Path>,
    out: Option<&std::path::Path>,
) -> Result<(), String> {
    let (messages, references, name, id) = load_source(archive_dir, group, thread)?;
    let (forest, identities) = build_thread_view(messages, references);
    let text = export_text(&forest, &identities, &name, &id, Utc::now());

    match out {
        Some(path) => {
            fs::write(path, &text).map_err(|e| format!("failed to write {path:?}: {e}"))?;
            log!(
                "Exported {} thread(s), {} message(s) to {}",
                forest.roots.len(),
                forest.message_count(),
                path.display()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_tree(
    cli: &Cli,
    archive_dir: &std::path::Path,
    group: Option<&str>,
    thread: Option<&std::path::Path>,
) -> Result<(), String> {
    let (messages, references, name, _) = load_source(archive_dir, group, thread)?;
    let (forest, identities) = build_thread_view(messages, references);
    let tree = build_view_tree(&forest, &identities);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&tree).map_err(|e| e.to_string())?
        );
        return Ok(());
    }

    println!(
        "{}: {} thread(s), {} message(s), {} unresolved parent(s)",
        name,
        forest.roots.len(),
        forest.message_count(),
        forest.missing_parents
    );
    print_tree(&tree, 0);
    Ok(())
}

fn print_tree(nodes: &[ViewNode], depth: usize) {
    for node in nodes {
        println!(
            "{:indent$}+ [{}] {} ({}): {}",
            "",
            node.id,
            node.author,
            node.created_at_display,
            preview_line(&node.body, 60),
            indent = depth * 2
        );
        print_tree(&node.children, depth + 1);
    }
}

fn cmd_status(cli: &Cli, archive_dir: &std::path::Path) -> Result<(), String> {
    let scopes = store::read_scope_config(archive_dir).map_err(|e| e.to_string())?;

    let mut rows: Vec<StatusRow> = Vec::new();
    for scope in &scopes {
        let (messages, references) = match store::load_scope(archive_dir, &scope.group_name) {
            Ok((m, r)) => (m.len(), r.len()),
            // Not yet merged (or never fetched): counts are simply zero.
            Err(_) => (0, 0),
        };
        let pending = store::pending_partial_count(archive_dir, &scope.group_name)
            .map_err(|e| e.to_string())?;
        rows.push(StatusRow {
            group_name: scope.group_name.clone(),
            group_id: scope.group_id.clone(),
            messages,
            references,
            pending_batches: pending,
            checkpoint: scope.last_message_id.clone(),
        });
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?
        );
        return Ok(());
    }

    log!("{} scope(s) configured in {}", rows.len(), archive_dir.display());
    for row in &rows {
        log!(
            "  {} (id {}): {} messages, {} references, {} pending batch file(s), checkpoint {}",
            row.group_name,
            row.group_id,
            row.messages,
            row.references,
            row.pending_batches,
            row.checkpoint
        );
    }
    Ok(())
}
