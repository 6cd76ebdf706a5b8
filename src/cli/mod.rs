//! # CLI Module
//!
//! Command-line interface for media-dedup.
//!
//! ## Usage
//! ```bash
//! # Scan a folder into the database
//! media-dedup scan /mnt/photos --extensions jpg,png,heic
//!
//! # Scan every configured media folder, waiting for a running scan
//! media-dedup --config /srv/media/config.json scan --wait
//!
//! # List near-duplicate clusters
//! media-dedup duplicates --threshold 5
//!
//! # JSON output
//! media-dedup stats --output json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use media_dedup::config::DedupConfig;
use media_dedup::core::comparator::{near_duplicate_clusters, resolve_clusters, NearDuplicateCluster};
use media_dedup::core::lock::{cleanup_expired_locks, list_locks, LeaseChecker, LockName};
use media_dedup::core::pipeline::{Pipeline, ScanReport};
use media_dedup::core::store::{now, Store};
use media_dedup::error::{ConfigError, Result};
use media_dedup::events::{Event, EventChannel, HashEvent, LockEvent, PipelineEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// media-dedup - Record exact and near duplicates across media collections
#[derive(Parser, Debug)]
#[command(name = "media-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON). Defaults to ./config.json when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint a folder and record duplicates
    Scan(ScanArgs),

    /// List near-duplicate clusters by perceptual hash
    Duplicates {
        /// Maximum Hamming distance to a cluster seed (0-64)
        #[arg(short, long)]
        threshold: Option<u32>,
    },

    /// Show database counts
    Stats,

    /// List lock rows
    Locks {
        /// Remove expired locks first
        #[arg(long)]
        cleanup: bool,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Folder to scan. Defaults to the configured media folders
    folder: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(long, overrides_with = "no_recursive")]
    recursive: bool,

    /// Only scan the top level of the folder
    #[arg(long, overrides_with = "recursive")]
    no_recursive: bool,

    /// Comma-separated extension allow-list (e.g. jpg,png)
    #[arg(short, long)]
    extensions: Option<String>,

    /// Skip files smaller than this many bytes
    #[arg(long)]
    min_size: Option<u64>,

    /// Skip files larger than this many bytes
    #[arg(long)]
    max_size: Option<u64>,

    /// Stop after this many files
    #[arg(short, long)]
    limit: Option<usize>,

    /// Number of fingerprint workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Wait for a held scan lock instead of failing
    #[arg(long)]
    wait: bool,

    /// Attach EXIF metadata and resolve GPS positions to places
    #[arg(long)]
    enrich: bool,

    /// Gazetteer used by --enrich
    #[arg(long)]
    gazetteer: Option<PathBuf>,
}

impl ScanArgs {
    /// Flags win over the configuration file
    fn apply(&self, config: &mut DedupConfig) {
        if self.recursive {
            config.recursive = true;
        }
        if self.no_recursive {
            config.recursive = false;
        }
        if let Some(list) = &self.extensions {
            config.set_extensions(list);
        }
        if self.min_size.is_some() {
            config.min_size = self.min_size;
        }
        if self.max_size.is_some() {
            config.max_size = self.max_size;
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.wait {
            config.lock.wait = true;
        }
        if self.enrich {
            config.enrichment.enabled = true;
        }
        if let Some(gazetteer) = &self.gazetteer {
            config.enrichment.gazetteer = Some(gazetteer.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    media_dedup::init_tracing(cli.verbose);

    let mut config = DedupConfig::discover(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }

    match cli.command {
        Commands::Scan(args) => {
            args.apply(&mut config);
            run_scan(config, args.folder, cli.output, cli.verbose)
        }
        Commands::Duplicates { threshold } => {
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            config.validate()?;
            run_duplicates(&config, cli.output, cli.verbose)
        }
        Commands::Stats => {
            config.validate()?;
            run_stats(&config, cli.output)
        }
        Commands::Locks { cleanup } => {
            config.validate()?;
            run_locks(&config, cleanup, cli.output)
        }
    }
}

fn run_scan(
    config: DedupConfig,
    folder: Option<PathBuf>,
    output: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let folders = match folder {
        Some(folder) => vec![folder],
        None => config.media_folders.clone(),
    };
    if folders.is_empty() {
        return Err(ConfigError::Invalid(
            "no folder given and no media_folders configured".into(),
        )
        .into());
    }

    let pipeline = Pipeline::new(config)?;
    let store = Store::open(&pipeline.config().database)?;
    let term = Term::stderr();

    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("media-dedup").bold().cyan(),
            style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line(&format!(
            "  {} {}",
            style("database").dim(),
            display_path(store.path())
        ))
        .ok();
        term.write_line("").ok();
    }

    let mut reports = Vec::with_capacity(folders.len());
    for root in &folders {
        let report = scan_folder(&pipeline, root, &store, output, verbose)?;
        if matches!(output, OutputFormat::Pretty) {
            print_scan_report(&term, &report);
        }
        reports.push(report);
    }

    if matches!(output, OutputFormat::Json) {
        print_json(&reports);
    }

    Ok(())
}

/// Run one folder with a spinner fed from the event channel
fn scan_folder(
    pipeline: &Pipeline,
    root: &Path,
    store: &Store,
    output: OutputFormat,
    verbose: bool,
) -> Result<ScanReport> {
    let (sender, receiver) = EventChannel::new();

    let progress = if matches!(output, OutputFormat::Pretty) {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner) =
            ProgressStyle::default_spinner().template("{spinner:.green} {pos} files {msg}")
        {
            pb.set_style(spinner);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        let Some(pb) = progress_clone else {
            // Drain so the pipeline never waits on us
            for _ in receiver.iter() {}
            return;
        };
        for event in receiver.iter() {
            match event {
                Event::Pipeline(PipelineEvent::Started { root, workers }) => {
                    pb.set_message(format!("{} ({} workers)", display_path(&root), workers));
                }
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    pb.set_message(format!("{}", phase));
                }
                Event::Lock(LockEvent::Acquired { lock_name }) => {
                    if verbose {
                        pb.println(format!("  {} lock '{}' acquired", style("•").dim(), lock_name));
                    }
                }
                Event::Hash(HashEvent::Progress(p)) => {
                    pb.set_position(p.completed as u64);
                    if verbose {
                        pb.set_message(
                            p.current_path
                                .file_name()
                                .unwrap_or_default()
                                .to_string_lossy()
                                .into_owned(),
                        );
                    }
                }
                Event::Hash(HashEvent::Skipped { path, message }) => {
                    if verbose {
                        pb.println(format!(
                            "  {} {}: {}",
                            style("skipped").yellow(),
                            display_path(&path),
                            message
                        ));
                    }
                }
                Event::Pipeline(PipelineEvent::Completed { .. })
                | Event::Pipeline(PipelineEvent::Aborted { .. }) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
        }
        pb.finish_and_clear();
    });

    let result = pipeline.run_with_events(root, store, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();

    result
}

fn print_scan_report(term: &Term, report: &ScanReport) {
    term.write_line(&format!(
        "{} Scan Complete {}",
        style("✓").green().bold(),
        style(display_path(&report.root)).dim()
    ))
    .ok();

    term.write_line(&format!(
        "  {} files discovered, {} recorded in {:.1}s with {} workers",
        style(report.candidates).cyan(),
        style(report.processed).cyan(),
        report.duration_ms as f64 / 1000.0,
        report.workers
    ))
    .ok();

    term.write_line(&format!(
        "  {} new records, {} updated",
        style(report.new_records).cyan(),
        style(report.updated).cyan()
    ))
    .ok();

    term.write_line(&format!(
        "  {} duplicates",
        style(report.duplicates).yellow()
    ))
    .ok();

    if report.skipped > 0 {
        term.write_line(&format!(
            "  {} files skipped (unreadable)",
            style(report.skipped).red()
        ))
        .ok();
    }

    if report.enriched > 0 {
        term.write_line(&format!(
            "  {} files placed",
            style(report.enriched).dim()
        ))
        .ok();
    }

    term.write_line("").ok();
}

fn run_duplicates(config: &DedupConfig, output: OutputFormat, verbose: bool) -> Result<()> {
    let store = Store::open(&config.database)?;

    // Read-only: refuse to cluster while a scan is writing
    let mut checker = LeaseChecker::new(&store, LockName::Scan, config.lock.check_interval());
    checker.check_at_start()?;

    let ids = near_duplicate_clusters(&store, config.threshold, Some(&mut checker))?;
    let clusters = resolve_clusters(&store, &ids, 2)?;

    match output {
        OutputFormat::Pretty => print_clusters(&clusters, config.threshold, verbose),
        OutputFormat::Json => print_json(&serde_json::json!({
            "threshold": config.threshold,
            "cluster_count": clusters.len(),
            "clusters": clusters,
        })),
    }

    Ok(())
}

fn print_clusters(clusters: &[NearDuplicateCluster], threshold: u32, verbose: bool) {
    let term = Term::stdout();

    if clusters.is_empty() {
        term.write_line(&format!(
            "No near-duplicate clusters at threshold {}",
            threshold
        ))
        .ok();
        return;
    }

    for (i, cluster) in clusters.iter().enumerate() {
        let paths: Vec<String> = cluster
            .members
            .iter()
            .map(|record| display_path(&record.path))
            .collect();
        term.write_line(&format!(
            "{} {}",
            style(format!("Cluster {}:", i + 1)).bold(),
            paths.join(", ")
        ))
        .ok();

        if verbose {
            for (idx, record) in cluster.members.iter().enumerate() {
                let marker = if idx == 0 {
                    style("★").green().to_string()
                } else {
                    style("○").dim().to_string()
                };
                term.write_line(&format!(
                    "    {} #{} {} {}",
                    marker,
                    record.id,
                    record.perceptual_hash.as_deref().unwrap_or("-"),
                    style(format_bytes(record.size)).dim()
                ))
                .ok();
            }
        }
    }
}

fn run_stats(config: &DedupConfig, output: OutputFormat) -> Result<()> {
    let store = Store::open(&config.database)?;
    let stats = store.stats()?;

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            term.write_line(&format!(
                "{} {}",
                style("Database").bold(),
                display_path(store.path())
            ))
            .ok();
            term.write_line(&format!("  {} files ({})", style(stats.total).cyan(), format_bytes(stats.bytes)))
                .ok();
            term.write_line(&format!("  {} unique", style(stats.unique()).cyan()))
                .ok();
            term.write_line(&format!("  {} duplicates", style(stats.duplicates).yellow()))
                .ok();
            term.write_line(&format!("  {} with a perceptual hash", stats.hashed))
                .ok();
            term.write_line(&format!("  {} related by capture id", stats.related))
                .ok();
            term.write_line(&format!("  {} locks held", stats.locks)).ok();
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "database": store.path(),
            "unique": stats.unique(),
            "stats": stats,
        })),
    }

    Ok(())
}

fn run_locks(config: &DedupConfig, cleanup: bool, output: OutputFormat) -> Result<()> {
    let store = Store::open(&config.database)?;

    let removed = if cleanup {
        cleanup_expired_locks(&store)?
    } else {
        0
    };
    let locks = list_locks(&store)?;

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            if cleanup {
                term.write_line(&format!(
                    "{} removed {} expired lock(s)",
                    style("✓").green(),
                    removed
                ))
                .ok();
            }
            if locks.is_empty() {
                term.write_line("No locks held").ok();
            }
            let at = now();
            for lock in &locks {
                let expires = match lock.expires_at {
                    Some(expires) => expires.format("%Y-%m-%d %H:%M:%S").to_string(),
                    None => "never".to_string(),
                };
                let state = if lock.is_expired(at) {
                    style("expired").red().to_string()
                } else {
                    style("held").green().to_string()
                };
                term.write_line(&format!(
                    "  {} {} by pid {} on {} since {} (expires {})",
                    style(&lock.lock_name).bold(),
                    state,
                    lock.holder_process,
                    lock.holder_host,
                    lock.acquired_at.format("%Y-%m-%d %H:%M:%S"),
                    expires
                ))
                .ok();
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "removed": removed,
            "locks": locks,
        })),
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => tracing::error!("Failed to render JSON output: {}", e),
    }
}

/// Shorten paths under the home directory to `~/...`
fn display_path(path: &Path) -> String {
    let relative = dirs::home_dir()
        .filter(|home| home.parent().is_some())
        .and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf));
    match relative {
        Some(relative) => format!("~/{}", relative.display()),
        None => path.display().to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
