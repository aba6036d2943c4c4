//! # CLI Module
//!
//! Command-line front end for the duplicate photo pipeline.
//!
//! ## Usage
//! ```bash
//! # Scan one directory level
//! photoboss scan ~/Photos
//!
//! # Whole tree, stricter grouping
//! photoboss scan ~/Photos --recursive --threshold 0.95
//!
//! # Only exact duplicates, JSON for scripting
//! photoboss scan ~/Photos -r --methods SHA256 --output json
//!
//! # Inspect the hash cache
//! photoboss cache-stats
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photoboss::core::cache::{
    default_cache_path, CacheFactory, DEFAULT_CACHE_FILE, HashCache, NullCacheFactory, SqliteCacheFactory,
    SqliteHashCache,
};
use photoboss::core::hasher::{HashCatalog, HashInput};
use photoboss::core::pipeline::{PipelineController, ScanReport};
use photoboss::core::scanner::{ScanConfig, ScanRequest};
use photoboss::core::similarity::{SimilarityConfig, DEFAULT_STRONG_THRESHOLD};
use photoboss::error::{PhotoBossError, Result};
use photoboss::events::{Event, EventChannel, EventReceiver, HashEvent, PipelineEvent, ScanEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::warn;

/// PhotoBoss - find duplicate and near-duplicate photos
#[derive(Parser, Debug)]
#[command(name = "photoboss")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a directory for duplicate photos
    Scan {
        /// Directory to scan
        root: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Cache database path
        #[arg(long, conflicts_with = "no_cache")]
        cache: Option<PathBuf>,

        /// Hash everything from scratch and store nothing
        #[arg(long)]
        no_cache: bool,

        /// Hash methods to run (see `photoboss methods`)
        #[arg(short, long, num_args = 1..)]
        methods: Vec<String>,

        /// Minimum confidence for two photos to be grouped (0.0-1.0)
        #[arg(short, long, default_value_t = DEFAULT_STRONG_THRESHOLD)]
        threshold: f64,

        /// Hash worker threads (defaults to one fewer than the core count)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the available hash methods
    Methods,

    /// Show what the hash cache holds
    CacheStats {
        /// Cache database path
        #[arg(long)]
        cache: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (duplicate paths only)
    Minimal,
}

struct ScanArgs {
    root: PathBuf,
    recursive: bool,
    cache: Option<PathBuf>,
    no_cache: bool,
    methods: Vec<String>,
    threshold: f64,
    workers: Option<usize>,
    include_hidden: bool,
    output: OutputFormat,
    verbose: bool,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            root,
            recursive,
            cache,
            no_cache,
            methods,
            threshold,
            workers,
            include_hidden,
            output,
            verbose,
        } => {
            photoboss::init_tracing(verbose);
            run_scan(ScanArgs {
                root,
                recursive,
                cache,
                no_cache,
                methods,
                threshold,
                workers,
                include_hidden,
                output,
                verbose,
            })
        }
        Commands::Methods => {
            photoboss::init_tracing(false);
            print_methods();
            Ok(())
        }
        Commands::CacheStats { cache } => {
            photoboss::init_tracing(false);
            print_cache_stats(&resolve_cache_path(cache))
        }
    }
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let term = Term::stderr();
    let pretty = matches!(args.output, OutputFormat::Pretty);

    if !args.root.is_dir() {
        return Err(PhotoBossError::Config(format!(
            "{} is not a directory",
            args.root.display()
        )));
    }

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("PhotoBoss").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let mut catalog = HashCatalog::new();
    if !args.methods.is_empty() {
        catalog.set_enabled(&args.methods)?;
    }

    let cache: Arc<dyn CacheFactory> = if args.no_cache {
        Arc::new(NullCacheFactory)
    } else {
        Arc::new(SqliteCacheFactory::new(resolve_cache_path(args.cache)))
    };
    if args.verbose && pretty {
        term.write_line(&format!(
            "  {} {}",
            style("Cache:").dim(),
            style(cache.describe()).dim()
        ))
        .ok();
    }

    let (sender, receiver) = EventChannel::new();

    let mut builder = PipelineController::builder()
        .catalog(catalog)
        .similarity(SimilarityConfig::default().with_threshold(args.threshold))
        .scan_config(ScanConfig {
            include_hidden: args.include_hidden,
            ..ScanConfig::default()
        })
        .cache(cache)
        .events(sender);
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    let mut pipeline = builder.build();

    let stop = pipeline.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.stop()) {
        warn!(error = %e, "Ctrl-C will not cancel the scan");
    }

    let progress = pretty.then(new_progress_bar);
    let event_thread = {
        let progress = progress.clone();
        let verbose = args.verbose;
        thread::spawn(move || drive_progress(receiver, progress, verbose))
    };

    let outcome = pipeline.run_scan(ScanRequest::new(&args.root, args.recursive));

    // Dropping the controller drops the last event sender.
    drop(pipeline);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let report = outcome?;
    match args.output {
        OutputFormat::Pretty => print_pretty_results(&term, &report, args.verbose),
        OutputFormat::Json => print_json_results(&report)?,
        OutputFormat::Minimal => print_minimal_results(&report),
    }

    Ok(())
}

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(template) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(template.progress_chars("█▓░"));
    }
    pb
}

/// Feed the progress bar from pipeline events until the channel closes.
fn drive_progress(receiver: EventReceiver, progress: Option<ProgressBar>, verbose: bool) {
    for event in receiver.iter() {
        let Some(ref pb) = progress else {
            continue;
        };
        match event {
            Event::Scan(ScanEvent::Progress { files_scanned, .. }) => {
                pb.set_length(files_scanned as u64);
            }
            Event::Scan(ScanEvent::Completed { total_files, .. }) => {
                pb.set_length(total_files as u64);
            }
            Event::Hash(HashEvent::Hashed { path, source }) => {
                pb.inc(1);
                if verbose {
                    pb.set_message(format!(
                        "{} ({:?})",
                        path.file_name().unwrap_or_default().to_string_lossy(),
                        source
                    ));
                }
            }
            Event::Hash(HashEvent::Failed {
                path,
                method,
                message,
            }) if verbose => {
                pb.println(format!(
                    "  {} {} [{}]: {}",
                    style("!").yellow(),
                    path.display(),
                    method,
                    message
                ));
            }
            Event::Pipeline(PipelineEvent::Status { message }) => {
                pb.set_message(message);
            }
            Event::Pipeline(PipelineEvent::Completed { .. } | PipelineEvent::Cancelled) => {
                pb.finish_and_clear();
            }
            _ => {}
        }
    }
}

fn print_pretty_results(term: &Term, report: &ScanReport, verbose: bool) {
    term.write_line("").ok();
    let heading = if report.cancelled {
        format!("{} Scan Cancelled", style("✗").red().bold())
    } else {
        format!("{} Scan Complete", style("✓").green().bold())
    };
    term.write_line(&heading).ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} photos scanned in {:.1}s",
        style(report.total_files).cyan(),
        report.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicate groups found",
        style(report.groups.len()).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicate photos",
        style(report.duplicate_count()).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} potential space savings",
        style(format_bytes(report.reclaimable_bytes())).yellow()
    ))
    .ok();
    if report.cache_hits > 0 {
        term.write_line(&format!("  {} cache hits", style(report.cache_hits).dim()))
            .ok();
    }
    if report.errors > 0 {
        term.write_line(&format!(
            "  {} files could not be fully hashed",
            style(report.errors).yellow()
        ))
        .ok();
    }
    term.write_line("").ok();

    if report.groups.is_empty() {
        term.write_line(&format!("  {} No duplicates found!", style("✓").green()))
            .ok();
    } else {
        term.write_line(&format!("{}", style("Duplicate Groups:").bold().underlined()))
            .ok();
        term.write_line("").ok();

        let home = dirs::home_dir();
        for (i, group) in report.groups.iter().enumerate() {
            term.write_line(&format!(
                "  {} ({} photos, {} reclaimable)",
                style(format!("Group {}:", i + 1)).bold(),
                group.len(),
                format_bytes(group.reclaimable_bytes())
            ))
            .ok();

            for image in &group.images {
                let marker = if image.is_best {
                    style("★").green().to_string()
                } else {
                    style("○").dim().to_string()
                };
                let mut line = format!("    {} {}", marker, display_path(&image.path, home.as_deref()));
                if verbose {
                    line.push_str(&format!(
                        "  {}",
                        style(format!(
                            "{} {} {}",
                            image.format,
                            image.resolution,
                            format_bytes(image.file_size)
                        ))
                        .dim()
                    ));
                }
                term.write_line(&line).ok();
            }
            term.write_line("").ok();
        }
    }

    term.write_line(&format!(
        "{}",
        style("No files were changed. Review carefully before deleting anything.").dim()
    ))
    .ok();
}

fn print_json_results(report: &ScanReport) -> Result<()> {
    let output = serde_json::json!({
        "summary": report.summary(),
        "cancelled": report.cancelled,
        "groups": report.groups,
    });
    let text = serde_json::to_string_pretty(&output)
        .map_err(|e| PhotoBossError::Config(format!("failed to serialize report: {e}")))?;
    println!("{text}");
    Ok(())
}

fn print_minimal_results(report: &ScanReport) {
    for group in &report.groups {
        for image in group.duplicates() {
            println!("{}", image.path.display());
        }
    }
}

fn print_methods() {
    let catalog = HashCatalog::new();
    let similarity = SimilarityConfig::default();
    for key in catalog.keys() {
        let input = match catalog.input_kind(key) {
            Some(HashInput::Bytes) => "bytes",
            Some(HashInput::Image) => "image",
            None => "?",
        };
        let weight = similarity
            .weight(key)
            .map(|w| format!("weight {w:.2}"))
            .unwrap_or_else(|| "exact match".to_string());
        println!(
            "{:<16} v{}  {:<5}  {}",
            key,
            catalog.version(key).unwrap_or_default(),
            input,
            weight
        );
    }
}

fn print_cache_stats(path: &Path) -> Result<()> {
    let cache = SqliteHashCache::open(path)?;
    let stats = cache.stats()?;
    let term = Term::stdout();
    term.write_line(&format!("{} {}", style("Cache:").bold(), path.display()))
        .ok();
    term.write_line(&format!("  schema version  {}", stats.schema_version))
        .ok();
    term.write_line(&format!("  files           {}", stats.files))
        .ok();
    term.write_line(&format!("  hash values     {}", stats.hashes))
        .ok();
    term.write_line(&format!("  last scan       {}", stats.last_scan_id))
        .ok();
    Ok(())
}

/// Explicit path, else the per-user cache directory, else the working directory
fn resolve_cache_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(default_cache_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE))
}

fn display_path(path: &Path, home: Option<&Path>) -> String {
    match home.and_then(|home| path.strip_prefix(home).ok()) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_flags_parse() {
        let cli = Cli::try_parse_from([
            "photoboss",
            "scan",
            "/photos",
            "-r",
            "--methods",
            "SHA256",
            "Average Hash",
            "--threshold",
            "0.8",
            "--output",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan {
                root,
                recursive,
                methods,
                threshold,
                ..
            } => {
                assert_eq!(root, PathBuf::from("/photos"));
                assert!(recursive);
                assert_eq!(methods, vec!["SHA256", "Average Hash"]);
                assert_eq!(threshold, 0.8);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cache_and_no_cache_conflict() {
        let parsed =
            Cli::try_parse_from(["photoboss", "scan", "/photos", "--cache", "x.db", "--no-cache"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn format_bytes_picks_units() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn home_prefix_is_abbreviated() {
        let home = PathBuf::from("/home/me");
        assert_eq!(
            display_path(Path::new("/home/me/pics/a.jpg"), Some(&home)),
            "~/pics/a.jpg"
        );
        assert_eq!(display_path(Path::new("/srv/a.jpg"), Some(&home)), "/srv/a.jpg");
    }
}
