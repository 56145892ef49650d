//! treetally - hierarchical folder analytics for large path tables.
//!
//! Usage:
//!   treetally levels [INPUT]    Aggregate a metric at every folder depth
//!   treetally top [INPUT]       Largest folders at one depth
//!   treetally files [INPUT]     Paginated list of the largest files
//!   treetally scale [INPUT]     Table size class and chosen strategies
//!   treetally export [INPUT]    Write the path table as JSON lines
//!   treetally cache clear       Remove every persisted aggregate
//!   treetally cache purge       Remove expired persisted aggregates
//!
//! INPUT is a directory (scanned) or a `.jsonl` table.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use tokio::runtime::{Builder, Handle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use treetally_analyze::{
    CountSource, FolderReport, LevelRequest, MemorySource, Metric, Precision, ReportOptions,
    RowSource, paginate, read_json_lines, write_json_lines,
};
use treetally_cache::{CacheManager, DiskStore};
use treetally_core::{
    AggregationResult, AnalyticsConfig, Completeness, HierarchyLevel, LevelSummary, PathField,
    PathRow,
};
use treetally_scan::{JwalkScanner, ScanConfig};

#[derive(Parser)]
#[command(
    name = "treetally",
    version,
    about = "Hierarchical folder analytics for large path tables",
    long_about = "treetally aggregates sizes and counts at every folder depth of a \
                  path table.\n\n\
                  Large tables are sampled or processed in batches, and results are \
                  cached between runs."
)]
struct Cli {
    /// Increase log verbosity (-v debug for treetally, -vv debug for everything)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory (defaults to the user cache directory)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Keep cached results in memory only
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate a metric at every folder depth
    Levels {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// Only show this depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Records to show per depth
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Largest folders at one depth
    Top {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// Depth to rank
        #[arg(short, long, default_value = "1")]
        depth: usize,

        /// Number of folders to show
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,
    },

    /// Paginated list of the largest files
    Files {
        #[command(flatten)]
        input: InputArgs,

        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u64,

        /// Files per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the size class of a table and the strategies it would get
    Scale {
        #[command(flatten)]
        input: InputArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Write the path table as JSON lines
    Export {
        #[command(flatten)]
        input: InputArgs,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage persisted aggregates
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every persisted aggregate
    Clear,
    /// Remove persisted aggregates past their TTL
    Purge,
}

#[derive(Args)]
struct InputArgs {
    /// Directory to scan or `.jsonl` table to read
    #[arg(default_value = ".")]
    input: PathBuf,

    /// Render scanned paths relative to the scanned directory
    #[arg(long)]
    relative: bool,

    /// Skip hidden files when scanning
    #[arg(long)]
    no_hidden: bool,

    /// Glob patterns to skip when scanning
    #[arg(long = "ignore")]
    ignore: Vec<String>,
}

#[derive(Args)]
struct QueryArgs {
    /// Metric to aggregate
    #[arg(short, long, default_value = "size")]
    metric: MetricArg,

    /// Where item counts come from
    #[arg(long, default_value = "rows")]
    count_source: CountSourceArg,

    /// Group files by their own path or by their parent folder
    #[arg(long, default_value = "path")]
    group_by: GroupByArg,

    /// Deepest level to aggregate
    #[arg(long)]
    max_depth: Option<usize>,

    /// Count every row even for large tables (batched instead of sampled)
    #[arg(long)]
    exact: bool,

    /// Ignore cached results and recompute
    #[arg(long)]
    refresh: bool,

    /// Stop batched runs after this many seconds and show partial results
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

impl QueryArgs {
    fn request(&self) -> LevelRequest {
        LevelRequest::new(self.metric.into())
            .with_count_source(self.count_source.into())
            .with_path_field(self.group_by.into())
            .with_max_depth(self.max_depth)
    }

    fn options(&self) -> ReportOptions {
        let precision = if self.exact {
            Precision::Exact
        } else {
            Precision::Approximate
        };
        ReportOptions::new(precision).with_refresh(self.refresh)
    }

    fn deadline(&self, runtime: &Handle) -> Deadline {
        let token = CancellationToken::new();
        let timer = self.timeout_secs.map(|secs| {
            let expired = token.clone();
            runtime.spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!(secs, "timeout reached, stopping after the current batch");
                expired.cancel();
            })
        });
        Deadline { token, timer }
    }
}

/// Cancellation token that fires when `--timeout-secs` elapses.
///
/// The timer task is aborted when the deadline is dropped.
struct Deadline {
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    Size,
    Count,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Size => Metric::Size,
            MetricArg::Count => Metric::Count,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CountSourceArg {
    Rows,
    Hint,
}

impl From<CountSourceArg> for CountSource {
    fn from(arg: CountSourceArg) -> Self {
        match arg {
            CountSourceArg::Rows => CountSource::Rows,
            CountSourceArg::Hint => CountSource::Hint,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GroupByArg {
    Path,
    Parent,
}

impl From<GroupByArg> for PathField {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::Path => PathField::Path,
            GroupByArg::Parent => PathField::Parent,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().or_else(AnalyticsConfig::default_path);
    let config = AnalyticsConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let timer = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("treetally-timer")
        .enable_time()
        .build()
        .context("Failed to start timer runtime")?;

    match cli.command {
        Command::Levels {
            ref input,
            ref query,
            depth,
            limit,
        } => {
            let source = load_input(input)?;
            let report = FolderReport::new(config.clone(), open_cache(&cli, &config));
            let deadline = query.deadline(timer.handle());
            let result = report
                .levels(&source, &query.request(), query.options(), &deadline.token)
                .context("Aggregation failed")?;
            print_levels(&result, query, depth, limit)?;
        }
        Command::Top {
            ref input,
            ref query,
            depth,
            top,
        } => {
            let source = load_input(input)?;
            let report = FolderReport::new(config.clone(), open_cache(&cli, &config));
            let deadline = query.deadline(timer.handle());
            let records = report
                .top(
                    &source,
                    &query.request(),
                    depth,
                    top,
                    query.options(),
                    &deadline.token,
                )
                .context("Aggregation failed")?;
            print_top(&records, query, depth)?;
        }
        Command::Files {
            ref input,
            page,
            page_size,
            format,
        } => {
            let source = load_input(input)?;
            run_files(source, page, page_size.unwrap_or(config.page_size), format)?;
        }
        Command::Scale { ref input, format } => {
            let source = load_input(input)?;
            let report = FolderReport::new(config.clone(), open_cache(&cli, &config));
            run_scale(&report, &source, format)?;
        }
        Command::Export {
            ref input,
            ref output,
        } => {
            let source = load_input(input)?;
            run_export(&source, output.as_deref())?;
        }
        Command::Cache { ref action } => {
            run_cache(&cli, action)?;
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays clean for JSON output.
fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "treetally=info",
        1 => "treetally=debug",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Read a `.jsonl` table or scan a directory.
fn load_input(args: &InputArgs) -> Result<MemorySource> {
    let path = &args.input;
    if path.is_file() {
        return read_json_lines(path).with_context(|| format!("Failed to read {}", path.display()));
    }

    let path = path.canonicalize().context("Invalid path")?;
    eprintln!("Scanning {}...", path.display());

    let config = ScanConfig::builder()
        .root(&path)
        .relative_paths(args.relative)
        .include_hidden(!args.no_hidden)
        .ignore_patterns(args.ignore.clone())
        .build()
        .map_err(|e| eyre!("Invalid scan options: {e}"))?;
    let table = JwalkScanner::new().scan(&config).context("Scan failed")?;

    eprintln!(
        "Scanned {} files ({}) in {:.2}s",
        table.stats.files,
        format_size(table.stats.total_size),
        table.duration.as_secs_f64()
    );
    if !table.warnings.is_empty() {
        eprintln!("{} warning(s) during scan", table.warnings.len());
    }

    Ok(MemorySource::new(table.into_rows()))
}

/// Disk-backed cache, or memory-only when persistence is off or unavailable.
fn open_cache(cli: &Cli, config: &AnalyticsConfig) -> Arc<CacheManager> {
    let manager = if cli.no_persist {
        CacheManager::in_memory()
    } else if let Some(dir) = cli.cache_dir.clone().or_else(DiskStore::default_dir) {
        match DiskStore::open(&dir) {
            Ok(store) => CacheManager::new(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "cache directory unusable, caching in memory only");
                CacheManager::in_memory()
            }
        }
    } else {
        warn!("no cache directory available, caching in memory only");
        CacheManager::in_memory()
    };

    Arc::new(manager.with_memory_capacity(config.memory_cache_entries))
}

fn print_levels(
    result: &AggregationResult,
    query: &QueryArgs,
    only_depth: Option<usize>,
    limit: usize,
) -> Result<()> {
    if let OutputFormat::Json = query.format {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    print_header(result);
    if result.is_empty() {
        println!(" No data.");
        return Ok(());
    }

    let total = result.total_metric();
    for group in &result.levels {
        if only_depth.is_some_and(|d| d != group.depth) {
            continue;
        }

        let summary = LevelSummary::from_records(&group.records);
        println!(
            " Depth {} - {} folders, mean {}, median {}",
            group.depth,
            summary.records,
            format_metric(query.metric, summary.mean_metric as u64),
            format_metric(query.metric, summary.median_metric as u64),
        );

        let top = treetally_analyze::top_by_metric(&group.records, limit);
        for record in &top {
            print_record(record, query.metric, total);
        }
        let remaining = group.records.len().saturating_sub(limit);
        if remaining > 0 {
            println!("   ... and {remaining} more");
        }
        println!();
    }

    Ok(())
}

fn print_top(records: &[HierarchyLevel], query: &QueryArgs, depth: usize) -> Result<()> {
    match query.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!(" No folders at depth {depth}.");
                return Ok(());
            }
            let total: u64 = records.iter().map(|r| r.aggregated_metric).sum();
            println!(" Top {} at depth {depth}", records.len());
            println!("{}", "─".repeat(70));
            for record in records {
                print_record(record, query.metric, total);
            }
        }
    }
    Ok(())
}

fn print_header(result: &AggregationResult) {
    println!();
    println!("{}", "─".repeat(70));
    println!(
        " {} rows, {} levels (deepest path has {} segments)",
        result.rows_processed,
        result.depth_count(),
        result.max_depth_observed
    );
    match result.completeness {
        Completeness::Exact => println!(" Exact"),
        Completeness::Sampled { fraction, method } => println!(
            " Approximate: {:.2}% {} sample",
            fraction * 100.0,
            method.as_str()
        ),
        Completeness::Partial {
            batches_completed,
            sampling,
        } => match sampling {
            Some(method) => println!(
                " Partial and approximate: {} sample stopped after {batches_completed} batch(es)",
                method.as_str()
            ),
            None => println!(" Partial: stopped after {batches_completed} batch(es)"),
        },
    }
    println!("{}", "─".repeat(70));
    println!();
}

fn print_record(record: &HierarchyLevel, metric: MetricArg, total: u64) {
    let ratio = if total > 0 {
        record.aggregated_metric as f64 / total as f64
    } else {
        0.0
    };
    println!(
        "   {:<40} {:>10} {:>8} items {:>5.1}% {}",
        truncate(&record.prefix_path, 40),
        format_metric(metric, record.aggregated_metric),
        record.item_count,
        ratio * 100.0,
        make_bar(ratio, 10)
    );
}

fn run_files(source: MemorySource, page: u64, page_size: u64, format: OutputFormat) -> Result<()> {
    let mut rows = source.into_rows();
    rows.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.raw_path.cmp(&b.raw_path)));
    let page = paginate(&MemorySource::new(rows), page_size, page)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
        OutputFormat::Text => {
            let window = page.window;
            println!(
                " Page {} of {} ({} files)",
                window.page_number, window.total_pages, window.total_records
            );
            println!("{}", "─".repeat(70));
            for (index, row) in page.items.iter().enumerate() {
                print_file(window.offset + index as u64 + 1, row);
            }
            if window.has_next() {
                println!(" Next: --page {}", window.page_number + 1);
            }
        }
    }
    Ok(())
}

fn print_file(rank: u64, row: &PathRow) {
    let modified = row
        .modified
        .map(|m| m.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    println!(
        " {rank:>6}. {:<50} {:>10} {modified}",
        truncate(&row.raw_path, 50),
        format_size(row.size)
    );
}

fn run_scale(report: &FolderReport, source: &dyn RowSource, format: OutputFormat) -> Result<()> {
    let scale = report.scale(source)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&scale)?),
        OutputFormat::Text => {
            let rows = scale
                .row_count
                .map_or_else(|| "unknown".to_string(), |n| n.to_string());
            let tier = scale.tier.map_or("unknown", |t| t.as_str());
            println!(" Rows: {rows} ({tier})");
            println!(" Approximate queries: {}", scale.approximate_strategy.describe());
            println!(" Exact queries:       {}", scale.exact_strategy.describe());
            if !scale.recommendations.is_empty() {
                println!();
                println!(" Recommendations:");
                for recommendation in &scale.recommendations {
                    println!("   - {recommendation}");
                }
            }
        }
    }
    Ok(())
}

fn run_export(source: &MemorySource, output: Option<&Path>) -> Result<()> {
    match output {
        Some(output_path) => {
            let file = File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            write_json_lines(source.rows(), BufWriter::new(file))?;
            eprintln!("Exported {} rows to {}", source.len(), output_path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_json_lines(source.rows(), &mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn run_cache(cli: &Cli, action: &CacheAction) -> Result<()> {
    let dir = cli
        .cache_dir
        .clone()
        .or_else(DiskStore::default_dir)
        .ok_or_else(|| eyre!("No cache directory available"))?;
    let store = DiskStore::open(&dir).context("Failed to open cache directory")?;

    match action {
        CacheAction::Clear => {
            let entries = store.len()?;
            treetally_cache::CacheStore::clear(&store)?;
            eprintln!("Removed {entries} cached aggregate(s) from {}", dir.display());
        }
        CacheAction::Purge => {
            let removed = store.purge_expired()?;
            eprintln!("Removed {removed} expired aggregate(s) from {}", dir.display());
        }
    }
    Ok(())
}

/// Size metrics as bytes, count metrics as plain numbers.
fn format_metric(metric: MetricArg, value: u64) -> String {
    match metric {
        MetricArg::Size => format_size(value),
        MetricArg::Count => value.to_string(),
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
