//! CLI entry point for the ad-library preprocessing pipeline.

use adlib_processing::utils::has_column;
use adlib_processing::{
    Pipeline, PipelineConfig, PipelineReport, PipelineResult, RecordErrorPolicy,
};
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Columns the pipeline cannot run without.
static REQUIRED_AD_COLUMNS: [&str; 2] = ["id", "ad_delivery_start_time"];
static REQUIRED_TARGETING_COLUMNS: [&str; 3] = ["archive_id", "age", "gender"];
static REQUIRED_LOCATION_COLUMNS: [&str; 1] = ["archive_id"];

/// CLI-compatible record error policy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliErrorPolicy {
    /// Drop failing records and list them in the report
    Skip,
    /// Stop at the first failing record
    Abort,
}

impl From<CliErrorPolicy> for RecordErrorPolicy {
    fn from(cli: CliErrorPolicy) -> Self {
        match cli {
            CliErrorPolicy::Skip => RecordErrorPolicy::Skip,
            CliErrorPolicy::Abort => RecordErrorPolicy::Abort,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Ad-library targeting vs. delivery preprocessing",
    long_about = "Cleans a political ad-library export, merges it with the targeting export \
                  and compares declared targeting with observed delivery.\n\n\
                  EXAMPLES:\n  \
                  # Default German run\n  \
                  adlib-processing -a data/ad_library_DE.csv -t data/targeting_DE.csv\n\n  \
                  # Join location targeting and stop on the first bad record\n  \
                  adlib-processing -a ads.csv -t targeting.csv -L location.csv --on-error abort\n\n  \
                  # Preview inputs without processing\n  \
                  adlib-processing -a ads.csv -t targeting.csv --dry-run"
)]
struct Args {
    /// Path to the ad-library CSV export
    #[arg(short, long)]
    ad_library: String,

    /// Path to the targeting CSV export
    #[arg(short, long)]
    targeting: String,

    /// Path to the location-targeting CSV export, left-joined on archive_id
    #[arg(short = 'L', long)]
    location: Option<String>,

    /// Output directory for results
    #[arg(short, long, default_value = "./output")]
    output: String,

    /// Custom output file name (without extension)
    ///
    /// If not specified, uses "{country}_merged_data"
    #[arg(long)]
    output_name: Option<String>,

    /// Country code written to the country_id column
    #[arg(long, default_value = "DE")]
    country: String,

    /// Election day; delivery after it is excluded (YYYY-MM-DD)
    #[arg(long, default_value = "2021-09-26")]
    election_date: NaiveDate,

    /// Drop ads that started before this date (YYYY-MM-DD)
    #[arg(long, default_value = "2021-07-01")]
    start_date: NaiveDate,

    /// What to do with records that fail to process
    #[arg(long, value_enum, default_value = "skip")]
    on_error: CliErrorPolicy,

    /// Preview inputs and planned outputs without processing
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Write a JSON report with skipped records to the output directory
    #[arg(short = 'r', long)]
    emit_report: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries
/// the JSON report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    dotenv().ok();

    for path in [Some(&args.ad_library), Some(&args.targeting), args.location.as_ref()]
        .into_iter()
        .flatten()
    {
        if !Path::new(path).exists() {
            return Err(anyhow!("Input file not found: {}", path));
        }
    }

    info!("Loading ad library from: {}", args.ad_library);
    let ad_library = load_csv_with_fallbacks(&args.ad_library)?;
    info!("Ad library loaded: {:?}", ad_library.shape());

    info!("Loading targeting from: {}", args.targeting);
    let targeting = load_csv_with_fallbacks(&args.targeting)?;
    info!("Targeting loaded: {:?}", targeting.shape());

    let location = match args.location {
        Some(ref path) => {
            info!("Loading location targeting from: {}", path);
            let df = load_csv_with_fallbacks(path)?;
            info!("Location targeting loaded: {:?}", df.shape());
            Some(df)
        }
        None => None,
    };

    let mut config_builder = PipelineConfig::builder()
        .country_id(&args.country)
        .election_date(args.election_date)
        .start_date(args.start_date)
        .record_error_policy(args.on_error.into())
        .output_dir(&args.output)
        .emit_report(args.emit_report);

    if let Some(ref name) = args.output_name {
        config_builder = config_builder.output_name(name);
    }

    let config = config_builder.build()?;

    if args.dry_run {
        run_dry_run(&args, &config, &ad_library, &targeting, location.as_ref());
        return Ok(());
    }

    let mut builder = Pipeline::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    info!("{}", "=".repeat(80));
    info!("Starting ad-library preprocessing pipeline...");
    info!("{}", "=".repeat(80));

    let outcome = match location {
        Some(ref location) => pipeline.process_with_location(&ad_library, &targeting, location),
        None => pipeline.process(&ad_library, &targeting),
    };

    match outcome {
        Ok(result) => handle_pipeline_output(&result, pipeline.config(), &args),
        Err(e) => {
            error!("Pipeline failed: {}", e);
            Err(anyhow!("Pipeline failed: {}", e))
        }
    }
}

/// Preview inputs and planned outputs.
///
/// Uses `println!` on purpose: this output is the point of `--dry-run` and
/// must not depend on the log level.
fn run_dry_run(
    args: &Args,
    config: &PipelineConfig,
    ad_library: &DataFrame,
    targeting: &DataFrame,
    location: Option<&DataFrame>,
) {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of preprocessing");
    println!("{}\n", "=".repeat(80));

    println!("INPUTS");
    println!("{}", "-".repeat(40));
    println!(
        "  Ad library: {} ({} rows x {} columns)",
        args.ad_library,
        ad_library.height(),
        ad_library.width()
    );
    println!(
        "  Targeting:  {} ({} rows x {} columns)",
        args.targeting,
        targeting.height(),
        targeting.width()
    );
    if let (Some(path), Some(df)) = (&args.location, location) {
        println!(
            "  Location:   {} ({} rows x {} columns)",
            path,
            df.height(),
            df.width()
        );
    }
    println!();

    println!("REQUIRED COLUMNS");
    println!("{}", "-".repeat(40));
    for (frame, name) in REQUIRED_AD_COLUMNS
        .iter()
        .map(|name| (ad_library, name))
        .chain(REQUIRED_TARGETING_COLUMNS.iter().map(|name| (targeting, name)))
        .chain(
            location
                .into_iter()
                .flat_map(|df| REQUIRED_LOCATION_COLUMNS.iter().map(move |name| (df, name))),
        )
    {
        let status = if has_column(frame, name) { "ok" } else { "MISSING" };
        println!("  {:<28} {}", name, status);
    }
    println!();

    println!("SETTINGS");
    println!("{}", "-".repeat(40));
    println!("  Country:        {}", config.country_id);
    println!("  Election date:  {}", config.election_date);
    println!("  Start date:     {}", config.start_date);
    println!("  On record error: {:?}", config.record_error_policy);
    println!();

    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    let stem = config.output_file_stem();
    println!("  - {}", config.output_dir.join(format!("{stem}.csv")).display());
    if config.emit_report {
        println!("  - {}", config.output_dir.join(format!("{stem}_report.json")).display());
    }
    println!();
    println!("{}", "=".repeat(80));
    println!("To execute this preprocessing, run without --dry-run");
    println!("{}", "=".repeat(80));
}

/// Handle pipeline output based on CLI flags.
///
/// - Default: human-readable summary on stdout
/// - `--json`: JSON report on stdout only
fn handle_pipeline_output(
    result: &PipelineResult,
    config: &PipelineConfig,
    args: &Args,
) -> Result<()> {
    if args.json {
        let report = PipelineReport::from_result(config, result);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(ref report_file) = result.report_file {
        info!("Report written to: {}", report_file);
    }

    print_human_readable_summary(result, args);
    Ok(())
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(result: &PipelineResult, args: &Args) {
    let summary = &result.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("PREPROCESSING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Ad library: {} ({} rows)", args.ad_library, summary.ad_rows);
    println!("Targeting:  {} ({} rows)", args.targeting, summary.targeting_rows);
    if let Some(ref location) = args.location {
        println!("Location:   {} ({} rows)", location, summary.location_rows);
    }
    match result.output_file {
        Some(ref output_file) => println!(
            "Output:     {} ({} rows x {} columns)",
            output_file,
            result.data.height(),
            result.data.width()
        ),
        None => println!("Output:     not written"),
    }
    println!();

    println!("Processing Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!("  Ads cleaned: {} of {}", summary.ads_cleaned, summary.ad_rows);
    println!("  Ads without targeting: {}", summary.ads_without_targeting);
    println!("  Rows before start date: {}", summary.ads_before_start_date);
    println!("  Rows without spend: {}", summary.rows_without_spend);
    println!("  Records derived: {}", summary.records_derived);
    println!("  Records skipped: {}", summary.records_skipped);
    if let Some(distance) = summary.mean_gender_distance {
        println!("  Mean gender distance: {:.4}", distance);
    }
    if let Some(distance) = summary.mean_age_distance {
        println!("  Mean age distance: {:.4}", distance);
    }
    println!();

    if !result.skipped_records.is_empty() {
        println!("Skipped Records:");
        for skipped in result.skipped_records.iter().take(10) {
            println!("  ! {} [{}] {}", skipped.record_id, skipped.code, skipped.message);
        }
        if result.skipped_records.len() > 10 {
            println!("  ... and {} more", result.skipped_records.len() - 10);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save the skipped records as JSON");
    println!("{}", "=".repeat(80));
}

/// Load a CSV export with every column read as a string.
///
/// Falls back to a pre-cleaned copy of the content when the quoted read
/// fails.
fn load_csv_with_fallbacks(path: &str) -> Result<DataFrame> {
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard loading failed: {}", e);
        }
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        error!("Could not read file: {}", e);
        e
    })?;
    let cursor = std::io::Cursor::new(clean_csv_content(&content));

    CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .into_reader_with_file_handle(cursor)
        .finish()
        .map_err(|e| anyhow!("Failed to parse {}: {}", path, e))
}

/// Drop blank lines that break the CSV reader.
fn clean_csv_content(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
