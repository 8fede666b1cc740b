use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use configuration::{LogLevel, Settings, init_tracing, load_config};
use core_types::DataSystem;
use datastore::{CsvTableLoader, TableLoader, profile_table};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use reports::{AnalyticsOrchestrator, ReportKind, ReportParams};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// The main entry point for the Crossview analytics application.
fn main() -> ExitCode {
    // A .env file is optional; CROSSVIEW__* variables may also come from the shell.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(root) = cli.data_dir {
        settings.data.root = root;
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }

    // The guard flushes the file appender on drop, so it lives until we return.
    let _guard = init_tracing(&settings.logging)?;
    info!(data_root = %settings.data.root.display(), "Configuration loaded");

    match cli.command {
        Commands::Report(args) => handle_report(args, settings),
        Commands::RunAll(args) => handle_run_all(args, settings),
        Commands::Sources => handle_sources(settings),
        Commands::Describe(args) => handle_describe(args, settings),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Cross-system analytics over MySQL, PostgreSQL and Cassandra exports.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the toml configuration file.
    #[arg(long, global = true, default_value = "crossview.toml")]
    config: PathBuf,

    /// Overrides `data.root` from the configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Overrides `logging.level` from the configuration.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single named report and print it as JSON.
    Report(ReportArgs),
    /// Run every report in parallel and print one combined JSON document.
    RunAll(OutputArgs),
    /// List the configured source tables and whether their files exist.
    Sources,
    /// Profile one source table: columns, kinds, nulls and duplicates.
    Describe(DescribeArgs),
}

#[derive(Parser)]
struct ReportArgs {
    /// The report to run (e.g., "claims-vs-policies").
    name: ReportKind,

    /// Lookback of the user-growth report, in months.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    months: Option<u32>,

    /// Lookback of the activity-patterns report, in hours.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    hours: Option<u32>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser)]
struct OutputArgs {
    /// Print single-line JSON instead of pretty-printed output.
    #[arg(long)]
    compact: bool,
}

#[derive(Parser)]
struct DescribeArgs {
    /// The record system (mysql, postgresql or cassandra).
    system: DataSystem,

    /// The logical table name (e.g., "users").
    table: String,

    /// Print the profile as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Report Command Logic
// ==============================================================================

fn orchestrator(settings: Settings) -> AnalyticsOrchestrator {
    let loader = Arc::new(CsvTableLoader::new(settings.data));
    AnalyticsOrchestrator::new(loader, settings.analysis)
}

fn handle_report(args: ReportArgs, settings: Settings) -> anyhow::Result<ExitCode> {
    let orchestrator = orchestrator(settings);
    let params = ReportParams {
        months: args.months,
        hours: args.hours,
    };

    match orchestrator.run(args.name, &params) {
        Ok(report) => {
            print_json(&report, args.output.compact)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(report = args.name.name(), error = %e, "Report failed");
            eprintln!("Error: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn handle_run_all(args: OutputArgs, settings: Settings) -> anyhow::Result<ExitCode> {
    let orchestrator = orchestrator(settings);
    let params = ReportParams::default();

    let progress_bar = ProgressBar::new(ReportKind::ALL.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let outcomes: Vec<_> = ReportKind::ALL[..]
        .par_iter()
        .map(|kind| {
            let outcome = orchestrator.run(*kind, &params);
            progress_bar.set_message(kind.name());
            progress_bar.inc(1);
            (*kind, outcome)
        })
        .collect();
    progress_bar.finish_with_message("All reports complete.");

    let mut failures = 0;
    let mut combined = Map::new();
    for (kind, outcome) in outcomes {
        let entry = match outcome {
            Ok(report) => report,
            Err(e) => {
                failures += 1;
                error!(report = kind.name(), error = %e, "Report failed");
                json!({ "error": e.to_string() })
            }
        };
        combined.insert(kind.name().to_string(), entry);
    }

    print_json(&Value::Object(combined), args.compact)?;
    if failures > 0 {
        eprintln!("{failures} of {} reports failed.", ReportKind::ALL.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &Value, compact: bool) -> anyhow::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{rendered}");
    Ok(())
}

// ==============================================================================
// Source Command Logic
// ==============================================================================

fn handle_sources(settings: Settings) -> anyhow::Result<ExitCode> {
    let loader = CsvTableLoader::new(settings.data);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["System", "Table", "Path", "Available"]);

    let statuses = loader.availability();
    let available = statuses.iter().filter(|s| s.available).count();
    for status in &statuses {
        table.add_row(vec![
            status.system.to_string(),
            status.table.clone(),
            status.path.display().to_string(),
            if status.available { "yes" } else { "no" }.to_string(),
        ]);
    }

    println!("{table}");
    println!("{available} of {} configured tables available.", statuses.len());
    Ok(ExitCode::SUCCESS)
}

fn handle_describe(args: DescribeArgs, settings: Settings) -> anyhow::Result<ExitCode> {
    let loader = CsvTableLoader::new(settings.data);
    let source = loader
        .get_table(args.system, &args.table)
        .with_context(|| format!("Failed to load {}.{}", args.system, args.table))?;
    let profile = profile_table(&source);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Column", "Kind", "Nulls", "Null %", "Distinct"]);
    for column in &profile.columns {
        table.add_row(vec![
            column.name.clone(),
            column.kind.to_string(),
            column.nulls.to_string(),
            format!("{:.2}", column.null_percentage),
            column.distinct.to_string(),
        ]);
    }

    println!("{}.{}", args.system, profile.table);
    println!(
        "Rows: {} | Duplicate rows: {} ({:.2}%) | Completeness: {:.2}%",
        profile.rows, profile.duplicate_rows, profile.duplicate_percentage, profile.completeness
    );
    println!("{table}");
    Ok(ExitCode::SUCCESS)
}
