//! Command-line interface for the reservation pipeline

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};

use crate::config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use crate::ingestion::IngestionReport;
use crate::logging::LoggingContext;
use crate::pipeline::TrainingPipeline;
use crate::preprocessing::PreprocessingReport;
use crate::tracking::ExperimentTracker;
use crate::training::TrainingReport;
use crate::utils::Timer;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{key:<18}")), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "reservation-mlops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a hotel reservation cancellation classifier")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run ingestion, preprocessing and training in order (default)
    Run,
    /// Fetch the raw dataset and split it into train/test
    Ingest,
    /// Clean, encode, rebalance and select features
    Preprocess,
    /// Search hyperparameters, evaluate and persist the model
    Train,
    /// List tracked training runs
    Runs,
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn load_pipeline(config_path: &Path) -> anyhow::Result<TrainingPipeline> {
    step_run(&format!("Loading config {}", config_path.display()));
    let pipeline = TrainingPipeline::from_config_file(config_path)?;
    step_ok("Config valid");
    Ok(pipeline)
}

fn print_ingestion(report: &IngestionReport) {
    section("Ingestion");
    println!("  {}", kv("Raw rows", &report.raw_rows.to_string()));
    println!("  {}", kv("Train rows", &report.train_rows.to_string()));
    println!("  {}", kv("Test rows", &report.test_rows.to_string()));
}

fn print_preprocessing(report: &PreprocessingReport) {
    section("Preprocessing");
    println!("  {}", kv("Duplicates", &report.duplicates_dropped.to_string()));
    println!("  {}", kv("Skewed columns", &report.skewed_columns.join(", ")));
    let synthetic: Vec<String> = report
        .synthetic
        .iter()
        .map(|(class, n)| format!("{class}: +{n}"))
        .collect();
    println!("  {}", kv("Synthetic rows", &synthetic.join(", ")));
    println!("  {}", kv("Train / test rows", &format!("{} / {}", report.train_rows, report.test_rows)));
    println!("  {}", kv("Features", &report.selected_features.join(", ")));
}

fn print_training(report: &TrainingReport) {
    section("Training");
    for (name, value) in &report.best_params {
        println!("  {}", kv(name, value));
    }
    println!("  {}", kv("CV score", &format!("{:.4}", report.cv_score)));
    println!();
    line_box_top();
    line_box(&kv("Accuracy", &format!("{:.4}", report.metrics.accuracy)));
    line_box(&kv("Precision", &format!("{:.4}", report.metrics.precision)));
    line_box(&kv("Recall", &format!("{:.4}", report.metrics.recall)));
    line_box(&kv("F1", &format!("{:.4}", report.metrics.f1_score)));
    line_box_bottom();
    println!("  {}", kv("Model", &report.model_file.display().to_string()));
    println!("  {}", kv("Tracking run", &report.run_id));
}

pub fn cmd_run(config_path: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let ctx = LoggingContext::init(&pipeline.config().logging)?;

    let report = pipeline.run(&ctx)?;
    print_ingestion(&report.ingestion);
    print_preprocessing(&report.preprocessing);
    print_training(&report.training);
    println!();
    step_ok(&format!("Pipeline finished in {:.1}s", report.duration_secs));
    Ok(())
}

pub fn cmd_ingest(config_path: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let ctx = LoggingContext::init(&pipeline.config().logging)?;
    let report = pipeline.ingest(&ctx)?;
    print_ingestion(&report);
    Ok(())
}

pub fn cmd_preprocess(config_path: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let ctx = LoggingContext::init(&pipeline.config().logging)?;
    let report = pipeline.preprocess(&ctx)?;
    print_preprocessing(&report);
    Ok(())
}

pub fn cmd_train(config_path: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let ctx = LoggingContext::init(&pipeline.config().logging)?;
    let timer = Timer::start();
    let report = pipeline.train(&ctx)?;
    print_training(&report);
    step_ok(&format!("Training finished in {:.1}s", timer.elapsed_secs()));
    Ok(())
}

pub fn cmd_runs(config_path: &Path) -> anyhow::Result<()> {
    let config = PipelineConfig::from_yaml_file(config_path)?;
    let tracker = ExperimentTracker::new(&config.tracking);
    let runs = tracker.list_runs()?;

    section(&format!("Runs of {}", tracker.experiment()));
    if runs.is_empty() {
        println!("  {}", muted("no runs recorded"));
        return Ok(());
    }
    for run in &runs {
        let accuracy = run
            .metrics
            .get("accuracy")
            .map(|a| format!("{a:.4}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}  {}  {:<9} {}",
            dim(&run.start_time.format("%Y-%m-%d %H:%M:%S").to_string()),
            run.run_id,
            format!("{:?}", run.status).to_lowercase(),
            kv("accuracy", &accuracy)
        );
    }
    Ok(())
}

/// Dispatch a parsed command line
pub fn execute(cli: &Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&cli.config),
        Commands::Ingest => cmd_ingest(&cli.config),
        Commands::Preprocess => cmd_preprocess(&cli.config),
        Commands::Train => cmd_train(&cli.config),
        Commands::Runs => cmd_runs(&cli.config),
    }
}
