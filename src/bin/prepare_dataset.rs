//! Dataset preparation tool
//!
//! Splits a folder of per-strain image folders into train/val/test trees,
//! optionally extracting per-strain ZIP archives first.
//!
//! Usage:
//!   prepare_dataset --source data/raw --output data/prepared
//!   prepare_dataset --source downloads --output data/prepared --extract-zips --seed 7

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use strain_classifier::dataset::{
    extract_from_zips, prepare_dataset, SplitRatios, SplitReport, DEFAULT_SEED, EXTRACTED_DIR,
};
use strain_classifier::utils::format_number;
use strain_classifier::utils::logging::{init_logging, LogConfig};

/// Prepare a strain image dataset for training
#[derive(Parser, Debug)]
#[command(name = "prepare_dataset")]
#[command(version)]
#[command(about = "Split per-strain image folders into train/val/test", long_about = None)]
struct Args {
    /// Source directory with one folder per strain
    #[arg(long)]
    source: PathBuf,

    /// Output directory for train/val/test
    #[arg(long)]
    output: PathBuf,

    /// Training set ratio
    #[arg(long, default_value = "0.8")]
    train_ratio: f64,

    /// Validation set ratio
    #[arg(long, default_value = "0.1")]
    val_ratio: f64,

    /// Test set ratio
    #[arg(long, default_value = "0.1")]
    test_ratio: f64,

    /// Extract ZIP files in the source directory first
    #[arg(long, default_value = "false")]
    extract_zips: bool,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let ratios = SplitRatios::new(args.train_ratio, args.val_ratio, args.test_ratio);

    // Nothing on disk is touched before the ratios are known to be valid
    if let Err(e) = ratios.validate() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        return Ok(false);
    }

    let mut source = args.source.clone();

    if args.extract_zips {
        let extracted = source.join(EXTRACTED_DIR);
        println!("{}", "Extracting archives...".cyan());
        let count = extract_from_zips(&source, &extracted)
            .with_context(|| format!("Failed to extract archives from {:?}", source))?;
        println!("  {} Extracted {} archives", "✓".green(), count);
        println!();
        source = extracted;
    }

    println!("{}", "Preparing dataset...".cyan().bold());
    println!("  Source: {}", source.display());
    println!("  Output: {}", args.output.display());
    println!(
        "  Splitting: {:.0}% train, {:.0}% val, {:.0}% test",
        ratios.train * 100.0,
        ratios.val * 100.0,
        ratios.test * 100.0
    );
    println!("  Seed: {}", args.seed);
    println!();

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let report = prepare_dataset(&source, &args.output, &ratios, &mut rng)?;

    print_report(&report, &args.output);
    Ok(report.succeeded())
}

fn print_report(report: &SplitReport, output: &Path) {
    for name in &report.skipped {
        println!("  {} Skipping {}: no images found", "⚠".yellow(), name);
    }
    for class in &report.classes {
        let c = &class.counts;
        println!(
            "  {} {}: {} train, {} val, {} test ({} total)",
            "✓".green(),
            class.name,
            c.train,
            c.val,
            c.test,
            c.total()
        );
    }
    println!();

    if !report.succeeded() {
        println!("{} No class contained any images", "Error:".red().bold());
        return;
    }

    let totals = report.totals();
    println!("{}", "Dataset preparation complete!".green().bold());
    println!("  Classes: {}", report.classes.len());
    println!(
        "  Total images: {} ({} train, {} val, {} test)",
        format_number(totals.total()),
        format_number(totals.train),
        format_number(totals.val),
        format_number(totals.test)
    );
    println!("  Output directory: {}", output.display());
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  1. Zip the dataset: cd {} && zip -r dataset.zip train val test",
        output.display()
    );
    println!("  2. Upload it to your training environment");
    println!("  3. Point the training notebook at train/, val/ and test/");
}
