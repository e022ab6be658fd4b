//! Strain Classifier CLI
//!
//! Runs the prediction service from the command line: classify a single
//! image given as a path, URL or data URI, or inspect a checkpoint.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use strain_classifier::backend::{backend_name, default_device, DefaultBackend};
use strain_classifier::inference::{PredictionInput, PredictionService, Predictor, PredictorConfig};
use strain_classifier::utils::logging::{init_logging, LogConfig};

/// Cannabis strain classification from photographs
///
/// Loads a fine-tuned ResNet-50 checkpoint (PyTorch `.pt`/`.pth` or burn
/// `.mpk`) and predicts the strain shown in an image.
#[derive(Parser, Debug)]
#[command(name = "strain_classifier")]
#[command(version)]
#[command(about = "Strain classification with a fine-tuned ResNet-50 on Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Where the service finds its checkpoint and class names
#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Path to the checkpoint (default: model.pt)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Path to the class names file (default: class_names.txt)
    #[arg(long)]
    class_names: Option<PathBuf>,

    /// TOML config file; explicit flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ModelArgs {
    fn predictor_config(&self) -> Result<PredictorConfig> {
        let mut config = match &self.config {
            Some(path) => PredictorConfig::load(path)
                .with_context(|| format!("Failed to read config {:?}", path))?,
            None => PredictorConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(class_names) = &self.class_names {
            config.class_names_path = class_names.clone();
        }

        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Predict the strain shown in an image
    Predict {
        /// Image path, http(s) URL or data:image URI
        #[arg(short, long)]
        input: String,

        #[command(flatten)]
        model: ModelArgs,

        /// Print the result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Load a checkpoint and show what it contains
    Inspect {
        #[command(flatten)]
        model: ModelArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let json_output = matches!(cli.command, Commands::Predict { json: true, .. });
    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if json_output {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Predict { input, model, json } => {
            // Keep stdout clean for machine-readable output
            if !json {
                print_banner();
            }
            cmd_predict(&input, &model.predictor_config()?, json)?;
        }

        Commands::Inspect { model } => {
            print_banner();
            cmd_inspect(&model.predictor_config()?)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   🌿 Strain Classifier                                           ║
 ║   ResNet-50 Strain Recognition with Burn + Rust                  ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_predict(input: &str, config: &PredictorConfig, json: bool) -> Result<()> {
    let input = PredictionInput::parse(input);

    info!("Running prediction");
    info!("  Input: {}", input.describe());
    info!("  Model: {:?}", config.model_path);

    if !json {
        println!("{}", "Prediction Configuration:".cyan().bold());
        println!("  📷 Input:   {}", input.describe());
        println!("  🧠 Model:   {}", config.model_path.display());
        println!("  🖥️  Backend: {}", backend_name());
        println!();
        println!("{}", "Loading model...".cyan());
    }

    let mut predictor = Predictor::<DefaultBackend>::new(config.clone(), default_device());
    predictor.setup().context("Failed to load model")?;

    let result = predictor.predict(input).context("Prediction failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!("{}", result.display());
        println!(
            "{} {} ({:.1}%)",
            "Result:".green().bold(),
            result.predicted_label.bold(),
            result.confidence * 100.0
        );
    }

    Ok(())
}

fn cmd_inspect(config: &PredictorConfig) -> Result<()> {
    println!("{}", "Loading model...".cyan());

    let service = PredictionService::<DefaultBackend>::load(config, &default_device())
        .context("Failed to load model")?;

    println!();
    println!("{}", "Checkpoint:".cyan().bold());
    println!("  File:     {}", config.model_path.display());
    println!("  Layout:   {}", service.layout());
    println!("  Backend:  {}", backend_name());
    println!("  Classes:  {}", service.num_classes());

    let labels_source = if config.class_names_path.exists() {
        config.class_names_path.display().to_string()
    } else {
        format!("generated ({}N)", config.fallback_label_prefix)
    };
    println!("  Labels:   {}", labels_source);

    let preview: Vec<&str> = service.class_names().iter().take(5).collect();
    let more = service.num_classes().saturating_sub(preview.len());
    if more > 0 {
        println!("            {} ... (+{} more)", preview.join(", "), more);
    } else {
        println!("            {}", preview.join(", "));
    }

    Ok(())
}
