//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use smartocr::ocr::{ExtractionMode, OcrBackend, SmartOcr, TesseractBackend, TrocrBackend};
use smartocr::Config;

#[derive(Parser)]
#[command(name = "smartocr")]
#[command(about = "Extract printed or handwritten text from images")]
#[command(version)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON); discovered automatically when omitted
    #[arg(long, global = true, env = "SMARTOCR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from an image path or http(s) URL
    Extract {
        /// Image path or URL
        image: String,
        /// Extraction mode: printed, handwritten or auto
        #[arg(short, long, default_value = "auto")]
        mode: String,
        /// Print a JSON report (backend, decision, timing) instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Check whether the OCR backends are ready
    Check,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(&path)
            .await
            .map_err(anyhow::Error::msg)?,
        None => Config::load().await,
    };

    match cli.command {
        Commands::Extract { image, mode, json } => cmd_extract(config, image, &mode, json).await,
        Commands::Check => cmd_check(&config),
    }
}

async fn cmd_extract(config: Config, image: String, mode: &str, json: bool) -> anyhow::Result<()> {
    let mode: ExtractionMode = mode.parse()?;

    // Blocking HTTP and model inference run on the blocking pool.
    let extraction = tokio::task::spawn_blocking(move || {
        let ocr = SmartOcr::from_config(&config)?;
        ocr.extract_with(&image, mode)
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
    } else {
        println!("{}", extraction.text);
    }
    Ok(())
}

fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("OCR Backend Status").bold());
    println!("{}", "-".repeat(50));

    let tesseract = TesseractBackend::with_config(config.printed.clone());
    let tesseract_status = if tesseract.is_available() {
        style("✓ available").green()
    } else {
        style("✗ not available").red()
    };
    println!("  {:<15} {}", "Tesseract", tesseract_status);
    if !tesseract.is_available() {
        println!("                  {}", style(tesseract.availability_hint()).dim());
    }

    let trocr = TrocrBackend::with_config(config.handwritten.clone());
    let trocr_status = if trocr.is_available() {
        style("✓ available").green()
    } else {
        style("○ model will download on first use").yellow()
    };
    println!("  {:<15} {}", "TrOCR", trocr_status);
    println!("                  {}", style(trocr.availability_hint()).dim());

    println!(
        "\n  Auto mode threshold: mean luminance > {}",
        config.selector.threshold
    );
    if let Some(path) = &config.source_path {
        println!("  Config: {}", path.display());
    }
    println!();
    Ok(())
}
