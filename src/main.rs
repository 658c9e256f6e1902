//! partar CLI - parallel tar extraction

use clap::Parser;
use partar::config::{CliArgs, ExtractConfig};
use partar::core::Extractor;
use partar::error::{ExtractError, Result};
use partar::progress::ProgressReporter;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = match args.verbose {
        0 | 1 => "warn",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("partar={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    // Build configuration
    let config = ExtractConfig::from_cli(&args).map_err(ExtractError::Config)?;

    if config.verbose > 1 {
        print_config(&config);
    }

    let mut extractor = Extractor::new(config.clone());
    if config.progress {
        extractor = extractor.with_progress(ProgressReporter::new());
    }

    let summary = extractor.execute()?;

    // Print results
    if !config.quiet {
        summary.print(config.output_format)?;
    }

    Ok(())
}

fn print_config(config: &ExtractConfig) {
    eprintln!("=== Configuration ===");
    eprintln!("Archive:     {}", config.archive.display());
    eprintln!("Destination: {}", config.destination.display());
    eprintln!("Workers:     {}", config.effective_workers());
    eprintln!("Queue depth: {}", config.effective_queue_depth());
    eprintln!("Buffer:      {}", humansize::format_size(config.buffer_size as u64, humansize::BINARY));
    eprintln!("Update:      {}", config.update);
    eprintln!("Preallocate: {}", config.preallocate);
    eprintln!("Keep mtime:  {}", config.preserve_mtime);
    eprintln!();
}
