//! Tokenizer Cache - Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokenizer_cache::manager::ListEntry;
use tokenizer_cache::models::format_size;
use tokenizer_cache::{
    BatchSummary, CacheConfig, CacheManager, CleanOutcome, FetchOutcome, FixedAnswer,
    HfHubClient, ListReport, Presence, PreloadReport, VerifyReport, VerifyStatus,
};

#[derive(Parser, Debug)]
#[command(name = "tokenizer-cache")]
#[command(about = "Offline tokenizer cache manager for TEI", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every registry model, scan the cache and write the manifest
    Preload,
    /// List models recorded in the manifest
    List,
    /// Force re-download of one model
    Update {
        /// Model id, e.g. BAAI/bge-small-en-v1.5
        #[arg(long)]
        model: String,
    },
    /// Force re-download of every model in the manifest
    UpdateAll,
    /// Check that every recorded model loads offline
    Verify {
        /// Repair invalid models without prompting
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete all cached models
    Clean {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for reports
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let config = CacheConfig::load(cli.config)?;
    config.validate()?;

    tracing::debug!(
        cache_dir = ?config.cache_dir,
        models = config.models.len(),
        "Configuration loaded"
    );

    let hub = Arc::new(HfHubClient::from_config(&config)?);
    let mut manager = CacheManager::new(config, hub.clone(), hub);

    match cli.command {
        Command::Preload => {
            let report = manager.preload().await?;
            print_preload(&report, manager.config().min_success_ratio);
        }
        Command::List => {
            let report = manager.list().await?;
            print_list(&report);
        }
        Command::Update { model } => {
            println!("Updating {}", model);
            let outcome = manager.update(&model).await?;
            print_outcome(&model, &outcome);
        }
        Command::UpdateAll => {
            let summary = manager.update_all().await?;
            if summary.total() == 0 {
                println!("No downloaded models found");
            } else {
                print_summary("Update complete", &summary);
            }
        }
        Command::Verify { yes } => {
            if yes {
                manager = manager.with_confirm(Arc::new(FixedAnswer(true)));
            }
            let report = manager.verify().await?;
            print_verify(&report);
            if let Some(repairs) = manager.repair(&report).await? {
                print_summary("Repair complete", &repairs);
            }
        }
        Command::Clean { yes } => {
            if yes {
                manager = manager.with_confirm(Arc::new(FixedAnswer(true)));
            }
            match manager.clean().await? {
                CleanOutcome::Declined => println!("Clean cancelled"),
                CleanOutcome::Cleaned { removed } => {
                    println!("Cache cleaned ({} entries removed)", removed)
                }
            }
        }
    }

    Ok(())
}

fn print_outcome(model_id: &str, outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::Ok { probe } => {
            println!("  ok  {}", model_id);
            println!(
                "      probe '{}' -> {} tokens",
                probe.text, probe.token_count
            );
        }
        other => println!("  err {} ({})", model_id, other),
    }
}

fn print_summary(title: &str, summary: &BatchSummary) {
    println!();
    println!(
        "{}: {}/{} succeeded",
        title,
        summary.success_count(),
        summary.total()
    );

    let failures: Vec<_> = summary.failures().collect();
    if !failures.is_empty() {
        println!("Failed models:");
        for failure in failures {
            println!("  - {} ({})", failure.model_id, failure.outcome);
        }
    }
}

fn print_preload(report: &PreloadReport, min_success_ratio: f64) {
    for result in &report.summary.results {
        print_outcome(&result.model_id, &result.outcome);
    }
    print_summary("Preload complete", &report.summary);

    let structure = &report.structure;
    println!();
    println!(
        "Cache files: {} total, {} tokenizer, {} config",
        structure.total_files, structure.tokenizer_files, structure.config_files
    );
    if !structure.has_tokenizers() {
        println!("Warning: no tokenizer files found in cache");
    }

    if report.below_threshold {
        println!(
            "Warning: success ratio {:.1}% is below {:.1}%, some models may be unavailable offline",
            report.summary.success_ratio() * 100.0,
            min_success_ratio * 100.0
        );
    }
}

fn print_list(report: &ListReport) {
    println!("Downloaded models ({}):", report.entries.len());

    for ListEntry { model_id, presence } in &report.entries {
        match presence {
            Presence::Present { size_bytes } => {
                println!("  ok  {} ({})", model_id, format_size(*size_bytes))
            }
            Presence::Missing => println!("  err {} (cache missing)", model_id),
        }
    }

    if let Some(updated) = report.last_updated {
        println!();
        println!(
            "Last updated: {}",
            updated
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn print_verify(report: &VerifyReport) {
    for entry in &report.entries {
        match &entry.status {
            VerifyStatus::Valid => println!("  ok  {}", entry.model_id),
            VerifyStatus::Missing => println!("  err {} (cache missing)", entry.model_id),
            VerifyStatus::Invalid { reason } => {
                println!("  err {} ({})", entry.model_id, reason)
            }
        }
    }

    let invalid: Vec<_> = report.invalid().collect();
    println!();
    println!("Valid: {}/{}", report.valid_count(), report.entries.len());
    println!("Invalid: {}", invalid.len());

    if !invalid.is_empty() {
        println!();
        println!("Models needing repair:");
        for entry in invalid {
            println!("  - {}", entry.model_id);
        }
    }
}
