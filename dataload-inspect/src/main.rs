//! Dataload inspector
//!
//! Runs a reader built from a TOML configuration and reports what it
//! produces, one log line per batch and a summary per epoch.
//!
//! # Usage
//!
//! ```bash
//! # Read one epoch
//! dataload-inspect --config loader.toml
//!
//! # Three epochs, first 10 batches each, as shard 1 of 4
//! dataload-inspect --config loader.toml --epochs 3 --max-batches 10 \
//!     --shard-index 1 --num-shards 4
//! ```

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataload_core::{Example, LoaderConfig, ReaderBuilder, TracingLogger};

/// Dataload inspector
#[derive(Parser, Debug)]
#[command(name = "dataload-inspect")]
#[command(about = "Reads a dataset through a dataload reader and reports batch statistics")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: String,

    /// Number of passes over the dataset
    #[arg(short, long, default_value = "1")]
    epochs: u64,

    /// Stop each epoch after this many batches
    #[arg(long)]
    max_batches: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override reader.batch_size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override reader.shard_index
    #[arg(long)]
    shard_index: Option<usize>,

    /// Override reader.num_shards
    #[arg(long)]
    num_shards: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = LoaderConfig::from_file(&args.config)?.with_env_overrides();
    if let Some(batch_size) = args.batch_size {
        config.reader.batch_size = batch_size;
    }
    if let Some(shard_index) = args.shard_index {
        config.reader.shard_index = shard_index;
    }
    if let Some(num_shards) = args.num_shards {
        config.reader.num_shards = num_shards;
    }

    tracing::info!("Starting dataload inspector");
    tracing::info!("  Config: {}", args.config);
    tracing::info!("  Format: {}", config.format.name());
    tracing::info!("  Batch size: {}", config.reader.batch_size);
    tracing::info!(
        "  Shard: {}/{}",
        config.reader.shard_index,
        config.reader.num_shards
    );

    let mut reader = ReaderBuilder::with_config(&config)?
        .logger(Arc::new(TracingLogger))
        .build()?;

    if let Some(schema) = reader.schema()? {
        tracing::info!("Schema: {}", schema);
    } else {
        tracing::info!("The dataset is empty");
    }

    for epoch in 0..args.epochs {
        if epoch > 0 {
            reader.restart()?;
        }

        let started = Instant::now();
        let mut batches = 0u64;
        let mut instances = 0usize;

        while args.max_batches.map_or(true, |max| batches < max) {
            let Some(example) = reader.read()? else {
                break;
            };
            log_batch(epoch, batches, &example);
            batches += 1;
            instances += example.batch_size();
        }

        let elapsed = started.elapsed();
        tracing::info!(
            "Epoch {} done: {} batch(es), {} instance(s) in {:.3}s ({:.0} instances/s)",
            epoch,
            batches,
            instances,
            elapsed.as_secs_f64(),
            instances as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        );
    }

    reader.close();
    Ok(())
}

fn log_batch(epoch: u64, index: u64, example: &Example) {
    let shapes: Vec<String> = example
        .iter()
        .map(|(attribute, tensor)| format!("{}{:?}", attribute.name(), tensor.shape()))
        .collect();
    tracing::info!(
        epoch,
        batch = index,
        size = example.batch_size(),
        "{}",
        shapes.join(" ")
    );
}
