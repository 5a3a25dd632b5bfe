//! CaskKV CLI
//!
//! Command-line interface that opens a data directory and runs one command
//! against the engine.

use std::process::ExitCode;

use caskkv::{CaskError, Config, Engine};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// CaskKV CLI
#[derive(Parser, Debug)]
#[command(name = "caskkv-cli")]
#[command(about = "CLI for the CaskKV storage engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./caskkv_data")]
    data_dir: String,

    /// Maximum segment size in MB before rotation
    #[arg(short = 's', long, default_value = "8")]
    max_segment_mb: u64,

    /// Never compact in the background
    #[arg(long)]
    no_auto_compaction: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Run a compaction pass now
    Compact,

    /// Print engine statistics
    Stats,

    /// Write a duplicate-heavy workload, then read every key back
    Load {
        /// Number of distinct keys to write
        #[arg(short, long, default_value = "1500")]
        count: usize,

        /// Key size in bytes
        #[arg(short, long, default_value = "50")]
        key_size: usize,

        /// Value size in bytes
        #[arg(short = 'v', long, default_value = "5000")]
        value_size: usize,

        /// Also overwrite an earlier key every N writes (0 = never)
        #[arg(long, default_value = "1")]
        dup_every: usize,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caskkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_segment_size(args.max_segment_mb * 1024 * 1024)
        .auto_compaction(!args.no_auto_compaction)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&engine, args.command);
    if let Err(e) = engine.close() {
        tracing::warn!("Error while closing engine: {}", e);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CaskError::KeyNotFound) => {
            eprintln!("(not found)");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> caskkv::Result<()> {
    match command {
        Commands::Get { key } => {
            let value = engine.read(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, value } => {
            engine.write(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Compact => {
            let report = engine.compact()?;
            println!("{:#?}", report);
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("{:#?}", stats);
            if let Some(amp) = stats.amplification() {
                println!("space amplification: {:.2}", amp);
            }
        }
        Commands::Load {
            count,
            key_size,
            value_size,
            dup_every,
        } => load(engine, count, key_size, value_size, dup_every)?,
    }
    Ok(())
}

/// Deterministic load: key `i` gets generation 0, and every `dup_every`
/// writes key `i / 2` is rewritten with the next generation.
fn load(
    engine: &Engine,
    count: usize,
    key_size: usize,
    value_size: usize,
    dup_every: usize,
) -> caskkv::Result<()> {
    let make_key = |i: usize| padded(format!("key-{}", i), key_size);
    let make_value = |i: usize, gen: usize| padded(format!("value-{}-{}", i, gen), value_size);

    let mut generations = vec![0usize; count];
    for i in 0..count {
        engine.write(&make_key(i), &make_value(i, 0))?;

        if dup_every > 0 && (i + 1) % dup_every == 0 {
            let target = i / 2;
            generations[target] += 1;
            engine.write(&make_key(target), &make_value(target, generations[target]))?;
        }
    }

    for (i, &gen) in generations.iter().enumerate() {
        let stored = engine.read(&make_key(i))?;
        if stored != make_value(i, gen) {
            return Err(CaskError::Storage(format!("value mismatch for key {}", i)));
        }
    }

    tracing::info!(keys = count, "load complete, all values verified");
    println!("{:#?}", engine.stats());
    Ok(())
}

/// `text` right-padded (or cut) to exactly `len` bytes
fn padded(text: String, len: usize) -> Vec<u8> {
    let mut bytes = text.into_bytes();
    bytes.resize(len, b'.');
    bytes
}
