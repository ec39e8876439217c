//! caskdb CLI
//!
//! Opens a store directory, runs one command and closes the store.

use std::path::PathBuf;

use caskdb::config::megabytes_to_bytes;
use caskdb::{Config, DataStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// caskdb CLI
#[derive(Parser, Debug)]
#[command(name = "caskdb-cli")]
#[command(about = "CLI for the caskdb key-value store")]
#[command(version)]
struct Args {
    /// Data directory (created if missing)
    #[arg(short, long, default_value = "./caskdb_data")]
    data_dir: PathBuf,

    /// Segment size threshold in MB before rotation
    #[arg(short = 's', long, default_value = "64")]
    segment_size_mb: u64,

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

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    Keys,

    /// Compact archived segments
    Merge,

    /// Show segment and key counts
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caskdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> caskdb::Result<()> {
    std::fs::create_dir_all(&args.data_dir)?;

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_size_threshold(megabytes_to_bytes(args.segment_size_mb)?)
        .build();
    let mut store = DataStore::open(config)?;

    match args.command {
        Commands::Get { key } => match store.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            store.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Keys => {
            for key in store.keys() {
                println!("{}", String::from_utf8_lossy(key));
            }
        }
        Commands::Merge => {
            let report = store.merge()?;
            println!(
                "merged {} segments into {} ({} records, {} → {} bytes)",
                report.segments_merged,
                report.segments_written,
                report.records_copied,
                report.bytes_before,
                report.bytes_after
            );
        }
        Commands::Stats => {
            println!("keys:              {}", store.len());
            println!("active segment:    {}", store.active_segment_id());
            println!("archived segments: {:?}", store.archived_segment_ids());
            println!("disk bytes:        {}", store.disk_size());
            println!("merge interval:    {}s", store.merge_interval().as_secs());
        }
    }

    store.close()
}
