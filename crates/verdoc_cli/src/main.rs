//! VerDoc CLI
//!
//! Command-line tools for inspecting a file-backed VerDoc store.
//!
//! # Commands
//!
//! - `get` - Print one document snapshot
//! - `ops` - Print a document's operations by version
//! - `history` - Print a document's operation chain
//! - `query` - Run a Mongo-style query against a collection
//! - `drop` - Drop a collection

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// VerDoc command-line store tools.
#[derive(Parser)]
#[command(name = "verdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Partition key prefix
    #[arg(global = true, long, default_value = verdoc_core::DEFAULT_KEY_PREFIX)]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one document snapshot
    Get {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },

    /// Print a document's operations
    Ops {
        /// Collection name
        collection: String,
        /// Document id
        id: String,

        /// First version to print
        #[arg(long, default_value = "1")]
        from: u64,

        /// Stop before this version
        #[arg(long)]
        to: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print a document's operation chain, newest first
    History {
        /// Collection name
        collection: String,
        /// Document id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a query against a collection
    Query {
        /// Collection name
        collection: String,
        /// Query object as JSON
        query: String,

        /// Comma-separated data fields to keep
        #[arg(long)]
        fields: Option<String>,
    },

    /// Drop a collection
    Drop {
        /// Collection name
        collection: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = cli.path;
    let prefix = cli.prefix;
    match cli.command {
        Commands::Get { collection, id } => {
            let path = path.ok_or("Store path required for get")?;
            let db = commands::open(&path, &prefix).await?;
            commands::get::run(&db, &collection, &id).await?;
        }
        Commands::Ops {
            collection,
            id,
            from,
            to,
            format,
        } => {
            let path = path.ok_or("Store path required for ops")?;
            let db = commands::open(&path, &prefix).await?;
            commands::ops::run(&db, &collection, &id, from, to, &format).await?;
        }
        Commands::History {
            collection,
            id,
            format,
        } => {
            let path = path.ok_or("Store path required for history")?;
            let db = commands::open(&path, &prefix).await?;
            commands::ops::history(&db, &collection, &id, &format).await?;
        }
        Commands::Query {
            collection,
            query,
            fields,
        } => {
            let path = path.ok_or("Store path required for query")?;
            let db = commands::open(&path, &prefix).await?;
            commands::query::run(&db, &collection, &query, fields.as_deref()).await?;
        }
        Commands::Drop { collection } => {
            let path = path.ok_or("Store path required for drop")?;
            let db = commands::open(&path, &prefix).await?;
            commands::drop::run(&db, &collection).await?;
        }
        Commands::Version => {
            println!("VerDoc CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("VerDoc Core v{}", verdoc_core::VERSION);
        }
    }

    Ok(())
}
