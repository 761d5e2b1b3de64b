//! # Lorekeeper CLI (`lore`)
//!
//! ## Usage
//!
//! ```bash
//! lore --config ./config/lore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore init` | Create the SQLite database and index schema |
//! | `lore sync` | Index new and changed campaign files, drop deleted ones |
//! | `lore retrieve "<query>"` | Ranked passages for a query and progression state |
//! | `lore reset` | Forget the cache and every indexed chunk |
//! | `lore stats` | Index and cache counts |
//!
//! Logs go to stderr; set `RUST_LOG=lorekeeper=debug` for detail.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lorekeeper::retrieve::StateArgs;
use lorekeeper::{config, db, ingest, migrate, retrieve, stats, Lorekeeper};

/// Lorekeeper: spoiler-aware retrieval over a campaign corpus.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Lorekeeper: spoiler-aware retrieval over a tabletop campaign corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index new and changed files and remove deleted ones.
    Sync {
        /// Evict the cache first so every file is re-chunked. Stored
        /// vectors are still reused for unchanged chunks.
        #[arg(long)]
        full: bool,
    },

    /// Retrieve passages for a query.
    ///
    /// Without `--act` nothing is filtered by progression.
    Retrieve {
        query: String,

        /// Current act: `2`, `II` or `"Act II"`.
        #[arg(long)]
        act: Option<String>,

        #[arg(long)]
        arc: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Storyline branch the party is on.
        #[arg(long)]
        branch: Option<String>,

        /// Maximum passages (default: `retrieval.final_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Show similarity, score adjustment and tags per passage.
        #[arg(long)]
        explain: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Evict the cache and clear the collection.
    Reset,

    /// Show index and cache counts.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync { full } => {
            ingest::run_sync(&cfg, full).await?;
        }
        Commands::Retrieve {
            query,
            act,
            arc,
            location,
            branch,
            limit,
            explain,
            json,
        } => {
            let state = StateArgs {
                act,
                arc,
                location,
                branch,
            };
            retrieve::run_retrieve(&cfg, &query, &state, limit, explain, json).await?;
        }
        Commands::Reset => {
            let lore = Lorekeeper::open(&cfg).await?;
            let result = lore.reset().await;
            lore.close().await;
            println!("Reset: removed {} chunks.", result?);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
