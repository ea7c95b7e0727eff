use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

/// lexis - spaced-repetition vocabulary scheduler
#[derive(Parser)]
#[command(name = "lexis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spaced-repetition scheduling for vocabulary learning", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database and default configuration
    Init,

    /// Show data directory, catalog size and effective configuration
    Status,

    /// Load vocabulary items from a JSON array (upsert by id)
    Import {
        /// Input file path
        input: PathBuf,
    },

    /// Set the language a learner is studying
    Learner {
        /// Learner identifier
        id: String,
        /// Language code, e.g. it, es, fr
        #[arg(long)]
        language: String,
    },

    /// List the next review session for a learner
    Session {
        #[arg(long)]
        learner: String,
        /// Number of items (defaults to session.default_size)
        #[arg(long)]
        size: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Grade one review and reschedule the item
    Review {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        item: String,
        /// Recall quality, 0 (blackout) to 5 (perfect)
        #[arg(long, allow_hyphen_values = true)]
        quality: i64,
        /// How long the learner took to answer
        #[arg(long)]
        response_time_ms: Option<u64>,
        #[arg(long)]
        json: bool,
    },

    /// Show a learner's progress statistics
    Stats {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        json: bool,
    },

    /// Show the interval each quality rating would give an item
    Preview {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        item: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Keep stdout clean for --json
        .init();

    match cli.command {
        Commands::Init => {
            info!("Initializing lexis");
            commands::init().await?;
        }
        Commands::Status => {
            commands::show_status().await?;
        }
        Commands::Import { input } => {
            commands::import(input).await?;
        }
        Commands::Learner { id, language } => {
            commands::set_language(id, language).await?;
        }
        Commands::Session { learner, size, json } => {
            commands::session(learner, size, json).await?;
        }
        Commands::Review {
            learner,
            item,
            quality,
            response_time_ms,
            json,
        } => {
            commands::review(learner, item, quality, response_time_ms, json).await?;
        }
        Commands::Stats { learner, json } => {
            commands::stats(learner, json).await?;
        }
        Commands::Preview { learner, item } => {
            commands::preview(learner, item).await?;
        }
    }

    Ok(())
}
