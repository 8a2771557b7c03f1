mod cli;
mod db;
mod models;
mod services;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hoopcast")]
#[command(about = "NCAA basketball spread-prediction pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    InitDb,
    /// Ingest raw boxscore and schedule data
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },
    /// Rebuild the kagglestyle projection and both reciprocal tables
    Reconcile,
    /// Rebuild the training-data tables
    BuildFeatures,
    /// Cross-validate and train the spread ensemble
    Train,
    /// Predict every game scheduled on a date
    Predict {
        /// Game date (YYYY-MM-DD)
        date: NaiveDate,
        /// Training-run identifier (directory name under the models dir)
        model_id: String,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Load the historical detailed-results CSV
    Kaggle {
        #[arg(long)]
        csv: String,
    },
    /// Fetch per-team boxscores from the live data feed
    Sdv {
        #[arg(long, value_delimiter = ',', required = true)]
        seasons: Vec<i64>,
    },
    /// Fetch the schedule from the live data feed
    Schedule {
        #[arg(long, value_delimiter = ',', required = true)]
        seasons: Vec<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            tracing::info!("Initializing database...");
            db::init_database().await?;
        }
        Commands::Ingest { source } => match source {
            IngestSource::Kaggle { csv } => cli::ingest_kaggle(&csv).await?,
            IngestSource::Sdv { seasons } => cli::ingest_sdv(&seasons).await?,
            IngestSource::Schedule { seasons } => cli::ingest_schedule(&seasons).await?,
        },
        Commands::Reconcile => cli::reconcile().await?,
        Commands::BuildFeatures => cli::build_features().await?,
        Commands::Train => cli::train().await?,
        Commands::Predict { date, model_id } => cli::predict(date, &model_id).await?,
    }

    Ok(())
}
