use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;

use crate::db::{self, create_pool};
use crate::services::features::build_training_data;
use crate::services::predictor::predict_date;
use crate::services::reconcile::{build_reciprocal, build_sdv_kagglestyle};
use crate::services::sdv_fetcher::SdvFetcher;
use crate::services::trainer::train_and_save;

pub async fn ingest_kaggle(csv_path: &str) -> Result<()> {
    let pool = create_pool().await?;
    db::init_database_with_pool(&pool).await?;

    println!("📥 Loading historical boxscores from {}...", csv_path);
    let n = db::ingest::load_kaggle_csv(&pool, Path::new(csv_path)).await?;
    println!("✅ Loaded {} rows into boxscores_kaggle", n);

    Ok(())
}

pub async fn ingest_sdv(seasons: &[i64]) -> Result<()> {
    let pool = create_pool().await?;
    db::init_database_with_pool(&pool).await?;
    let fetcher = SdvFetcher::new();

    for &season in seasons {
        println!("📥 Fetching season {} team boxscores...", season);
        let n = fetcher.fetch_season_boxscores(&pool, season).await?;
        println!("✅ Stored {} boxscore rows for {}", n, season);
    }

    Ok(())
}

pub async fn ingest_schedule(seasons: &[i64]) -> Result<()> {
    let pool = create_pool().await?;
    db::init_database_with_pool(&pool).await?;
    let fetcher = SdvFetcher::new();

    for &season in seasons {
        println!("📥 Fetching season {} schedule...", season);
        let n = fetcher.fetch_season_schedule(&pool, season).await?;
        println!("✅ Stored {} schedule rows for {}", n, season);
    }

    Ok(())
}

/// Rebuilds every derived boxscore table: the live data projected into the
/// historical layout, then both reciprocal expansions.
pub async fn reconcile() -> Result<()> {
    let pool = create_pool().await?;

    println!("🔧 Projecting live boxscores into the historical layout...");
    build_sdv_kagglestyle(&pool).await?;

    println!("🔧 Building reciprocal tables...");
    let n_kaggle =
        build_reciprocal(&pool, "boxscores_kaggle", "boxscores_kaggle_reciprocal").await?;
    let n_sdv = build_reciprocal(
        &pool,
        "boxscores_sdv_kagglestyle",
        "boxscores_sdv_kagglestyle_reciprocal",
    )
    .await?;
    println!(
        "✅ Reciprocal tables rebuilt ({} historical rows, {} live rows)",
        n_kaggle, n_sdv
    );

    Ok(())
}

pub async fn build_features() -> Result<()> {
    let pool = create_pool().await?;

    println!("🔧 Building training data from historical boxscores...");
    let n_kaggle = build_training_data(
        &pool,
        "boxscores_kaggle_reciprocal",
        "training_data_kaggle",
    )
    .await?;
    println!("✅ {} rows in training_data_kaggle", n_kaggle);

    println!("🔧 Building training data from live boxscores...");
    let n_sdv = build_training_data(
        &pool,
        "boxscores_sdv_kagglestyle_reciprocal",
        "training_data_sdv",
    )
    .await?;
    println!("✅ {} rows in training_data_sdv", n_sdv);

    Ok(())
}

pub async fn train() -> Result<()> {
    let pool = create_pool().await?;

    println!("🏋️ Training spread ensemble (this takes a while)...");
    let model_id = train_and_save(&pool, "training_data_kaggle").await?;
    println!("✅ Saved ensemble {}", model_id);
    println!("💡 Predict with: hoopcast predict <date> {}", model_id);

    Ok(())
}

pub async fn predict(date: NaiveDate, model_id: &str) -> Result<()> {
    let pool = create_pool().await?;

    println!("🔮 Predicting games on {} with ensemble {}...", date, model_id);
    let predictions = predict_date(&pool, date, model_id).await?;

    if predictions.is_empty() {
        println!("📭 No predictions written (no games, or no feature history)");
        return Ok(());
    }

    println!("\n🎯 Predicted spreads (home perspective):");
    for p in &predictions {
        println!(
            "   {} vs {}: {:+.1}",
            p.home_display_name, p.away_display_name, p.pred_spread
        );
    }
    println!("\n✅ {} predictions appended", predictions.len());

    Ok(())
}
