//! Inference: load a persisted ensemble, rebuild the training-time feature
//! vector for each scheduled game on a date, and append ensemble-mean spread
//! predictions.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::db::insert_prediction;
use crate::models::GamePrediction;
use crate::services::features::{feature_vector, team_features_by_id};
use crate::services::gbm::GbmRegressor;
use crate::services::trainer::{member_path, model_base_dir, ENSEMBLE_SIZE};

/// Inference failures that must stop the run rather than degrade silently.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Averaging fewer members than were trained would skew the prediction,
    /// so a short ensemble is fatal at load time.
    #[error("ensemble {model_id} is incomplete: missing artifact {missing}")]
    EnsembleIncomplete { model_id: String, missing: PathBuf },
}

/// Loads all members of a persisted ensemble, failing fast if any artifact
/// is absent.
pub fn load_ensemble(model_id: &str) -> Result<Vec<GbmRegressor>> {
    let base = model_base_dir();
    let mut members = Vec::with_capacity(ENSEMBLE_SIZE);
    for i in 0..ENSEMBLE_SIZE {
        let path = member_path(&base, model_id, i);
        if !path.exists() {
            return Err(PredictError::EnsembleIncomplete {
                model_id: model_id.to_string(),
                missing: path,
            }
            .into());
        }
        members.push(GbmRegressor::load(&path)?);
    }
    Ok(members)
}

/// One schedule row in the shape inference needs: t1 is always the home
/// side, so `location` is 1 (or 0 at a neutral venue).
#[derive(Debug, Clone)]
pub struct ScheduledGame {
    pub season: i64,
    pub daynum: i64,
    pub id: i64,
    pub game_id: i64,
    pub t1_teamid: i64,
    pub t2_teamid: i64,
    pub home_display_name: String,
    pub away_display_name: String,
    pub location: i64,
}

pub async fn scheduled_games(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<ScheduledGame>> {
    let rows = sqlx::query(
        r#"SELECT season, daynum, id, game_id, home_id, away_id,
                  home_display_name, away_display_name, neutral_site
           FROM schedule_sdv
           WHERE date(start_date) = ?
           ORDER BY id"#,
    )
    .bind(date.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| ScheduledGame {
            season: r.get("season"),
            daynum: r.get("daynum"),
            id: r.get("id"),
            game_id: r.get("game_id"),
            t1_teamid: r.get("home_id"),
            t2_teamid: r.get("away_id"),
            home_display_name: r.get("home_display_name"),
            away_display_name: r.get("away_display_name"),
            location: if r.get::<bool, _>("neutral_site") { 0 } else { 1 },
        })
        .collect())
}

/// Predicts every game scheduled on `date` with the ensemble `model_id` and
/// appends one `predictions` row per game. Games where either side has no
/// prior games this season are skipped with a warning — features are never
/// zero-filled. Returns the rows written.
pub async fn predict_date(
    pool: &SqlitePool,
    date: NaiveDate,
    model_id: &str,
) -> Result<Vec<GamePrediction>> {
    let members = load_ensemble(model_id)?;

    let games = scheduled_games(pool, date).await?;
    if games.is_empty() {
        tracing::warn!("No scheduled games on {}", date);
        return Ok(Vec::new());
    }

    // Features are as-of each game's own day; schedules can straddle a
    // season boundary, so group rather than assume one (season, daynum).
    let mut by_day: BTreeMap<(i64, i64), Vec<&ScheduledGame>> = BTreeMap::new();
    for g in &games {
        by_day.entry((g.season, g.daynum)).or_default().push(g);
    }

    let mut written = Vec::new();
    for ((season, daynum), day_games) in by_day {
        let features = team_features_by_id(
            pool,
            "boxscores_sdv_kagglestyle_reciprocal",
            season,
            daynum,
        )
        .await?;

        for g in day_games {
            let (t1, t2) = match (features.get(&g.t1_teamid), features.get(&g.t2_teamid)) {
                (Some(t1), Some(t2)) => (t1, t2),
                _ => {
                    tracing::warn!(
                        "Skipping {} vs {}: no feature history for one side",
                        g.home_display_name,
                        g.away_display_name
                    );
                    continue;
                }
            };

            let x = feature_vector(t1, t2, g.daynum, g.location);
            let pred_spread =
                members.iter().map(|m| m.predict_one(&x)).sum::<f64>() / members.len() as f64;

            let prediction = GamePrediction {
                t1_teamid: g.t1_teamid,
                t2_teamid: g.t2_teamid,
                pred_spread,
                season: g.season,
                daynum: g.daynum,
                id: g.id,
                game_id: g.game_id,
                home_display_name: g.home_display_name.clone(),
                away_display_name: g.away_display_name.clone(),
            };
            insert_prediction(pool, &prediction).await?;

            tracing::info!(
                "{} vs {}: predicted spread {:+.1}",
                prediction.home_display_name,
                prediction.away_display_name,
                prediction.pred_spread
            );
            written.push(prediction);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_reciprocal_table, init_database_with_pool, insert_reciprocal_rows, insert_schedule_game};
    use crate::models::{ReciprocalRow, ScheduleGame, StatLine};
    use crate::services::gbm::{GbmParams, GbmRegressor};
    use crate::services::reconcile::mirror;
    use std::path::Path;

    // One shared artifact dir for the whole test process; tests distinguish
    // themselves by model_id so setting the env var is idempotent.
    fn test_model_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hoopcast-models-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::env::set_var("HOOPCAST_MODEL_DIR", &dir);
        dir
    }

    fn write_members(dir: &Path, model_id: &str, count: usize) {
        std::fs::create_dir_all(dir.join(model_id)).unwrap();
        let mut model = GbmRegressor::new(GbmParams {
            subsample: 1.0,
            colsample_bytree: 1.0,
            num_parallel_tree: 1,
            min_child_weight: 1.0,
            gamma: 0.0,
            ..GbmParams::default()
        });
        let xs: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64; 42]).collect();
        let ys: Vec<f64> = (0..10).map(|i| i as f64).collect();
        model.fit(&xs, &ys, 3, 0);
        for i in 0..count {
            model.save(&member_path(dir, model_id, i)).unwrap();
        }
    }

    #[test]
    fn short_ensemble_fails_fast_at_load() {
        let dir = test_model_dir();
        write_members(&dir, "20240101000000", ENSEMBLE_SIZE - 1);

        let err = load_ensemble("20240101000000").unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }

    #[test]
    fn complete_ensemble_loads_all_members() {
        let dir = test_model_dir();
        write_members(&dir, "20240102000000", ENSEMBLE_SIZE);

        let members = load_ensemble("20240102000000").unwrap();
        assert_eq!(members.len(), ENSEMBLE_SIZE);
    }

    fn flat_stats(v: i64) -> StatLine {
        StatLine {
            fgm: v,
            fga: v,
            fgm3: v,
            fga3: v,
            ftm: v,
            fta: v,
            or_: v,
            dr: v,
            ast: v,
            to_: v,
            stl: v,
            blk: v,
            pf: v,
        }
    }

    fn schedule_row(id: i64, home: i64, away: i64, neutral: bool) -> ScheduleGame {
        ScheduleGame {
            id,
            uid: format!("s:{}", id),
            date: "2024-02-01T00:00Z".to_string(),
            neutral_site: neutral,
            start_date: "2024-02-01T19:00:00+00:00".to_string(),
            venue_full_name: None,
            status_type_completed: false,
            home_id: home,
            home_location: None,
            home_name: None,
            home_abbreviation: None,
            home_display_name: format!("Home {}", home),
            home_short_display_name: None,
            home_score: None,
            home_winner: None,
            away_id: away,
            away_location: None,
            away_name: None,
            away_abbreviation: None,
            away_display_name: format!("Away {}", away),
            away_short_display_name: None,
            away_score: None,
            away_winner: None,
            game_id: id,
            season: 2024,
            season_type: 2,
            game_date: "2024-02-01".to_string(),
            season_start_date: "2023-11-06".to_string(),
            daynum: 87,
        }
    }

    #[tokio::test]
    async fn predict_date_appends_rows_and_skips_historyless_teams() {
        let dir = test_model_dir();
        write_members(&dir, "20240103000000", ENSEMBLE_SIZE);

        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_database_with_pool(&pool).await.unwrap();
        create_reciprocal_table(&pool, "boxscores_sdv_kagglestyle_reciprocal")
            .await
            .unwrap();

        // Teams 10 and 20 have history; team 30 does not.
        let prior = ReciprocalRow {
            season: 2024,
            daynum: 80,
            t1_teamid: 10,
            t1_score: 80,
            t2_teamid: 20,
            t2_score: 70,
            location: 1,
            numot: 0,
            t1: flat_stats(25),
            t2: flat_stats(22),
        };
        insert_reciprocal_rows(
            &pool,
            "boxscores_sdv_kagglestyle_reciprocal",
            &[prior.clone(), mirror(&prior)],
        )
        .await
        .unwrap();

        insert_schedule_game(&pool, &schedule_row(1, 10, 20, false))
            .await
            .unwrap();
        insert_schedule_game(&pool, &schedule_row(2, 10, 30, true))
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let written = predict_date(&pool, date, "20240103000000").await.unwrap();

        // Only the game between teams with history gets a prediction.
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].t1_teamid, 10);
        assert_eq!(written[0].t2_teamid, 20);
        assert!(written[0].pred_spread.is_finite());

        assert_eq!(crate::db::count_rows(&pool, "predictions").await.unwrap(), 1);
    }
}
