//! Trailing-window team aggregates and training-data construction.
//!
//! This is the heart of the pipeline: raw reciprocal boxscores become, for
//! every (season, daynum) actually observed, one feature row per team built
//! from strictly prior games, then joined back onto that day's games to form
//! labelled training examples.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db::{
    create_training_table, distinct_season_daynums, fetch_reciprocal_rows_at,
    insert_training_examples, validate_table,
};
use crate::models::{TeamFeatures, TrainingExample};

/// Length of the win-ratio window, in calendar days.
pub const WIN_RATIO_WINDOW_DAYS: i64 = 14;

/// Day-of-season cutoff below which examples are considered to have too
/// little history and are excluded from training.
pub const MIN_TRAINING_DAYNUM: i64 = 90;

/// The positional feature layout consumed by the models. Training and
/// inference both assemble vectors through [`feature_vector`], so the two
/// can never drift apart; this list exists for the trainer's column SELECT
/// and for humans reading the artifacts.
pub fn feature_columns() -> Vec<String> {
    let mut cols = Vec::with_capacity(2 * TeamFeatures::MEAN_COLUMNS.len() + 4);
    for side in ["t1", "t2"] {
        for c in TeamFeatures::MEAN_COLUMNS {
            cols.push(format!("{}_{}", side, c));
        }
    }
    cols.push("t1_win_ratio_14d".to_string());
    cols.push("t2_win_ratio_14d".to_string());
    cols.push("daynum".to_string());
    cols.push("location".to_string());
    cols
}

/// Assembles the model input for one game: both sides' mean blocks, both
/// win ratios, the day number, and the subject's location indicator.
pub fn feature_vector(t1: &TeamFeatures, t2: &TeamFeatures, daynum: i64, location: i64) -> Vec<f64> {
    let mut x = Vec::with_capacity(2 * TeamFeatures::MEAN_COLUMNS.len() + 4);
    x.extend(t1.mean_values());
    x.extend(t2.mean_values());
    x.push(t1.win_ratio_14d);
    x.push(t2.win_ratio_14d);
    x.push(daynum as f64);
    x.push(location as f64);
    x
}

/// Trailing aggregates for every team with at least one game strictly before
/// `daynum` in `season`. Teams with no prior games are absent from the
/// result — the caller decides whether that means NULL or skip, never 0.
///
/// The win ratio covers the trailing 14-calendar-day window
/// `[daynum - 14, daynum)` and is 0 when no games fall inside it.
pub async fn team_features(
    pool: &SqlitePool,
    table: &str,
    season: i64,
    daynum: i64,
) -> Result<Vec<TeamFeatures>> {
    let table = validate_table(table)?;

    let sql = format!(
        r#"
        SELECT
            agg.team_id AS team_id,
            agg.fgm_mean, agg.fga_mean, agg.fgm3_mean, agg.fga3_mean,
            agg.or_mean, agg.ast_mean, agg.to_mean, agg.stl_mean, agg.pf_mean,
            agg.opp_fgm_mean, agg.opp_fga_mean, agg.opp_fgm3_mean, agg.opp_fga3_mean,
            agg.opp_or_mean, agg.opp_ast_mean, agg.opp_to_mean, agg.opp_stl_mean,
            agg.opp_blk_mean, agg.point_diff_mean,
            COALESCE(win.win_ratio_14d, 0.0) AS win_ratio_14d
        FROM (
            SELECT
                t1_teamid AS team_id,
                AVG(t1_fgm) AS fgm_mean,
                AVG(t1_fga) AS fga_mean,
                AVG(t1_fgm3) AS fgm3_mean,
                AVG(t1_fga3) AS fga3_mean,
                AVG(t1_or) AS or_mean,
                AVG(t1_ast) AS ast_mean,
                AVG(t1_to) AS to_mean,
                AVG(t1_stl) AS stl_mean,
                AVG(t1_pf) AS pf_mean,
                AVG(t2_fgm) AS opp_fgm_mean,
                AVG(t2_fga) AS opp_fga_mean,
                AVG(t2_fgm3) AS opp_fgm3_mean,
                AVG(t2_fga3) AS opp_fga3_mean,
                AVG(t2_or) AS opp_or_mean,
                AVG(t2_ast) AS opp_ast_mean,
                AVG(t2_to) AS opp_to_mean,
                AVG(t2_stl) AS opp_stl_mean,
                AVG(t2_blk) AS opp_blk_mean,
                AVG(t1_score - t2_score) AS point_diff_mean
            FROM {table}
            WHERE season = ? AND daynum < ?
            GROUP BY t1_teamid
        ) agg
        LEFT JOIN (
            SELECT
                t1_teamid AS team_id,
                CAST(SUM(CASE WHEN t1_score > t2_score THEN 1 ELSE 0 END) AS REAL)
                    / COUNT(*) AS win_ratio_14d
            FROM {table}
            WHERE season = ? AND daynum >= ? - {window} AND daynum < ?
            GROUP BY t1_teamid
        ) win ON win.team_id = agg.team_id
        ORDER BY agg.team_id
        "#,
        table = table,
        window = WIN_RATIO_WINDOW_DAYS,
    );

    let features = sqlx::query_as::<_, TeamFeatures>(&sql)
        .bind(season)
        .bind(daynum)
        .bind(season)
        .bind(daynum)
        .bind(daynum)
        .fetch_all(pool)
        .await?;
    Ok(features)
}

/// Same result keyed by team id, for joining onto games.
pub async fn team_features_by_id(
    pool: &SqlitePool,
    table: &str,
    season: i64,
    daynum: i64,
) -> Result<HashMap<i64, TeamFeatures>> {
    let features = team_features(pool, table, season, daynum).await?;
    Ok(features.into_iter().map(|f| (f.team_id, f)).collect())
}

/// Rebuilds a training-data table from a reciprocal boxscore table.
///
/// Walks every distinct (season, daynum) in order; for each, computes team
/// aggregates as of that day — strictly prior games only, so a game never
/// contributes to its own features — and pairs every reciprocal row at that
/// exact day with its subject's and opponent's aggregates. A side with no
/// prior games that season yields NULL feature columns; the daynum filter at
/// training time drops those rows. Returns the number of examples written.
pub async fn build_training_data(
    pool: &SqlitePool,
    reciprocal_table: &str,
    training_table: &str,
) -> Result<usize> {
    let reciprocal_table = validate_table(reciprocal_table)?;
    let training_table = validate_table(training_table)?;

    create_training_table(pool, training_table).await?;

    let season_days = distinct_season_daynums(pool, reciprocal_table).await?;
    tracing::info!(
        "Building {} across {} (season, daynum) pairs",
        training_table,
        season_days.len()
    );

    let mut written = 0usize;
    for (season, daynum) in season_days {
        let features = team_features_by_id(pool, reciprocal_table, season, daynum).await?;
        let games = fetch_reciprocal_rows_at(pool, reciprocal_table, season, daynum).await?;

        let examples: Vec<TrainingExample> = games
            .iter()
            .map(|g| TrainingExample {
                season: g.season,
                daynum: g.daynum,
                t1_teamid: g.t1_teamid,
                t2_teamid: g.t2_teamid,
                t1_score: g.t1_score,
                t2_score: g.t2_score,
                location: g.location,
                t1: features.get(&g.t1_teamid).copied(),
                t2: features.get(&g.t2_teamid).copied(),
            })
            .collect();

        insert_training_examples(pool, training_table, &examples).await?;
        written += examples.len();
    }

    tracing::info!("Wrote {} examples to {}", written, training_table);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_reciprocal_table, init_database_with_pool, insert_reciprocal_rows};
    use crate::models::{ReciprocalRow, StatLine};
    use crate::services::reconcile::mirror;
    use sqlx::Row;

    const TABLE: &str = "boxscores_kaggle_reciprocal";

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

    fn game(
        season: i64,
        daynum: i64,
        t1: i64,
        t1_score: i64,
        t2: i64,
        t2_score: i64,
        stat: i64,
    ) -> Vec<ReciprocalRow> {
        let row = ReciprocalRow {
            season,
            daynum,
            t1_teamid: t1,
            t1_score,
            t2_teamid: t2,
            t2_score,
            location: 1,
            numot: 0,
            t1: flat_stats(stat),
            t2: flat_stats(stat + 1),
        };
        vec![row.clone(), mirror(&row)]
    }

    async fn seeded_pool(rows: &[ReciprocalRow]) -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_database_with_pool(&pool).await.unwrap();
        create_reciprocal_table(&pool, TABLE).await.unwrap();
        insert_reciprocal_rows(&pool, TABLE, rows).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn aggregates_use_strictly_prior_games_only() {
        // Team 1101: one game on day 40 (fgm 10), one on day 50 (fgm 20).
        let mut rows = game(2024, 40, 1101, 80, 1202, 70, 10);
        rows.extend(game(2024, 50, 1101, 90, 1303, 60, 20));
        let pool = seeded_pool(&rows).await;

        // As of day 50 only the day-40 game may contribute.
        let features = team_features_by_id(&pool, TABLE, 2024, 50).await.unwrap();
        let f = features.get(&1101).unwrap();
        assert!((f.fgm_mean - 10.0).abs() < 1e-9);
        assert!((f.point_diff_mean - 10.0).abs() < 1e-9);

        // As of day 51 both games contribute.
        let features = team_features_by_id(&pool, TABLE, 2024, 51).await.unwrap();
        let f = features.get(&1101).unwrap();
        assert!((f.fgm_mean - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn team_without_prior_games_is_absent() {
        let rows = game(2024, 90, 1101, 80, 1202, 70, 10);
        let pool = seeded_pool(&rows).await;

        let features = team_features_by_id(&pool, TABLE, 2024, 90).await.unwrap();
        assert!(features.is_empty());
    }

    #[tokio::test]
    async fn win_ratio_counts_only_the_trailing_window() {
        // Three games before day 90, two wins — but only days 80 (win) and
        // 85 (loss) fall inside the 14-day window [76, 90).
        let mut rows = game(2024, 60, 1101, 80, 1202, 70, 10); // win, outside window
        rows.extend(game(2024, 80, 1101, 75, 1303, 70, 10)); // win
        rows.extend(game(2024, 85, 1101, 65, 1404, 70, 10)); // loss
        let pool = seeded_pool(&rows).await;

        let features = team_features_by_id(&pool, TABLE, 2024, 90).await.unwrap();
        let f = features.get(&1101).unwrap();
        assert!((f.win_ratio_14d - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_window_yields_zero_not_an_error() {
        let rows = game(2024, 20, 1101, 80, 1202, 70, 10);
        let pool = seeded_pool(&rows).await;

        // Day 60: prior games exist, none within [46, 60).
        let features = team_features_by_id(&pool, TABLE, 2024, 60).await.unwrap();
        let f = features.get(&1101).unwrap();
        assert_eq!(f.win_ratio_14d, 0.0);
        assert!(f.fgm_mean > 0.0);
    }

    #[tokio::test]
    async fn training_rows_carry_nulls_for_first_games_and_features_after() {
        let mut rows = game(2024, 30, 1101, 80, 1202, 70, 10);
        rows.extend(game(2024, 40, 1101, 85, 1202, 75, 20));
        let pool = seeded_pool(&rows).await;

        let written = build_training_data(&pool, TABLE, "training_data_kaggle")
            .await
            .unwrap();
        assert_eq!(written, 4); // two games, two perspectives each

        let day30 = sqlx::query(
            "SELECT t1_fgmmean FROM training_data_kaggle WHERE daynum = 30 AND t1_teamid = 1101",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(day30.get::<Option<f64>, _>("t1_fgmmean").is_none());

        // Day-40 features come from the day-30 game only: no leakage of the
        // day-40 boxscore into its own aggregates.
        let day40 = sqlx::query(
            "SELECT t1_fgmmean, t1_win_ratio_14d, t2_fgmmean \
             FROM training_data_kaggle WHERE daynum = 40 AND t1_teamid = 1101",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(day40.get::<f64, _>("t1_fgmmean"), 10.0);
        assert_eq!(day40.get::<f64, _>("t1_win_ratio_14d"), 1.0);
        assert_eq!(day40.get::<f64, _>("t2_fgmmean"), 11.0);
    }

    #[test]
    fn feature_layout_is_stable() {
        let cols = feature_columns();
        assert_eq!(cols.len(), 42);
        assert_eq!(cols[0], "t1_fgmmean");
        assert_eq!(cols[18], "t1_pointdiffmean");
        assert_eq!(cols[19], "t2_fgmmean");
        assert_eq!(cols[38], "t1_win_ratio_14d");
        assert_eq!(cols[41], "location");

        let t1 = TeamFeatures {
            team_id: 1,
            fgm_mean: 1.0,
            fga_mean: 2.0,
            fgm3_mean: 3.0,
            fga3_mean: 4.0,
            or_mean: 5.0,
            ast_mean: 6.0,
            to_mean: 7.0,
            stl_mean: 8.0,
            pf_mean: 9.0,
            opp_fgm_mean: 10.0,
            opp_fga_mean: 11.0,
            opp_fgm3_mean: 12.0,
            opp_fga3_mean: 13.0,
            opp_or_mean: 14.0,
            opp_ast_mean: 15.0,
            opp_to_mean: 16.0,
            opp_stl_mean: 17.0,
            opp_blk_mean: 18.0,
            point_diff_mean: 19.0,
            win_ratio_14d: 0.75,
        };
        let t2 = TeamFeatures {
            win_ratio_14d: 0.25,
            ..t1
        };
        let x = feature_vector(&t1, &t2, 95, 1);
        assert_eq!(x.len(), cols.len());
        assert_eq!(x[0], 1.0);
        assert_eq!(x[18], 19.0);
        assert_eq!(x[38], 0.75);
        assert_eq!(x[39], 0.25);
        assert_eq!(x[40], 95.0);
        assert_eq!(x[41], 1.0);
    }
}
