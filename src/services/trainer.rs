//! Cross-validated training of the spread ensemble.
//!
//! Three independent CV repeats pick a boosting-round count each; each
//! repeat then contributes one full-data ensemble member, persisted as its
//! own artifact under a timestamp-named run directory.

use anyhow::{anyhow, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sqlx::{Row, SqlitePool};
use std::env;
use std::path::{Path, PathBuf};

use crate::db::{insert_training_run, validate_table};
use crate::models::TrainingRun;
use crate::services::features::{feature_columns, MIN_TRAINING_DAYNUM};
use crate::services::gbm::{mean_absolute_error, GbmParams, GbmRegressor};

/// One ensemble member per CV repeat.
pub const ENSEMBLE_SIZE: usize = 3;

const CV_FOLDS: usize = 5;
const MAX_BOOST_ROUNDS: usize = 800;
const EARLY_STOPPING_ROUNDS: usize = 25;
/// The selected round count is inflated by this margin before the full-data
/// refit, since the final model sees more data than any CV fold did.
const ROUND_INFLATION: f64 = 1.05;

/// Root directory for model artifacts, overridable for tests/deployments.
pub fn model_base_dir() -> PathBuf {
    env::var("HOOPCAST_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"))
}

pub fn member_path(base: &Path, model_id: &str, member: usize) -> PathBuf {
    base.join(model_id)
        .join(format!("gbm_model_{}_{}.json", model_id, member))
}

/// Loads the labelled training matrix: feature vectors in the shared
/// positional layout plus the spread label `t1_score - t2_score`. Rows
/// before the day-number cutoff or with any NULL feature (a side's first
/// games of a season) are excluded.
pub async fn load_training_data(
    pool: &SqlitePool,
    table: &str,
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let table = validate_table(table)?;
    let cols = feature_columns();

    let select_list: Vec<String> = cols
        .iter()
        .map(|c| match c.as_str() {
            // stored as INTEGER; the model consumes f64
            "daynum" => "CAST(daynum AS REAL) AS daynum".to_string(),
            "location" => "CAST(location AS REAL) AS location".to_string(),
            other => other.to_string(),
        })
        .collect();

    let sql = format!(
        "SELECT {}, t1_score, t2_score FROM {} WHERE daynum >= ?",
        select_list.join(", "),
        table
    );
    let rows = sqlx::query(&sql)
        .bind(MIN_TRAINING_DAYNUM)
        .fetch_all(pool)
        .await?;

    let mut xs = Vec::with_capacity(rows.len());
    let mut ys = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    'rows: for row in &rows {
        let mut x = Vec::with_capacity(cols.len());
        for c in &cols {
            match row.try_get::<Option<f64>, _>(c.as_str())? {
                Some(v) => x.push(v),
                None => {
                    skipped += 1;
                    continue 'rows;
                }
            }
        }
        let t1_score: i64 = row.get("t1_score");
        let t2_score: i64 = row.get("t2_score");
        xs.push(x);
        ys.push((t1_score - t2_score) as f64);
    }

    tracing::info!(
        "Loaded {} training examples from {} ({} skipped for missing history)",
        xs.len(),
        table,
        skipped
    );
    Ok((xs, ys))
}

#[derive(Debug, Clone, Copy)]
pub struct CvResult {
    /// 0-based index of the best round on the validation curve.
    pub best_iteration: usize,
    pub best_mae: f64,
}

fn kfold_indices(n: usize, folds: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); folds];
    for (i, v) in idx.into_iter().enumerate() {
        out[i % folds].push(v);
    }
    out
}

fn gather(xs: &[Vec<f64>], ys: &[f64], idx: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
    (
        idx.iter().map(|&i| xs[i].clone()).collect(),
        idx.iter().map(|&i| ys[i]).collect(),
    )
}

/// One repeat of 5-fold cross-validation: boosts all folds in lockstep,
/// tracks the mean held-out MAE per round, and stops once the curve has not
/// improved for `EARLY_STOPPING_ROUNDS` rounds.
fn cross_validate_once(
    params: &GbmParams,
    xs: &[Vec<f64>],
    ys: &[f64],
    repeat: usize,
) -> Result<CvResult> {
    let folds = kfold_indices(xs.len(), CV_FOLDS, repeat as u64);

    struct FoldState {
        model: GbmRegressor,
        train_x: Vec<Vec<f64>>,
        train_y: Vec<f64>,
        train_preds: Vec<f64>,
        val_x: Vec<Vec<f64>>,
        val_y: Vec<f64>,
        val_preds: Vec<f64>,
        rng: StdRng,
    }

    let mut states = Vec::with_capacity(CV_FOLDS);
    for (k, val_idx) in folds.iter().enumerate() {
        let train_idx: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != k)
            .flat_map(|(_, f)| f.iter().copied())
            .collect();
        let (train_x, train_y) = gather(xs, ys, &train_idx);
        let (val_x, val_y) = gather(xs, ys, val_idx);
        let model = GbmRegressor::new(params.clone());
        let train_preds = vec![model.base_score(); train_x.len()];
        let val_preds = vec![model.base_score(); val_x.len()];
        states.push(FoldState {
            model,
            train_x,
            train_y,
            train_preds,
            val_x,
            val_y,
            val_preds,
            rng: StdRng::seed_from_u64((repeat * CV_FOLDS + k) as u64),
        });
    }

    let mut best = CvResult {
        best_iteration: 0,
        best_mae: f64::INFINITY,
    };
    for round in 0..MAX_BOOST_ROUNDS {
        let mut mae_sum = 0.0;
        for s in states.iter_mut() {
            s.model
                .boost_round(&s.train_x, &s.train_y, &mut s.train_preds, &mut s.rng);
            s.model.apply_last_round(&s.val_x, &mut s.val_preds);
            mae_sum += mean_absolute_error(&s.val_preds, &s.val_y);
        }
        let mean_mae = mae_sum / CV_FOLDS as f64;

        if mean_mae < best.best_mae {
            best = CvResult {
                best_iteration: round,
                best_mae: mean_mae,
            };
        }
        if round % 50 == 0 {
            tracing::info!("repeat {} round {} val-mae {:.4}", repeat, round, mean_mae);
        }
        if round - best.best_iteration >= EARLY_STOPPING_ROUNDS {
            break;
        }
    }
    Ok(best)
}

/// Repeated cross-validation, one result per future ensemble member.
pub fn cross_validate(params: &GbmParams, xs: &[Vec<f64>], ys: &[f64]) -> Result<Vec<CvResult>> {
    if xs.len() < CV_FOLDS {
        return Err(anyhow!(
            "only {} training examples, need at least {}",
            xs.len(),
            CV_FOLDS
        ));
    }
    let mut results = Vec::with_capacity(ENSEMBLE_SIZE);
    for repeat in 0..ENSEMBLE_SIZE {
        tracing::info!("Fold repeater {}", repeat);
        results.push(cross_validate_once(params, xs, ys, repeat)?);
    }
    Ok(results)
}

fn inflated_rounds(best_iteration: usize) -> usize {
    ((best_iteration as f64 * ROUND_INFLATION) as usize).max(1)
}

/// Full training entry point: cross-validate, refit each member on all data
/// with its inflated round count, persist artifacts, and record the run.
/// Returns the run identifier (the training timestamp).
pub async fn train_and_save(pool: &SqlitePool, table: &str) -> Result<String> {
    let (xs, ys) = load_training_data(pool, table).await?;
    let params = GbmParams::default();

    let cv = cross_validate(&params, &xs, &ys)?;

    let now = Utc::now();
    let model_id = now.format("%Y%m%d%H%M%S").to_string();
    let base = model_base_dir();
    let run_dir = base.join(&model_id);
    std::fs::create_dir_all(&run_dir)?;

    for (member, result) in cv.iter().enumerate() {
        let rounds = inflated_rounds(result.best_iteration);
        tracing::info!(
            "Training member {} for {} rounds (cv best {} @ mae {:.4})",
            member,
            rounds,
            result.best_iteration,
            result.best_mae
        );

        let mut model = GbmRegressor::new(params.clone());
        model.fit(&xs, &ys, rounds, member as u64);

        let path = member_path(&base, &model_id, member);
        model.save(&path)?;

        insert_training_run(
            pool,
            &TrainingRun {
                training_timestamp: now.to_rfc3339(),
                file_location: path.display().to_string(),
                iteration_counts: rounds as i64,
                val_mae: result.best_mae,
                training_examples: xs.len() as i64,
            },
        )
        .await?;
    }

    tracing::info!("Saved ensemble {} ({} members)", model_id, ENSEMBLE_SIZE);
    Ok(model_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kfold_partitions_every_index_exactly_once() {
        let folds = kfold_indices(103, 5, 0);
        let mut seen: Vec<usize> = folds.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..103).collect::<Vec<_>>());
        for f in &folds {
            assert!(f.len() >= 20);
        }
    }

    #[test]
    fn kfold_is_deterministic_per_seed() {
        assert_eq!(kfold_indices(50, 5, 1), kfold_indices(50, 5, 1));
        assert_ne!(kfold_indices(50, 5, 1), kfold_indices(50, 5, 2));
    }

    #[test]
    fn round_inflation_never_returns_zero() {
        assert_eq!(inflated_rounds(0), 1);
        assert_eq!(inflated_rounds(100), 105);
        assert_eq!(inflated_rounds(800), 840);
    }

    #[test]
    fn cross_validate_selects_a_round_on_a_learnable_target() {
        // Small but learnable: y = 3*x0 + x1 over a grid.
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..15 {
            for j in 0..15 {
                xs.push(vec![i as f64, j as f64]);
                ys.push(3.0 * i as f64 + j as f64);
            }
        }
        let params = GbmParams {
            eta: 0.3,
            max_depth: 3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            num_parallel_tree: 1,
            min_child_weight: 1.0,
            gamma: 0.0,
            lambda: 1.0,
            cauchy_scale: crate::services::gbm::CAUCHY_SCALE,
        };
        let results = cross_validate(&params, &xs, &ys).unwrap();
        assert_eq!(results.len(), ENSEMBLE_SIZE);
        for r in results {
            assert!(r.best_mae.is_finite());
            assert!(r.best_iteration > 0);
        }
    }
}
