pub mod ingest;

use anyhow::{anyhow, Result};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::env;
use std::str::FromStr;

use crate::models::*;

/// Stat block column suffixes, subject-relative. The reciprocal tables carry
/// each of these twice (`t1_` and `t2_` prefixed); the mirroring transform in
/// `services::reconcile` swaps the prefixes.
pub const STAT_COLUMNS: [&str; 13] = [
    "fgm", "fga", "fgm3", "fga3", "ftm", "fta", "or", "dr", "ast", "to", "stl", "blk", "pf",
];

/// Every table this pipeline is allowed to read or (re)build. Table names
/// arrive as strings in a few places (reciprocal build, training-data build),
/// so they are checked here instead of being spliced into SQL unvalidated.
const KNOWN_TABLES: [&str; 9] = [
    "boxscores_kaggle",
    "boxscores_sdv",
    "boxscores_sdv_kagglestyle",
    "boxscores_kaggle_reciprocal",
    "boxscores_sdv_kagglestyle_reciprocal",
    "schedule_sdv",
    "training_data_kaggle",
    "training_data_sdv",
    "predictions",
];

pub fn validate_table(name: &str) -> Result<&str> {
    KNOWN_TABLES
        .iter()
        .find(|t| **t == name)
        .copied()
        .ok_or_else(|| anyhow!("unknown table '{}'", name))
}

pub async fn create_pool() -> Result<SqlitePool> {
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/hoopcast.db".to_string());

    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(&database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database() -> Result<()> {
    let pool = create_pool().await?;
    init_database_with_pool(&pool).await
}

/// Creates the raw and bookkeeping tables. Derived tables (kagglestyle,
/// reciprocal, training data) are drop-and-recreated by their builders.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS boxscores_kaggle (
            season INTEGER,
            daynum INTEGER,
            wteamid INTEGER,
            wscore INTEGER,
            lteamid INTEGER,
            lscore INTEGER,
            wloc TEXT,
            numot INTEGER,
            wfgm INTEGER,
            wfga INTEGER,
            wfgm3 INTEGER,
            wfga3 INTEGER,
            wftm INTEGER,
            wfta INTEGER,
            wor INTEGER,
            wdr INTEGER,
            wast INTEGER,
            wto INTEGER,
            wstl INTEGER,
            wblk INTEGER,
            wpf INTEGER,
            lfgm INTEGER,
            lfga INTEGER,
            lfgm3 INTEGER,
            lfga3 INTEGER,
            lftm INTEGER,
            lfta INTEGER,
            lor INTEGER,
            ldr INTEGER,
            last INTEGER,
            lto INTEGER,
            lstl INTEGER,
            lblk INTEGER,
            lpf INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS boxscores_sdv (
            game_id INTEGER,
            season INTEGER,
            season_type INTEGER,
            game_date TEXT,
            game_date_time TEXT,
            team_id INTEGER,
            team_uid TEXT,
            team_slug TEXT,
            team_location TEXT,
            team_name TEXT,
            team_abbreviation TEXT,
            team_display_name TEXT,
            team_short_display_name TEXT,
            team_color TEXT,
            team_alternate_color TEXT,
            team_logo TEXT,
            team_home_away TEXT,
            team_score INTEGER,
            team_winner INTEGER,
            assists INTEGER,
            blocks INTEGER,
            defensive_rebounds INTEGER,
            fast_break_points INTEGER,
            field_goal_pct REAL,
            field_goals_made INTEGER,
            field_goals_attempted INTEGER,
            flagrant_fouls INTEGER,
            fouls INTEGER,
            free_throw_pct REAL,
            free_throws_made INTEGER,
            free_throws_attempted INTEGER,
            largest_lead TEXT,
            offensive_rebounds INTEGER,
            points_in_paint INTEGER,
            steals INTEGER,
            team_turnovers INTEGER,
            technical_fouls INTEGER,
            three_point_field_goal_pct REAL,
            three_point_field_goals_made INTEGER,
            three_point_field_goals_attempted INTEGER,
            total_rebounds INTEGER,
            total_technical_fouls INTEGER,
            total_turnovers INTEGER,
            turnover_points INTEGER,
            turnovers INTEGER,
            opponent_team_id INTEGER,
            opponent_team_uid TEXT,
            opponent_team_slug TEXT,
            opponent_team_location TEXT,
            opponent_team_name TEXT,
            opponent_team_abbreviation TEXT,
            opponent_team_display_name TEXT,
            opponent_team_short_display_name TEXT,
            opponent_team_color TEXT,
            opponent_team_alternate_color TEXT,
            opponent_team_logo TEXT,
            opponent_team_score INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_sdv (
            id INTEGER,
            uid TEXT,
            date TEXT,
            attendance REAL,
            time_valid INTEGER,
            neutral_site INTEGER,
            conference_competition INTEGER,
            play_by_play_available INTEGER,
            recent INTEGER,
            start_date TEXT,
            notes_type TEXT,
            notes_headline TEXT,
            broadcast_market TEXT,
            broadcast_name TEXT,
            type_id INTEGER,
            type_abbreviation TEXT,
            venue_id INTEGER,
            venue_full_name TEXT,
            venue_address_city TEXT,
            venue_address_state TEXT,
            venue_capacity REAL,
            venue_indoor INTEGER,
            status_clock REAL,
            status_display_clock TEXT,
            status_period REAL,
            status_type_id INTEGER,
            status_type_name TEXT,
            status_type_state TEXT,
            status_type_completed INTEGER,
            status_type_description TEXT,
            status_type_detail TEXT,
            status_type_short_detail TEXT,
            format_regulation_periods REAL,
            home_id INTEGER,
            home_uid TEXT,
            home_location TEXT,
            home_name TEXT,
            home_abbreviation TEXT,
            home_display_name TEXT,
            home_short_display_name TEXT,
            home_color TEXT,
            home_alternate_color TEXT,
            home_is_active INTEGER,
            home_venue_id INTEGER,
            home_logo TEXT,
            home_conference_id INTEGER,
            home_score INTEGER,
            home_winner INTEGER,
            home_current_rank REAL,
            home_linescores TEXT,
            home_records TEXT,
            away_id INTEGER,
            away_uid TEXT,
            away_location TEXT,
            away_name TEXT,
            away_abbreviation TEXT,
            away_display_name TEXT,
            away_short_display_name TEXT,
            away_color TEXT,
            away_alternate_color TEXT,
            away_is_active INTEGER,
            away_venue_id INTEGER,
            away_logo TEXT,
            away_conference_id INTEGER,
            away_score INTEGER,
            away_winner INTEGER,
            away_current_rank REAL,
            away_linescores TEXT,
            away_records TEXT,
            game_id INTEGER,
            season INTEGER,
            season_type INTEGER,
            status_type_alt_detail TEXT,
            tournament_id INTEGER,
            groups_id INTEGER,
            groups_name TEXT,
            groups_short_name TEXT,
            groups_is_conference INTEGER,
            game_json INTEGER,
            game_json_url TEXT,
            game_date_time TEXT,
            game_date TEXT,
            pbp INTEGER,
            team_box INTEGER,
            player_box INTEGER,
            season_start_date TEXT,
            daynum INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_runs (
            training_timestamp TEXT,
            file_location TEXT,
            iteration_counts INTEGER,
            val_mae REAL,
            training_examples INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only, no uniqueness on (t1_teamid, t2_teamid, game_id); re-running
    // a prediction date adds rows rather than replacing them.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            t1_teamid INTEGER,
            t2_teamid INTEGER,
            pred_spread REAL,
            season INTEGER,
            daynum INTEGER,
            id INTEGER,
            game_id INTEGER,
            home_display_name TEXT,
            away_display_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_kaggle_season_daynum ON boxscores_kaggle(season, daynum)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_schedule_start_date ON schedule_sdv(start_date)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized");
    Ok(())
}

// ── boxscore row I/O ─────────────────────────────────────────────────────────

pub async fn insert_kaggle_boxscores(pool: &SqlitePool, rows: &[KaggleBoxscore]) -> Result<()> {
    for r in rows {
        sqlx::query(
            r#"INSERT INTO boxscores_kaggle
               (season, daynum, wteamid, wscore, lteamid, lscore, wloc, numot,
                wfgm, wfga, wfgm3, wfga3, wftm, wfta, wor, wdr, wast, wto, wstl, wblk, wpf,
                lfgm, lfga, lfgm3, lfga3, lftm, lfta, lor, ldr, last, lto, lstl, lblk, lpf)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                       ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                       ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(r.season)
        .bind(r.daynum)
        .bind(r.wteamid)
        .bind(r.wscore)
        .bind(r.lteamid)
        .bind(r.lscore)
        .bind(&r.wloc)
        .bind(r.numot)
        .bind(r.wfgm)
        .bind(r.wfga)
        .bind(r.wfgm3)
        .bind(r.wfga3)
        .bind(r.wftm)
        .bind(r.wfta)
        .bind(r.wor)
        .bind(r.wdr)
        .bind(r.wast)
        .bind(r.wto)
        .bind(r.wstl)
        .bind(r.wblk)
        .bind(r.wpf)
        .bind(r.lfgm)
        .bind(r.lfga)
        .bind(r.lfgm3)
        .bind(r.lfga3)
        .bind(r.lftm)
        .bind(r.lfta)
        .bind(r.lor)
        .bind(r.ldr)
        .bind(r.last)
        .bind(r.lto)
        .bind(r.lstl)
        .bind(r.lblk)
        .bind(r.lpf)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Reads any winner/loser-shaped table (`boxscores_kaggle` or
/// `boxscores_sdv_kagglestyle`) back into rows.
pub async fn fetch_winner_loser_rows(pool: &SqlitePool, table: &str) -> Result<Vec<KaggleBoxscore>> {
    let table = validate_table(table)?;
    let rows = sqlx::query_as::<_, KaggleBoxscore>(&format!(
        "SELECT * FROM {} ORDER BY season, daynum",
        table
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert_sdv_boxscore(pool: &SqlitePool, b: &SdvBoxscore) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO boxscores_sdv
           (game_id, season, season_type, game_date, game_date_time,
            team_id, team_location, team_name, team_abbreviation, team_display_name,
            team_short_display_name, team_home_away, team_score, team_winner,
            assists, blocks, defensive_rebounds, fast_break_points, field_goal_pct,
            field_goals_made, field_goals_attempted, flagrant_fouls, fouls,
            free_throw_pct, free_throws_made, free_throws_attempted, largest_lead,
            offensive_rebounds, points_in_paint, steals, team_turnovers, technical_fouls,
            three_point_field_goal_pct, three_point_field_goals_made,
            three_point_field_goals_attempted, total_rebounds, total_technical_fouls,
            total_turnovers, turnover_points, turnovers,
            opponent_team_id, opponent_team_location, opponent_team_name,
            opponent_team_abbreviation, opponent_team_display_name,
            opponent_team_short_display_name, opponent_team_score)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                   ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(b.game_id)
    .bind(b.season)
    .bind(b.season_type)
    .bind(&b.game_date)
    .bind(&b.game_date_time)
    .bind(b.team_id)
    .bind(&b.team_location)
    .bind(&b.team_name)
    .bind(&b.team_abbreviation)
    .bind(&b.team_display_name)
    .bind(&b.team_short_display_name)
    .bind(&b.team_home_away)
    .bind(b.team_score)
    .bind(b.team_winner)
    .bind(b.assists)
    .bind(b.blocks)
    .bind(b.defensive_rebounds)
    .bind(b.fast_break_points)
    .bind(b.field_goal_pct)
    .bind(b.field_goals_made)
    .bind(b.field_goals_attempted)
    .bind(b.flagrant_fouls)
    .bind(b.fouls)
    .bind(b.free_throw_pct)
    .bind(b.free_throws_made)
    .bind(b.free_throws_attempted)
    .bind(&b.largest_lead)
    .bind(b.offensive_rebounds)
    .bind(b.points_in_paint)
    .bind(b.steals)
    .bind(b.team_turnovers)
    .bind(b.technical_fouls)
    .bind(b.three_point_field_goal_pct)
    .bind(b.three_point_field_goals_made)
    .bind(b.three_point_field_goals_attempted)
    .bind(b.total_rebounds)
    .bind(b.total_technical_fouls)
    .bind(b.total_turnovers)
    .bind(b.turnover_points)
    .bind(b.turnovers)
    .bind(b.opponent_team_id)
    .bind(&b.opponent_team_location)
    .bind(&b.opponent_team_name)
    .bind(&b.opponent_team_abbreviation)
    .bind(&b.opponent_team_display_name)
    .bind(&b.opponent_team_short_display_name)
    .bind(b.opponent_team_score)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_schedule_game(pool: &SqlitePool, g: &ScheduleGame) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO schedule_sdv
           (id, uid, date, neutral_site, start_date, venue_full_name, status_type_completed,
            home_id, home_location, home_name, home_abbreviation, home_display_name,
            home_short_display_name, home_score, home_winner,
            away_id, away_location, away_name, away_abbreviation, away_display_name,
            away_short_display_name, away_score, away_winner,
            game_id, season, season_type, game_date, season_start_date, daynum)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                   ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(g.id)
    .bind(&g.uid)
    .bind(&g.date)
    .bind(g.neutral_site)
    .bind(&g.start_date)
    .bind(&g.venue_full_name)
    .bind(g.status_type_completed)
    .bind(g.home_id)
    .bind(&g.home_location)
    .bind(&g.home_name)
    .bind(&g.home_abbreviation)
    .bind(&g.home_display_name)
    .bind(&g.home_short_display_name)
    .bind(g.home_score)
    .bind(g.home_winner)
    .bind(g.away_id)
    .bind(&g.away_location)
    .bind(&g.away_name)
    .bind(&g.away_abbreviation)
    .bind(&g.away_display_name)
    .bind(&g.away_short_display_name)
    .bind(g.away_score)
    .bind(g.away_winner)
    .bind(g.game_id)
    .bind(g.season)
    .bind(g.season_type)
    .bind(&g.game_date)
    .bind(&g.season_start_date)
    .bind(g.daynum)
    .execute(pool)
    .await?;
    Ok(())
}

// ── reciprocal tables ────────────────────────────────────────────────────────

fn prefixed_stat_columns(prefix: &str) -> Vec<String> {
    STAT_COLUMNS
        .iter()
        .map(|c| format!("{}_{}", prefix, c))
        .collect()
}

/// Drops and recreates a reciprocal table. Rebuilds are full, never
/// incremental.
pub async fn create_reciprocal_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let table = validate_table(table)?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(pool)
        .await?;

    let stat_cols: Vec<String> = prefixed_stat_columns("t1")
        .into_iter()
        .chain(prefixed_stat_columns("t2"))
        .map(|c| format!("{} INTEGER", c))
        .collect();

    let ddl = format!(
        r#"CREATE TABLE {} (
            season INTEGER,
            daynum INTEGER,
            t1_teamid INTEGER,
            t1_score INTEGER,
            t2_teamid INTEGER,
            t2_score INTEGER,
            location INTEGER,
            numot INTEGER,
            {}
        )"#,
        table,
        stat_cols.join(",\n            ")
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}

pub async fn insert_reciprocal_rows(
    pool: &SqlitePool,
    table: &str,
    rows: &[ReciprocalRow],
) -> Result<()> {
    let table = validate_table(table)?;
    let cols: Vec<String> = ["season", "daynum", "t1_teamid", "t1_score", "t2_teamid", "t2_score", "location", "numot"]
        .iter()
        .map(|s| s.to_string())
        .chain(prefixed_stat_columns("t1"))
        .chain(prefixed_stat_columns("t2"))
        .collect();
    let placeholders = vec!["?"; cols.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols.join(", "),
        placeholders
    );

    for r in rows {
        let mut q = sqlx::query(&sql)
            .bind(r.season)
            .bind(r.daynum)
            .bind(r.t1_teamid)
            .bind(r.t1_score)
            .bind(r.t2_teamid)
            .bind(r.t2_score)
            .bind(r.location)
            .bind(r.numot);
        for v in r.t1.values().into_iter().chain(r.t2.values()) {
            q = q.bind(v);
        }
        q.execute(pool).await?;
    }
    Ok(())
}

/// Every distinct (season, daynum) observed in a reciprocal table, in
/// chronological order. The training-data builder walks these one by one.
pub async fn distinct_season_daynums(pool: &SqlitePool, table: &str) -> Result<Vec<(i64, i64)>> {
    let table = validate_table(table)?;
    let rows = sqlx::query(&format!(
        "SELECT season, daynum FROM {} GROUP BY season, daynum ORDER BY season, daynum",
        table
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get::<i64, _>("season"), r.get::<i64, _>("daynum")))
        .collect())
}

pub async fn fetch_reciprocal_rows_at(
    pool: &SqlitePool,
    table: &str,
    season: i64,
    daynum: i64,
) -> Result<Vec<ReciprocalRow>> {
    let table = validate_table(table)?;
    let rows = sqlx::query(&format!(
        "SELECT * FROM {} WHERE season = ? AND daynum = ?",
        table
    ))
    .bind(season)
    .bind(daynum)
    .fetch_all(pool)
    .await?;

    let read_stats = |row: &sqlx::sqlite::SqliteRow, prefix: &str| StatLine {
        fgm: row.get::<i64, _>(format!("{}_fgm", prefix).as_str()),
        fga: row.get::<i64, _>(format!("{}_fga", prefix).as_str()),
        fgm3: row.get::<i64, _>(format!("{}_fgm3", prefix).as_str()),
        fga3: row.get::<i64, _>(format!("{}_fga3", prefix).as_str()),
        ftm: row.get::<i64, _>(format!("{}_ftm", prefix).as_str()),
        fta: row.get::<i64, _>(format!("{}_fta", prefix).as_str()),
        or_: row.get::<i64, _>(format!("{}_or", prefix).as_str()),
        dr: row.get::<i64, _>(format!("{}_dr", prefix).as_str()),
        ast: row.get::<i64, _>(format!("{}_ast", prefix).as_str()),
        to_: row.get::<i64, _>(format!("{}_to", prefix).as_str()),
        stl: row.get::<i64, _>(format!("{}_stl", prefix).as_str()),
        blk: row.get::<i64, _>(format!("{}_blk", prefix).as_str()),
        pf: row.get::<i64, _>(format!("{}_pf", prefix).as_str()),
    };

    Ok(rows
        .iter()
        .map(|row| ReciprocalRow {
            season: row.get("season"),
            daynum: row.get("daynum"),
            t1_teamid: row.get("t1_teamid"),
            t1_score: row.get("t1_score"),
            t2_teamid: row.get("t2_teamid"),
            t2_score: row.get("t2_score"),
            location: row.get("location"),
            numot: row.get("numot"),
            t1: read_stats(row, "t1"),
            t2: read_stats(row, "t2"),
        })
        .collect())
}

// ── training data tables ─────────────────────────────────────────────────────

/// Drops and recreates a training-data table with one column per feature
/// plus identity and label columns.
pub async fn create_training_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let table = validate_table(table)?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(pool)
        .await?;

    let mut cols: Vec<String> = Vec::new();
    for side in ["t1", "t2"] {
        for c in TeamFeatures::MEAN_COLUMNS {
            cols.push(format!("{}_{} REAL", side, c));
        }
        cols.push(format!("{}_win_ratio_14d REAL", side));
    }

    let ddl = format!(
        r#"CREATE TABLE {} (
            season INTEGER,
            daynum INTEGER,
            t1_teamid INTEGER,
            t2_teamid INTEGER,
            t1_score INTEGER,
            t2_score INTEGER,
            location INTEGER,
            {}
        )"#,
        table,
        cols.join(",\n            ")
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}

pub async fn insert_training_examples(
    pool: &SqlitePool,
    table: &str,
    examples: &[TrainingExample],
) -> Result<()> {
    let table = validate_table(table)?;
    let mut cols: Vec<String> = ["season", "daynum", "t1_teamid", "t2_teamid", "t1_score", "t2_score", "location"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for side in ["t1", "t2"] {
        for c in TeamFeatures::MEAN_COLUMNS {
            cols.push(format!("{}_{}", side, c));
        }
        cols.push(format!("{}_win_ratio_14d", side));
    }
    let placeholders = vec!["?"; cols.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols.join(", "),
        placeholders
    );

    for ex in examples {
        let mut q = sqlx::query(&sql)
            .bind(ex.season)
            .bind(ex.daynum)
            .bind(ex.t1_teamid)
            .bind(ex.t2_teamid)
            .bind(ex.t1_score)
            .bind(ex.t2_score)
            .bind(ex.location);
        for side in [&ex.t1, &ex.t2] {
            match side {
                Some(f) => {
                    for v in f.mean_values() {
                        q = q.bind(v);
                    }
                    q = q.bind(f.win_ratio_14d);
                }
                None => {
                    for _ in 0..=TeamFeatures::MEAN_COLUMNS.len() {
                        q = q.bind(Option::<f64>::None);
                    }
                }
            }
        }
        q.execute(pool).await?;
    }
    Ok(())
}

// ── bookkeeping ──────────────────────────────────────────────────────────────

pub async fn insert_training_run(pool: &SqlitePool, run: &TrainingRun) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO training_runs
           (training_timestamp, file_location, iteration_counts, val_mae, training_examples)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&run.training_timestamp)
    .bind(&run.file_location)
    .bind(run.iteration_counts)
    .bind(run.val_mae)
    .bind(run.training_examples)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_prediction(pool: &SqlitePool, p: &GamePrediction) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO predictions
           (t1_teamid, t2_teamid, pred_spread, season, daynum, id, game_id,
            home_display_name, away_display_name)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(p.t1_teamid)
    .bind(p.t2_teamid)
    .bind(p.pred_spread)
    .bind(p.season)
    .bind(p.daynum)
    .bind(p.id)
    .bind(p.game_id)
    .bind(&p.home_display_name)
    .bind(&p.away_display_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let table = validate_table(table)?;
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_database_with_pool(&pool).await.unwrap();
        pool
    }

    fn sample_kaggle_row() -> KaggleBoxscore {
        KaggleBoxscore {
            season: 2024,
            daynum: 50,
            wteamid: 1101,
            wscore: 80,
            lteamid: 1202,
            lscore: 70,
            wloc: "H".to_string(),
            numot: 0,
            wfgm: 30,
            wfga: 60,
            wfgm3: 8,
            wfga3: 20,
            wftm: 12,
            wfta: 15,
            wor: 10,
            wdr: 25,
            wast: 18,
            wto: 11,
            wstl: 7,
            wblk: 4,
            wpf: 16,
            lfgm: 26,
            lfga: 62,
            lfgm3: 6,
            lfga3: 22,
            lftm: 12,
            lfta: 18,
            lor: 9,
            ldr: 22,
            last: 14,
            lto: 13,
            lstl: 5,
            lblk: 2,
            lpf: 17,
        }
    }

    #[tokio::test]
    async fn insert_then_query_round_trips_rows_and_columns() {
        let pool = test_pool().await;
        let rows = vec![sample_kaggle_row(), sample_kaggle_row()];
        insert_kaggle_boxscores(&pool, &rows).await.unwrap();

        assert_eq!(count_rows(&pool, "boxscores_kaggle").await.unwrap(), 2);

        let back = fetch_winner_loser_rows(&pool, "boxscores_kaggle")
            .await
            .unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].wteamid, 1101);
        assert_eq!(back[0].winner_stats(), rows[0].winner_stats());
        assert_eq!(back[0].loser_stats(), rows[0].loser_stats());
    }

    #[tokio::test]
    async fn unknown_tables_are_rejected() {
        let pool = test_pool().await;
        let err = fetch_winner_loser_rows(&pool, "boxscores_kaggle; DROP TABLE predictions")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown table"));
    }

    #[tokio::test]
    async fn reciprocal_table_round_trip() {
        let pool = test_pool().await;
        create_reciprocal_table(&pool, "boxscores_kaggle_reciprocal")
            .await
            .unwrap();

        let src = sample_kaggle_row();
        let row = ReciprocalRow {
            season: src.season,
            daynum: src.daynum,
            t1_teamid: src.wteamid,
            t1_score: src.wscore,
            t2_teamid: src.lteamid,
            t2_score: src.lscore,
            location: 1,
            numot: src.numot,
            t1: src.winner_stats(),
            t2: src.loser_stats(),
        };
        insert_reciprocal_rows(&pool, "boxscores_kaggle_reciprocal", &[row.clone()])
            .await
            .unwrap();

        let back = fetch_reciprocal_rows_at(&pool, "boxscores_kaggle_reciprocal", 2024, 50)
            .await
            .unwrap();
        assert_eq!(back, vec![row]);
    }
}
