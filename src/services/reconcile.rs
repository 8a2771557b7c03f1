//! Schema reconciliation: projects the live-API boxscores into the
//! historical winner/loser layout, then expands every winner/loser row into
//! the canonical reciprocal pair (one row per team-as-subject).

use anyhow::Result;
use sqlx::SqlitePool;

use crate::db::{
    create_reciprocal_table, fetch_winner_loser_rows, insert_reciprocal_rows, validate_table,
};
use crate::models::{KaggleBoxscore, ReciprocalRow};

/// Rebuilds `boxscores_sdv_kagglestyle` from `boxscores_sdv`.
///
/// Pure column projection: the two per-team rows of each game are paired on
/// game_id, oriented winner/loser by the higher score, and renamed into the
/// historical column layout. No statistic is recomputed. `daynum` is derived
/// as days since the season's first recorded game date; `wloc` comes from
/// the winner's home/away flag, overridden to 'N' when the schedule marks
/// the game neutral; overtime counts are not exposed by the source and land
/// as 0.
pub async fn build_sdv_kagglestyle(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DROP TABLE IF EXISTS boxscores_sdv_kagglestyle")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE boxscores_sdv_kagglestyle AS
        SELECT
            w.season AS season,
            CAST(julianday(w.game_date) - julianday(starts.season_start) AS INTEGER) AS daynum,
            w.team_id AS wteamid,
            w.team_score AS wscore,
            l.team_id AS lteamid,
            l.team_score AS lscore,
            CASE
                WHEN COALESCE(sch.neutral_site, 0) = 1 THEN 'N'
                WHEN w.team_home_away = 'home' THEN 'H'
                ELSE 'A'
            END AS wloc,
            0 AS numot,
            w.field_goals_made AS wfgm,
            w.field_goals_attempted AS wfga,
            w.three_point_field_goals_made AS wfgm3,
            w.three_point_field_goals_attempted AS wfga3,
            w.free_throws_made AS wftm,
            w.free_throws_attempted AS wfta,
            w.offensive_rebounds AS wor,
            w.defensive_rebounds AS wdr,
            w.assists AS wast,
            w.turnovers AS wto,
            w.steals AS wstl,
            w.blocks AS wblk,
            w.fouls AS wpf,
            l.field_goals_made AS lfgm,
            l.field_goals_attempted AS lfga,
            l.three_point_field_goals_made AS lfgm3,
            l.three_point_field_goals_attempted AS lfga3,
            l.free_throws_made AS lftm,
            l.free_throws_attempted AS lfta,
            l.offensive_rebounds AS lor,
            l.defensive_rebounds AS ldr,
            l.assists AS last,
            l.turnovers AS lto,
            l.steals AS lstl,
            l.blocks AS lblk,
            l.fouls AS lpf
        FROM boxscores_sdv w
        JOIN boxscores_sdv l
            ON l.game_id = w.game_id AND l.team_id = w.opponent_team_id
        JOIN (
            SELECT season, MIN(game_date) AS season_start
            FROM boxscores_sdv
            GROUP BY season
        ) starts ON starts.season = w.season
        LEFT JOIN schedule_sdv sch ON sch.game_id = w.game_id
        WHERE w.team_score > l.team_score
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Rebuilt boxscores_sdv_kagglestyle");
    Ok(())
}

fn location_from_wloc(wloc: &str) -> i64 {
    match wloc {
        "H" => 1,
        "A" => -1,
        _ => 0,
    }
}

/// The winner-subject canonical row for a winner/loser boxscore.
pub fn winner_subject_row(src: &KaggleBoxscore) -> ReciprocalRow {
    ReciprocalRow {
        season: src.season,
        daynum: src.daynum,
        t1_teamid: src.wteamid,
        t1_score: src.wscore,
        t2_teamid: src.lteamid,
        t2_score: src.lscore,
        location: location_from_wloc(&src.wloc),
        numot: src.numot,
        t1: src.winner_stats(),
        t2: src.loser_stats(),
    }
}

/// Mirrors a canonical row into the opponent's perspective: every
/// subject-relative column trades places with its opponent-relative
/// counterpart and the location flips sign. Values are reassigned, never
/// recomputed, so `mirror(mirror(r)) == r`.
pub fn mirror(row: &ReciprocalRow) -> ReciprocalRow {
    ReciprocalRow {
        season: row.season,
        daynum: row.daynum,
        t1_teamid: row.t2_teamid,
        t1_score: row.t2_score,
        t2_teamid: row.t1_teamid,
        t2_score: row.t1_score,
        location: -row.location,
        numot: row.numot,
        t1: row.t2,
        t2: row.t1,
    }
}

/// Drop-and-recreates `dest` with the reciprocal expansion of `source`:
/// every game contributes exactly two rows, the winner-subject row and its
/// mirror. Returns the number of rows written.
pub async fn build_reciprocal(pool: &SqlitePool, source: &str, dest: &str) -> Result<usize> {
    let source = validate_table(source)?;
    let dest = validate_table(dest)?;

    create_reciprocal_table(pool, dest).await?;

    let games = fetch_winner_loser_rows(pool, source).await?;
    let mut rows = Vec::with_capacity(games.len() * 2);
    for game in &games {
        let subject = winner_subject_row(game);
        let mirrored = mirror(&subject);
        rows.push(subject);
        rows.push(mirrored);
    }
    insert_reciprocal_rows(pool, dest, &rows).await?;

    tracing::info!("Rebuilt {} with {} rows from {}", dest, rows.len(), source);
    Ok(rows.len())
}
