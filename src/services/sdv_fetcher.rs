//! Live-data ingestion: per-season team boxscores and schedules from the
//! sportsdataverse data releases, stored raw into `boxscores_sdv` and
//! `schedule_sdv`.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::env;

use crate::db::{insert_schedule_game, insert_sdv_boxscore};
use crate::models::{ScheduleGame, SdvBoxscore};

/// First season for which the feed carries fast-break / paint / turnover
/// point totals. Earlier seasons report them unreliably, so they are stored
/// as NULL.
const EXTENDED_STATS_FIRST_SEASON: i64 = 2024;

// ── feed row structures ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RawTeamBox {
    pub game_id: i64,
    pub season: i64,
    pub season_type: i64,
    pub game_date: String,
    pub game_date_time: Option<String>,
    pub team_id: i64,
    pub team_location: String,
    pub team_name: String,
    pub team_abbreviation: String,
    pub team_display_name: String,
    pub team_short_display_name: String,
    pub team_home_away: String,
    pub team_score: i64,
    pub team_winner: bool,
    pub assists: i64,
    pub blocks: i64,
    pub defensive_rebounds: i64,
    pub fast_break_points: Option<i64>,
    pub field_goal_pct: Option<f64>,
    pub field_goals_made: i64,
    pub field_goals_attempted: i64,
    pub flagrant_fouls: Option<i64>,
    pub fouls: i64,
    pub free_throw_pct: Option<f64>,
    pub free_throws_made: i64,
    pub free_throws_attempted: i64,
    pub largest_lead: Option<String>,
    pub offensive_rebounds: i64,
    pub points_in_paint: Option<i64>,
    pub steals: i64,
    pub team_turnovers: Option<i64>,
    pub technical_fouls: Option<i64>,
    pub three_point_field_goal_pct: Option<f64>,
    pub three_point_field_goals_made: i64,
    pub three_point_field_goals_attempted: i64,
    pub total_rebounds: Option<i64>,
    pub total_technical_fouls: Option<i64>,
    pub total_turnovers: Option<i64>,
    pub turnover_points: Option<i64>,
    pub turnovers: i64,
    pub opponent_team_id: i64,
    pub opponent_team_location: Option<String>,
    pub opponent_team_name: Option<String>,
    pub opponent_team_abbreviation: Option<String>,
    pub opponent_team_display_name: Option<String>,
    pub opponent_team_short_display_name: Option<String>,
    pub opponent_team_score: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawScheduleGame {
    pub id: i64,
    pub uid: String,
    pub date: String,
    pub neutral_site: bool,
    pub start_date: String,
    pub venue_full_name: Option<String>,
    pub status_type_completed: bool,
    pub home_id: i64,
    pub home_location: Option<String>,
    pub home_name: Option<String>,
    pub home_abbreviation: Option<String>,
    pub home_display_name: String,
    pub home_short_display_name: Option<String>,
    pub home_score: Option<i64>,
    pub home_winner: Option<bool>,
    pub away_id: i64,
    pub away_location: Option<String>,
    pub away_name: Option<String>,
    pub away_abbreviation: Option<String>,
    pub away_display_name: String,
    pub away_short_display_name: Option<String>,
    pub away_score: Option<i64>,
    pub away_winner: Option<bool>,
    pub game_id: i64,
    pub season: i64,
    pub season_type: i64,
    pub game_date: String,
}

// ── mapping helpers ─────────────────────────────────────────────────────────

/// Leading `YYYY-MM-DD` of a feed timestamp (`2024-02-01T19:00Z` and plain
/// dates both work).
fn date_part(s: &str) -> Result<NaiveDate> {
    let head = s.get(..10).ok_or_else(|| anyhow!("bad date '{}'", s))?;
    Ok(NaiveDate::parse_from_str(head, "%Y-%m-%d")?)
}

fn to_sdv_boxscore(r: RawTeamBox) -> SdvBoxscore {
    let extended = r.season >= EXTENDED_STATS_FIRST_SEASON;
    SdvBoxscore {
        game_id: r.game_id,
        season: r.season,
        season_type: r.season_type,
        game_date_time: r.game_date_time.unwrap_or_else(|| r.game_date.clone()),
        game_date: r.game_date,
        team_id: r.team_id,
        team_location: r.team_location,
        team_name: r.team_name,
        team_abbreviation: r.team_abbreviation,
        team_display_name: r.team_display_name,
        team_short_display_name: r.team_short_display_name,
        team_home_away: r.team_home_away,
        team_score: r.team_score,
        team_winner: r.team_winner,
        assists: r.assists,
        blocks: r.blocks,
        defensive_rebounds: r.defensive_rebounds,
        fast_break_points: if extended { r.fast_break_points } else { None },
        field_goal_pct: r.field_goal_pct,
        field_goals_made: r.field_goals_made,
        field_goals_attempted: r.field_goals_attempted,
        flagrant_fouls: r.flagrant_fouls,
        fouls: r.fouls,
        free_throw_pct: r.free_throw_pct,
        free_throws_made: r.free_throws_made,
        free_throws_attempted: r.free_throws_attempted,
        largest_lead: r.largest_lead,
        offensive_rebounds: r.offensive_rebounds,
        points_in_paint: if extended { r.points_in_paint } else { None },
        steals: r.steals,
        team_turnovers: r.team_turnovers,
        technical_fouls: r.technical_fouls,
        three_point_field_goal_pct: r.three_point_field_goal_pct,
        three_point_field_goals_made: r.three_point_field_goals_made,
        three_point_field_goals_attempted: r.three_point_field_goals_attempted,
        total_rebounds: r.total_rebounds,
        total_technical_fouls: r.total_technical_fouls,
        total_turnovers: r.total_turnovers,
        turnover_points: if extended { r.turnover_points } else { None },
        turnovers: r.turnovers,
        opponent_team_id: r.opponent_team_id,
        opponent_team_location: r.opponent_team_location,
        opponent_team_name: r.opponent_team_name,
        opponent_team_abbreviation: r.opponent_team_abbreviation,
        opponent_team_display_name: r.opponent_team_display_name,
        opponent_team_short_display_name: r.opponent_team_short_display_name,
        opponent_team_score: r.opponent_team_score,
    }
}

/// Attaches the derived columns to a season's schedule: the season's first
/// start date and `daynum` = whole days elapsed since it.
fn to_schedule_games(raw: Vec<RawScheduleGame>) -> Result<Vec<ScheduleGame>> {
    let season_start = raw
        .iter()
        .map(|g| date_part(&g.start_date))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .min()
        .ok_or_else(|| anyhow!("empty schedule feed"))?;

    raw.into_iter()
        .map(|g| {
            let day = date_part(&g.start_date)?;
            Ok(ScheduleGame {
                id: g.id,
                uid: g.uid,
                date: g.date,
                neutral_site: g.neutral_site,
                start_date: g.start_date,
                venue_full_name: g.venue_full_name,
                status_type_completed: g.status_type_completed,
                home_id: g.home_id,
                home_location: g.home_location,
                home_name: g.home_name,
                home_abbreviation: g.home_abbreviation,
                home_display_name: g.home_display_name,
                home_short_display_name: g.home_short_display_name,
                home_score: g.home_score,
                home_winner: g.home_winner,
                away_id: g.away_id,
                away_location: g.away_location,
                away_name: g.away_name,
                away_abbreviation: g.away_abbreviation,
                away_display_name: g.away_display_name,
                away_short_display_name: g.away_short_display_name,
                away_score: g.away_score,
                away_winner: g.away_winner,
                game_id: g.game_id,
                season: g.season,
                season_type: g.season_type,
                game_date: g.game_date,
                season_start_date: season_start.format("%Y-%m-%d").to_string(),
                daynum: (day - season_start).num_days(),
            })
        })
        .collect()
}

// ── SdvFetcher ──────────────────────────────────────────────────────────────

pub struct SdvFetcher {
    client: Client,
    base_url: String,
}

impl SdvFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: env::var("SDV_DATA_BASE_URL").unwrap_or_else(|_| {
                "https://raw.githubusercontent.com/sportsdataverse/hoopR-mbb-data/main/mbb"
                    .to_string()
            }),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("feed error {} for {}: {}", status, url, body));
        }
        Ok(response.json().await?)
    }

    /// Fetches one season of per-team boxscores and stores them raw.
    /// Returns the number of rows stored.
    pub async fn fetch_season_boxscores(&self, pool: &SqlitePool, season: i64) -> Result<usize> {
        let url = format!("{}/team_box/json/team_box_{}.json", self.base_url, season);
        tracing::info!("Fetching {} team boxscores from {}…", season, url);

        let raw: Vec<RawTeamBox> = self.fetch_json(&url).await?;
        let mut stored = 0usize;
        for r in raw {
            insert_sdv_boxscore(pool, &to_sdv_boxscore(r)).await?;
            stored += 1;
        }

        tracing::info!("Stored {} boxscore rows for season {}", stored, season);
        Ok(stored)
    }

    /// Fetches one season's schedule, derives `season_start_date` and
    /// `daynum`, and stores the rows. Returns the number stored.
    pub async fn fetch_season_schedule(&self, pool: &SqlitePool, season: i64) -> Result<usize> {
        let url = format!("{}/schedules/json/mbb_schedule_{}.json", self.base_url, season);
        tracing::info!("Fetching {} schedule from {}…", season, url);

        let raw: Vec<RawScheduleGame> = self.fetch_json(&url).await?;
        let games = to_schedule_games(raw)?;
        for g in &games {
            insert_schedule_game(pool, g).await?;
        }

        tracing::info!("Stored {} schedule rows for season {}", games.len(), season);
        Ok(games.len())
    }
}

impl Default for SdvFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_box(season: i64) -> RawTeamBox {
        RawTeamBox {
            game_id: 401_500_001,
            season,
            season_type: 2,
            game_date: "2023-11-10".to_string(),
            game_date_time: Some("2023-11-10T19:00Z".to_string()),
            team_id: 150,
            team_location: "Durham".to_string(),
            team_name: "Blue Devils".to_string(),
            team_abbreviation: "DUKE".to_string(),
            team_display_name: "Duke Blue Devils".to_string(),
            team_short_display_name: "Duke".to_string(),
            team_home_away: "home".to_string(),
            team_score: 74,
            team_winner: true,
            assists: 15,
            blocks: 4,
            defensive_rebounds: 24,
            fast_break_points: Some(12),
            field_goal_pct: Some(0.45),
            field_goals_made: 27,
            field_goals_attempted: 60,
            flagrant_fouls: Some(0),
            fouls: 16,
            free_throw_pct: Some(0.8),
            free_throws_made: 12,
            free_throws_attempted: 15,
            largest_lead: Some("11".to_string()),
            offensive_rebounds: 9,
            points_in_paint: Some(30),
            steals: 6,
            team_turnovers: Some(1),
            technical_fouls: Some(0),
            three_point_field_goal_pct: Some(0.4),
            three_point_field_goals_made: 8,
            three_point_field_goals_attempted: 20,
            total_rebounds: Some(33),
            total_technical_fouls: Some(0),
            total_turnovers: Some(12),
            turnover_points: Some(14),
            turnovers: 11,
            opponent_team_id: 152,
            opponent_team_location: Some("Chapel Hill".to_string()),
            opponent_team_name: Some("Tar Heels".to_string()),
            opponent_team_abbreviation: Some("UNC".to_string()),
            opponent_team_display_name: Some("North Carolina Tar Heels".to_string()),
            opponent_team_short_display_name: Some("UNC".to_string()),
            opponent_team_score: 70,
        }
    }

    fn raw_schedule(id: i64, start_date: &str) -> RawScheduleGame {
        RawScheduleGame {
            id,
            uid: format!("s:{}", id),
            date: start_date.to_string(),
            neutral_site: false,
            start_date: start_date.to_string(),
            venue_full_name: None,
            status_type_completed: false,
            home_id: 150,
            home_location: None,
            home_name: None,
            home_abbreviation: None,
            home_display_name: "Duke Blue Devils".to_string(),
            home_short_display_name: None,
            home_score: None,
            home_winner: None,
            away_id: 152,
            away_location: None,
            away_name: None,
            away_abbreviation: None,
            away_display_name: "North Carolina Tar Heels".to_string(),
            away_short_display_name: None,
            away_score: None,
            away_winner: None,
            game_id: id,
            season: 2024,
            season_type: 2,
            game_date: start_date[..10].to_string(),
        }
    }

    #[test]
    fn pre_2024_seasons_null_the_extended_stats() {
        let b = to_sdv_boxscore(raw_box(2023));
        assert_eq!(b.fast_break_points, None);
        assert_eq!(b.points_in_paint, None);
        assert_eq!(b.turnover_points, None);
        // the rest of the stat block survives untouched
        assert_eq!(b.field_goals_made, 27);
        assert_eq!(b.turnovers, 11);
    }

    #[test]
    fn recent_seasons_keep_the_extended_stats() {
        let b = to_sdv_boxscore(raw_box(2024));
        assert_eq!(b.fast_break_points, Some(12));
        assert_eq!(b.points_in_paint, Some(30));
        assert_eq!(b.turnover_points, Some(14));
    }

    #[test]
    fn schedule_daynum_counts_days_from_season_first_game() {
        let games = to_schedule_games(vec![
            raw_schedule(3, "2023-12-01T19:00Z"),
            raw_schedule(1, "2023-11-06T17:00Z"),
            raw_schedule(2, "2023-11-07T23:30Z"),
        ])
        .unwrap();

        for g in &games {
            assert_eq!(g.season_start_date, "2023-11-06");
        }
        let daynums: Vec<i64> = games.iter().map(|g| g.daynum).collect();
        assert_eq!(daynums, vec![25, 0, 1]);
    }

    #[test]
    fn empty_schedule_feed_is_an_error() {
        assert!(to_schedule_games(Vec::new()).is_err());
    }

    #[test]
    fn bad_dates_are_rejected() {
        assert!(date_part("nope").is_err());
        assert_eq!(
            date_part("2024-02-01T19:00Z").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }
}
