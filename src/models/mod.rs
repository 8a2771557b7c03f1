use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One line of counting stats for a single team in a single game.
///
/// The same block appears four times in the raw data (winner/loser in the
/// historical shape, subject/opponent in the canonical shape), so it gets its
/// own struct rather than 13 fields copied around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatLine {
    pub fgm: i64,
    pub fga: i64,
    pub fgm3: i64,
    pub fga3: i64,
    pub ftm: i64,
    pub fta: i64,
    pub or_: i64,
    pub dr: i64,
    pub ast: i64,
    pub to_: i64,
    pub stl: i64,
    pub blk: i64,
    pub pf: i64,
}

impl StatLine {
    /// Values in `db::STAT_COLUMNS` order.
    pub fn values(&self) -> [i64; 13] {
        [
            self.fgm, self.fga, self.fgm3, self.fga3, self.ftm, self.fta, self.or_, self.dr,
            self.ast, self.to_, self.stl, self.blk, self.pf,
        ]
    }
}

/// Winner/loser-oriented boxscore, the layout of the historical Kaggle
/// competition dataset (`MRegularSeasonDetailedResults.csv`).
#[derive(Debug, Clone, Deserialize, FromRow)]
pub struct KaggleBoxscore {
    #[serde(rename = "Season")]
    pub season: i64,
    #[serde(rename = "DayNum")]
    pub daynum: i64,
    #[serde(rename = "WTeamID")]
    pub wteamid: i64,
    #[serde(rename = "WScore")]
    pub wscore: i64,
    #[serde(rename = "LTeamID")]
    pub lteamid: i64,
    #[serde(rename = "LScore")]
    pub lscore: i64,
    #[serde(rename = "WLoc")]
    pub wloc: String,
    #[serde(rename = "NumOT")]
    pub numot: i64,
    #[serde(rename = "WFGM")]
    pub wfgm: i64,
    #[serde(rename = "WFGA")]
    pub wfga: i64,
    #[serde(rename = "WFGM3")]
    pub wfgm3: i64,
    #[serde(rename = "WFGA3")]
    pub wfga3: i64,
    #[serde(rename = "WFTM")]
    pub wftm: i64,
    #[serde(rename = "WFTA")]
    pub wfta: i64,
    #[serde(rename = "WOR")]
    pub wor: i64,
    #[serde(rename = "WDR")]
    pub wdr: i64,
    #[serde(rename = "WAst")]
    pub wast: i64,
    #[serde(rename = "WTO")]
    pub wto: i64,
    #[serde(rename = "WStl")]
    pub wstl: i64,
    #[serde(rename = "WBlk")]
    pub wblk: i64,
    #[serde(rename = "WPF")]
    pub wpf: i64,
    #[serde(rename = "LFGM")]
    pub lfgm: i64,
    #[serde(rename = "LFGA")]
    pub lfga: i64,
    #[serde(rename = "LFGM3")]
    pub lfgm3: i64,
    #[serde(rename = "LFGA3")]
    pub lfga3: i64,
    #[serde(rename = "LFTM")]
    pub lftm: i64,
    #[serde(rename = "LFTA")]
    pub lfta: i64,
    #[serde(rename = "LOR")]
    pub lor: i64,
    #[serde(rename = "LDR")]
    pub ldr: i64,
    #[serde(rename = "LAst")]
    pub last: i64,
    #[serde(rename = "LTO")]
    pub lto: i64,
    #[serde(rename = "LStl")]
    pub lstl: i64,
    #[serde(rename = "LBlk")]
    pub lblk: i64,
    #[serde(rename = "LPF")]
    pub lpf: i64,
}

impl KaggleBoxscore {
    pub fn winner_stats(&self) -> StatLine {
        StatLine {
            fgm: self.wfgm,
            fga: self.wfga,
            fgm3: self.wfgm3,
            fga3: self.wfga3,
            ftm: self.wftm,
            fta: self.wfta,
            or_: self.wor,
            dr: self.wdr,
            ast: self.wast,
            to_: self.wto,
            stl: self.wstl,
            blk: self.wblk,
            pf: self.wpf,
        }
    }

    pub fn loser_stats(&self) -> StatLine {
        StatLine {
            fgm: self.lfgm,
            fga: self.lfga,
            fgm3: self.lfgm3,
            fga3: self.lfga3,
            ftm: self.lftm,
            fta: self.lfta,
            or_: self.lor,
            dr: self.ldr,
            ast: self.last,
            to_: self.lto,
            stl: self.lstl,
            blk: self.lblk,
            pf: self.lpf,
        }
    }
}

/// Canonical team-vs-opponent boxscore. Every game yields exactly two of
/// these: the winner-subject row and its mirror.
///
/// `location` is from the subject's perspective: 1 home, 0 neutral, -1 away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReciprocalRow {
    pub season: i64,
    pub daynum: i64,
    pub t1_teamid: i64,
    pub t1_score: i64,
    pub t2_teamid: i64,
    pub t2_score: i64,
    pub location: i64,
    pub numot: i64,
    pub t1: StatLine,
    pub t2: StatLine,
}

/// One team boxscore row from the live sports-data API, one row per
/// (game, team). Stats the API only carries from 2024 on are optional.
#[derive(Debug, Clone)]
pub struct SdvBoxscore {
    pub game_id: i64,
    pub season: i64,
    pub season_type: i64,
    pub game_date: String,
    pub game_date_time: String,
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

/// One scheduled game as stored in `schedule_sdv`. `daynum` is derived at
/// ingest time (days since the season's first game), not supplied upstream.
#[derive(Debug, Clone)]
pub struct ScheduleGame {
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
    pub season_start_date: String,
    pub daynum: i64,
}

/// Trailing aggregates for one team as of a given (season, daynum).
/// Field order here carries no meaning; the positional feature layout lives
/// in `services::features::FEATURE_COLUMNS`.
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct TeamFeatures {
    pub team_id: i64,
    pub fgm_mean: f64,
    pub fga_mean: f64,
    pub fgm3_mean: f64,
    pub fga3_mean: f64,
    pub or_mean: f64,
    pub ast_mean: f64,
    pub to_mean: f64,
    pub stl_mean: f64,
    pub pf_mean: f64,
    pub opp_fgm_mean: f64,
    pub opp_fga_mean: f64,
    pub opp_fgm3_mean: f64,
    pub opp_fga3_mean: f64,
    pub opp_or_mean: f64,
    pub opp_ast_mean: f64,
    pub opp_to_mean: f64,
    pub opp_stl_mean: f64,
    pub opp_blk_mean: f64,
    pub point_diff_mean: f64,
    pub win_ratio_14d: f64,
}

impl TeamFeatures {
    /// Column suffixes for the mean block, in the order `mean_values`
    /// emits them. Prefixed with `t1_`/`t2_` in the training tables.
    pub const MEAN_COLUMNS: [&'static str; 19] = [
        "fgmmean",
        "fgamean",
        "fgm3mean",
        "fga3mean",
        "ormean",
        "astmean",
        "tomean",
        "stlmean",
        "pfmean",
        "opponent_fgmmean",
        "opponent_fgamean",
        "opponent_fgm3mean",
        "opponent_fga3mean",
        "opponent_ormean",
        "opponent_astmean",
        "opponent_tomean",
        "opponent_stlmean",
        "opponent_blkmean",
        "pointdiffmean",
    ];

    pub fn mean_values(&self) -> [f64; 19] {
        [
            self.fgm_mean,
            self.fga_mean,
            self.fgm3_mean,
            self.fga3_mean,
            self.or_mean,
            self.ast_mean,
            self.to_mean,
            self.stl_mean,
            self.pf_mean,
            self.opp_fgm_mean,
            self.opp_fga_mean,
            self.opp_fgm3_mean,
            self.opp_fga3_mean,
            self.opp_or_mean,
            self.opp_ast_mean,
            self.opp_to_mean,
            self.opp_stl_mean,
            self.opp_blk_mean,
            self.point_diff_mean,
        ]
    }
}

/// One training example: a reciprocal boxscore row joined with both sides'
/// trailing aggregates as of its own game day. A feature block is `None`
/// when that side has no prior games in the season (stored as NULLs and
/// excluded downstream, never zero-filled).
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub season: i64,
    pub daynum: i64,
    pub t1_teamid: i64,
    pub t2_teamid: i64,
    pub t1_score: i64,
    pub t2_score: i64,
    pub location: i64,
    pub t1: Option<TeamFeatures>,
    pub t2: Option<TeamFeatures>,
}

/// One row of `training_runs`: the record of one persisted ensemble member.
#[derive(Debug, Clone, FromRow)]
pub struct TrainingRun {
    pub training_timestamp: String,
    pub file_location: String,
    pub iteration_counts: i64,
    pub val_mae: f64,
    pub training_examples: i64,
}

/// One appended prediction row: the ensemble-mean spread for a scheduled
/// game, t1 = home side.
#[derive(Debug, Clone, FromRow)]
pub struct GamePrediction {
    pub t1_teamid: i64,
    pub t2_teamid: i64,
    pub pred_spread: f64,
    pub season: i64,
    pub daynum: i64,
    pub id: i64,
    pub game_id: i64,
    pub home_display_name: String,
    pub away_display_name: String,
}
