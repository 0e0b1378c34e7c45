use std::fmt;

use chrono::{DateTime, Utc};

/// Rank sentinel for players whose rank could not be determined at all.
pub const RANK_UNKNOWN: &str = "UNKNOWN";
/// Rank sentinel for players known to be below the ranked threshold.
pub const RANK_UNRANKED: &str = "UNRANKED";

/// The two supported titles. Stored in the `game` column of every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Title {
    Pubg,
    Valorant,
}

impl Title {
    pub fn as_str(self) -> &'static str {
        match self {
            Title::Pubg => "pubg",
            Title::Valorant => "valorant",
        }
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player identity produced by discovery, optionally carrying the region it
/// was discovered in and a profile captured along the way (the crawler sees
/// names and ranks for free; the sampler does not).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub external_id: String,
    pub region: Option<String>,
    pub profile: Option<PlayerProfile>,
}

impl Candidate {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            region: None,
            profile: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub username: String,
    pub rank: String,
}

impl PlayerProfile {
    /// True when the rank resolved to one of the sentinels rather than a tier.
    pub fn is_unranked(&self) -> bool {
        self.rank == RANK_UNKNOWN || self.rank == RANK_UNRANKED
    }
}

/// Match-level fields persisted once per distinct match id per title.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub external_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub map_name: Option<String>,
    pub game_mode: Option<String>,
    pub rounds_played: Option<i32>,
    pub is_ranked: bool,
}

/// The common per-player per-match statistic schema both titles normalize
/// into. Fields a title does not report stay at their zero defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchStatistic {
    pub won_match: bool,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub kda: f64,
    pub headshot_rate: f64,
    pub damage_dealt: f64,
    pub headshots: i64,
    pub bodyshots: i64,
    pub legshots: i64,
    pub total_shots_hit: i64,
    pub skills_used: i64,
    pub ultimates_used: i64,
    pub bomb_plants: i64,
    pub bomb_defuses: i64,
    pub boosts_used: i64,
    pub heals_used: i64,
    pub revives: i64,
    pub dbnos: i64,
    pub time_alive_seconds: i64,
    pub longest_kill_distance: f64,
    pub favorite_weapon: Option<String>,
}
