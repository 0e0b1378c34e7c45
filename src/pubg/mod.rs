//! Battle-royale title (PUBG) ingestion: sample-based seed discovery,
//! seasonal rank lookup, match suitability and statistic normalization.
//!
//! The provider speaks JSON:API — match payloads carry participants and
//! rosters as `included` resources, and win attribution requires walking the
//! roster→participant relationship lists.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::RateLimitedClient;
use crate::model::{
    Candidate, MatchRecord, MatchStatistic, PlayerProfile, Title, RANK_UNKNOWN, RANK_UNRANKED,
};
use crate::normalization;
use crate::orchestrator::TitleBackend;

pub const API_BASE: &str = "https://api.pubg.com/shards";

// Provider quota is 10 requests/minute; 6.1s keeps us just under it.
const REQUEST_DELAY: Duration = Duration::from_millis(6100);
const RETRY_FALLBACK: Duration = Duration::from_secs(10);

const QUALIFYING_MATCH_TYPE: &str = "competitive";
const OFFICIAL_MATCH_TYPE: &str = "official";
const RANKED_MODES: &[&str] = &["squad", "squad-fpp", "solo", "solo-fpp", "duo", "duo-fpp"];

/// The slice of the provider API that discovery walks. Split out so the
/// discovery logic is testable against canned payloads.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn sample_match_ids(&self, count: usize) -> Vec<String>;
    async fn match_data(&self, match_id: &str) -> Option<Value>;
}

pub struct PubgApi {
    client: RateLimitedClient,
    base: String,
    platform: String,
}

impl PubgApi {
    pub fn new(api_key: &str, platform: &str) -> Self {
        Self {
            client: RateLimitedClient::new(
                format!("Bearer {api_key}"),
                "application/vnd.api+json",
                REQUEST_DELAY,
                RETRY_FALLBACK,
            ),
            base: API_BASE.to_string(),
            platform: platform.to_string(),
        }
    }

    pub async fn player_profile(&self, account_id: &str) -> Option<Value> {
        let url = format!("{}/{}/players/{}", self.base, self.platform, account_id);
        self.client.request(&url).await.into_json()
    }

    /// Ordered match ids from the player's relationships, truncated to `limit`.
    pub async fn player_match_ids(&self, account_id: &str, limit: usize) -> Vec<String> {
        let Some(doc) = self.player_profile(account_id).await else {
            warn!(account_id, "could not fetch player match history");
            return Vec::new();
        };
        match_refs(&doc, limit)
    }

    /// Seasonal rank label ("Tier Sub"), or a sentinel. Checks the configured
    /// game mode first, then its base mode (prefix before '-').
    pub async fn rank_label(
        &self,
        account_id: &str,
        season_id: Option<&str>,
        mode_filter: &str,
    ) -> String {
        let Some(season) = season_id else {
            return RANK_UNKNOWN.to_string();
        };
        let url = format!(
            "{}/{}/players/{}/seasons/{}/ranked",
            self.base, self.platform, account_id, season
        );
        let Some(doc) = self.client.request(&url).await.into_json() else {
            return RANK_UNKNOWN.to_string();
        };
        let Some(modes) = doc.pointer("/data/attributes/rankedGameModeStats") else {
            return RANK_UNKNOWN.to_string();
        };

        let mut modes_to_check: Vec<&str> = vec![mode_filter];
        if let Some(base) = mode_filter.split('-').next() {
            if base != mode_filter {
                modes_to_check.push(base);
            }
        }
        for key in modes_to_check {
            let Some(tier_info) = modes.get(key).and_then(|m| m.get("currentTier")) else {
                continue;
            };
            let tier = tier_info.get("tier").and_then(Value::as_str).unwrap_or("");
            let sub = tier_info.get("subTier");
            let tier_lower = tier.to_ascii_lowercase();
            if !tier.is_empty() && tier_lower != "unranked" && tier_lower != "none" {
                if let Some(sub) = sub.filter(|s| !s.is_null()) {
                    let sub_str = match sub {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if !sub_str.is_empty() {
                        return format!("{tier} {sub_str}");
                    }
                }
            }
        }
        info!(account_id, season, mode_filter, "no current rank for checked modes");
        RANK_UNRANKED.to_string()
    }
}

#[async_trait]
impl MatchSource for PubgApi {
    /// Arbitrary recent match ids from the platform samples endpoint.
    async fn sample_match_ids(&self, count: usize) -> Vec<String> {
        let url = format!("{}/{}/samples", self.base, self.platform);
        let Some(doc) = self.client.request(&url).await.into_json() else {
            warn!(platform = %self.platform, "could not fetch sample match ids");
            return Vec::new();
        };
        match_refs(&doc, count)
    }

    async fn match_data(&self, match_id: &str) -> Option<Value> {
        let url = format!("{}/{}/matches/{}", self.base, self.platform, match_id);
        let doc = self.client.request(&url).await.into_json()?;
        if doc.get("data").is_none() {
            warn!(match_id, "match payload missing data document");
            return None;
        }
        Some(doc)
    }
}

/// Extract `data.relationships.matches.data[].id` from a JSON:API document.
fn match_refs(doc: &Value, limit: usize) -> Vec<String> {
    let Some(refs) = doc
        .pointer("/data/relationships/matches/data")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    refs.iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str))
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Scan a bounded sample of recent matches for qualifying (competitive) ones
/// and pull seed players out of them. Empty is a normal outcome: the sample
/// simply contained no qualifying match.
pub async fn find_seed_players(
    source: &dyn MatchSource,
    sample_size: usize,
    players_wanted: usize,
) -> Vec<String> {
    let sample_ids = source.sample_match_ids(sample_size).await;
    if sample_ids.is_empty() {
        warn!("no sample match ids available");
        return Vec::new();
    }
    info!(samples = sample_ids.len(), "scanning samples for qualifying matches");

    let mut found: Vec<String> = Vec::new();
    for match_id in sample_ids {
        if found.len() >= players_wanted {
            break;
        }
        let Some(doc) = source.match_data(&match_id).await else {
            continue;
        };
        let match_type = doc
            .pointer("/data/attributes/matchType")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        if match_type != QUALIFYING_MATCH_TYPE {
            info!(match_id, match_type, "sample match not qualifying");
            continue;
        }
        let picked = sample_participants(&doc, players_wanted - found.len());
        info!(match_id, picked = picked.len(), "qualifying sample match found");
        for id in picked {
            if !found.contains(&id) {
                found.push(id);
            }
        }
    }
    found
}

/// Uniformly sample up to `n` distinct eligible participant account ids from
/// a match payload.
fn sample_participants(doc: &Value, n: usize) -> Vec<String> {
    let mut eligible: BTreeSet<String> = BTreeSet::new();
    for item in participants(doc) {
        if let Some(id) = item
            .pointer("/attributes/stats/playerId")
            .and_then(Value::as_str)
        {
            if id.starts_with("account.") {
                eligible.insert(id.to_string());
            }
        }
    }
    let pool: Vec<String> = eligible.into_iter().collect();
    let mut rng = rand::thread_rng();
    pool.choose_multiple(&mut rng, n.min(pool.len()))
        .cloned()
        .collect()
}

fn included<'a>(doc: &'a Value, kind: &str) -> Vec<&'a Value> {
    doc.get("included")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|i| i.get("type").and_then(Value::as_str) == Some(kind))
                .collect()
        })
        .unwrap_or_default()
}

fn participants(doc: &Value) -> Vec<&Value> {
    included(doc, "participant")
}

fn rosters(doc: &Value) -> Vec<&Value> {
    included(doc, "roster")
}

/// Title A suitability rule: competitive always counts; official matches
/// count when not custom and played in one of the standard ranked modes.
pub fn is_match_suitable(attributes: &Value) -> bool {
    let match_type = attributes
        .get("matchType")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();
    if match_type == QUALIFYING_MATCH_TYPE {
        return true;
    }
    if match_type == OFFICIAL_MATCH_TYPE
        && !attributes
            .get("isCustomMatch")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    {
        let mode = attributes
            .get("gameMode")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_ascii_lowercase();
        return RANKED_MODES.contains(&mode.as_str());
    }
    false
}

pub fn match_record(match_id: &str, doc: &Value) -> Option<MatchRecord> {
    let attrs = doc.pointer("/data/attributes")?;
    let started_at = attrs
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    Some(MatchRecord {
        external_id: match_id.to_string(),
        started_at,
        duration_seconds: attrs.get("duration").and_then(Value::as_i64).unwrap_or(0),
        map_name: attrs
            .get("mapName")
            .and_then(Value::as_str)
            .map(str::to_string),
        game_mode: attrs
            .get("gameMode")
            .and_then(Value::as_str)
            .map(|s| s.to_ascii_lowercase()),
        rounds_played: None,
        // Only suitable matches reach persistence; they are ranked by rule.
        is_ranked: true,
    })
}

/// Normalize the target player's statistics out of a full match payload.
/// Returns None when the player or the structures it needs are absent.
pub fn normalize_statistic(doc: &Value, account_id: &str) -> Option<MatchStatistic> {
    let participants = participants(doc);
    if participants.is_empty() {
        return None;
    }
    let target = participants.iter().find(|p| {
        p.pointer("/attributes/stats/playerId").and_then(Value::as_str) == Some(account_id)
    })?;
    let stats = target.pointer("/attributes/stats")?;

    let kills = stat_i64(stats, "kills");
    let assists = stat_i64(stats, "assists");
    let death_type = stats
        .get("deathType")
        .and_then(Value::as_str)
        .unwrap_or("");
    // Alive (or no death reported) means zero deaths; anything else is one.
    let deaths = if death_type.is_empty() || death_type.eq_ignore_ascii_case("alive") {
        0
    } else {
        1
    };
    let headshot_kills = stat_i64(stats, "headshotKills");

    let won_match = won_match(doc, target.get("id").and_then(Value::as_str));

    Some(MatchStatistic {
        won_match,
        kills,
        deaths,
        assists,
        kda: normalization::kda(kills, assists, deaths),
        headshot_rate: normalization::percentage(headshot_kills as f64, kills as f64),
        damage_dealt: normalization::round1(stat_f64(stats, "damageDealt")),
        boosts_used: stat_i64(stats, "boosts"),
        heals_used: stat_i64(stats, "heals"),
        revives: stat_i64(stats, "revives"),
        dbnos: stat_i64(stats, "DBNOs"),
        time_alive_seconds: stat_f64(stats, "timeSurvived") as i64,
        longest_kill_distance: normalization::round1(stat_f64(stats, "longestKill")),
        ..Default::default()
    })
}

fn stat_i64(stats: &Value, key: &str) -> i64 {
    stats.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn stat_f64(stats: &Value, key: &str) -> f64 {
    stats.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Map roster id -> placed-first flag. Unparseable ranks count as a loss.
fn roster_win_map<'a>(rosters: &[&'a Value]) -> HashMap<&'a str, bool> {
    let mut map = HashMap::new();
    for roster in rosters {
        let Some(id) = roster.get("id").and_then(Value::as_str) else {
            continue;
        };
        let rank = roster
            .pointer("/attributes/stats/rank")
            .map(|v| match v {
                Value::Number(n) => n.as_i64().unwrap_or(99),
                Value::String(s) => s.parse::<i64>().unwrap_or(99),
                _ => 99,
            })
            .unwrap_or(99);
        map.insert(id, rank == 1);
    }
    map
}

/// Walk roster->participant relationships; the first roster referencing the
/// participant decides the win flag.
fn won_match(doc: &Value, participant_api_id: Option<&str>) -> bool {
    let Some(participant_api_id) = participant_api_id else {
        return false;
    };
    let rosters = rosters(doc);
    let wins = roster_win_map(&rosters);
    for roster in &rosters {
        let members = roster
            .pointer("/relationships/participants/data")
            .and_then(Value::as_array);
        let Some(members) = members else {
            continue;
        };
        if members
            .iter()
            .any(|m| m.get("id").and_then(Value::as_str) == Some(participant_api_id))
        {
            let roster_id = roster.get("id").and_then(Value::as_str).unwrap_or("");
            return wins.get(roster_id).copied().unwrap_or(false);
        }
    }
    false
}

/// `Player_<chars 8..16 of the account id>`, the provider-style placeholder
/// used when the profile fetch cannot supply a display name.
fn fallback_name(account_id: &str) -> String {
    let tail: String = account_id.chars().skip(8).take(8).collect();
    format!("Player_{tail}")
}

pub struct PubgBackend {
    api: PubgApi,
    sample_size: usize,
    players_wanted: usize,
    season_id: Option<String>,
    rank_mode: String,
}

impl PubgBackend {
    pub fn new(
        api: PubgApi,
        sample_size: usize,
        players_wanted: usize,
        season_id: Option<String>,
        rank_mode: String,
    ) -> Self {
        Self {
            api,
            sample_size,
            players_wanted,
            season_id,
            rank_mode,
        }
    }
}

#[async_trait]
impl TitleBackend for PubgBackend {
    fn title(&self) -> Title {
        Title::Pubg
    }

    fn enforces_rank_gate(&self) -> bool {
        true
    }

    async fn discover(&self) -> Vec<Candidate> {
        find_seed_players(&self.api, self.sample_size, self.players_wanted)
            .await
            .into_iter()
            .map(Candidate::new)
            .collect()
    }

    async fn resolve_player(&self, candidate: &Candidate) -> Option<PlayerProfile> {
        let account_id = candidate.external_id.as_str();
        let username = self
            .api
            .player_profile(account_id)
            .await
            .and_then(|doc| {
                doc.pointer("/data/attributes/name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fallback_name(account_id));
        let rank = self
            .api
            .rank_label(account_id, self.season_id.as_deref(), &self.rank_mode)
            .await;
        Some(PlayerProfile { username, rank })
    }

    async fn history(&self, candidate: &Candidate, limit: usize) -> Vec<String> {
        self.api
            .player_match_ids(&candidate.external_id, limit)
            .await
    }

    async fn match_details(&self, match_id: &str) -> Option<Value> {
        self.api.match_data(match_id).await
    }

    fn suitable(&self, details: &Value) -> bool {
        details
            .pointer("/data/attributes")
            .map(is_match_suitable)
            .unwrap_or(false)
    }

    fn match_record(&self, match_id: &str, details: &Value) -> Option<MatchRecord> {
        match_record(match_id, details)
    }

    fn normalize(&self, details: &Value, candidate: &Candidate) -> Option<MatchStatistic> {
        normalize_statistic(details, &candidate.external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(match_type: &str, custom: bool, mode: &str) -> Value {
        json!({
            "matchType": match_type,
            "isCustomMatch": custom,
            "gameMode": mode,
        })
    }

    #[test]
    fn competitive_matches_are_always_suitable() {
        assert!(is_match_suitable(&attrs("competitive", false, "squad")));
        assert!(is_match_suitable(&attrs("competitive", true, "arcade")));
    }

    #[test]
    fn official_matches_need_ranked_mode_and_no_custom_flag() {
        assert!(is_match_suitable(&attrs("official", false, "solo")));
        assert!(is_match_suitable(&attrs("official", false, "squad-fpp")));
        assert!(!is_match_suitable(&attrs("official", true, "solo")));
        assert!(!is_match_suitable(&attrs("official", false, "arcade")));
        assert!(!is_match_suitable(&attrs("casual", false, "solo")));
    }

    fn participant(api_id: &str, account_id: &str, stats: Value) -> Value {
        let mut stats = stats;
        stats["playerId"] = Value::from(account_id);
        json!({
            "type": "participant",
            "id": api_id,
            "attributes": { "stats": stats }
        })
    }

    fn roster(id: &str, rank: i64, member_ids: &[&str]) -> Value {
        json!({
            "type": "roster",
            "id": id,
            "attributes": { "stats": { "rank": rank } },
            "relationships": {
                "participants": {
                    "data": member_ids.iter().map(|m| json!({"id": m})).collect::<Vec<_>>()
                }
            }
        })
    }

    fn match_doc(included: Vec<Value>) -> Value {
        json!({
            "data": {
                "attributes": {
                    "matchType": "competitive",
                    "createdAt": "2024-03-01T12:00:00Z",
                    "duration": 1800,
                    "mapName": "Erangel",
                    "gameMode": "squad-fpp"
                }
            },
            "included": included
        })
    }

    #[test]
    fn normalizes_target_player_with_zero_deaths() {
        let doc = match_doc(vec![
            participant(
                "p1",
                "account.target",
                json!({
                    "kills": 4, "assists": 2, "deathType": "alive",
                    "headshotKills": 2, "damageDealt": 351.27,
                    "boosts": 3, "heals": 5, "revives": 1, "DBNOs": 2,
                    "timeSurvived": 1650.5, "longestKill": 212.44
                }),
            ),
            roster("r1", 1, &["p1"]),
        ]);

        let stat = normalize_statistic(&doc, "account.target").unwrap();
        assert_eq!(stat.kills, 4);
        assert_eq!(stat.deaths, 0);
        assert_eq!(stat.assists, 2);
        assert_eq!(stat.kda, 6.0);
        assert_eq!(stat.headshot_rate, 50.0);
        assert_eq!(stat.damage_dealt, 351.3);
        assert_eq!(stat.time_alive_seconds, 1650);
        assert_eq!(stat.longest_kill_distance, 212.4);
        assert!(stat.won_match);
    }

    #[test]
    fn death_type_other_than_alive_counts_one_death() {
        let doc = match_doc(vec![participant(
            "p1",
            "account.target",
            json!({ "kills": 4, "assists": 2, "deathType": "byplayer" }),
        )]);
        let stat = normalize_statistic(&doc, "account.target").unwrap();
        assert_eq!(stat.deaths, 1);
        assert_eq!(stat.kda, 6.0);
    }

    #[test]
    fn headshot_rate_zero_when_no_kills() {
        let doc = match_doc(vec![participant(
            "p1",
            "account.target",
            json!({ "kills": 0, "headshotKills": 0, "deathType": "byplayer" }),
        )]);
        let stat = normalize_statistic(&doc, "account.target").unwrap();
        assert_eq!(stat.headshot_rate, 0.0);
    }

    #[test]
    fn win_comes_from_first_matching_roster() {
        let doc = match_doc(vec![
            participant("p1", "account.winner", json!({"kills": 1, "deathType": "alive"})),
            participant("p2", "account.loser", json!({"kills": 0, "deathType": "byplayer"})),
            roster("r1", 1, &["p1"]),
            roster("r2", 7, &["p2"]),
        ]);
        assert!(normalize_statistic(&doc, "account.winner").unwrap().won_match);
        assert!(!normalize_statistic(&doc, "account.loser").unwrap().won_match);
    }

    #[test]
    fn missing_numeric_fields_default_to_zero() {
        let doc = match_doc(vec![participant(
            "p1",
            "account.target",
            json!({ "deathType": "alive" }),
        )]);
        let stat = normalize_statistic(&doc, "account.target").unwrap();
        assert_eq!(stat.kills, 0);
        assert_eq!(stat.assists, 0);
        assert_eq!(stat.boosts_used, 0);
        assert_eq!(stat.dbnos, 0);
        assert_eq!(stat.damage_dealt, 0.0);
        assert_eq!(stat.time_alive_seconds, 0);
        assert_eq!(stat.longest_kill_distance, 0.0);
    }

    #[test]
    fn absent_player_yields_none() {
        let doc = match_doc(vec![participant(
            "p1",
            "account.someone",
            json!({"kills": 1}),
        )]);
        assert!(normalize_statistic(&doc, "account.other").is_none());
        assert!(normalize_statistic(&match_doc(vec![]), "account.other").is_none());
    }

    #[test]
    fn fallback_name_uses_account_id_tail() {
        assert_eq!(fallback_name("account.0123456789abcdef"), "Player_01234567");
    }

    struct FakeSource {
        samples: Vec<String>,
        matches: HashMap<String, Value>,
    }

    #[async_trait]
    impl MatchSource for FakeSource {
        async fn sample_match_ids(&self, count: usize) -> Vec<String> {
            self.samples.iter().take(count).cloned().collect()
        }

        async fn match_data(&self, match_id: &str) -> Option<Value> {
            self.matches.get(match_id).cloned()
        }
    }

    fn plain_match(match_type: &str, account_ids: &[&str]) -> Value {
        let included: Vec<Value> = account_ids
            .iter()
            .enumerate()
            .map(|(i, id)| participant(&format!("p{i}"), id, json!({})))
            .collect();
        json!({
            "data": { "attributes": { "matchType": match_type } },
            "included": included
        })
    }

    #[tokio::test]
    async fn seed_discovery_picks_only_from_qualifying_match() {
        let mut matches = HashMap::new();
        for i in 0..10 {
            let id = format!("m{i}");
            // Only the 4th sample qualifies; the rest are official matches
            // with their own participants.
            let doc = if i == 3 {
                plain_match(
                    "competitive",
                    &["account.a", "account.b", "account.c"],
                )
            } else {
                plain_match("official", &[&format!("account.decoy{i}")])
            };
            matches.insert(id, doc);
        }
        let source = FakeSource {
            samples: (0..10).map(|i| format!("m{i}")).collect(),
            matches,
        };

        let found = find_seed_players(&source, 10, 5).await;
        assert_eq!(found.len(), 3);
        for id in &found {
            assert!(["account.a", "account.b", "account.c"].contains(&id.as_str()));
        }
    }

    #[tokio::test]
    async fn seed_discovery_respects_players_wanted() {
        let mut matches = HashMap::new();
        matches.insert(
            "m0".to_string(),
            plain_match("competitive", &["account.a", "account.b", "account.c"]),
        );
        let source = FakeSource {
            samples: vec!["m0".to_string()],
            matches,
        };
        let found = find_seed_players(&source, 10, 2).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn seed_discovery_without_qualifying_match_is_empty() {
        let mut matches = HashMap::new();
        matches.insert("m0".to_string(), plain_match("official", &["account.a"]));
        let source = FakeSource {
            samples: vec!["m0".to_string()],
            matches,
        };
        assert!(find_seed_players(&source, 10, 3).await.is_empty());
    }

    #[test]
    fn match_record_reads_attributes() {
        let doc = match_doc(vec![]);
        let record = match_record("m1", &doc).unwrap();
        assert_eq!(record.external_id, "m1");
        assert_eq!(record.duration_seconds, 1800);
        assert_eq!(record.map_name.as_deref(), Some("Erangel"));
        assert_eq!(record.game_mode.as_deref(), Some("squad-fpp"));
        assert!(record.is_ranked);
        assert_eq!(record.started_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }
}
