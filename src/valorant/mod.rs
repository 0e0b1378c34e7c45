//! Tactical-shooter title (Valorant) ingestion: account resolution, BFS
//! rank-bucket crawling and statistic normalization.
//!
//! The provider wraps every payload in an envelope (`status`, `data`); an
//! embedded non-200 status is a failure even when the HTTP layer said 200.
//! There is no samples endpoint, so discovery walks the player graph from a
//! configured start account, bucketing participants by rank tier.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::RateLimitedClient;
use crate::model::{Candidate, MatchRecord, MatchStatistic, PlayerProfile, Title, RANK_UNKNOWN};
use crate::normalization::{self, rank};
use crate::orchestrator::TitleBackend;

pub const API_BASE: &str = "https://api.henrikdev.xyz";

// Community-key quota is 30 requests/minute; 2.1s keeps us just under it.
const REQUEST_DELAY: Duration = Duration::from_millis(2100);
const RETRY_FALLBACK: Duration = Duration::from_secs(5);

/// Matches pulled per player while crawling. Smaller than ingestion history
/// so traversal stays cheap.
const CRAWL_WINDOW: usize = 5;
/// Hard cap on crawl iterations (players dequeued), so a sparse graph or
/// over-ambitious quotas cannot spin the session forever.
const MAX_CRAWL_ITERATIONS: usize = 500;
/// Participant entries with implausibly short puuids are provider noise.
const MIN_PUUID_LEN: usize = 10;

/// Weapons every round starts with; tallying them would drown real picks.
const STARTING_WEAPONS: &[&str] = &["classic", "knife"];

const COMPETITIVE_MODE_ID: &str = "competitive";

/// The slice of the provider API the crawler walks, split out so traversal
/// is testable against canned payloads.
#[async_trait]
pub trait CrawlSource: Send + Sync {
    async fn recent_match_ids(&self, region: &str, puuid: &str, size: usize) -> Vec<String>;
    async fn match_details(&self, match_id: &str) -> Option<Value>;
}

pub struct ValorantApi {
    client: RateLimitedClient,
    base: String,
    platform: String,
}

impl ValorantApi {
    pub fn new(api_key: &str, platform: &str) -> Self {
        Self {
            client: RateLimitedClient::new(
                api_key.to_string(),
                "application/json",
                REQUEST_DELAY,
                RETRY_FALLBACK,
            ),
            base: API_BASE.to_string(),
            platform: platform.to_string(),
        }
    }

    pub async fn account_details(&self, name: &str, tag: &str) -> Option<Value> {
        let url = format!(
            "{}/valorant/v1/account/{}/{}",
            self.base,
            urlencoding::encode(name),
            urlencoding::encode(tag)
        );
        envelope_data(self.client.request(&url).await.into_json()?)
    }

    pub async fn account_by_puuid(&self, puuid: &str) -> Option<Value> {
        let url = format!("{}/valorant/v1/by-puuid/account/{}", self.base, puuid);
        envelope_data(self.client.request(&url).await.into_json()?)
    }

    /// Competitive match ids from the player's recent history, newest first.
    pub async fn recent_competitive_ids(
        &self,
        region: &str,
        puuid: &str,
        size: usize,
    ) -> Vec<String> {
        let url = format!(
            "{}/valorant/v4/by-puuid/matches/{}/{}/{}?mode={}&size={}",
            self.base, region, self.platform, puuid, COMPETITIVE_MODE_ID, size
        );
        let Some(data) = self
            .client
            .request(&url)
            .await
            .into_json()
            .and_then(envelope_data)
        else {
            warn!(puuid, region, "could not fetch match history");
            return Vec::new();
        };
        let Some(entries) = data.as_array() else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|m| {
                m.pointer("/metadata/match_id")
                    .or_else(|| m.pointer("/metadata/matchid"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .collect()
    }

    pub async fn full_match(&self, match_id: &str) -> Option<Value> {
        let url = format!("{}/valorant/v2/match/{}", self.base, match_id);
        envelope_data(self.client.request(&url).await.into_json()?)
    }
}

#[async_trait]
impl CrawlSource for ValorantApi {
    async fn recent_match_ids(&self, region: &str, puuid: &str, size: usize) -> Vec<String> {
        self.recent_competitive_ids(region, puuid, size).await
    }

    async fn match_details(&self, match_id: &str) -> Option<Value> {
        self.full_match(match_id).await
    }
}

/// Unwrap the provider envelope. An embedded non-200 status is an error even
/// on HTTP 200; the embedded message is logged and the payload discarded.
fn envelope_data(doc: Value) -> Option<Value> {
    let status = doc.get("status").and_then(Value::as_i64).unwrap_or(0);
    if status != 200 {
        let message = doc
            .pointer("/errors/0/message")
            .and_then(Value::as_str)
            .unwrap_or("no error message");
        warn!(status, message, "provider envelope reported an error");
        return None;
    }
    doc.get("data").cloned()
}

pub struct CrawlPlan {
    pub start_puuid: String,
    pub start_region: String,
    pub target_ranks: Vec<String>,
    pub players_per_rank: usize,
}

/// Breadth-first crawl of the player graph, bucketing discovered players by
/// rank tier until every requested bucket is full.
///
/// Every unseen participant is enqueued regardless of bucket so the frontier
/// keeps growing through tiers we do not collect. A player is never dequeued
/// twice, and the iteration cap bounds the walk when quotas cannot be met.
pub async fn crawl(source: &dyn CrawlSource, plan: &CrawlPlan) -> Vec<Candidate> {
    let mut buckets: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
    for name in &plan.target_ranks {
        if rank::is_known_tier(name) {
            buckets.insert(name.clone(), Vec::new());
        } else {
            warn!(rank = %name, "ignoring unknown rank tier in crawl targets");
        }
    }
    if buckets.is_empty() {
        warn!("no valid rank tiers to crawl for");
        return Vec::new();
    }

    let mut queue: VecDeque<(String, String)> = VecDeque::new();
    let mut seen: HashSet<String> = HashSet::new();
    queue.push_back((plan.start_puuid.clone(), plan.start_region.clone()));
    seen.insert(plan.start_puuid.clone());

    let mut iterations = 0usize;
    while let Some((puuid, region)) = {
        let all_full = buckets.values().all(|b| b.len() >= plan.players_per_rank);
        if all_full || iterations >= MAX_CRAWL_ITERATIONS {
            None
        } else {
            queue.pop_front()
        }
    } {
        iterations += 1;
        debug!(iterations, queued = queue.len(), puuid, "crawl step");

        let match_ids = source.recent_match_ids(&region, &puuid, CRAWL_WINDOW).await;
        for match_id in match_ids {
            let Some(details) = source.match_details(&match_id).await else {
                continue;
            };
            let match_region = details
                .pointer("/metadata/region")
                .and_then(Value::as_str)
                .unwrap_or(&region)
                .to_string();
            let Some(players) = details.pointer("/players/all_players").and_then(Value::as_array)
            else {
                continue;
            };

            for player in players {
                let Some(p) = player.get("puuid").and_then(Value::as_str) else {
                    continue;
                };
                if p.len() < MIN_PUUID_LEN {
                    continue;
                }

                // Collection is independent of the traversal seen-set so a
                // qualifying start player still lands in its bucket; dedup
                // is per bucket.
                let tier = rank::classify_tier(player.get("currenttier").and_then(Value::as_i64));
                if let Some(bucket) = buckets.get_mut(tier) {
                    if bucket.len() < plan.players_per_rank
                        && bucket.iter().all(|c| c.external_id != p)
                    {
                        let profile = display_name(player).map(|username| PlayerProfile {
                            username,
                            rank: tier.to_string(),
                        });
                        bucket.push(Candidate {
                            external_id: p.to_string(),
                            region: Some(match_region.clone()),
                            profile,
                        });
                        debug!(puuid = p, tier, in_bucket = bucket.len(), "collected player");
                    }
                }

                if seen.insert(p.to_string()) {
                    queue.push_back((p.to_string(), match_region.clone()));
                }
            }
        }
    }

    for (tier, bucket) in &buckets {
        info!(tier = %tier, collected = bucket.len(), wanted = plan.players_per_rank, "crawl bucket");
    }
    buckets.into_values().flatten().collect()
}

fn display_name(player: &Value) -> Option<String> {
    let name = player.get("name").and_then(Value::as_str)?;
    let tag = player.get("tag").and_then(Value::as_str)?;
    if name.is_empty() || tag.is_empty() {
        return None;
    }
    Some(format!("{name}#{tag}"))
}

pub fn is_match_suitable(details: &Value) -> bool {
    details
        .pointer("/metadata/mode_id")
        .and_then(Value::as_str)
        .map(|m| m.eq_ignore_ascii_case(COMPETITIVE_MODE_ID))
        .unwrap_or(false)
}

pub fn match_record(match_id: &str, details: &Value) -> Option<MatchRecord> {
    let metadata = details.get("metadata")?;
    let started_at = metadata
        .get("game_start")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);
    Some(MatchRecord {
        external_id: match_id.to_string(),
        started_at,
        duration_seconds: metadata
            .get("game_length")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        map_name: metadata.get("map").and_then(Value::as_str).map(str::to_string),
        game_mode: metadata
            .get("mode")
            .and_then(Value::as_str)
            .map(str::to_string),
        rounds_played: metadata
            .get("rounds_played")
            .and_then(Value::as_i64)
            .map(|r| r as i32),
        is_ranked: is_match_suitable(details),
    })
}

/// Normalize the target player's statistics out of a full match payload.
/// The stats block, the team lists and the round list are all required;
/// anything missing skips the player for this match.
pub fn normalize_statistic(details: &Value, puuid: &str) -> Option<MatchStatistic> {
    let players = details.pointer("/players/all_players").and_then(Value::as_array)?;
    let target = players
        .iter()
        .find(|p| p.get("puuid").and_then(Value::as_str) == Some(puuid))?;
    let stats = target.get("stats")?;
    let teams = details.get("teams")?;
    let rounds = details.get("rounds").and_then(Value::as_array)?;

    let kills = stat_i64(stats, "kills");
    let deaths = stat_i64(stats, "deaths");
    let assists = stat_i64(stats, "assists");
    let headshots = stat_i64(stats, "headshots");
    let bodyshots = stat_i64(stats, "bodyshots");
    let legshots = stat_i64(stats, "legshots");
    let total_shots_hit = headshots + bodyshots + legshots;

    let casts = target.get("ability_casts");
    let cast = |key: &str| casts.map(|c| stat_i64(c, key)).unwrap_or(0);
    let skills_used = cast("c_cast") + cast("q_cast") + cast("e_cast");
    let ultimates_used = cast("x_cast");

    let winning_team = if teams
        .pointer("/red/has_won")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        "Red"
    } else {
        "Blue"
    };
    let won_match = target
        .get("team")
        .and_then(Value::as_str)
        .map(|t| t.eq_ignore_ascii_case(winning_team))
        .unwrap_or(false);

    let mut bomb_plants = 0i64;
    let mut bomb_defuses = 0i64;
    let mut weapon_counts: HashMap<String, i64> = HashMap::new();
    for round in rounds {
        if round
            .pointer("/plant_events/planted_by/puuid")
            .and_then(Value::as_str)
            == Some(puuid)
        {
            bomb_plants += 1;
        }
        if round
            .pointer("/defuse_events/defused_by/puuid")
            .and_then(Value::as_str)
            == Some(puuid)
        {
            bomb_defuses += 1;
        }
        let Some(round_players) = round.get("player_stats").and_then(Value::as_array) else {
            continue;
        };
        for rp in round_players {
            if rp.get("player_puuid").and_then(Value::as_str) != Some(puuid) {
                continue;
            }
            if let Some(weapon) = rp.pointer("/economy/weapon/name").and_then(Value::as_str) {
                if !STARTING_WEAPONS.contains(&weapon.to_ascii_lowercase().as_str()) {
                    *weapon_counts.entry(weapon.to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    Some(MatchStatistic {
        won_match,
        kills,
        deaths,
        assists,
        kda: normalization::kda(kills, assists, deaths),
        headshot_rate: normalization::percentage(headshots as f64, total_shots_hit as f64),
        headshots,
        bodyshots,
        legshots,
        total_shots_hit,
        skills_used,
        ultimates_used,
        bomb_plants,
        bomb_defuses,
        favorite_weapon: favorite_weapon(&weapon_counts),
        ..Default::default()
    })
}

/// Most-used weapon by (count desc, name asc). Empty weapon names lose to
/// any named weapon regardless of count.
fn favorite_weapon(counts: &HashMap<String, i64>) -> Option<String> {
    let mut entries: Vec<(&String, &i64)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .find(|(name, _)| !name.is_empty())
        .map(|(name, _)| name.clone())
}

fn stat_i64(obj: &Value, key: &str) -> i64 {
    obj.get(key).and_then(Value::as_i64).unwrap_or(0)
}

pub struct ValorantBackend {
    api: ValorantApi,
    start_name: String,
    start_tag: String,
    target_ranks: Vec<String>,
    players_per_rank: usize,
}

impl ValorantBackend {
    pub fn new(
        api: ValorantApi,
        start_name: String,
        start_tag: String,
        target_ranks: Vec<String>,
        players_per_rank: usize,
    ) -> Self {
        Self {
            api,
            start_name,
            start_tag,
            target_ranks,
            players_per_rank,
        }
    }
}

#[async_trait]
impl TitleBackend for ValorantBackend {
    fn title(&self) -> Title {
        Title::Valorant
    }

    async fn discover(&self) -> Vec<Candidate> {
        let Some(account) = self.api.account_details(&self.start_name, &self.start_tag).await
        else {
            warn!(
                name = %self.start_name,
                tag = %self.start_tag,
                "could not resolve crawl start account"
            );
            return Vec::new();
        };
        let (Some(puuid), Some(region)) = (
            account.get("puuid").and_then(Value::as_str),
            account.get("region").and_then(Value::as_str),
        ) else {
            warn!("start account payload missing puuid or region");
            return Vec::new();
        };
        info!(puuid, region, "crawl start account resolved");

        let plan = CrawlPlan {
            start_puuid: puuid.to_string(),
            start_region: region.to_string(),
            target_ranks: self.target_ranks.clone(),
            players_per_rank: self.players_per_rank,
        };
        crawl(&self.api, &plan).await
    }

    async fn resolve_player(&self, candidate: &Candidate) -> Option<PlayerProfile> {
        // The crawler captures name and rank in passing; only candidates
        // without one need another lookup.
        if let Some(profile) = &candidate.profile {
            return Some(profile.clone());
        }
        let account = self.api.account_by_puuid(&candidate.external_id).await?;
        let username = display_name(&account)?;
        Some(PlayerProfile {
            username,
            rank: RANK_UNKNOWN.to_string(),
        })
    }

    async fn history(&self, candidate: &Candidate, limit: usize) -> Vec<String> {
        let region = candidate.region.as_deref().unwrap_or("na");
        self.api
            .recent_competitive_ids(region, &candidate.external_id, limit)
            .await
    }

    async fn match_details(&self, match_id: &str) -> Option<Value> {
        self.api.full_match(match_id).await
    }

    fn suitable(&self, details: &Value) -> bool {
        is_match_suitable(details)
    }

    fn match_record(&self, match_id: &str, details: &Value) -> Option<MatchRecord> {
        match_record(match_id, details)
    }

    fn normalize(&self, details: &Value, candidate: &Candidate) -> Option<MatchStatistic> {
        normalize_statistic(details, &candidate.external_id)
    }
}
