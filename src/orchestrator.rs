//! Session driver shared by both titles.
//!
//! Discovery strategies differ wildly per title (sample-based vs graph
//! crawl), but the player/match loops do not, so each title plugs in as a
//! `TitleBackend` and the loops live here once. A session runs strictly
//! sequentially: the providers meter requests globally, so there is nothing
//! to gain from parallel fetches.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::{Candidate, MatchRecord, MatchStatistic, PlayerProfile, Title};
use crate::store::{gateway, Db};

/// Per-title capability the session driver runs against.
#[async_trait]
pub trait TitleBackend: Send + Sync {
    fn title(&self) -> Title;

    /// Whether candidates with a sentinel rank are excluded from match
    /// loading. A quality filter: only the battle-royale title wants it.
    fn enforces_rank_gate(&self) -> bool {
        false
    }

    /// Produce the candidate player set for this run. Empty is a normal
    /// outcome and ends the session with zero work.
    async fn discover(&self) -> Vec<Candidate>;

    /// Resolve or refresh the candidate's display name and rank label.
    async fn resolve_player(&self, candidate: &Candidate) -> Option<PlayerProfile>;

    /// Ordered (most-recent-first) match ids from the candidate's history,
    /// truncated to `limit`.
    async fn history(&self, candidate: &Candidate, limit: usize) -> Vec<String>;

    /// Full match detail payload, or None when the fetch failed or the
    /// payload was unusable (both mean "skip this match").
    async fn match_details(&self, match_id: &str) -> Option<Value>;

    /// Pure suitability rule on the match payload.
    fn suitable(&self, details: &Value) -> bool;

    /// Match-level fields for persistence. None when required metadata is
    /// missing from the payload.
    fn match_record(&self, match_id: &str, details: &Value) -> Option<MatchRecord>;

    /// Normalize the candidate's statistics out of the match payload. None
    /// when the player is absent or the nested structures are missing.
    fn normalize(&self, details: &Value, candidate: &Candidate) -> Option<MatchStatistic>;
}

/// Run parameters the loops care about; discovery quotas live inside the
/// backend since they are title-specific.
#[derive(Debug, Clone, Copy)]
pub struct RunQuotas {
    /// Suitable matches to save per candidate player.
    pub matches_wanted: usize,
    /// History lookback = matches_wanted * history_multiplier, to leave room
    /// for suitability rejections.
    pub history_multiplier: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub candidates: usize,
    pub players_processed: usize,
    pub matches_seen: usize,
    pub matches_saved: usize,
    pub stats_created: usize,
    pub stats_updated: usize,
}

pub async fn run_session(
    backend: &dyn TitleBackend,
    db: &Db,
    quotas: &RunQuotas,
) -> Result<SessionSummary> {
    let title = backend.title();
    info!(game = %title, "ingestion session starting");

    let candidates = backend.discover().await;
    let mut summary = SessionSummary {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        warn!(game = %title, "discovery yielded no candidates; ending run");
        return Ok(summary);
    }
    info!(game = %title, candidates = candidates.len(), "discovery complete");

    // In-session dedup: a match processed once this run is never re-fetched
    // or re-normalized, even when it shows up in several players' histories.
    let mut seen_matches: HashSet<String> = HashSet::new();
    let history_limit = quotas.matches_wanted * quotas.history_multiplier;

    for candidate in &candidates {
        let Some(profile) = backend.resolve_player(candidate).await else {
            warn!(player = %candidate.external_id, "could not resolve player profile; skipping");
            continue;
        };
        let player_id = gateway::upsert_player(db, title, &candidate.external_id, &profile).await?;
        info!(player = %profile.username, rank = %profile.rank, "player upserted");

        if backend.enforces_rank_gate() && profile.is_unranked() {
            warn!(
                player = %profile.username,
                rank = %profile.rank,
                "rank gate: player is unranked, skipping match loading"
            );
            continue;
        }
        summary.players_processed += 1;

        let history = backend.history(candidate, history_limit).await;
        if history.is_empty() {
            warn!(player = %profile.username, "no match history; skipping player");
            continue;
        }

        let mut saved_for_player = 0usize;
        for match_id in history {
            if saved_for_player >= quotas.matches_wanted {
                debug!(player = %profile.username, saved_for_player, "per-player quota reached");
                break;
            }
            if seen_matches.contains(&match_id) {
                debug!(match_id, "match already processed this session; skipping");
                continue;
            }

            let Some(details) = backend.match_details(&match_id).await else {
                continue;
            };
            // Seen regardless of suitability; only a failed fetch may retry
            // later under another player.
            seen_matches.insert(match_id.clone());
            summary.matches_seen += 1;

            if !backend.suitable(&details) {
                info!(match_id, "match not suitable; skipping");
                continue;
            }
            let Some(record) = backend.match_record(&match_id, &details) else {
                warn!(match_id, "match payload missing required metadata; skipping");
                continue;
            };

            let match_row_id = gateway::upsert_match(db, title, &record).await?;
            match backend.normalize(&details, candidate) {
                Some(stat) => {
                    let res =
                        gateway::upsert_statistic(db, title, player_id, match_row_id, &stat).await?;
                    if res.created {
                        summary.stats_created += 1;
                    } else {
                        summary.stats_updated += 1;
                    }
                }
                None => {
                    warn!(
                        match_id,
                        player = %profile.username,
                        "player statistics missing from match payload"
                    );
                }
            }
            saved_for_player += 1;
            summary.matches_saved += 1;
            info!(
                match_id,
                player = %profile.username,
                saved_for_player,
                wanted = quotas.matches_wanted,
                "suitable match processed"
            );
        }
    }

    info!(
        game = %title,
        candidates = summary.candidates,
        players_processed = summary.players_processed,
        matches_seen = summary.matches_seen,
        matches_saved = summary.matches_saved,
        stats_created = summary.stats_created,
        stats_updated = summary.stats_updated,
        "ingestion session complete"
    );
    Ok(summary)
}
