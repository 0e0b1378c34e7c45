//! Upsert-by-natural-key persistence gateway.
//!
//! The pipeline never performs raw inserts and never checks row existence
//! itself; every write goes through one of these three upserts, all of which
//! are safe to call repeatedly with identical keys. Upsert order is always
//! Player, then Match, then Statistic, so a statistic row can never exist
//! without its referenced player and match.

use anyhow::Result;
use sqlx::Row;
use tracing::debug;

use super::Db;
use crate::model::{MatchRecord, MatchStatistic, PlayerProfile, Title};

/// Result of a statistic upsert; `created` distinguishes a fresh row from an
/// overwrite so the session summary can report both.
#[derive(Debug, Clone, Copy)]
pub struct StatUpsert {
    pub id: i64,
    pub created: bool,
}

pub async fn upsert_player(
    db: &Db,
    title: Title,
    external_id: &str,
    profile: &PlayerProfile,
) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO players (game, external_id, username, rank)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (game, external_id) DO UPDATE
           SET username = EXCLUDED.username,
               rank = EXCLUDED.rank
         RETURNING id",
    )
    .persistent(false)
    .bind(title.as_str())
    .bind(external_id)
    .bind(&profile.username)
    .bind(&profile.rank)
    .fetch_one(&db.pool)
    .await?;
    let id: i64 = row.get("id");
    debug!(game = %title, external_id, player_id = id, "player upserted");
    Ok(id)
}

pub async fn upsert_match(db: &Db, title: Title, record: &MatchRecord) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO matches (game, external_id, started_at, duration_seconds,
                              map_name, game_mode, rounds_played, is_ranked)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (game, external_id) DO UPDATE
           SET started_at = EXCLUDED.started_at,
               duration_seconds = EXCLUDED.duration_seconds,
               map_name = EXCLUDED.map_name,
               game_mode = EXCLUDED.game_mode,
               rounds_played = EXCLUDED.rounds_played,
               is_ranked = EXCLUDED.is_ranked
         RETURNING id",
    )
    .persistent(false)
    .bind(title.as_str())
    .bind(&record.external_id)
    .bind(record.started_at)
    .bind(record.duration_seconds)
    .bind(record.map_name.as_deref())
    .bind(record.game_mode.as_deref())
    .bind(record.rounds_played)
    .bind(record.is_ranked)
    .fetch_one(&db.pool)
    .await?;
    let id: i64 = row.get("id");
    debug!(game = %title, external_id = %record.external_id, match_row_id = id, "match upserted");
    Ok(id)
}

pub async fn upsert_statistic(
    db: &Db,
    title: Title,
    player_id: i64,
    match_id: i64,
    stat: &MatchStatistic,
) -> Result<StatUpsert> {
    // xmax = 0 only for freshly inserted rows; overwrites report created=false.
    let row = sqlx::query(
        "INSERT INTO player_match_stats
            (game, player_id, match_id, won_match,
             kills, deaths, assists, kda, headshot_rate, damage_dealt,
             headshots, bodyshots, legshots, total_shots_hit,
             skills_used, ultimates_used, bomb_plants, bomb_defuses,
             boosts_used, heals_used, revives, dbnos,
             time_alive_seconds, longest_kill_distance, favorite_weapon)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                 $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
         ON CONFLICT (player_id, match_id) DO UPDATE
           SET won_match = EXCLUDED.won_match,
               kills = EXCLUDED.kills,
               deaths = EXCLUDED.deaths,
               assists = EXCLUDED.assists,
               kda = EXCLUDED.kda,
               headshot_rate = EXCLUDED.headshot_rate,
               damage_dealt = EXCLUDED.damage_dealt,
               headshots = EXCLUDED.headshots,
               bodyshots = EXCLUDED.bodyshots,
               legshots = EXCLUDED.legshots,
               total_shots_hit = EXCLUDED.total_shots_hit,
               skills_used = EXCLUDED.skills_used,
               ultimates_used = EXCLUDED.ultimates_used,
               bomb_plants = EXCLUDED.bomb_plants,
               bomb_defuses = EXCLUDED.bomb_defuses,
               boosts_used = EXCLUDED.boosts_used,
               heals_used = EXCLUDED.heals_used,
               revives = EXCLUDED.revives,
               dbnos = EXCLUDED.dbnos,
               time_alive_seconds = EXCLUDED.time_alive_seconds,
               longest_kill_distance = EXCLUDED.longest_kill_distance,
               favorite_weapon = EXCLUDED.favorite_weapon
         RETURNING id, (xmax = 0) AS created",
    )
    .persistent(false)
    .bind(title.as_str())
    .bind(player_id)
    .bind(match_id)
    .bind(stat.won_match)
    .bind(stat.kills)
    .bind(stat.deaths)
    .bind(stat.assists)
    .bind(stat.kda)
    .bind(stat.headshot_rate)
    .bind(stat.damage_dealt)
    .bind(stat.headshots)
    .bind(stat.bodyshots)
    .bind(stat.legshots)
    .bind(stat.total_shots_hit)
    .bind(stat.skills_used)
    .bind(stat.ultimates_used)
    .bind(stat.bomb_plants)
    .bind(stat.bomb_defuses)
    .bind(stat.boosts_used)
    .bind(stat.heals_used)
    .bind(stat.revives)
    .bind(stat.dbnos)
    .bind(stat.time_alive_seconds)
    .bind(stat.longest_kill_distance)
    .bind(stat.favorite_weapon.as_deref())
    .fetch_one(&db.pool)
    .await?;

    let out = StatUpsert {
        id: row.get("id"),
        created: row.get("created"),
    };
    debug!(
        game = %title,
        player_id,
        match_id,
        stat_id = out.id,
        created = out.created,
        "statistic upserted"
    );
    Ok(out)
}
