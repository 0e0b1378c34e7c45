use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use matchminer::orchestrator::{run_session, RunQuotas};
use matchminer::pubg::{PubgApi, PubgBackend};
use matchminer::store::Db;
use matchminer::util::env as env_util;
use matchminer::valorant::{ValorantApi, ValorantBackend};

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Competitive match statistics ingestion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest battle-royale matches starting from sampled seed players
    Pubg(PubgArgs),
    /// Ingest tactical-shooter matches via a rank-bucketed player crawl
    Valorant(ValorantArgs),
}

#[derive(Debug, Args)]
struct PubgArgs {
    /// Platform shard to ingest from
    #[arg(long, default_value = "steam")]
    platform: String,
    /// Sample match ids to scan for seed players
    #[arg(long, default_value_t = 10)]
    sample_matches: usize,
    /// Seed players to pull out of the first qualifying sample match
    #[arg(long, default_value_t = 1)]
    players_from_match: usize,
    /// Suitable matches to save per player
    #[arg(long, default_value_t = 2)]
    matches_per_player: usize,
    /// Ranked season id for rank lookups (no lookup when omitted)
    #[arg(long)]
    season_id: Option<String>,
    /// Ranked game mode checked for the player's current tier
    #[arg(long, default_value = "squad-fpp")]
    rank_mode: String,
    /// History ids to scan per saved match wanted
    #[arg(long, default_value_t = 15)]
    history_multiplier: usize,
}

#[derive(Debug, Args)]
struct ValorantArgs {
    /// Display name of the crawl start account
    #[arg(long)]
    start_name: String,
    /// Tag line of the crawl start account
    #[arg(long)]
    start_tag: String,
    /// Platform path segment for history lookups
    #[arg(long, default_value = "pc")]
    platform: String,
    /// Players to collect per target rank tier
    #[arg(long, default_value_t = 5)]
    players_per_rank: usize,
    /// Suitable matches to save per player
    #[arg(long, default_value_t = 5)]
    matches_per_player: usize,
    /// Rank tiers to collect players for (comma-separated)
    #[arg(long, value_delimiter = ',', default_values_t = [
        "GOLD".to_string(), "PLATINUM".to_string(), "DIAMOND".to_string()
    ])]
    target_ranks: Vec<String>,
    /// History ids to scan per saved match wanted
    #[arg(long, default_value_t = 1)]
    history_multiplier: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    matchminer::trace::init_tracing("info")?;

    let cli = Cli::parse();

    let database_url = env_util::db_url().context("no database URL configured for ingest CLI")?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNECTIONS", 5);
    let db = Db::connect(&database_url, max_conns).await?;

    let summary = match cli.command {
        Command::Pubg(args) => {
            env_util::preflight_check(
                "pubg ingest",
                &["PUBG_API_KEY"],
                &["DATABASE_URL", "PUBG_API_KEY"],
            )?;
            let api_key = env_util::env_req("PUBG_API_KEY")?;
            let backend = PubgBackend::new(
                PubgApi::new(&api_key, &args.platform),
                args.sample_matches,
                args.players_from_match,
                args.season_id,
                args.rank_mode,
            );
            let quotas = RunQuotas {
                matches_wanted: args.matches_per_player,
                history_multiplier: args.history_multiplier,
            };
            run_session(&backend, &db, &quotas).await?
        }
        Command::Valorant(args) => {
            env_util::preflight_check(
                "valorant ingest",
                &["HENRIKDEV_API_KEY"],
                &["DATABASE_URL", "HENRIKDEV_API_KEY"],
            )?;
            let api_key = env_util::env_req("HENRIKDEV_API_KEY")?;
            let backend = ValorantBackend::new(
                ValorantApi::new(&api_key, &args.platform),
                args.start_name,
                args.start_tag,
                args.target_ranks,
                args.players_per_rank,
            );
            let quotas = RunQuotas {
                matches_wanted: args.matches_per_player,
                history_multiplier: args.history_multiplier,
            };
            run_session(&backend, &db, &quotas).await?
        }
    };

    info!(
        candidates = summary.candidates,
        players_processed = summary.players_processed,
        matches_saved = summary.matches_saved,
        stats_created = summary.stats_created,
        stats_updated = summary.stats_updated,
        "ingest finished"
    );
    Ok(())
}
