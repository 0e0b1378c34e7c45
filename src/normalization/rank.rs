//! Numeric rank-tier classification for the tactical-shooter title.
//!
//! The provider reports a player's competitive tier as a small integer. The
//! mapping to named tiers is kept as an ordered table of inclusive ranges
//! consulted by linear scan so new tiers are a one-line change.

use crate::model::{RANK_UNKNOWN, RANK_UNRANKED};

#[derive(Debug, Clone, Copy)]
pub struct RankTier {
    pub name: &'static str,
    pub min: i64,
    pub max: i64,
}

impl RankTier {
    const fn new(name: &'static str, min: i64, max: i64) -> Self {
        Self { name, min, max }
    }
}

pub const RANK_TIERS: &[RankTier] = &[
    RankTier::new("IRON", 3, 5),
    RankTier::new("BRONZE", 6, 8),
    RankTier::new("SILVER", 9, 11),
    RankTier::new("GOLD", 12, 14),
    RankTier::new("PLATINUM", 15, 17),
    RankTier::new("DIAMOND", 18, 20),
    RankTier::new("ASCENDANT", 21, 23),
    RankTier::new("IMMORTAL", 24, 26),
    RankTier::new("RADIANT", 27, 27),
];

/// Classify a raw numeric tier into a bucket name. Below the table's minimum
/// is UNRANKED; missing or out-of-table values are UNKNOWN.
pub fn classify_tier(raw: Option<i64>) -> &'static str {
    let Some(tier) = raw else {
        return RANK_UNKNOWN;
    };
    for t in RANK_TIERS {
        if tier >= t.min && tier <= t.max {
            return t.name;
        }
    }
    let floor = RANK_TIERS.first().map(|t| t.min).unwrap_or(0);
    if tier < floor {
        RANK_UNRANKED
    } else {
        RANK_UNKNOWN
    }
}

/// True when `name` is one of the named tiers (sentinels excluded).
pub fn is_known_tier(name: &str) -> bool {
    RANK_TIERS.iter().any(|t| t.name == name)
}
