//! Referral leaderboard

use lib_records::{RecordResult, RecordStore, SortDirection, SortField};
use lib_types::Address;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    ReferralCount,
    ReferralRewards,
}

impl LeaderboardMetric {
    fn sort_field(&self) -> SortField {
        match self {
            LeaderboardMetric::ReferralCount => SortField::ReferralCount,
            LeaderboardMetric::ReferralRewards => SortField::ReferralRewards,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub address: Address,
    pub referral_count: u64,
    pub referral_rewards: u64,
}

/// Top referrers by `metric`, highest first; zero-valued records are skipped
pub async fn leaderboard(
    store: &dyn RecordStore,
    metric: LeaderboardMetric,
    limit: usize,
) -> RecordResult<Vec<LeaderboardEntry>> {
    let records = store
        .list_records(metric.sort_field(), SortDirection::Desc)
        .await?;

    Ok(records
        .into_iter()
        .filter(|r| match metric {
            LeaderboardMetric::ReferralCount => r.referral_count > 0,
            LeaderboardMetric::ReferralRewards => r.referral_rewards > 0,
        })
        .take(limit)
        .enumerate()
        .map(|(i, r)| LeaderboardEntry {
            rank: i + 1,
            address: r.address,
            referral_count: r.referral_count,
            referral_rewards: r.referral_rewards,
        })
        .collect())
}
