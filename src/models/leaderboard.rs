use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub account_id: String,
    pub display_name: String,
    pub balance: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

/// Balance descending, then account id ascending so equal balances rank the
/// same way on every read.
pub fn rank(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });
}
