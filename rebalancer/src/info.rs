//! Per-asset rebalance metadata.

use basketbook::Timestamp;
use basketbook_venue::ExchangeId;

/// Trading parameters and progress for one asset.
///
/// Entries persist across rebalances; the manager resets maxima, cool-offs
/// and routing explicitly between them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetTradeInfo {
    /// Target real unit, expressed at the multiplier snapshotted by the last
    /// `start_rebalance`.
    pub target_unit: i128,
    /// Largest quantity of this asset one trade may move.
    pub max_size: u128,
    pub exchange: ExchangeId,
    /// Seconds that must pass between trades of this asset.
    pub cool_off_period: u64,
    pub last_trade_timestamp: Timestamp,
}

impl AssetTradeInfo {
    /// Earliest time the asset may trade again.
    pub fn next_trade_time(&self) -> Timestamp {
        self.last_trade_timestamp.saturating_add(self.cool_off_period)
    }

    pub fn cool_off_elapsed(&self, now: Timestamp) -> bool {
        now >= self.next_trade_time()
    }
}
