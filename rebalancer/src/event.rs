//! Events emitted by the rebalance engine.
//!
//! Events are buffered on the engine and only kept when the call that
//! produced them commits.

use std::fmt;

use basketbook::{Address, Timestamp};
use basketbook_venue::ExchangeId;

/// Which side of the basket a trade moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeDirection {
    /// The component was under target and bought with the reserve asset.
    Buy,
    /// The component was over target and sold for the reserve asset.
    Sell,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "BUY"),
            TradeDirection::Sell => write!(f, "SELL"),
        }
    }
}

/// A completed trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeExecuted {
    pub component: Address,
    pub counter_asset: Address,
    pub direction: TradeDirection,
    pub exchange: ExchangeId,
    /// Quantity of the asset that left the basket.
    pub amount_sold: u128,
    /// Quantity of the asset received, net of the protocol fee.
    pub amount_bought: u128,
    pub protocol_fee: u128,
    /// Component real unit after the trade.
    pub new_component_unit: i128,
    /// Reserve real unit after the trade.
    pub new_reserve_unit: i128,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceEvent {
    TargetUnitsUpdated {
        component: Address,
        target_unit: i128,
        position_multiplier: i128,
    },
    TradeMaximumUpdated {
        component: Address,
        max_size: u128,
    },
    AssetExchangeUpdated {
        component: Address,
        exchange: ExchangeId,
    },
    CoolOffPeriodUpdated {
        component: Address,
        cool_off_period: u64,
    },
    TraderStatusUpdated {
        trader: Address,
        status: bool,
    },
    AnyoneTradeUpdated {
        status: bool,
    },
    RaiseTargetPercentageUpdated {
        percentage: u128,
    },
    TradeExecuted(TradeExecuted),
    AssetTargetsRaised {
        position_multiplier: i128,
    },
}

impl RebalanceEvent {
    /// Short snake-case name used in the audit trail.
    pub fn name(&self) -> &'static str {
        match self {
            RebalanceEvent::TargetUnitsUpdated { .. } => "target_units_updated",
            RebalanceEvent::TradeMaximumUpdated { .. } => "trade_maximum_updated",
            RebalanceEvent::AssetExchangeUpdated { .. } => "asset_exchange_updated",
            RebalanceEvent::CoolOffPeriodUpdated { .. } => "cool_off_period_updated",
            RebalanceEvent::TraderStatusUpdated { .. } => "trader_status_updated",
            RebalanceEvent::AnyoneTradeUpdated { .. } => "anyone_trade_updated",
            RebalanceEvent::RaiseTargetPercentageUpdated { .. } => "raise_target_percentage_updated",
            RebalanceEvent::TradeExecuted(_) => "trade_executed",
            RebalanceEvent::AssetTargetsRaised { .. } => "asset_targets_raised",
        }
    }
}
