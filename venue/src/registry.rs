//! Venue lookup by exchange id.

use basketbook::Address;
use rustc_hash::FxHashMap;

use crate::amm::AmmRouter;
use crate::error::{Result, VenueError};
use crate::mock::MockVenue;
use crate::split::SplitRouter;
use crate::{ExchangeAdapter, ExchangeId, Fill, Quote, SwapKind};

/// A concrete venue. Closed over the known implementations so the whole
/// registry is `Clone` and can be checkpointed with the engine state.
#[derive(Debug, Clone)]
pub enum Venue {
    Amm(AmmRouter),
    Split(SplitRouter),
    Mock(MockVenue),
}

impl Venue {
    fn adapter(&self) -> &dyn ExchangeAdapter {
        match self {
            Venue::Amm(v) => v,
            Venue::Split(v) => v,
            Venue::Mock(v) => v,
        }
    }

    fn adapter_mut(&mut self) -> &mut dyn ExchangeAdapter {
        match self {
            Venue::Amm(v) => v,
            Venue::Split(v) => v,
            Venue::Mock(v) => v,
        }
    }
}

impl ExchangeAdapter for Venue {
    fn quote(&self, asset_in: Address, asset_out: Address, amount: u128, kind: SwapKind) -> Result<Quote> {
        self.adapter().quote(asset_in, asset_out, amount, kind)
    }

    fn execute(
        &mut self,
        asset_in: Address,
        asset_out: Address,
        amount: u128,
        kind: SwapKind,
        bound: u128,
    ) -> Result<Fill> {
        self.adapter_mut().execute(asset_in, asset_out, amount, kind, bound)
    }
}

impl From<AmmRouter> for Venue {
    fn from(v: AmmRouter) -> Self {
        Venue::Amm(v)
    }
}

impl From<SplitRouter> for Venue {
    fn from(v: SplitRouter) -> Self {
        Venue::Split(v)
    }
}

impl From<MockVenue> for Venue {
    fn from(v: MockVenue) -> Self {
        Venue::Mock(v)
    }
}

/// The set of enabled venues.
#[derive(Debug, Clone, Default)]
pub struct VenueRegistry {
    venues: FxHashMap<ExchangeId, Venue>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a venue under `id`, replacing any previous one.
    /// `ExchangeId::None` cannot be registered.
    pub fn register(&mut self, id: ExchangeId, venue: impl Into<Venue>) -> Result<()> {
        if id.is_none() {
            return Err(VenueError::NotRegistered(id));
        }
        log::debug!("registered venue {id}");
        self.venues.insert(id, venue.into());
        Ok(())
    }

    pub fn with_venue(mut self, id: ExchangeId, venue: impl Into<Venue>) -> Result<Self> {
        self.register(id, venue)?;
        Ok(self)
    }

    pub fn contains(&self, id: ExchangeId) -> bool {
        self.venues.contains_key(&id)
    }

    pub fn get(&self, id: ExchangeId) -> Result<&Venue> {
        self.venues.get(&id).ok_or(VenueError::NotRegistered(id))
    }

    pub fn get_mut(&mut self, id: ExchangeId) -> Result<&mut Venue> {
        self.venues.get_mut(&id).ok_or(VenueError::NotRegistered(id))
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<ExchangeId> {
        let mut ids: Vec<_> = self.venues.keys().copied().collect();
        ids.sort();
        ids
    }
}
