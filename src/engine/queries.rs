use crate::limits::MAX_EVENTS_PER_QUERY;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn accommodations(&self) -> Vec<Accommodation> {
        self.state.read().await.registry.all()
    }

    pub async fn accommodations_by_owner(&self, owner: &Principal) -> Vec<Accommodation> {
        self.state.read().await.registry.by_owner(owner)
    }

    pub async fn accommodation(&self, id: AccommodationId) -> Result<Accommodation, EngineError> {
        self.state.read().await.registry.get(id).cloned()
    }

    pub async fn owner_of(&self, id: AccommodationId) -> Result<Principal, EngineError> {
        self.state.read().await.registry.owner_of(id).cloned()
    }

    pub async fn price_of(&self, id: AccommodationId) -> Result<Amount, EngineError> {
        self.state.read().await.registry.price_of(id)
    }

    pub async fn booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        self.state.read().await.ledger.get(id).cloned()
    }

    pub async fn bookings_by_renter(&self, renter: &Principal) -> Result<Vec<Booking>, EngineError> {
        self.state.read().await.ledger.by_renter(renter)
    }

    pub async fn unavailable_intervals(&self, accommodation_id: AccommodationId) -> Vec<Span> {
        self.state.read().await.ledger.unavailable(accommodation_id)
    }

    /// Journal entries with sequence number greater than `after`, oldest first.
    pub async fn events_since(&self, after: u64) -> Vec<(u64, Event)> {
        let guard = self.state.read().await;
        let skip = usize::try_from(after).unwrap_or(usize::MAX);
        guard
            .journal
            .iter()
            .enumerate()
            .skip(skip)
            .take(MAX_EVENTS_PER_QUERY)
            .map(|(i, event)| (i as u64 + 1, event.clone()))
            .collect()
    }
}
