use tracing::debug;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_principal(caller: &Principal) -> Result<(), EngineError> {
    if caller.as_str().is_empty() {
        return Err(EngineError::LimitExceeded("empty principal"));
    }
    if caller.as_str().len() > MAX_PRINCIPAL_LEN {
        return Err(EngineError::LimitExceeded("principal too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_accommodation(
        &self,
        caller: &Principal,
        metadata_ref: String,
        price_per_night: Amount,
    ) -> Result<Accommodation, EngineError> {
        validate_principal(caller)?;
        let mut guard = self.state.write().await;
        let accommodation = guard
            .registry
            .create(caller, metadata_ref, price_per_night)?;

        let event = Event::AccommodationCreated {
            id: accommodation.id,
            owner: accommodation.owner.clone(),
            price_per_night: accommodation.price_per_night,
            listed: accommodation.listed,
        };
        self.record(&mut guard, event);
        debug!(id = accommodation.id, owner = %caller, "accommodation created");
        Ok(accommodation)
    }

    pub async fn update_price(
        &self,
        caller: &Principal,
        id: AccommodationId,
        price_per_night: Amount,
    ) -> Result<Accommodation, EngineError> {
        validate_principal(caller)?;
        let mut guard = self.state.write().await;
        let accommodation = guard.registry.update_price(caller, id, price_per_night)?;
        debug!(id, price_per_night, "price updated");
        Ok(accommodation)
    }

    pub async fn update_listed_status(
        &self,
        caller: &Principal,
        id: AccommodationId,
        listed: bool,
    ) -> Result<Accommodation, EngineError> {
        validate_principal(caller)?;
        let mut guard = self.state.write().await;
        let accommodation = guard.registry.update_listed_status(caller, id, listed)?;
        debug!(id, listed, "listing status updated");
        Ok(accommodation)
    }

    pub async fn create_booking(
        &self,
        caller: &Principal,
        accommodation_id: AccommodationId,
        start: Timestamp,
        end: Timestamp,
        payment: Amount,
    ) -> Result<Booking, EngineError> {
        validate_principal(caller)?;
        let mut guard = self.state.write().await;
        let market = &mut *guard;
        let result = market.ledger.create(
            &market.registry,
            caller,
            accommodation_id,
            start,
            end,
            payment,
        );
        let booking = match result {
            Ok(booking) => booking,
            Err(e) => {
                metrics::counter!(crate::observability::BOOKING_REJECTIONS_TOTAL, "reason" => e.label())
                    .increment(1);
                return Err(e);
            }
        };

        let event = Event::BookingCreated {
            id: booking.id,
            accommodation_id,
            renter: booking.renter.clone(),
            start: booking.span.start,
            end: booking.span.end,
            checked_in: booking.checked_in,
        };
        self.record(market, event);
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        debug!(id = booking.id, accommodation_id, renter = %caller, start, end, "booking created");
        Ok(booking)
    }

    pub async fn check_in(&self, caller: &Principal, id: BookingId) -> Result<Booking, EngineError> {
        validate_principal(caller)?;
        let mut guard = self.state.write().await;
        let booking = guard.ledger.check_in(caller, id)?;
        debug!(id, renter = %caller, "checked in");
        Ok(booking)
    }
}
