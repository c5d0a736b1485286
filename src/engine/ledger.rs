use std::collections::{BTreeMap, HashMap};

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_overlap, check_payment, validate_range};
use super::registry::AccommodationRegistry;
use super::EngineError;

/// Occupied spans of one accommodation, sorted by `span.start`.
///
/// Stored spans never overlap each other, so sorting by start also sorts by end.
#[derive(Debug, Default)]
pub struct Calendar {
    entries: Vec<(Span, BookingId)>,
}

impl Calendar {
    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, span: Span, booking_id: BookingId) {
        let pos = self
            .entries
            .binary_search_by_key(&span.start, |(s, _)| s.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, (span, booking_id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(Span, BookingId)> {
        let right_bound = self.entries.partition_point(|(s, _)| s.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |(s, _)| s.end > query.start)
    }

    /// Spans in booking-creation order.
    pub fn in_creation_order(&self) -> Vec<Span> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|(_, id)| *id);
        entries.into_iter().map(|(span, _)| span).collect()
    }
}

/// Owns every booking, the per-accommodation calendars and the renter index.
///
/// Never mutates the registry; it is only consulted for existence, ownership
/// and price.
#[derive(Debug)]
pub struct BookingLedger {
    next_id: BookingId,
    payment_policy: PaymentPolicy,
    bookings: BTreeMap<BookingId, Booking>,
    calendars: HashMap<AccommodationId, Calendar>,
    by_renter: HashMap<Principal, Vec<BookingId>>,
}

impl Default for BookingLedger {
    fn default() -> Self {
        Self::new(PaymentPolicy::default())
    }
}

impl BookingLedger {
    pub fn new(payment_policy: PaymentPolicy) -> Self {
        Self {
            next_id: 1,
            payment_policy,
            bookings: BTreeMap::new(),
            calendars: HashMap::new(),
            by_renter: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Validate against the registry and existing bookings, then record.
    /// Nothing is written unless every check passes. `registry` is always the
    /// one this ledger is paired with inside its `Marketplace`.
    pub fn create(
        &mut self,
        registry: &AccommodationRegistry,
        caller: &Principal,
        accommodation_id: AccommodationId,
        start: Timestamp,
        end: Timestamp,
        payment: Amount,
    ) -> Result<Booking, EngineError> {
        let accommodation = registry.get(accommodation_id)?;
        if accommodation.owner == *caller {
            return Err(EngineError::SelfBooking(accommodation_id));
        }
        let span = validate_range(start, end)?;

        if let Some(calendar) = self.calendars.get(&accommodation_id) {
            if calendar.len() >= MAX_BOOKINGS_PER_ACCOMMODATION {
                return Err(EngineError::LimitExceeded("too many bookings on accommodation"));
            }
            check_no_overlap(calendar, &span)?;
        }
        check_payment(
            self.payment_policy,
            accommodation.price_per_night,
            &span,
            payment,
        )?;

        let id = self.next_id;
        self.next_id += 1;
        let booking = Booking {
            id,
            accommodation_id,
            renter: caller.clone(),
            span,
            paid: payment,
            checked_in: false,
        };
        self.bookings.insert(id, booking.clone());
        self.calendars
            .entry(accommodation_id)
            .or_default()
            .insert(span, id);
        self.by_renter.entry(caller.clone()).or_default().push(id);
        Ok(booking)
    }

    /// One-way transition to checked in. Repeating it is a no-op.
    pub fn check_in(&mut self, caller: &Principal, id: BookingId) -> Result<Booking, EngineError> {
        let booking = self
            .bookings
            .get_mut(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        if booking.renter != *caller {
            return Err(EngineError::WrongRenter(id));
        }
        booking.checked_in = true;
        Ok(booking.clone())
    }

    pub fn get(&self, id: BookingId) -> Result<&Booking, EngineError> {
        self.bookings.get(&id).ok_or(EngineError::BookingNotFound(id))
    }

    pub fn by_renter(&self, renter: &Principal) -> Result<Vec<Booking>, EngineError> {
        let bookings: Vec<Booking> = self
            .by_renter
            .get(renter)
            .map(|ids| ids.iter().filter_map(|id| self.bookings.get(id)).cloned().collect())
            .unwrap_or_default();
        if bookings.is_empty() {
            return Err(EngineError::NoBookings);
        }
        Ok(bookings)
    }

    /// Booked spans of an accommodation. Unknown ids simply have none.
    pub fn unavailable(&self, accommodation_id: AccommodationId) -> Vec<Span> {
        self.calendars
            .get(&accommodation_id)
            .map(Calendar::in_creation_order)
            .unwrap_or_default()
    }
}
