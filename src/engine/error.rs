use crate::model::{AccommodationId, Amount, BookingId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    AccommodationNotFound(AccommodationId),
    BookingNotFound(BookingId),
    NotOwner(AccommodationId),
    SelfBooking(AccommodationId),
    /// Carries the existing booking the request collided with.
    Overlap(BookingId),
    InvalidRange {
        start: Timestamp,
        end: Timestamp,
    },
    WrongRenter(BookingId),
    NoBookings,
    PaymentMismatch {
        expected: Amount,
        paid: Amount,
    },
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Fixed reason bound to the error kind, independent of the ids involved.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::AccommodationNotFound(_) => "accommodation does not exist",
            EngineError::BookingNotFound(_) => "booking does not exist",
            EngineError::NotOwner(_) => "caller is not the owner of the accommodation",
            EngineError::SelfBooking(_) => "caller is the owner of the accommodation",
            EngineError::Overlap(_) => "requested dates overlap an existing booking",
            EngineError::InvalidRange { .. } => "booking must start before it ends",
            EngineError::WrongRenter(_) => "caller is not the renter of the booking",
            EngineError::NoBookings => "caller has no bookings",
            EngineError::PaymentMismatch { .. } => "payment does not match the price of the stay",
            EngineError::LimitExceeded(_) => "limit exceeded",
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::AccommodationNotFound(_) | EngineError::BookingNotFound(_) => "not_found",
            EngineError::NotOwner(_) => "not_owner",
            EngineError::SelfBooking(_) => "self_booking",
            EngineError::Overlap(_) => "overlap",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::WrongRenter(_) => "wrong_renter",
            EngineError::NoBookings => "no_bookings",
            EngineError::PaymentMismatch { .. } => "payment_mismatch",
            EngineError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = self.reason();
        match self {
            EngineError::AccommodationNotFound(id)
            | EngineError::NotOwner(id)
            | EngineError::SelfBooking(id) => write!(f, "{reason}: accommodation {id}"),
            EngineError::BookingNotFound(id) | EngineError::WrongRenter(id) => {
                write!(f, "{reason}: booking {id}")
            }
            EngineError::Overlap(id) => write!(f, "{reason}: conflicts with booking {id}"),
            EngineError::InvalidRange { start, end } => write!(f, "{reason}: [{start}, {end})"),
            EngineError::NoBookings => f.write_str(reason),
            EngineError::PaymentMismatch { expected, paid } => {
                write!(f, "{reason}: expected {expected}, got {paid}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "{reason}: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_leads_with_fixed_reason() {
        let e = EngineError::NotOwner(3);
        assert_eq!(e.to_string(), "caller is not the owner of the accommodation: accommodation 3");
        assert!(EngineError::Overlap(9).to_string().starts_with(EngineError::Overlap(1).reason()));
        assert_eq!(EngineError::NoBookings.to_string(), "caller has no bookings");
    }

    #[test]
    fn not_found_kinds_share_label() {
        assert_eq!(EngineError::AccommodationNotFound(1).label(), "not_found");
        assert_eq!(EngineError::BookingNotFound(1).label(), "not_found");
    }
}
