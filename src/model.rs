use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix seconds. The only time type.
pub type Timestamp = i64;

/// Integral currency amount. No unit is implied.
pub type Amount = u64;

pub type AccommodationId = u64;
pub type BookingId = u64;

pub const SECS_PER_NIGHT: Timestamp = 86_400;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Exact even for spans reaching across most of the `i64` range.
    pub fn duration_secs(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    /// Nights covered by the span, a partial night counting as a whole one.
    pub fn nights(&self) -> u64 {
        self.duration_secs().div_ceil(SECS_PER_NIGHT as u64)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Verified caller identity. Opaque to the engine: only compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accommodation {
    pub id: AccommodationId,
    pub owner: Principal,
    pub metadata_ref: String,
    pub price_per_night: Amount,
    pub listed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub accommodation_id: AccommodationId,
    pub renter: Principal,
    pub span: Span,
    /// Amount received with the booking request, recorded as given.
    pub paid: Amount,
    pub checked_in: bool,
}

/// How `create_booking` treats the amount sent along with the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentPolicy {
    /// Any amount is accepted and recorded.
    #[default]
    Permissive,
    /// Amount must equal `price_per_night * nights`.
    ExactNightly,
}

impl FromStr for PaymentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permissive" => Ok(PaymentPolicy::Permissive),
            "exact" | "exact_nightly" => Ok(PaymentPolicy::ExactNightly),
            other => Err(format!("unknown payment policy: {other}")),
        }
    }
}

/// Notifications appended to the journal and broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AccommodationCreated {
        id: AccommodationId,
        owner: Principal,
        price_per_night: Amount,
        listed: bool,
    },
    BookingCreated {
        id: BookingId,
        accommodation_id: AccommodationId,
        renter: Principal,
        start: Timestamp,
        end: Timestamp,
        checked_in: bool,
    },
}

impl Event {
    /// The accommodation this event concerns, used to route per-unit notifications.
    pub fn accommodation_id(&self) -> AccommodationId {
        match self {
            Event::AccommodationCreated { id, .. } => *id,
            Event::BookingCreated { accommodation_id, .. } => *accommodation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::AccommodationCreated { .. } => "accommodation_created",
            Event::BookingCreated { .. } => "booking_created",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_secs(), 100);
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_overlap_containment() {
        let outer = Span::new(0, 1000);
        let inner = Span::new(400, 500);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn nights_round_up() {
        assert_eq!(Span::new(0, SECS_PER_NIGHT).nights(), 1);
        assert_eq!(Span::new(0, SECS_PER_NIGHT + 1).nights(), 2);
        assert_eq!(Span::new(0, 3600).nights(), 1);
        assert_eq!(Span::new(1000, 1000 + 3 * SECS_PER_NIGHT).nights(), 3);
    }

    #[test]
    fn payment_policy_parse() {
        assert_eq!("permissive".parse(), Ok(PaymentPolicy::Permissive));
        assert_eq!("EXACT".parse(), Ok(PaymentPolicy::ExactNightly));
        assert!("free".parse::<PaymentPolicy>().is_err());
        assert_eq!(PaymentPolicy::default(), PaymentPolicy::Permissive);
    }

    #[test]
    fn event_routing() {
        let created = Event::AccommodationCreated {
            id: 7,
            owner: Principal::from("alice"),
            price_per_night: 100,
            listed: false,
        };
        assert_eq!(created.accommodation_id(), 7);
        assert_eq!(created.kind(), "accommodation_created");

        let booked = Event::BookingCreated {
            id: 1,
            accommodation_id: 7,
            renter: Principal::from("bob"),
            start: 0,
            end: 86_400,
            checked_in: false,
        };
        assert_eq!(booked.accommodation_id(), 7);
    }

    #[test]
    fn event_json_payload() {
        let event = Event::BookingCreated {
            id: 1,
            accommodation_id: 2,
            renter: Principal::from("bob"),
            start: 10,
            end: 20,
            checked_in: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "booking_created");
        assert_eq!(json["renter"], "bob");
        assert_eq!(json["checked_in"], false);
        let decoded: Event = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, event);
    }
}
