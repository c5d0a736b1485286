mod conflict;
mod error;
mod ledger;
mod mutations;
mod queries;
mod registry;

pub use error::EngineError;
pub use ledger::{BookingLedger, Calendar};
pub use registry::AccommodationRegistry;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::*;
use crate::notify::NotifyHub;

/// A registry, the ledger bound to it, and the event journal.
/// Always accessed as one unit through the engine's lock.
///
/// The pairing is fixed at construction: the ledger only ever validates
/// against this registry, and neither can be swapped out afterwards.
pub struct Marketplace {
    registry: AccommodationRegistry,
    ledger: BookingLedger,
    /// Append-only; the sequence number of `journal[i]` is `i + 1`.
    journal: Vec<Event>,
}

impl Marketplace {
    pub fn new(payment_policy: PaymentPolicy) -> Self {
        Self {
            registry: AccommodationRegistry::new(),
            ledger: BookingLedger::new(payment_policy),
            journal: Vec::new(),
        }
    }
}

/// Single-writer facade over one marketplace.
///
/// Every mutation holds the write guard from validation through commit and
/// broadcast, so an overlap check and the insert it guards are one critical
/// section. Queries share the read guard and never see a half-applied write.
pub struct Engine {
    state: RwLock<Marketplace>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(payment_policy: PaymentPolicy, notify: Arc<NotifyHub>) -> Self {
        Self {
            state: RwLock::new(Marketplace::new(payment_policy)),
            notify,
        }
    }

    /// Journal + notify in one call. Caller holds the write guard.
    pub(super) fn record(&self, market: &mut Marketplace, event: Event) {
        self.notify.send(&event);
        market.journal.push(event);
    }
}
