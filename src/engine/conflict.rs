use crate::model::*;

use super::ledger::Calendar;
use super::EngineError;

/// Any integral pair with `start < end` is a bookable range.
pub(crate) fn validate_range(start: Timestamp, end: Timestamp) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok(Span::new(start, end))
}

/// Fail with the first existing booking whose span intersects `span`.
pub(crate) fn check_no_overlap(calendar: &Calendar, span: &Span) -> Result<(), EngineError> {
    match calendar.overlapping(span).next() {
        Some(&(_, booking_id)) => Err(EngineError::Overlap(booking_id)),
        None => Ok(()),
    }
}

pub(crate) fn check_payment(
    policy: PaymentPolicy,
    price_per_night: Amount,
    span: &Span,
    paid: Amount,
) -> Result<(), EngineError> {
    match policy {
        PaymentPolicy::Permissive => Ok(()),
        PaymentPolicy::ExactNightly => {
            let expected = price_per_night
                .checked_mul(span.nights())
                .ok_or(EngineError::LimitExceeded("price overflow"))?;
            if paid != expected {
                return Err(EngineError::PaymentMismatch { expected, paid });
            }
            Ok(())
        }
    }
}
