use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, ValidationError};

pub(crate) fn now_ms() -> Ms {
    Utc::now().timestamp_millis()
}

/// First live booking on the vehicle overlapping `span`, ignoring `exclude`.
pub fn find_conflict(vs: &VehicleState, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    vs.overlapping(span)
        .filter(|b| b.is_live() && Some(b.id) != exclude)
        .find(|b| b.span().overlaps(span))
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(
    vs: &VehicleState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(vs, span, exclude) {
        Some(id) => Err(ValidationError::SchedulingConflict(id).into()),
        None => Ok(()),
    }
}

/// Window checks for a new request. Shape errors come first so that an
/// inverted or too-short window is reported as such whatever its start;
/// then the start is checked against `now` truncated to the minute.
pub fn validate_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: Ms,
) -> Result<Span, EngineError> {
    let (start, end) = (to_ms(start), to_ms(end));
    if end <= start {
        return Err(ValidationError::InvalidRange.into());
    }
    if end - start < MIN_BOOKING_DURATION_MS {
        return Err(ValidationError::DurationTooShort.into());
    }
    let this_minute = now - now.rem_euclid(MINUTE_MS);
    if start < this_minute {
        return Err(ValidationError::PastStartDate.into());
    }
    if end - start > MAX_BOOKING_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking longer than 30 days"));
    }
    Ok(Span::new(start, end))
}
