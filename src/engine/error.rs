use thiserror::Error;
use ulid::Ulid;

use crate::model::{BookingStatus, VehicleStatus};

/// Rejections of a booking request. Never retried; the caller resubmits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("start date is in the past")]
    PastStartDate,
    #[error("end date must be after start date")]
    InvalidRange,
    #[error("booking must last at least one hour")]
    DurationTooShort,
    #[error("vehicle is not available (currently {0})")]
    VehicleUnavailable(VehicleStatus),
    #[error("vehicle is already booked in this window (booking {0})")]
    SchedulingConflict(Ulid),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Ulid) -> Self {
        EngineError::NotFound { entity, id }
    }
}

impl ValidationError {
    /// Stable machine-readable code, used as the `outcome` metric label and
    /// the `error` field of HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::PastStartDate => "past_start_date",
            ValidationError::InvalidRange => "invalid_range",
            ValidationError::DurationTooShort => "duration_too_short",
            ValidationError::VehicleUnavailable(_) => "vehicle_unavailable",
            ValidationError::SchedulingConflict(_) => "scheduling_conflict",
        }
    }
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(v) => v.code(),
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::NotFound { .. } => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Persistence(_) => "persistence_error",
        }
    }
}
