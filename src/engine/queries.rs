use chrono::{DateTime, Utc};
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::find_conflict;
use super::{Engine, EngineError, ValidationError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub vehicle_id: Option<Ulid>,
    pub trainer_id: Option<Ulid>,
    pub status: Option<BookingStatus>,
    /// Matches the requested location.
    pub location: Option<Location>,
}

impl BookingFilter {
    fn matches(&self, b: &Booking) -> bool {
        self.trainer_id.is_none_or(|t| b.trainer_id == t)
            && self.status.is_none_or(|s| b.status == s)
            && self.location.is_none_or(|l| b.requested_location == l)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleFilter {
    pub location: Option<Location>,
    pub status: Option<VehicleStatus>,
}

impl VehicleFilter {
    fn matches(&self, v: &Vehicle) -> bool {
        self.location.is_none_or(|l| v.location == l) && self.status.is_none_or(|s| v.status == s)
    }
}

impl Engine {
    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let vehicle_id = self
            .store
            .vehicle_for_booking(&id)
            .ok_or(EngineError::not_found("booking", id))?;
        let state = self.vehicle_state(&vehicle_id)?;
        let guard = state.read().await;
        guard
            .booking(&id)
            .cloned()
            .ok_or(EngineError::not_found("booking", id))
    }

    /// Matching bookings ordered by start.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, EngineError> {
        let states = match filter.vehicle_id {
            Some(id) => vec![self.vehicle_state(&id)?],
            None => self.store.vehicle_states(),
        };
        let mut out = Vec::new();
        for state in states {
            let guard = state.read().await;
            out.extend(guard.bookings.iter().filter(|b| filter.matches(b)).cloned());
        }
        out.sort_by(|a, b| (a.start_date, a.id).cmp(&(b.start_date, b.id)));
        Ok(out)
    }

    pub async fn get_vehicle(&self, id: Ulid) -> Result<Vehicle, EngineError> {
        let state = self.vehicle_state(&id)?;
        let vehicle = state.read().await.vehicle.clone();
        Ok(vehicle)
    }

    /// Matching vehicles in registration order.
    pub async fn list_vehicles(&self, filter: &VehicleFilter) -> Vec<Vehicle> {
        let mut out = Vec::new();
        for state in self.store.vehicle_states() {
            let guard = state.read().await;
            if filter.matches(&guard.vehicle) {
                out.push(guard.vehicle.clone());
            }
        }
        out.sort_by_key(|v| v.id);
        out
    }

    /// Whether `[start, end)` overlaps a live booking on the vehicle other
    /// than `exclude`. Touching boundaries are not conflicts.
    pub async fn has_conflict(
        &self,
        vehicle_id: Ulid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let (start, end) = (to_ms(start), to_ms(end));
        if end <= start {
            return Err(ValidationError::InvalidRange.into());
        }
        let state = self.vehicle_state(&vehicle_id)?;
        let guard = state.read().await;
        Ok(find_conflict(&guard, &Span::new(start, end), exclude).is_some())
    }

    /// Free windows for the vehicle in `[from, to)`.
    pub async fn vehicle_availability(
        &self,
        vehicle_id: Ulid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_duration: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        let (start, end) = (to_ms(from), to_ms(to));
        if end <= start {
            return Err(ValidationError::InvalidRange.into());
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("availability window wider than 90 days"));
        }
        if min_duration.is_some_and(|d| d <= 0) {
            return Err(EngineError::InvalidRequest("min duration must be positive"));
        }
        let state = self.vehicle_state(&vehicle_id)?;
        let guard = state.read().await;
        Ok(free_windows(&guard, &Span::new(start, end), min_duration))
    }
}
