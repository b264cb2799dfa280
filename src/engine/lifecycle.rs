use chrono::{DateTime, Utc};
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, now_ms, validate_window};
use super::{Audience, Engine, EngineError, EventContext, ValidationError};

/// A trainer's request for a vehicle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub vehicle_id: Ulid,
    pub trainer_id: Ulid,
    pub purpose: String,
    /// Defaults to the vehicle's site; any other site is rejected.
    #[serde(default)]
    pub requested_location: Option<Location>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Caller-supplied context for a status change.
#[derive(Debug, Clone, Default)]
pub struct TransitionMeta {
    pub actor_id: Option<Ulid>,
    /// Re-run the conflict check when moving into approved/active.
    pub revalidate: bool,
    /// Stored in `notes` on rejection or cancellation.
    pub reason: Option<String>,
    /// Recorded on return (completed).
    pub condition: Option<ReturnCondition>,
}

fn check_len(text: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match text {
        Some(t) if t.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

impl Engine {
    pub async fn create_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let result = self.try_create_booking(req).await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.code(),
        };
        metrics::counter!(observability::BOOKING_REQUESTS_TOTAL, "outcome" => outcome)
            .increment(1);
        if let Err(e) = &result {
            tracing::warn!(outcome, "booking request rejected: {e}");
        }
        result
    }

    async fn try_create_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let now = now_ms();
        let span = validate_window(req.start_date, req.end_date, now)?;
        let purpose = req.purpose.trim();
        if purpose.is_empty() {
            return Err(EngineError::InvalidRequest("purpose is required"));
        }
        check_len(Some(purpose), MAX_PURPOSE_LEN, "purpose too long")?;
        check_len(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;

        let trainer = self.user(&req.trainer_id)?;
        let state = self.vehicle_state(&req.vehicle_id)?;
        let mut guard = state.write().await;
        let site = guard.vehicle.location;
        if req.requested_location.is_some_and(|l| l != site) {
            return Err(EngineError::InvalidRequest(
                "requested location must be the vehicle's site",
            ));
        }

        let status = self.reconcile_locked(&mut guard, now).await?;
        if status != VehicleStatus::Available {
            return Err(ValidationError::VehicleUnavailable(status).into());
        }
        check_no_conflict(&guard, &span, None)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_VEHICLE {
            return Err(EngineError::LimitExceeded("too many bookings on vehicle"));
        }

        let at = Utc::now();
        let booking = Booking {
            id: Ulid::new(),
            vehicle_id: req.vehicle_id,
            trainer_id: trainer.id,
            trainer_name: trainer.name,
            start_date: req.start_date,
            end_date: req.end_date,
            purpose: purpose.to_string(),
            requested_location: site,
            status: BookingStatus::Pending,
            notes: req.notes,
            created_at: at,
            updated_at: at,
        };
        self.persist_vehicle_event(&mut guard, Event::BookingCreated(booking.clone()))
            .await?;
        self.settle(&mut guard, now).await;
        let ctx = EventContext::for_booking(&booking, &guard.vehicle);
        drop(guard);

        tracing::info!(booking = %booking.id, vehicle = %booking.vehicle_id, trainer = %booking.trainer_id, "booking created");
        self.emit(NotificationType::BookingCreated, &ctx).await;
        self.emit_to(NotificationType::BookingCreated, &[Audience::Trainer], &ctx)
            .await;
        Ok(booking)
    }

    /// Reconcile after a committed change. A failure here leaves the cached
    /// status stale until the next sweep; it does not undo the change.
    async fn settle(&self, vs: &mut VehicleState, now: Ms) {
        if let Err(e) = self.reconcile_locked(vs, now).await {
            tracing::error!(vehicle = %vs.vehicle.id, "post-commit reconcile failed: {e}");
        }
    }

    pub async fn transition_booking(
        &self,
        id: Ulid,
        to: BookingStatus,
        meta: TransitionMeta,
    ) -> Result<Booking, EngineError> {
        let vehicle_id = self
            .store
            .vehicle_for_booking(&id)
            .ok_or(EngineError::not_found("booking", id))?;
        if let Some(actor) = meta.actor_id {
            self.user(&actor)?;
        }
        check_len(meta.reason.as_deref(), MAX_NOTES_LEN, "reason too long")?;
        let condition = meta.condition.unwrap_or_default();
        check_len(condition.remarks.as_deref(), MAX_NOTES_LEN, "remarks too long")?;

        let state = self.vehicle_state(&vehicle_id)?;
        let mut guard = state.write().await;
        let current = guard
            .booking(&id)
            .cloned()
            .ok_or(EngineError::not_found("booking", id))?;

        let from = current.status;
        if !from.can_transition_to(to) {
            tracing::warn!(booking = %id, %from, %to, "invalid booking transition");
            return Err(EngineError::InvalidTransition { from, to });
        }
        if meta.revalidate && matches!(to, BookingStatus::Approved | BookingStatus::Active) {
            check_no_conflict(&guard, &current.span(), Some(id))?;
        }

        let detail = match to {
            BookingStatus::Rejected | BookingStatus::Cancelled => meta.reason.clone(),
            BookingStatus::Completed => condition.remarks.clone(),
            _ => None,
        };
        let event = Event::BookingTransitioned {
            id,
            vehicle_id,
            status: to,
            notes: detail.clone(),
            at: Utc::now(),
        };
        self.persist_vehicle_event(&mut guard, event).await?;

        let raise_maintenance = to == BookingStatus::Completed && condition.needs_maintenance;
        if raise_maintenance && guard.vehicle.manual_override != Some(VehicleOverride::Maintenance)
        {
            let event = Event::VehicleOverrideSet {
                vehicle_id,
                manual_override: Some(VehicleOverride::Maintenance),
                at: Utc::now(),
            };
            if let Err(e) = self.persist_vehicle_event(&mut guard, event).await {
                tracing::error!(vehicle = %vehicle_id, "maintenance override not recorded: {e}");
            }
        }
        self.settle(&mut guard, now_ms()).await;

        let updated = guard
            .booking(&id)
            .cloned()
            .ok_or(EngineError::not_found("booking", id))?;
        let ctx = EventContext::for_booking(&updated, &guard.vehicle).with_detail(detail);
        drop(guard);

        metrics::counter!(observability::BOOKING_TRANSITIONS_TOTAL, "to" => to.as_str())
            .increment(1);
        tracing::info!(booking = %id, %from, %to, actor = ?meta.actor_id, "booking transitioned");

        match to {
            BookingStatus::Approved => {
                self.emit(NotificationType::BookingApproved, &ctx).await;
            }
            BookingStatus::Rejected => {
                self.emit(NotificationType::BookingRejected, &ctx).await;
            }
            BookingStatus::Active => {
                self.emit(NotificationType::KeyIssued, &ctx).await;
            }
            BookingStatus::Completed => {
                self.emit(NotificationType::VehicleReturned, &ctx).await;
                if condition.damaged {
                    self.emit(NotificationType::DamageReported, &ctx).await;
                }
                if raise_maintenance {
                    self.emit(NotificationType::MaintenanceRequired, &ctx).await;
                }
            }
            BookingStatus::Cancelled | BookingStatus::Pending => {}
        }
        Ok(updated)
    }
}
