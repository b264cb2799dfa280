use std::collections::BTreeMap;

use chrono::Utc;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::now_ms;
use super::{Engine, EngineError, EventContext};

/// Whether `booking` keeps its vehicle out of circulation at `now`.
/// Active bookings hold until the return is recorded; approved ones until
/// their window ends.
pub fn holds_vehicle(booking: &Booking, now: Ms) -> bool {
    match booking.status {
        BookingStatus::Active => true,
        BookingStatus::Approved => now < to_ms(booking.end_date),
        _ => false,
    }
}

/// Status explained by the manual override and the booking set alone.
pub fn derive_status(vs: &VehicleState, now: Ms) -> VehicleStatus {
    match vs.vehicle.manual_override {
        Some(VehicleOverride::Maintenance) => VehicleStatus::Maintenance,
        Some(VehicleOverride::Inactive) => VehicleStatus::Inactive,
        None if vs.bookings.iter().any(|b| holds_vehicle(b, now)) => VehicleStatus::InUse,
        None => VehicleStatus::Available,
    }
}

fn required_text(raw: &str, what: &'static str) -> Result<String, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidRequest(what));
    }
    Ok(trimmed.to_string())
}

impl Engine {
    pub async fn register_vehicle(
        &self,
        brand: &str,
        model: &str,
        reg_no: &str,
        location: Location,
    ) -> Result<Vehicle, EngineError> {
        let brand = required_text(brand, "brand is required")?;
        let model = required_text(model, "model is required")?;
        let reg_no = required_text(reg_no, "registration number is required")?;
        if brand.len() > MAX_NAME_LEN || model.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("vehicle name too long"));
        }
        if reg_no.len() > MAX_REG_NO_LEN {
            return Err(EngineError::LimitExceeded("registration number too long"));
        }

        let _registry = self.registry_lock.lock().await;
        if self.store.vehicle_count() >= MAX_VEHICLES {
            return Err(EngineError::LimitExceeded("too many vehicles"));
        }
        if self.store.vehicle_by_reg_no(&reg_no).is_some() {
            return Err(EngineError::AlreadyExists(format!("vehicle {reg_no}")));
        }

        let vehicle = Vehicle {
            id: Ulid::new(),
            brand,
            model,
            reg_no,
            location,
            status: VehicleStatus::Available,
            manual_override: None,
            updated_at: Utc::now(),
        };
        self.persist_global(Event::VehicleRegistered(vehicle.clone()))
            .await?;
        tracing::info!(vehicle = %vehicle.id, reg_no = %vehicle.reg_no, %location, "vehicle registered");
        Ok(vehicle)
    }

    /// Set or clear the manual override, then reconcile.
    pub async fn set_vehicle_override(
        &self,
        vehicle_id: Ulid,
        manual_override: Option<VehicleOverride>,
    ) -> Result<Vehicle, EngineError> {
        let state = self.vehicle_state(&vehicle_id)?;
        let mut guard = state.write().await;
        if guard.vehicle.manual_override != manual_override {
            let event = Event::VehicleOverrideSet {
                vehicle_id,
                manual_override,
                at: Utc::now(),
            };
            self.persist_vehicle_event(&mut guard, event).await?;
            tracing::info!(vehicle = %vehicle_id, ?manual_override, "vehicle override changed");
        }
        self.reconcile_locked(&mut guard, now_ms()).await?;
        Ok(guard.vehicle.clone())
    }

    pub async fn reconcile(&self, vehicle_id: Ulid) -> Result<VehicleStatus, EngineError> {
        self.reconcile_at(vehicle_id, now_ms()).await
    }

    pub async fn reconcile_at(
        &self,
        vehicle_id: Ulid,
        now: Ms,
    ) -> Result<VehicleStatus, EngineError> {
        let state = self.vehicle_state(&vehicle_id)?;
        let mut guard = state.write().await;
        self.reconcile_locked(&mut guard, now).await
    }

    /// Recompute and, when it moved, persist the cached status.
    /// Caller holds the vehicle's write lock.
    pub(super) async fn reconcile_locked(
        &self,
        vs: &mut VehicleState,
        now: Ms,
    ) -> Result<VehicleStatus, EngineError> {
        let derived = derive_status(vs, now);
        if derived != vs.vehicle.status {
            let previous = vs.vehicle.status;
            let event = Event::VehicleStatusChanged {
                vehicle_id: vs.vehicle.id,
                status: derived,
                at: Utc::now(),
            };
            self.persist_vehicle_event(vs, event).await?;
            metrics::counter!(
                observability::VEHICLE_STATUS_CHANGES_TOTAL,
                "status" => derived.to_string()
            )
            .increment(1);
            tracing::info!(vehicle = %vs.vehicle.id, from = %previous, to = %derived, "vehicle status changed");
        }
        Ok(derived)
    }

    /// Reconcile every vehicle. Returns how many changed status.
    pub async fn reconcile_all(&self, now: Ms) -> usize {
        let started = std::time::Instant::now();
        let mut changed = 0;
        for state in self.store.vehicle_states() {
            let mut guard = state.write().await;
            let before = guard.vehicle.status;
            match self.reconcile_locked(&mut guard, now).await {
                Ok(after) if after != before => changed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(vehicle = %guard.vehicle.id, "reconcile failed: {e}");
                }
            }
        }
        metrics::histogram!(observability::RECONCILE_SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        changed
    }

    /// Ask the vehicle's location admin for parts.
    pub async fn request_parts(
        &self,
        vehicle_id: Ulid,
        requester_id: Ulid,
        details: &str,
    ) -> Result<Vec<Notification>, EngineError> {
        let requester = self.user(&requester_id)?;
        let details = required_text(details, "parts request details are required")?;
        if details.len() > MAX_NOTES_LEN {
            return Err(EngineError::LimitExceeded("parts request too long"));
        }
        let vehicle = self.vehicle_state(&vehicle_id)?.read().await.vehicle.clone();

        let ctx = EventContext {
            related_entity_type: EntityKind::Vehicle,
            related_entity_id: vehicle.id,
            location: vehicle.location,
            trainer_id: None,
            actor_name: requester.name,
            subject: vehicle.label(),
            window: None,
            detail: Some(details),
            metadata: BTreeMap::from([
                ("vehicleId".to_string(), vehicle.id.to_string()),
                ("requesterId".to_string(), requester_id.to_string()),
            ]),
        };
        Ok(self.emit(NotificationType::PartsRequested, &ctx).await)
    }
}
