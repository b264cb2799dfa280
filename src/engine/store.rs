use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedVehicleState = Arc<RwLock<VehicleState>>;

/// The Resource Store: every record the engine knows about, in memory.
/// Vehicle-scoped records live behind the vehicle's lock; everything else
/// sits in concurrent maps.
pub struct InMemoryStore {
    vehicles: DashMap<Ulid, SharedVehicleState>,
    booking_to_vehicle: DashMap<Ulid, Ulid>,
    /// Normalized registration number to vehicle id.
    reg_numbers: DashMap<String, Ulid>,
    users: DashMap<Ulid, User>,
    notifications: DashMap<Ulid, Notification>,
    notification_index: DashMap<NotificationKey, Ulid>,
    messages: DashMap<Ulid, Message>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
            booking_to_vehicle: DashMap::new(),
            reg_numbers: DashMap::new(),
            users: DashMap::new(),
            notifications: DashMap::new(),
            notification_index: DashMap::new(),
            messages: DashMap::new(),
        }
    }

    // ── Vehicles & bookings ──────────────────────────────────

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicle_state(&self, id: &Ulid) -> Option<SharedVehicleState> {
        self.vehicles.get(id).map(|e| e.value().clone())
    }

    pub fn vehicle_states(&self) -> Vec<SharedVehicleState> {
        self.vehicles.iter().map(|e| e.value().clone()).collect()
    }

    pub fn vehicle_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_vehicle.get(booking_id).map(|e| *e.value())
    }

    pub fn vehicle_by_reg_no(&self, reg_no: &str) -> Option<Ulid> {
        self.reg_numbers
            .get(&normalize_reg_no(reg_no))
            .map(|e| *e.value())
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn users(&self) -> Vec<User> {
        self.users.iter().map(|e| e.value().clone()).collect()
    }

    // ── Notifications ────────────────────────────────────────

    pub fn notification(&self, id: &Ulid) -> Option<Notification> {
        self.notifications.get(id).map(|e| e.value().clone())
    }

    pub fn notification_for_key(&self, key: &NotificationKey) -> Option<Notification> {
        let id = *self.notification_index.get(key)?.value();
        self.notification(&id)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.iter().map(|e| e.value().clone()).collect()
    }

    // ── Messages ─────────────────────────────────────────────

    pub fn message(&self, id: &Ulid) -> Option<Message> {
        self.messages.get(id).map(|e| e.value().clone())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().map(|e| e.value().clone()).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a vehicle-scoped event. Caller holds the vehicle's write lock.
    pub fn apply_to_vehicle(&self, vs: &mut VehicleState, event: &Event) {
        match event {
            Event::BookingCreated(booking) => {
                self.booking_to_vehicle.insert(booking.id, vs.vehicle.id);
                vs.insert_booking(booking.clone());
            }
            Event::BookingTransitioned {
                id,
                status,
                notes,
                at,
                ..
            } => {
                if let Some(booking) = vs.booking_mut(id) {
                    booking.status = *status;
                    if notes.is_some() {
                        booking.notes = notes.clone();
                    }
                    booking.updated_at = *at;
                }
            }
            Event::VehicleOverrideSet {
                manual_override,
                at,
                ..
            } => {
                vs.vehicle.manual_override = *manual_override;
                vs.vehicle.updated_at = *at;
            }
            Event::VehicleStatusChanged { status, at, .. } => {
                vs.vehicle.status = *status;
                vs.vehicle.updated_at = *at;
            }
            other => self.apply_global(other),
        }
    }

    /// Apply an event that touches no vehicle's booking list.
    pub fn apply_global(&self, event: &Event) {
        match event {
            Event::UserRegistered(user) => {
                self.users.insert(user.id, user.clone());
            }
            Event::VehicleRegistered(vehicle) => {
                self.reg_numbers
                    .insert(normalize_reg_no(&vehicle.reg_no), vehicle.id);
                self.vehicles.insert(
                    vehicle.id,
                    Arc::new(RwLock::new(VehicleState::new(vehicle.clone()))),
                );
            }
            Event::NotificationUpserted(notification) => {
                self.notification_index
                    .insert(notification.key(), notification.id);
                self.notifications
                    .insert(notification.id, notification.clone());
            }
            Event::NotificationRead { id } => {
                if let Some(mut n) = self.notifications.get_mut(id) {
                    n.read = true;
                }
            }
            Event::MessagePosted(message) => {
                self.messages.insert(message.id, message.clone());
            }
            Event::MessageRead { id } => {
                if let Some(mut m) = self.messages.get_mut(id) {
                    m.read = true;
                }
            }
            Event::BookingCreated(_)
            | Event::BookingTransitioned { .. }
            | Event::VehicleOverrideSet { .. }
            | Event::VehicleStatusChanged { .. } => {
                tracing::warn!("vehicle-scoped event applied without vehicle lock, ignored");
            }
        }
    }

    /// Rebuild state from journal records. Runs before the store is shared,
    /// so every lock is uncontended.
    pub fn replay(&self, events: &[Event]) {
        for event in events {
            match event.vehicle_id() {
                Some(vehicle_id) => {
                    let Some(state) = self.vehicle_state(&vehicle_id) else {
                        tracing::warn!("journal references unknown vehicle {vehicle_id}, skipped");
                        continue;
                    };
                    if let Ok(mut guard) = state.try_write() {
                        self.apply_to_vehicle(&mut guard, event);
                    }
                }
                None => self.apply_global(event),
            }
        }
    }
}
