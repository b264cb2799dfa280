use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds, the engine's internal time type.
pub type Ms = i64;

pub fn to_ms(t: DateTime<Utc>) -> Ms {
    t.timestamp_millis()
}

pub fn from_ms(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching boundaries do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Locations & people ───────────────────────────────────────────

/// Training-centre sites. `parse` is the single place site names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Pune,
    Bangalore,
    Chennai,
    Gurugram,
}

impl Location {
    pub const ALL: [Location; 4] = [
        Location::Pune,
        Location::Bangalore,
        Location::Chennai,
        Location::Gurugram,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Location::Pune => "Pune",
            Location::Bangalore => "Bangalore",
            Location::Chennai => "Chennai",
            Location::Gurugram => "Gurugram",
        }
    }

    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Location::Pune => &["pune", "ptc", "pune training centre", "pune training center"],
            Location::Bangalore => &["bangalore", "bengaluru", "blr"],
            Location::Chennai => &["chennai", "madras", "chn"],
            Location::Gurugram => &["gurugram", "gurgaon", "ggn"],
        }
    }

    /// Normalize a free-form site name, code or synonym.
    pub fn parse(raw: &str) -> Option<Location> {
        let needle = raw.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Location::ALL
            .into_iter()
            .find(|loc| loc.synonyms().contains(&needle.as_str()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Location::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown academy location: {raw}")))
    }
}

/// Where a user operates: one site, or every site (`ALL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationScope {
    All,
    Site(Location),
}

impl LocationScope {
    pub fn parse(raw: &str) -> Option<LocationScope> {
        if raw.trim().eq_ignore_ascii_case("all") {
            return Some(LocationScope::All);
        }
        Location::parse(raw).map(LocationScope::Site)
    }

    pub fn covers(self, location: Location) -> bool {
        match self {
            LocationScope::All => true,
            LocationScope::Site(site) => site == location,
        }
    }

    pub fn site(self) -> Option<Location> {
        match self {
            LocationScope::All => None,
            LocationScope::Site(site) => Some(site),
        }
    }
}

impl fmt::Display for LocationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationScope::All => f.write_str("ALL"),
            LocationScope::Site(site) => f.write_str(site.name()),
        }
    }
}

impl Serialize for LocationScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocationScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LocationScope::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown location scope: {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Trainer,
    Admin,
    SuperAdmin,
    Security,
}

impl Role {
    /// Roles allowed to broadcast.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub role: Role,
    pub location: LocationScope,
    pub created_at: DateTime<Utc>,
}

// ── Vehicles ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    Available,
    #[serde(rename = "In Use")]
    InUse,
    Maintenance,
    Inactive,
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VehicleStatus::Available => "Available",
            VehicleStatus::InUse => "In Use",
            VehicleStatus::Maintenance => "Maintenance",
            VehicleStatus::Inactive => "Inactive",
        })
    }
}

/// Manual states that win over anything derived from bookings.
/// `Maintenance` takes precedence over `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleOverride {
    Maintenance,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Ulid,
    pub brand: String,
    pub model: String,
    pub reg_no: String,
    pub location: Location,
    /// Cached; always recomputable from bookings + `manual_override`.
    pub status: VehicleStatus,
    pub manual_override: Option<VehicleOverride>,
    pub updated_at: DateTime<Utc>,
}

/// Registration numbers compare without case or whitespace.
pub fn normalize_reg_no(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

impl Vehicle {
    pub fn label(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.reg_no)
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Active,
    Completed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rejected
        )
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Active)
                | (Approved, Cancelled)
                | (Active, Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub vehicle_id: Ulid,
    pub trainer_id: Ulid,
    pub trainer_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub purpose: String,
    pub requested_location: Location,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(to_ms(self.start_date), to_ms(self.end_date))
    }

    /// Non-terminal bookings take part in conflict detection.
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Condition recorded by security when a vehicle comes back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReturnCondition {
    pub damaged: bool,
    pub needs_maintenance: bool,
    pub remarks: Option<String>,
}

/// A vehicle and its bookings, guarded together so check-then-write is atomic.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub vehicle: Vehicle,
    /// Every booking ever made for this vehicle, sorted by start.
    pub bookings: Vec<Booking>,
}

impl VehicleState {
    pub fn new(vehicle: Vehicle) -> Self {
        Self {
            vehicle,
            bookings: Vec::new(),
        }
    }

    pub fn insert_booking(&mut self, booking: Booking) {
        let start = booking.start_date;
        let pos = self.bookings.partition_point(|b| b.start_date <= start);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Bookings (any status) whose span overlaps `query`.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| to_ms(b.start_date) < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| to_ms(b.end_date) > query.start)
    }
}

// ── Notifications ────────────────────────────────────────────────

/// Closed set of workflow events that produce notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BookingCreated,
    BookingApproved,
    BookingRejected,
    KeyIssued,
    VehicleReturned,
    DamageReported,
    PartsRequested,
    MaintenanceRequired,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::BookingCreated => "booking_created",
            NotificationType::BookingApproved => "booking_approved",
            NotificationType::BookingRejected => "booking_rejected",
            NotificationType::KeyIssued => "key_issued",
            NotificationType::VehicleReturned => "vehicle_returned",
            NotificationType::DamageReported => "damage_reported",
            NotificationType::PartsRequested => "parts_requested",
            NotificationType::MaintenanceRequired => "maintenance_required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Booking,
    Vehicle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Ulid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub user_id: Ulid,
    pub related_entity_type: EntityKind,
    pub related_entity_id: Ulid,
    pub action_url: String,
    pub read: bool,
    /// Time of first emission; preserved across in-place updates.
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

/// Deduplication key: at most one live notification per triple.
pub type NotificationKey = (NotificationType, Ulid, Ulid);

impl Notification {
    pub fn key(&self) -> NotificationKey {
        (self.kind, self.user_id, self.related_entity_id)
    }
}

// ── Messages ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Ulid,
    pub sender_id: Ulid,
    pub sender_name: String,
    pub sender_role: Role,
    /// Empty means broadcast.
    pub recipient_ids: Vec<Ulid>,
    pub recipient_roles: Vec<Role>,
    pub location_filter: Option<Location>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub parent_message_id: Option<Ulid>,
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.recipient_ids.is_empty()
    }
}

// ── Journal records ──────────────────────────────────────────────

/// Journal record format. Flat: each variant is one committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(User),
    VehicleRegistered(Vehicle),
    VehicleOverrideSet {
        vehicle_id: Ulid,
        manual_override: Option<VehicleOverride>,
        at: DateTime<Utc>,
    },
    VehicleStatusChanged {
        vehicle_id: Ulid,
        status: VehicleStatus,
        at: DateTime<Utc>,
    },
    BookingCreated(Booking),
    BookingTransitioned {
        id: Ulid,
        vehicle_id: Ulid,
        status: BookingStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    },
    NotificationUpserted(Notification),
    NotificationRead {
        id: Ulid,
    },
    MessagePosted(Message),
    MessageRead {
        id: Ulid,
    },
}

impl Event {
    /// The vehicle whose lock must be held while applying this event.
    pub fn vehicle_id(&self) -> Option<Ulid> {
        match self {
            Event::VehicleOverrideSet { vehicle_id, .. }
            | Event::VehicleStatusChanged { vehicle_id, .. }
            | Event::BookingTransitioned { vehicle_id, .. } => Some(*vehicle_id),
            Event::BookingCreated(b) => Some(b.vehicle_id),
            Event::VehicleRegistered(_)
            | Event::UserRegistered(_)
            | Event::NotificationUpserted(_)
            | Event::NotificationRead { .. }
            | Event::MessagePosted(_)
            | Event::MessageRead { .. } => None,
        }
    }
}
