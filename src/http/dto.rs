//! Request and response bodies that are not engine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::TransitionMeta;
use crate::model::*;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserBody {
    pub name: String,
    pub role: Role,
    pub location: LocationScope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVehicleBody {
    pub brand: String,
    pub model: String,
    pub reg_no: String,
    pub location: Location,
}

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    #[serde(rename = "override")]
    pub manual_override: Option<VehicleOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartsRequestBody {
    pub requester_id: Ulid,
    pub details: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub vehicle_id: Ulid,
    pub status: VehicleStatus,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub min_duration_ms: Option<Ms>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub exclude_booking_id: Option<Ulid>,
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub conflict: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<Span> for FreeWindow {
    fn from(span: Span) -> Self {
        Self {
            start: from_ms(span.start),
            end: from_ms(span.end),
        }
    }
}

fn default_revalidate() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    pub status: BookingStatus,
    #[serde(default)]
    pub actor_id: Option<Ulid>,
    #[serde(default = "default_revalidate")]
    pub revalidate: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub condition: Option<ReturnCondition>,
}

impl TransitionBody {
    pub fn into_parts(self) -> (BookingStatus, TransitionMeta) {
        let meta = TransitionMeta {
            actor_id: self.actor_id,
            revalidate: self.revalidate,
            reason: self.reason,
            condition: self.condition,
        };
        (self.status, meta)
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub viewer_id: Ulid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    pub sender_id: Ulid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMessageBody {
    pub viewer_id: Ulid,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub vehicles: usize,
    pub users: usize,
}
