use std::collections::BTreeMap;

use chrono::Utc;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

/// Who a notification is addressed to, relative to the triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Trainer,
    LocationAdmin,
    LocationSecurity,
}

/// Fixed fan-out table.
pub fn recipients_for(kind: NotificationType) -> &'static [Audience] {
    use Audience::*;
    match kind {
        NotificationType::BookingCreated => &[LocationAdmin],
        NotificationType::BookingApproved => &[Trainer, LocationSecurity],
        NotificationType::BookingRejected => &[Trainer],
        NotificationType::KeyIssued => &[Trainer],
        NotificationType::VehicleReturned => &[Trainer, LocationAdmin],
        NotificationType::DamageReported => &[LocationAdmin],
        NotificationType::PartsRequested => &[LocationAdmin],
        NotificationType::MaintenanceRequired => &[LocationAdmin],
    }
}

/// Everything needed to address and render one event's notifications.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub related_entity_type: EntityKind,
    pub related_entity_id: Ulid,
    /// Site whose admin/security are addressed.
    pub location: Location,
    pub trainer_id: Option<Ulid>,
    /// Trainer or requester named in the text.
    pub actor_name: String,
    /// Vehicle label.
    pub subject: String,
    pub window: Option<Span>,
    /// Rejection reason, return remarks or parts details.
    pub detail: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl EventContext {
    pub fn for_booking(booking: &Booking, vehicle: &Vehicle) -> Self {
        Self {
            related_entity_type: EntityKind::Booking,
            related_entity_id: booking.id,
            location: vehicle.location,
            trainer_id: Some(booking.trainer_id),
            actor_name: booking.trainer_name.clone(),
            subject: vehicle.label(),
            window: Some(booking.span()),
            detail: None,
            metadata: BTreeMap::from([
                ("bookingId".to_string(), booking.id.to_string()),
                ("vehicleId".to_string(), vehicle.id.to_string()),
                ("status".to_string(), booking.status.to_string()),
            ]),
        }
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    fn action_url(&self) -> String {
        match self.related_entity_type {
            EntityKind::Booking => format!("/bookings/{}", self.related_entity_id),
            EntityKind::Vehicle => format!("/vehicles/{}", self.related_entity_id),
        }
    }
}

fn fmt_window(window: Option<Span>) -> String {
    match window {
        Some(span) => format!(
            "{} to {}",
            from_ms(span.start).format("%d %b %Y %H:%M"),
            from_ms(span.end).format("%d %b %Y %H:%M")
        ),
        None => "the requested window".to_string(),
    }
}

fn with_detail(text: String, label: &str, detail: Option<&str>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!("{text} {label}: {d}"),
        _ => text,
    }
}

/// Title and body for one addressed notification.
fn render(kind: NotificationType, audience: Audience, ctx: &EventContext) -> (String, String) {
    let who = &ctx.actor_name;
    let what = &ctx.subject;
    let when = fmt_window(ctx.window);
    let detail = ctx.detail.as_deref();
    match (kind, audience) {
        (NotificationType::BookingCreated, Audience::Trainer) => (
            "Booking request submitted".into(),
            format!("Your request for {what} ({when}) is awaiting approval."),
        ),
        (NotificationType::BookingCreated, _) => (
            "New booking request".into(),
            format!("{who} requested {what} for {when}."),
        ),
        (NotificationType::BookingApproved, Audience::LocationSecurity) => (
            "Key handover scheduled".into(),
            format!("{who} will collect {what} for {when}."),
        ),
        (NotificationType::BookingApproved, _) => (
            "Booking approved".into(),
            format!("Your booking for {what} ({when}) was approved."),
        ),
        (NotificationType::BookingRejected, _) => (
            "Booking rejected".into(),
            with_detail(
                format!("Your booking for {what} ({when}) was rejected."),
                "Reason",
                detail,
            ),
        ),
        (NotificationType::KeyIssued, _) => (
            "Keys issued".into(),
            format!("Keys for {what} have been issued for {when}."),
        ),
        (NotificationType::VehicleReturned, Audience::Trainer) => (
            "Vehicle returned".into(),
            format!("The return of {what} has been recorded."),
        ),
        (NotificationType::VehicleReturned, _) => (
            "Vehicle returned".into(),
            with_detail(format!("{who} returned {what}."), "Remarks", detail),
        ),
        (NotificationType::DamageReported, _) => (
            "Damage reported".into(),
            with_detail(
                format!("{what} was returned damaged by {who}."),
                "Remarks",
                detail,
            ),
        ),
        (NotificationType::PartsRequested, _) => (
            "Parts requested".into(),
            with_detail(format!("{who} requested parts for {what}."), "Details", detail),
        ),
        (NotificationType::MaintenanceRequired, _) => (
            "Maintenance required".into(),
            with_detail(
                format!("{what} has been placed under maintenance."),
                "Remarks",
                detail,
            ),
        ),
    }
}

/// Content for an upsert. `read: None` resets the flag on an update.
pub(super) struct NotificationDraft {
    pub kind: NotificationType,
    pub user_id: Ulid,
    pub related_entity_type: EntityKind,
    pub related_entity_id: Ulid,
    pub title: String,
    pub message: String,
    pub action_url: String,
    pub metadata: BTreeMap<String, String>,
    pub read: Option<bool>,
}

impl Engine {
    /// Fan `kind` out to its fixed audience.
    pub async fn emit(&self, kind: NotificationType, ctx: &EventContext) -> Vec<Notification> {
        self.emit_to(kind, recipients_for(kind), ctx).await
    }

    /// Fan out to an explicit audience. Unresolvable recipients are skipped;
    /// failed writes are logged and left out of the result.
    pub async fn emit_to(
        &self,
        kind: NotificationType,
        audiences: &[Audience],
        ctx: &EventContext,
    ) -> Vec<Notification> {
        let mut emitted = Vec::with_capacity(audiences.len());
        for &audience in audiences {
            let user_id = match audience {
                Audience::Trainer => ctx.trainer_id,
                Audience::LocationAdmin => self.recipient(Role::Admin, ctx.location),
                Audience::LocationSecurity => self.recipient(Role::Security, ctx.location),
            };
            let Some(user_id) = user_id else {
                tracing::debug!(kind = kind.as_str(), ?audience, location = %ctx.location, "no recipient, skipped");
                continue;
            };
            let (title, message) = render(kind, audience, ctx);
            let draft = NotificationDraft {
                kind,
                user_id,
                related_entity_type: ctx.related_entity_type,
                related_entity_id: ctx.related_entity_id,
                title,
                message,
                action_url: ctx.action_url(),
                metadata: ctx.metadata.clone(),
                read: None,
            };
            match self.upsert_notification(draft).await {
                Ok(notification) => {
                    metrics::counter!(
                        observability::NOTIFICATIONS_EMITTED_TOTAL,
                        "type" => kind.as_str()
                    )
                    .increment(1);
                    emitted.push(notification);
                }
                Err(e) => {
                    tracing::error!(kind = kind.as_str(), user = %user_id, "notification dropped: {e}");
                }
            }
        }
        emitted
    }

    /// Insert, or update in place keeping `id` and `timestamp`.
    pub(super) async fn upsert_notification(
        &self,
        draft: NotificationDraft,
    ) -> Result<Notification, EngineError> {
        let _dispatch = self.dispatch_lock.lock().await;
        let now = Utc::now();
        let key = (draft.kind, draft.user_id, draft.related_entity_id);
        let (id, timestamp) = match self.store.notification_for_key(&key) {
            Some(existing) => (existing.id, existing.timestamp),
            None => (Ulid::new(), now),
        };
        let notification = Notification {
            id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            user_id: draft.user_id,
            related_entity_type: draft.related_entity_type,
            related_entity_id: draft.related_entity_id,
            action_url: draft.action_url,
            read: draft.read.unwrap_or(false),
            timestamp,
            updated_at: now,
            metadata: draft.metadata,
        };
        self.persist_global(Event::NotificationUpserted(notification.clone()))
            .await?;
        self.notify.push(&notification);
        Ok(notification)
    }

    /// The user's notifications, newest first.
    pub fn notifications_for(
        &self,
        user_id: Ulid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, EngineError> {
        self.user(&user_id)?;
        let mut list: Vec<Notification> = self
            .store
            .notifications()
            .into_iter()
            .filter(|n| n.user_id == user_id && !(unread_only && n.read))
            .collect();
        list.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(list)
    }

    pub async fn mark_notification_read(&self, id: Ulid) -> Result<Notification, EngineError> {
        let notification = self
            .store
            .notification(&id)
            .ok_or(EngineError::not_found("notification", id))?;
        if notification.read {
            return Ok(notification);
        }
        self.persist_global(Event::NotificationRead { id }).await?;
        Ok(Notification {
            read: true,
            ..notification
        })
    }
}
