use super::*;
use super::conflict::now_ms;
use crate::limits::*;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

fn test_journal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("motorpool_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn tomorrow_at(hour: u32) -> DateTime<Utc> {
    let day = (Utc::now() + Duration::days(1)).date_naive();
    day.and_hms_opt(hour, 0, 0).unwrap().and_utc()
}

struct Academy {
    engine: Engine,
    admin: User,
    security: User,
    trainer: User,
    vehicle: Vehicle,
}

async fn academy(name: &str) -> Academy {
    let engine = Engine::new(test_journal_path(name), Arc::new(NotifyHub::new())).unwrap();
    let pune = LocationScope::Site(Location::Pune);
    let admin = engine.register_user("Meera", Role::Admin, pune).await.unwrap();
    let security = engine
        .register_user("Gate 1", Role::Security, pune)
        .await
        .unwrap();
    let trainer = engine
        .register_user("Ravi", Role::Trainer, pune)
        .await
        .unwrap();
    let vehicle = engine
        .register_vehicle("Tata", "Nexon", "MH12AB1234", Location::Pune)
        .await
        .unwrap();
    Academy {
        engine,
        admin,
        security,
        trainer,
        vehicle,
    }
}

fn request(a: &Academy, start: DateTime<Utc>, end: DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        vehicle_id: a.vehicle.id,
        trainer_id: a.trainer.id,
        purpose: "DRV-101 highway module".into(),
        requested_location: None,
        start_date: start,
        end_date: end,
        notes: None,
    }
}

fn revalidating() -> TransitionMeta {
    TransitionMeta {
        revalidate: true,
        ..Default::default()
    }
}

fn kinds_for(engine: &Engine, user: &User) -> Vec<NotificationType> {
    engine
        .notifications_for(user.id, false)
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect()
}

// ── Creation ─────────────────────────────────────────────

#[tokio::test]
async fn create_booking_is_pending_and_notifies() {
    let a = academy("create_pending.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.trainer_name, "Ravi");
    assert_eq!(booking.requested_location, Location::Pune);
    assert_eq!(a.engine.get_booking(booking.id).await.unwrap(), booking);

    assert_eq!(
        kinds_for(&a.engine, &a.admin),
        vec![NotificationType::BookingCreated]
    );
    assert_eq!(
        kinds_for(&a.engine, &a.trainer),
        vec![NotificationType::BookingCreated]
    );
    assert!(kinds_for(&a.engine, &a.security).is_empty());
    // Pending bookings do not hold the vehicle.
    assert_eq!(
        a.engine.get_vehicle(a.vehicle.id).await.unwrap().status,
        VehicleStatus::Available
    );
}

#[tokio::test]
async fn overlapping_request_fails_with_scheduling_conflict() {
    let a = academy("overlap.journal").await;
    let first = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    let err = a
        .engine
        .create_booking(request(&a, tomorrow_at(11), tomorrow_at(13)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::SchedulingConflict(id)) if id == first.id
    ));
}

#[tokio::test]
async fn touching_windows_do_not_conflict() {
    let a = academy("touching.journal").await;
    a.engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .create_booking(request(&a, tomorrow_at(12), tomorrow_at(14)))
        .await
        .unwrap();
    a.engine
        .create_booking(request(&a, tomorrow_at(8), tomorrow_at(10)))
        .await
        .unwrap();
}

#[tokio::test]
async fn terminal_bookings_release_their_window() {
    let a = academy("terminal_release.journal").await;
    let first = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .transition_booking(
            first.id,
            BookingStatus::Rejected,
            TransitionMeta {
                reason: Some("Fleet inspection".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let second = a
        .engine
        .create_booking(request(&a, tomorrow_at(11), tomorrow_at(13)))
        .await
        .unwrap();
    assert_eq!(second.status, BookingStatus::Pending);

    let rejected = a.engine.get_booking(first.id).await.unwrap();
    assert_eq!(rejected.notes.as_deref(), Some("Fleet inspection"));
    let note = a
        .engine
        .notifications_for(a.trainer.id, false)
        .unwrap()
        .into_iter()
        .find(|n| n.kind == NotificationType::BookingRejected)
        .unwrap();
    assert!(note.message.contains("Fleet inspection"));
}

async fn conflicts(
    a: &Academy,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<Ulid>,
) -> Result<bool, EngineError> {
    a.engine.has_conflict(a.vehicle.id, start, end, exclude).await
}

#[tokio::test]
async fn has_conflict_queries_by_vehicle() {
    let a = academy("has_conflict.journal").await;
    let booked = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();

    assert!(conflicts(&a, tomorrow_at(11), tomorrow_at(13), None).await.unwrap());
    assert!(conflicts(&a, tomorrow_at(9), tomorrow_at(15), None).await.unwrap());
    assert!(!conflicts(&a, tomorrow_at(12), tomorrow_at(14), None).await.unwrap());
    assert!(!conflicts(&a, tomorrow_at(8), tomorrow_at(10), None).await.unwrap());
    // A booking never conflicts with itself when re-checked.
    assert!(!conflicts(&a, tomorrow_at(10), tomorrow_at(12), Some(booked.id)).await.unwrap());

    a.engine
        .transition_booking(booked.id, BookingStatus::Rejected, TransitionMeta::default())
        .await
        .unwrap();
    assert!(!conflicts(&a, tomorrow_at(11), tomorrow_at(13), None).await.unwrap());

    assert!(matches!(
        conflicts(&a, tomorrow_at(12), tomorrow_at(12), None).await,
        Err(EngineError::Validation(ValidationError::InvalidRange))
    ));
    assert!(matches!(
        a.engine
            .has_conflict(Ulid::new(), tomorrow_at(10), tomorrow_at(12), None)
            .await,
        Err(EngineError::NotFound { entity: "vehicle", .. })
    ));
}

#[tokio::test]
async fn inverted_window_is_invalid_range() {
    let a = academy("invalid_range.journal").await;
    let past = Utc::now() - Duration::days(3);
    for (start, end) in [
        (tomorrow_at(12), tomorrow_at(10)),
        (tomorrow_at(12), tomorrow_at(12)),
        (past, past - Duration::hours(2)),
    ] {
        let err = a
            .engine
            .create_booking(request(&a, start, end))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InvalidRange)
        ));
    }
}

#[tokio::test]
async fn sub_hour_window_is_too_short() {
    let a = academy("too_short.journal").await;
    let past = Utc::now() - Duration::days(3);
    for (start, end) in [
        (tomorrow_at(10), tomorrow_at(10) + Duration::minutes(59)),
        (past, past + Duration::minutes(30)),
    ] {
        let err = a
            .engine
            .create_booking(request(&a, start, end))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::DurationTooShort)
        ));
    }
    a.engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(11)))
        .await
        .unwrap();
}

#[tokio::test]
async fn start_one_minute_ago_is_past_start_date() {
    let a = academy("past_start.journal").await;
    let start = Utc::now() - Duration::minutes(1) - Duration::seconds(1);
    let err = a
        .engine
        .create_booking(request(&a, start, start + Duration::hours(2)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::PastStartDate)
    ));
}

#[tokio::test]
async fn overlong_booking_rejected() {
    let a = academy("overlong.journal").await;
    let err = a
        .engine
        .create_booking(request(&a, tomorrow_at(0), tomorrow_at(0) + Duration::days(31)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

#[tokio::test]
async fn vehicle_under_override_rejects_requests() {
    let a = academy("override_rejects.journal").await;
    a.engine
        .set_vehicle_override(a.vehicle.id, Some(VehicleOverride::Maintenance))
        .await
        .unwrap();
    let err = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::VehicleUnavailable(VehicleStatus::Maintenance))
    ));

    a.engine
        .set_vehicle_override(a.vehicle.id, Some(VehicleOverride::Inactive))
        .await
        .unwrap();
    let err = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::VehicleUnavailable(VehicleStatus::Inactive))
    ));

    let cleared = a
        .engine
        .set_vehicle_override(a.vehicle.id, None)
        .await
        .unwrap();
    assert_eq!(cleared.status, VehicleStatus::Available);
    a.engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
}

#[tokio::test]
async fn requested_location_must_match_vehicle_site() {
    let a = academy("requested_site.journal").await;
    let chennai_admin = a
        .engine
        .register_user("Anand", Role::Admin, LocationScope::Site(Location::Chennai))
        .await
        .unwrap();

    let mut elsewhere = request(&a, tomorrow_at(10), tomorrow_at(12));
    elsewhere.requested_location = Some(Location::Chennai);
    let err = a.engine.create_booking(elsewhere).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)), "{err:?}");
    assert!(a.engine.list_bookings(&BookingFilter::default()).await.unwrap().is_empty());
    assert!(kinds_for(&a.engine, &chennai_admin).is_empty());
    assert!(kinds_for(&a.engine, &a.admin).is_empty());

    // Naming the vehicle's own site is the same as omitting it.
    let mut same_site = request(&a, tomorrow_at(10), tomorrow_at(12));
    same_site.requested_location = Some(Location::Pune);
    let booking = a.engine.create_booking(same_site).await.unwrap();
    let listed = a
        .engine
        .list_bookings(&BookingFilter {
            location: Some(Location::Pune),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed, vec![booking]);
    assert_eq!(
        kinds_for(&a.engine, &a.admin),
        vec![NotificationType::BookingCreated]
    );
}

#[tokio::test]
async fn unknown_trainer_or_vehicle_not_found() {
    let a = academy("create_not_found.journal").await;
    let mut req = request(&a, tomorrow_at(10), tomorrow_at(12));
    req.trainer_id = Ulid::new();
    assert!(matches!(
        a.engine.create_booking(req).await,
        Err(EngineError::NotFound { entity: "user", .. })
    ));
    let mut req = request(&a, tomorrow_at(10), tomorrow_at(12));
    req.vehicle_id = Ulid::new();
    assert!(matches!(
        a.engine.create_booking(req).await,
        Err(EngineError::NotFound {
            entity: "vehicle",
            ..
        })
    ));
}

#[tokio::test]
async fn concurrent_requests_for_one_window_admit_exactly_one() {
    let a = academy("concurrent.journal").await;
    let engine = Arc::new(a.engine);
    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        let req = BookingRequest {
            vehicle_id: a.vehicle.id,
            trainer_id: a.trainer.id,
            purpose: "Night driving".into(),
            requested_location: None,
            start_date: tomorrow_at(18),
            end_date: tomorrow_at(21),
            notes: None,
        };
        handles.push(tokio::spawn(async move { engine.create_booking(req).await }));
    }
    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => created += 1,
            Err(EngineError::Validation(ValidationError::SchedulingConflict(_))) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
}

// ── Transitions & status ─────────────────────────────────

#[tokio::test]
async fn illegal_transitions_rejected() {
    let a = academy("illegal_transitions.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();

    for to in [
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Pending,
    ] {
        let err = a
            .engine
            .transition_booking(booking.id, to, TransitionMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { from: BookingStatus::Pending, to: t } if t == to
        ));
    }

    a.engine
        .transition_booking(booking.id, BookingStatus::Rejected, TransitionMeta::default())
        .await
        .unwrap();
    let err = a
        .engine
        .transition_booking(booking.id, BookingStatus::Approved, TransitionMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert!(matches!(
        a.engine
            .transition_booking(Ulid::new(), BookingStatus::Approved, TransitionMeta::default())
            .await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn approval_puts_vehicle_in_use_unless_maintenance() {
    let a = academy("approval_in_use.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .transition_booking(booking.id, BookingStatus::Approved, revalidating())
        .await
        .unwrap();
    assert_eq!(
        a.engine.reconcile(a.vehicle.id).await.unwrap(),
        VehicleStatus::InUse
    );

    a.engine
        .set_vehicle_override(a.vehicle.id, Some(VehicleOverride::Maintenance))
        .await
        .unwrap();
    assert_eq!(
        a.engine.reconcile(a.vehicle.id).await.unwrap(),
        VehicleStatus::Maintenance
    );

    a.engine
        .set_vehicle_override(a.vehicle.id, None)
        .await
        .unwrap();
    assert_eq!(
        a.engine.reconcile(a.vehicle.id).await.unwrap(),
        VehicleStatus::InUse
    );

    assert_eq!(
        kinds_for(&a.engine, &a.security),
        vec![NotificationType::BookingApproved]
    );
    assert!(kinds_for(&a.engine, &a.trainer).contains(&NotificationType::BookingApproved));
}

#[tokio::test]
async fn full_lifecycle_cycles_vehicle_status() {
    let a = academy("full_lifecycle.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .transition_booking(booking.id, BookingStatus::Approved, revalidating())
        .await
        .unwrap();
    let active = a
        .engine
        .transition_booking(booking.id, BookingStatus::Active, revalidating())
        .await
        .unwrap();
    assert_eq!(active.status, BookingStatus::Active);
    assert_eq!(
        a.engine.get_vehicle(a.vehicle.id).await.unwrap().status,
        VehicleStatus::InUse
    );

    let done = a
        .engine
        .transition_booking(booking.id, BookingStatus::Completed, TransitionMeta::default())
        .await
        .unwrap();
    assert_eq!(done.status, BookingStatus::Completed);
    assert_eq!(
        a.engine.get_vehicle(a.vehicle.id).await.unwrap().status,
        VehicleStatus::Available
    );
    assert_eq!(
        a.engine.reconcile(a.vehicle.id).await.unwrap(),
        VehicleStatus::Available
    );

    let trainer_kinds = kinds_for(&a.engine, &a.trainer);
    for kind in [
        NotificationType::BookingCreated,
        NotificationType::BookingApproved,
        NotificationType::KeyIssued,
        NotificationType::VehicleReturned,
    ] {
        assert!(trainer_kinds.contains(&kind), "trainer missing {kind:?}");
    }
    let admin_kinds = kinds_for(&a.engine, &a.admin);
    assert!(admin_kinds.contains(&NotificationType::VehicleReturned));
    assert!(!admin_kinds.contains(&NotificationType::DamageReported));
}

#[tokio::test]
async fn damaged_return_raises_damage_and_maintenance() {
    let a = academy("damaged_return.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    for to in [BookingStatus::Approved, BookingStatus::Active] {
        a.engine
            .transition_booking(booking.id, to, TransitionMeta::default())
            .await
            .unwrap();
    }
    let done = a
        .engine
        .transition_booking(
            booking.id,
            BookingStatus::Completed,
            TransitionMeta {
                actor_id: Some(a.security.id),
                condition: Some(ReturnCondition {
                    damaged: true,
                    needs_maintenance: true,
                    remarks: Some("Rear bumper dented".into()),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(done.notes.as_deref(), Some("Rear bumper dented"));

    let vehicle = a.engine.get_vehicle(a.vehicle.id).await.unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Maintenance);
    assert_eq!(vehicle.manual_override, Some(VehicleOverride::Maintenance));

    let admin_kinds = kinds_for(&a.engine, &a.admin);
    for kind in [
        NotificationType::VehicleReturned,
        NotificationType::DamageReported,
        NotificationType::MaintenanceRequired,
    ] {
        assert!(admin_kinds.contains(&kind), "admin missing {kind:?}");
    }
}

#[tokio::test]
async fn cancellation_frees_vehicle_without_notifying() {
    let a = academy("cancellation.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .transition_booking(booking.id, BookingStatus::Approved, TransitionMeta::default())
        .await
        .unwrap();
    let before = a.engine.store().notifications().len();
    a.engine
        .transition_booking(booking.id, BookingStatus::Cancelled, TransitionMeta::default())
        .await
        .unwrap();
    assert_eq!(a.engine.store().notifications().len(), before);
    assert_eq!(
        a.engine.get_vehicle(a.vehicle.id).await.unwrap().status,
        VehicleStatus::Available
    );
}

#[tokio::test]
async fn elapsed_approval_released_by_reconcile() {
    let a = academy("elapsed_approval.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .transition_booking(booking.id, BookingStatus::Approved, TransitionMeta::default())
        .await
        .unwrap();
    let after_end = to_ms(tomorrow_at(12)) + MINUTE_MS;
    assert_eq!(
        a.engine.reconcile_at(a.vehicle.id, after_end).await.unwrap(),
        VehicleStatus::Available
    );
    assert_eq!(a.engine.reconcile_all(now_ms()).await, 1);
    assert_eq!(
        a.engine.get_vehicle(a.vehicle.id).await.unwrap().status,
        VehicleStatus::InUse
    );
    assert_eq!(a.engine.reconcile_all(now_ms()).await, 0);
}

#[tokio::test]
async fn active_booking_holds_past_its_end() {
    let a = academy("active_overrun.journal").await;
    let booking = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    for to in [BookingStatus::Approved, BookingStatus::Active] {
        a.engine
            .transition_booking(booking.id, to, TransitionMeta::default())
            .await
            .unwrap();
    }
    let long_after = to_ms(tomorrow_at(12)) + 6 * HOUR_MS;
    assert_eq!(
        a.engine.reconcile_at(a.vehicle.id, long_after).await.unwrap(),
        VehicleStatus::InUse
    );
}

#[tokio::test]
async fn non_overlap_invariant_holds_after_mixed_traffic() {
    let a = academy("invariant.journal").await;
    for (s, e) in [(8, 10), (9, 11), (10, 12), (11, 13), (12, 14), (13, 15), (9, 14), (14, 16)] {
        let _ = a
            .engine
            .create_booking(request(&a, tomorrow_at(s), tomorrow_at(e)))
            .await;
    }
    let live: Vec<Booking> = a
        .engine
        .list_bookings(&BookingFilter {
            vehicle_id: Some(a.vehicle.id),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .filter(Booking::is_live)
        .collect();
    assert_eq!(live.len(), 4);
    for (i, b1) in live.iter().enumerate() {
        for b2 in &live[i + 1..] {
            assert!(!b1.span().overlaps(&b2.span()));
        }
    }
}

// ── Notifications ────────────────────────────────────────

#[tokio::test]
async fn repeated_emit_updates_in_place() {
    let a = academy("dedup.journal").await;
    let booking_id = Ulid::new();
    let mut ctx = EventContext {
        related_entity_type: EntityKind::Booking,
        related_entity_id: booking_id,
        location: Location::Pune,
        trainer_id: Some(a.trainer.id),
        actor_name: a.trainer.name.clone(),
        subject: a.vehicle.label(),
        window: Some(Span::new(to_ms(tomorrow_at(10)), to_ms(tomorrow_at(12)))),
        detail: None,
        metadata: BTreeMap::new(),
    };
    let first = a.engine.emit(NotificationType::BookingApproved, &ctx).await;
    assert_eq!(first.len(), 2);
    let trainer_first = first.iter().find(|n| n.user_id == a.trainer.id).unwrap();
    a.engine
        .mark_notification_read(trainer_first.id)
        .await
        .unwrap();

    ctx.window = Some(Span::new(to_ms(tomorrow_at(14)), to_ms(tomorrow_at(16))));
    let second = a.engine.emit(NotificationType::BookingApproved, &ctx).await;
    let trainer_second = second.iter().find(|n| n.user_id == a.trainer.id).unwrap();

    assert_eq!(trainer_second.id, trainer_first.id);
    assert_eq!(trainer_second.timestamp, trainer_first.timestamp);
    assert_ne!(trainer_second.message, trainer_first.message);
    assert!(!trainer_second.read);

    let live: Vec<_> = a
        .engine
        .notifications_for(a.trainer.id, false)
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationType::BookingApproved && n.related_entity_id == booking_id)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].message, trainer_second.message);
}

#[tokio::test]
async fn missing_location_staff_are_skipped() {
    let engine = Engine::new(
        test_journal_path("no_staff.journal"),
        Arc::new(NotifyHub::new()),
    )
    .unwrap();
    let trainer = engine
        .register_user("Divya", Role::Trainer, LocationScope::Site(Location::Chennai))
        .await
        .unwrap();
    // An ALL-scope admin is not the Chennai admin.
    engine
        .register_user("HQ", Role::Admin, LocationScope::All)
        .await
        .unwrap();
    let vehicle = engine
        .register_vehicle("Maruti", "Dzire", "TN09 XY 4321", Location::Chennai)
        .await
        .unwrap();
    let booking = engine
        .create_booking(BookingRequest {
            vehicle_id: vehicle.id,
            trainer_id: trainer.id,
            purpose: "City driving".into(),
            requested_location: None,
            start_date: tomorrow_at(9),
            end_date: tomorrow_at(11),
            notes: None,
        })
        .await
        .unwrap();
    let all = engine.store().notifications();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].user_id, trainer.id);
    assert_eq!(all[0].related_entity_id, booking.id);
}

#[tokio::test]
async fn unread_filter_and_mark_read() {
    let a = academy("unread.journal").await;
    a.engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    let unread = a.engine.notifications_for(a.admin.id, true).unwrap();
    assert_eq!(unread.len(), 1);
    let read = a.engine.mark_notification_read(unread[0].id).await.unwrap();
    assert!(read.read);
    assert!(a.engine.notifications_for(a.admin.id, true).unwrap().is_empty());
    assert_eq!(a.engine.notifications_for(a.admin.id, false).unwrap().len(), 1);
    assert!(matches!(
        a.engine.mark_notification_read(Ulid::new()).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn notifications_reach_hub_subscribers() {
    let a = academy("hub_push.journal").await;
    let mut rx = a.engine.notify.subscribe(a.admin.id);
    a.engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    let pushed = rx.recv().await.unwrap();
    assert_eq!(pushed.kind, NotificationType::BookingCreated);
    assert_eq!(pushed.user_id, a.admin.id);
}

#[tokio::test]
async fn parts_request_goes_to_location_admin() {
    let a = academy("parts.journal").await;
    let sent = a
        .engine
        .request_parts(a.vehicle.id, a.security.id, "Replace wiper blades")
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, a.admin.id);
    assert_eq!(sent[0].kind, NotificationType::PartsRequested);
    assert_eq!(sent[0].related_entity_type, EntityKind::Vehicle);
    assert!(sent[0].message.contains("Replace wiper blades"));

    assert!(matches!(
        a.engine.request_parts(a.vehicle.id, a.security.id, "  ").await,
        Err(EngineError::InvalidRequest(_))
    ));
}

// ── Vehicles & queries ───────────────────────────────────

#[tokio::test]
async fn duplicate_registration_numbers_rejected() {
    let a = academy("dup_reg.journal").await;
    let err = a
        .engine
        .register_vehicle("Tata", "Nexon", " mh12 ab1234 ", Location::Chennai)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
    assert!(matches!(
        a.engine
            .register_vehicle("", "Nexon", "MH12ZZ0001", Location::Pune)
            .await,
        Err(EngineError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn list_filters() {
    let a = academy("list_filters.journal").await;
    let other = a
        .engine
        .register_vehicle("Mahindra", "XUV300", "KA01MN5555", Location::Bangalore)
        .await
        .unwrap();
    let b1 = a
        .engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    a.engine
        .transition_booking(b1.id, BookingStatus::Approved, TransitionMeta::default())
        .await
        .unwrap();

    let pune = a
        .engine
        .list_vehicles(&VehicleFilter {
            location: Some(Location::Pune),
            ..Default::default()
        })
        .await;
    assert_eq!(pune.len(), 1);
    assert_eq!(pune[0].id, a.vehicle.id);
    let available = a
        .engine
        .list_vehicles(&VehicleFilter {
            status: Some(VehicleStatus::Available),
            ..Default::default()
        })
        .await;
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, other.id);

    let approved = a
        .engine
        .list_bookings(&BookingFilter {
            status: Some(BookingStatus::Approved),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    let none = a
        .engine
        .list_bookings(&BookingFilter {
            trainer_id: Some(a.admin.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn availability_excludes_live_bookings() {
    let a = academy("availability.journal").await;
    a.engine
        .create_booking(request(&a, tomorrow_at(10), tomorrow_at(12)))
        .await
        .unwrap();
    let free = a
        .engine
        .vehicle_availability(a.vehicle.id, tomorrow_at(8), tomorrow_at(16), Some(HOUR_MS))
        .await
        .unwrap();
    assert_eq!(
        free,
        vec![
            Span::new(to_ms(tomorrow_at(8)), to_ms(tomorrow_at(10))),
            Span::new(to_ms(tomorrow_at(12)), to_ms(tomorrow_at(16))),
        ]
    );
    assert!(matches!(
        a.engine
            .vehicle_availability(a.vehicle.id, tomorrow_at(16), tomorrow_at(8), None)
            .await,
        Err(EngineError::Validation(ValidationError::InvalidRange))
    ));
    assert!(matches!(
        a.engine
            .vehicle_availability(
                a.vehicle.id,
                tomorrow_at(0),
                tomorrow_at(0) + Duration::days(91),
                None
            )
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Messaging ────────────────────────────────────────────

#[tokio::test]
async fn direct_message_and_reply() {
    let a = academy("messages_direct.journal").await;
    let question = a
        .engine
        .post_message(MessageDraft {
            sender_id: a.trainer.id,
            recipient_ids: vec![a.admin.id],
            content: "Can I extend tomorrow's booking?".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(a.engine.messages_for(a.admin.id).unwrap().len(), 1);
    assert!(a.engine.messages_for(a.security.id).unwrap().is_empty());

    let answer = a
        .engine
        .reply(question.id, a.admin.id, "Yes, until 14:00.")
        .await
        .unwrap();
    assert_eq!(answer.recipient_ids, vec![a.trainer.id]);
    assert_eq!(answer.parent_message_id, Some(question.id));

    let inbox = a.engine.messages_for(a.trainer.id).unwrap();
    assert_eq!(inbox.len(), 2);

    assert!(matches!(
        a.engine.reply(question.id, a.security.id, "me too").await,
        Err(EngineError::Forbidden(_))
    ));
}

#[tokio::test]
async fn admin_broadcast_scoped_to_admin_site() {
    let a = academy("messages_broadcast.journal").await;
    let chennai_trainer = a
        .engine
        .register_user("Karthik", Role::Trainer, LocationScope::Site(Location::Chennai))
        .await
        .unwrap();
    let notice = a
        .engine
        .post_message(MessageDraft {
            sender_id: a.admin.id,
            content: "Yard closed for resurfacing on Friday.".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(notice.location_filter, Some(Location::Pune));
    assert_eq!(a.engine.messages_for(a.trainer.id).unwrap().len(), 1);
    assert_eq!(a.engine.messages_for(a.security.id).unwrap().len(), 1);
    assert!(a.engine.messages_for(chennai_trainer.id).unwrap().is_empty());

    assert!(matches!(
        a.engine.mark_message_read(notice.id, chennai_trainer.id).await,
        Err(EngineError::Forbidden(_))
    ));
    let read = a
        .engine
        .mark_message_read(notice.id, a.trainer.id)
        .await
        .unwrap();
    assert!(read.read);
}

#[tokio::test]
async fn author_follow_up_reaches_original_audience() {
    let a = academy("messages_follow_up.journal").await;
    let chennai_trainer = a
        .engine
        .register_user("Karthik", Role::Trainer, LocationScope::Site(Location::Chennai))
        .await
        .unwrap();
    let notice = a
        .engine
        .post_message(MessageDraft {
            sender_id: a.admin.id,
            recipient_roles: vec![Role::Trainer],
            content: "Night-driving module moves to Thursday.".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let follow_up = a
        .engine
        .reply(notice.id, a.admin.id, "Bring reflective vests.")
        .await
        .unwrap();
    assert!(follow_up.recipient_ids.is_empty());
    assert_eq!(follow_up.recipient_roles, vec![Role::Trainer]);
    assert_eq!(follow_up.location_filter, Some(Location::Pune));
    assert_eq!(follow_up.parent_message_id, Some(notice.id));
    assert_eq!(a.engine.messages_for(a.trainer.id).unwrap().len(), 2);
    assert!(a.engine.messages_for(a.security.id).unwrap().is_empty());
    assert!(a.engine.messages_for(chennai_trainer.id).unwrap().is_empty());

    // A trainer following up on their own direct message re-addresses it.
    let question = a
        .engine
        .post_message(MessageDraft {
            sender_id: a.trainer.id,
            recipient_ids: vec![a.admin.id],
            content: "Is the Nexon free on Friday?".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let nudge = a
        .engine
        .reply(question.id, a.trainer.id, "Any update?")
        .await
        .unwrap();
    assert_eq!(nudge.recipient_ids, vec![a.admin.id]);
}

#[tokio::test]
async fn trainer_cannot_broadcast_and_content_checked() {
    let a = academy("messages_rules.journal").await;
    assert!(matches!(
        a.engine
            .post_message(MessageDraft {
                sender_id: a.trainer.id,
                content: "Hello everyone".into(),
                ..Default::default()
            })
            .await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        a.engine
            .post_message(MessageDraft {
                sender_id: a.trainer.id,
                recipient_ids: vec![a.admin.id],
                content: "   ".into(),
                ..Default::default()
            })
            .await,
        Err(EngineError::InvalidRequest(_))
    ));
    assert!(matches!(
        a.engine
            .post_message(MessageDraft {
                sender_id: a.trainer.id,
                recipient_ids: vec![a.admin.id],
                content: "x".repeat(MAX_MESSAGE_LEN + 1),
                ..Default::default()
            })
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        a.engine
            .post_message(MessageDraft {
                sender_id: a.trainer.id,
                recipient_ids: vec![Ulid::new()],
                content: "hi".into(),
                ..Default::default()
            })
            .await,
        Err(EngineError::NotFound { .. })
    ));
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn journal_replay_restores_state() {
    let path = test_journal_path("replay.journal");
    let (vehicle_id, booking_id, admin_id, message_id) = {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        let pune = LocationScope::Site(Location::Pune);
        let admin = engine.register_user("Meera", Role::Admin, pune).await.unwrap();
        let trainer = engine.register_user("Ravi", Role::Trainer, pune).await.unwrap();
        let vehicle = engine
            .register_vehicle("Tata", "Nexon", "MH12AB1234", Location::Pune)
            .await
            .unwrap();
        let booking = engine
            .create_booking(BookingRequest {
                vehicle_id: vehicle.id,
                trainer_id: trainer.id,
                purpose: "DRV-101".into(),
                requested_location: None,
                start_date: tomorrow_at(10),
                end_date: tomorrow_at(12),
                notes: Some("Bring L-plates".into()),
            })
            .await
            .unwrap();
        engine
            .transition_booking(booking.id, BookingStatus::Approved, TransitionMeta::default())
            .await
            .unwrap();
        let message = engine
            .post_message(MessageDraft {
                sender_id: trainer.id,
                recipient_ids: vec![admin.id],
                content: "Thanks!".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        (vehicle.id, booking.id, admin.id, message.id)
    };

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let booking = engine.get_booking(booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Approved);
    assert_eq!(booking.notes.as_deref(), Some("Bring L-plates"));
    assert_eq!(
        engine.get_vehicle(vehicle_id).await.unwrap().status,
        VehicleStatus::InUse
    );
    assert_eq!(engine.notifications_for(admin_id, false).unwrap().len(), 1);
    assert!(engine.store().message(&message_id).is_some());
    assert!(engine.store().vehicle_by_reg_no("mh12ab1234").is_some());
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_journal_path("compaction.journal");
    let (vehicle_id, booking_id) = {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        let pune = LocationScope::Site(Location::Pune);
        engine.register_user("Meera", Role::Admin, pune).await.unwrap();
        let trainer = engine.register_user("Ravi", Role::Trainer, pune).await.unwrap();
        let vehicle = engine
            .register_vehicle("Tata", "Nexon", "MH12AB1234", Location::Pune)
            .await
            .unwrap();
        let booking = engine
            .create_booking(BookingRequest {
                vehicle_id: vehicle.id,
                trainer_id: trainer.id,
                purpose: "DRV-101".into(),
                requested_location: None,
                start_date: tomorrow_at(10),
                end_date: tomorrow_at(12),
                notes: None,
            })
            .await
            .unwrap();
        for to in [BookingStatus::Approved, BookingStatus::Active] {
            engine
                .transition_booking(booking.id, to, TransitionMeta::default())
                .await
                .unwrap();
        }
        assert!(engine.journal_appends_since_compact().await > 0);
        assert!(engine.compact_journal().await.unwrap());
        assert_eq!(engine.journal_appends_since_compact().await, 0);
        (vehicle.id, booking.id)
    };

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(
        engine.get_booking(booking_id).await.unwrap().status,
        BookingStatus::Active
    );
    assert_eq!(
        engine.get_vehicle(vehicle_id).await.unwrap().status,
        VehicleStatus::InUse
    );
    assert_eq!(engine.store().user_count(), 2);
}
