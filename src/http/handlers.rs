use axum::extract::State;
use axum::http::StatusCode;
use ulid::Ulid;

use crate::engine::{BookingFilter, BookingRequest, EngineError, MessageDraft, VehicleFilter};
use crate::model::*;

use super::AppState;
use super::dto::*;
use super::extract::{Json, Path, Query};

type ApiResult<T> = Result<Json<T>, EngineError>;
type Created<T> = Result<(StatusCode, Json<T>), EngineError>;

fn created<T>(value: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(value)))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.engine.store();
    Json(HealthResponse {
        status: "ok",
        vehicles: store.vehicle_count(),
        users: store.user_count(),
    })
}

// ── Users & notifications ───────────────────────────────

pub async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterUserBody>,
) -> Created<User> {
    created(
        state
            .engine
            .register_user(&body.name, body.role, body.location)
            .await?,
    )
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<Ulid>) -> ApiResult<User> {
    Ok(Json(state.engine.get_user(id)?))
}

pub async fn user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Ulid>,
    Query(query): Query<NotificationsQuery>,
) -> ApiResult<Vec<Notification>> {
    Ok(Json(
        state.engine.notifications_for(user_id, query.unread_only)?,
    ))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> ApiResult<Notification> {
    Ok(Json(state.engine.mark_notification_read(id).await?))
}

// ── Vehicles ────────────────────────────────────────────

pub async fn register_vehicle(
    State(state): State<AppState>,
    Json(body): Json<RegisterVehicleBody>,
) -> Created<Vehicle> {
    created(
        state
            .engine
            .register_vehicle(&body.brand, &body.model, &body.reg_no, body.location)
            .await?,
    )
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    Query(filter): Query<VehicleFilter>,
) -> Json<Vec<Vehicle>> {
    Json(state.engine.list_vehicles(&filter).await)
}

pub async fn get_vehicle(State(state): State<AppState>, Path(id): Path<Ulid>) -> ApiResult<Vehicle> {
    Ok(Json(state.engine.get_vehicle(id).await?))
}

pub async fn set_override(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<OverrideBody>,
) -> ApiResult<Vehicle> {
    Ok(Json(
        state
            .engine
            .set_vehicle_override(id, body.manual_override)
            .await?,
    ))
}

pub async fn reconcile_vehicle(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> ApiResult<ReconcileResponse> {
    let status = state.engine.reconcile(id).await?;
    Ok(Json(ReconcileResponse {
        vehicle_id: id,
        status,
    }))
}

pub async fn request_parts(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<PartsRequestBody>,
) -> Created<Vec<Notification>> {
    created(
        state
            .engine
            .request_parts(id, body.requester_id, &body.details)
            .await?,
    )
}

pub async fn vehicle_availability(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Vec<FreeWindow>> {
    let spans = state
        .engine
        .vehicle_availability(id, query.from, query.to, query.min_duration_ms)
        .await?;
    Ok(Json(spans.into_iter().map(FreeWindow::from).collect()))
}

pub async fn vehicle_conflicts(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Query(query): Query<ConflictQuery>,
) -> ApiResult<ConflictResponse> {
    let conflict = state
        .engine
        .has_conflict(id, query.start, query.end, query.exclude_booking_id)
        .await?;
    Ok(Json(ConflictResponse { conflict }))
}

// ── Bookings ────────────────────────────────────────────

pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> Created<Booking> {
    created(state.engine.create_booking(request).await?)
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> ApiResult<Vec<Booking>> {
    Ok(Json(state.engine.list_bookings(&filter).await?))
}

pub async fn get_booking(State(state): State<AppState>, Path(id): Path<Ulid>) -> ApiResult<Booking> {
    Ok(Json(state.engine.get_booking(id).await?))
}

pub async fn transition_booking(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<TransitionBody>,
) -> ApiResult<Booking> {
    let (to, meta) = body.into_parts();
    Ok(Json(state.engine.transition_booking(id, to, meta).await?))
}

// ── Messages ────────────────────────────────────────────

pub async fn post_message(
    State(state): State<AppState>,
    Json(draft): Json<MessageDraft>,
) -> Created<Message> {
    created(state.engine.post_message(draft).await?)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ViewerQuery>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(state.engine.messages_for(query.viewer_id)?))
}

pub async fn reply(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<ReplyBody>,
) -> Created<Message> {
    created(state.engine.reply(id, body.sender_id, &body.content).await?)
}

pub async fn mark_message_read(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<ReadMessageBody>,
) -> ApiResult<Message> {
    Ok(Json(state.engine.mark_message_read(id, body.viewer_id).await?))
}
