//! REST surface over the engine.

pub mod dto;
pub mod error;
mod extract;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Users & notifications
        .route("/users", post(handlers::register_user))
        .route("/users/{id}", get(handlers::get_user))
        .route("/users/{id}/notifications", get(handlers::user_notifications))
        .route("/notifications/{id}/read", post(handlers::mark_notification_read))
        // Vehicles
        .route("/vehicles", get(handlers::list_vehicles).post(handlers::register_vehicle))
        .route("/vehicles/{id}", get(handlers::get_vehicle))
        .route("/vehicles/{id}/override", put(handlers::set_override))
        .route("/vehicles/{id}/reconcile", post(handlers::reconcile_vehicle))
        .route("/vehicles/{id}/parts-requests", post(handlers::request_parts))
        .route("/vehicles/{id}/availability", get(handlers::vehicle_availability))
        .route("/vehicles/{id}/conflicts", get(handlers::vehicle_conflicts))
        // Bookings
        .route("/bookings", get(handlers::list_bookings).post(handlers::create_booking))
        .route("/bookings/{id}", get(handlers::get_booking))
        .route("/bookings/{id}/status", patch(handlers::transition_booking))
        // Messages
        .route("/messages", get(handlers::list_messages).post(handlers::post_message))
        .route("/messages/{id}/reply", post(handlers::reply))
        .route("/messages/{id}/read", post(handlers::mark_message_read))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}
