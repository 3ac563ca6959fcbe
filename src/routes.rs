// src/routes.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::{header::CONTENT_TYPE, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::services::AppState;

pub fn create_routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/feed", get(handlers::get_feed))
        .route("/dashboard", get(handlers::get_dashboard))
        .route(
            "/reactions",
            get(handlers::get_reactions).post(handlers::post_reaction),
        )
        .route("/poll", get(handlers::get_poll))
        .route("/poll/votes", post(handlers::post_poll_vote));

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .with_state(state)
}
