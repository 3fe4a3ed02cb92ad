use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod health;
pub mod like;
pub mod messages;
pub mod state;

pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/like", post(like::like))
        .route("/messages", get(messages::list_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
