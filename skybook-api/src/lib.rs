use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod booking;
pub mod error;
pub mod identity;
pub mod order;
pub mod telemetry;
pub mod worker;

pub use error::AppError;

/// Layers shared by both services' routers.
pub fn with_common_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
            identity::USER_ID_HEADER.clone(),
            identity::USER_ROLE_HEADER.clone(),
        ]);

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
