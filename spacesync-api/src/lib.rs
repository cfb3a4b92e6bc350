use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod admin;
pub mod bookings;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod rooms;
pub mod state;
pub mod timetable;
pub mod users;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .nest("/bookings", bookings::routes(state.clone()))
        .nest("/rooms", rooms::routes())
        .nest("/timetable", timetable::routes(state.clone()))
        .nest("/admin", admin::routes(state.clone()))
        .nest("/users", users::routes(state.clone()));

    let mut router = Router::new()
        .route("/", get(health))
        .route("/metrics", get(metrics::export))
        .nest("/api", api)
        .layer(cors_layer(&state.cors_origins))
        .layer(TraceLayer::new_for_http());

    if state.redis.is_some() {
        router = router.layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));
    }

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "SpaceSync API is running",
    }))
}
