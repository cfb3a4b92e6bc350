use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::warn;

use crate::state::AppState;

const REQUESTS_PER_WINDOW: i64 = 100;
const WINDOW_SECONDS: i64 = 60;

/// Per-IP fixed window in Redis. Fails open when Redis is unreachable.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().cloned(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match redis.check_rate_limit(&key, REQUESTS_PER_WINDOW, WINDOW_SECONDS).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}
