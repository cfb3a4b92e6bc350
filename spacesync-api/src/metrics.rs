use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

/// Per-app registry so that several routers can live in one process (tests).
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Labels: outcome (booked, occupied, rejected, error).
    pub booking_requests: IntCounterVec,
    pub bookings_cancelled: IntCounter,
    pub bookings_expired: IntCounter,
    /// Labels: status (ok, error).
    pub sweeper_runs: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("spacesync".to_string()), None)?;

        let booking_requests = IntCounterVec::new(
            Opts::new("booking_requests_total", "Booking attempts by outcome"),
            &["outcome"],
        )?;
        let bookings_cancelled =
            IntCounter::new("bookings_cancelled_total", "Bookings ended by cancel or mark-free")?;
        let bookings_expired =
            IntCounter::new("bookings_expired_total", "Bookings expired by the sweeper")?;
        let sweeper_runs = IntCounterVec::new(
            Opts::new("sweeper_runs_total", "Expiry sweeper passes by status"),
            &["status"],
        )?;

        registry.register(Box::new(booking_requests.clone()))?;
        registry.register(Box::new(bookings_cancelled.clone()))?;
        registry.register(Box::new(bookings_expired.clone()))?;
        registry.register(Box::new(sweeper_runs.clone()))?;

        Ok(Self {
            registry,
            booking_requests,
            bookings_cancelled,
            bookings_expired,
            sweeper_runs,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn export(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.booking_requests.with_label_values(&["booked"]).inc();
        metrics.bookings_expired.inc_by(3);

        let text = metrics.render().unwrap();

        assert!(text.contains("spacesync_booking_requests_total{outcome=\"booked\"} 1"));
        assert!(text.contains("spacesync_bookings_expired_total 3"));
    }
}
