use std::net::{IpAddr, UdpSocket};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub host: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub message: &'static str,
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub response: HealthReport,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthcheck", get(healthcheck))
}

/// 200 "Healthy" when the store answers a ping, 503 "Unhealthy" otherwise.
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = match state.users.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "store ping failed");
            false
        }
    };
    let (status, message) = if healthy {
        (StatusCode::OK, "Healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
    };
    let report = HealthReport {
        host: local_ipv4(),
        time: OffsetDateTime::now_utc(),
        message,
        status: healthy,
    };
    (status, Json(HealthResponse { response: report }))
}

pub async fn ping() -> &'static str {
    "pong"
}

/// IPv4 address of the interface holding the default route. Connecting a UDP
/// socket sends nothing; it only makes the kernel pick a source address.
fn local_ipv4() -> Vec<String> {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("192.0.2.1:9")?;
        Ok(socket.local_addr()?.ip())
    };
    let mut hosts = vec!["127.0.0.1".to_string()];
    if let Ok(ip @ IpAddr::V4(_)) = probe() {
        if !ip.is_loopback() && !ip.is_unspecified() {
            hosts.push(ip.to_string());
        }
    }
    hosts
}
