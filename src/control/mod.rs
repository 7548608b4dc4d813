//! Local HTTP control API
//!
//! Exposes the bridge operations to the host on 127.0.0.1. Operation
//! endpoints answer `{"success": bool, "connected"?: bool, "error"?: string}`;
//! error strings are sanitized before they leave the process.

use crate::bridge::Bridge;
use crate::config::Settings;
use crate::error::BridgeError;
use crate::telemetry::TelemetrySource;
use crate::transport::Transport;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection};

/// Port used when `CONTROL_PORT` is unset or invalid
pub const DEFAULT_CONTROL_PORT: u16 = 8787;

/// Environment variable overriding the control port
pub const CONTROL_PORT_ENV: &str = "CONTROL_PORT";

/// Largest request body accepted
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Result of a host-triggered operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: &BridgeError) -> Self {
        Self {
            success: false,
            connected: None,
            error: Some(error.to_host_message()),
        }
    }

    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = Some(connected);
        self
    }
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    running: bool,
}

/// Control port from `CONTROL_PORT`, else [`DEFAULT_CONTROL_PORT`]
pub fn control_port() -> u16 {
    std::env::var(CONTROL_PORT_ENV)
        .ok()
        .and_then(|port| port.parse().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_CONTROL_PORT)
}

/// Loopback address for the control API
pub fn control_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Serve the control API until `shutdown` resolves
pub async fn serve<T, S, F>(
    bridge: Arc<Bridge<T, S>>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), warp::Error>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(bridge)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!(addr = %bound, "Control API listening");
    server.await;
    info!("Control API stopped");
    Ok(())
}

/// All control routes
pub fn routes<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> impl Filter<Extract = (WithStatus<Json>,), Error = Rejection> + Clone
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let get_settings = warp::path("settings")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge.clone()))
        .and_then(get_settings_handler);

    let save_settings = warp::path("settings")
        .and(warp::path::end())
        .and(warp::put())
        .and(with_body())
        .and(with_bridge(bridge.clone()))
        .and_then(save_settings_handler);

    let connect = warp::path("connect")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_bridge(bridge.clone()))
        .and_then(connect_handler);

    let disconnect = warp::path("disconnect")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_bridge(bridge.clone()))
        .and_then(disconnect_handler);

    let test_connection = warp::path("test-connection")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_bridge(bridge.clone()))
        .and_then(test_connection_handler);

    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge.clone()))
        .and_then(status_handler);

    let publish = warp::path("publish")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_bridge(bridge.clone()))
        .and_then(publish_handler);

    let telemetry = warp::path("telemetry")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge.clone()))
        .and_then(telemetry_handler);

    let events = warp::path("events")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_body())
        .and(with_bridge(bridge.clone()))
        .and_then(events_handler);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge))
        .and_then(health_handler);

    get_settings
        .or(save_settings)
        .unify()
        .or(connect)
        .unify()
        .or(disconnect)
        .unify()
        .or(test_connection)
        .unify()
        .or(status)
        .unify()
        .or(publish)
        .unify()
        .or(telemetry)
        .unify()
        .or(events)
        .unify()
        .or(health)
        .unify()
}

fn with_bridge<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> impl Filter<Extract = (Arc<Bridge<T, S>>,), Error = Infallible> + Clone
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    warp::any().map(move || bridge.clone())
}

fn with_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::bytes())
}

fn reply<V: Serialize>(value: &V, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(value), status)
}

fn bad_request(message: String) -> WithStatus<Json> {
    let response = HostResponse {
        success: false,
        connected: None,
        error: Some(message),
    };
    reply(&response, StatusCode::BAD_REQUEST)
}

async fn get_settings_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    Ok(reply(&bridge.get_settings().await, StatusCode::OK))
}

async fn save_settings_handler<T, S>(
    body: Bytes,
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let settings: Settings = match serde_json::from_slice(&body) {
        Ok(settings) => settings,
        Err(e) => return Ok(bad_request(format!("Invalid settings: {e}"))),
    };

    let response = match bridge.save_settings(settings).await {
        Ok(()) => HostResponse::ok(),
        Err(e) => {
            warn!(error = %e, "Error saving settings");
            HostResponse::failed(&e)
        }
    };
    Ok(reply(&response, StatusCode::OK))
}

async fn connect_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let response = match bridge.connect().await {
        Ok(()) => HostResponse::ok(),
        Err(e) => HostResponse::failed(&e),
    };
    let connected = bridge.connection_status().connected;
    Ok(reply(&response.with_connected(connected), StatusCode::OK))
}

async fn disconnect_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    bridge.disconnect().await;
    Ok(reply(
        &HostResponse::ok().with_connected(false),
        StatusCode::OK,
    ))
}

async fn test_connection_handler<T, S>(
    body: Bytes,
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let candidate = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Settings>(&body) {
            Ok(settings) => Some(settings),
            Err(e) => return Ok(bad_request(format!("Invalid settings: {e}"))),
        }
    };

    let response = match bridge.test_connection(candidate).await {
        Ok(()) => HostResponse::ok(),
        Err(e) => HostResponse::failed(&e),
    };
    Ok(reply(&response, StatusCode::OK))
}

async fn status_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    Ok(reply(&bridge.connection_status(), StatusCode::OK))
}

async fn publish_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let response = match bridge.publish_now().await {
        Ok(_) => HostResponse::ok(),
        Err(e) => HostResponse::failed(&e),
    };
    Ok(reply(&response, StatusCode::OK))
}

async fn telemetry_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    Ok(reply(&bridge.get_telemetry().await, StatusCode::OK))
}

async fn events_handler<T, S>(
    body: Bytes,
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => return Ok(bad_request(format!("Event body is not JSON: {e}"))),
    };

    // Dropped events are already logged by the bridge
    let _ = bridge.ingest_event(&event).await;
    Ok(reply(&HostResponse::ok(), StatusCode::ACCEPTED))
}

async fn health_handler<T, S>(
    bridge: Arc<Bridge<T, S>>,
) -> Result<WithStatus<Json>, Infallible>
where
    T: Transport + 'static,
    S: TelemetrySource + 'static,
{
    let response = LivenessResponse {
        alive: true,
        running: bridge.is_running(),
    };
    Ok(reply(&response, StatusCode::OK))
}
