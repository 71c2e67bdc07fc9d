use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::analytics::{anonymize_ip, extract_client_ip, ClickAggregator, GeoLocation};
use crate::config::AnalyticsConfig;
use crate::error::ClickError;
use crate::models::{EnrichedEvent, GLOBAL_SCOPE};

pub struct AppState {
    pub aggregator: Arc<ClickAggregator>,
    pub analytics: AnalyticsConfig,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct ClickQuery {
    pub host: Option<String>,
    pub uri: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn click_error(err: ClickError) -> ApiError {
    let status = match err {
        ClickError::InvalidClick(_) => StatusCode::BAD_REQUEST,
        ClickError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ClickError::Store(_) | ClickError::Protocol(_) => StatusCode::BAD_GATEWAY,
        ClickError::IncompleteReadback { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// Client IP as counted: proxy-aware, optionally anonymized
fn client_ip(state: &AppState, headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
    let ip = extract_client_ip(headers, addr.ip(), &state.analytics);
    if state.analytics.ip_anonymization {
        anonymize_ip(ip)
    } else {
        ip
    }
}

/// Count a click on `uri` of `host`
pub async fn record_click(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<ClickQuery>,
) -> Result<Json<EnrichedEvent>, ApiError> {
    let host = query.host.unwrap_or_default();
    let uri = query.uri.unwrap_or_default();
    if host.is_empty() || uri.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "missing query parameter host or uri",
        ));
    }

    let ip = client_ip(&state, &headers, addr).to_string();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    state
        .aggregator
        .process_click(&host, &uri, &ip, user_agent)
        .await
        .map(Json)
        .map_err(click_error)
}

/// Counters across every site
pub async fn global_counters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, u64>>, ApiError> {
    state
        .aggregator
        .get_counters(GLOBAL_SCOPE)
        .await
        .map(Json)
        .map_err(click_error)
}

/// Counters of one site
pub async fn site_counters(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<Json<BTreeMap<String, u64>>, ApiError> {
    let counters = state
        .aggregator
        .get_counters(&host)
        .await
        .map_err(click_error)?;

    if counters.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("key {} does not exist", host),
        ));
    }
    Ok(Json(counters))
}

fn location_of(state: &AppState, ip: IpAddr) -> Result<Json<GeoLocation>, ApiError> {
    state
        .aggregator
        .locate(&ip.to_string())
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no location for {}", ip)))
}

/// Location of the calling client
pub async fn caller_location(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<GeoLocation>, ApiError> {
    let ip = extract_client_ip(&headers, addr.ip(), &state.analytics);
    location_of(&state, ip)
}

/// Location of an arbitrary IP
pub async fn ip_location(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<Json<GeoLocation>, ApiError> {
    let ip = ip
        .parse::<IpAddr>()
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, format!("invalid IP address {}", ip)))?;
    location_of(&state, ip)
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
