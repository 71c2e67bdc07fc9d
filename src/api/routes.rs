use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE, ORIGIN},
        Method,
    },
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analytics::ClickAggregator;
use crate::config::AnalyticsConfig;

use super::handlers::{
    caller_location, global_counters, health_check, ip_location, record_click, site_counters,
    AppState,
};

/// Any page may embed the click beacon
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([ACCEPT, CONTENT_TYPE, ORIGIN])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

pub fn create_api_router(aggregator: Arc<ClickAggregator>, analytics: AnalyticsConfig) -> Router {
    let state = Arc::new(AppState {
        aggregator,
        analytics,
    });

    Router::new()
        .route("/", get(global_counters))
        .route("/click", get(record_click))
        .route("/host/{host}", get(site_counters))
        .route("/ip", get(caller_location))
        .route("/ip/{ip}", get(ip_location))
        .route("/health", get(health_check))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
