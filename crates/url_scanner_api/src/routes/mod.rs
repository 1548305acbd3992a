//! API Routes Module
//!
//! - `scan`: URL threat scanning
//! - `security_policy`: plain-text vulnerability disclosure policy
//! - `health`: liveness probe

pub mod health;
pub mod scan;
pub mod security_policy;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build all API routes and return a configured Router
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/scan", post(scan::scan_url_handler))
        .route(
            "/api/security-policy",
            get(security_policy::security_policy_handler),
        )
        .route("/health", get(health::health_handler))
        .with_state(state)
}
