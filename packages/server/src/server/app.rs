//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use twilio::{TwilioOptions, TwilioService};

use crate::domains::dispatch::{webhook, DispatchOrchestrator};
use crate::kernel::{PgDispatchStore, ServerDeps, StreamHub, TwilioAdapter};
use crate::server::routes::{
    add_coverage_handler, availability_check_handler, availability_handler,
    cancel_assignment_handler, decide_time_off_handler, dispatch_issue_handler, events_handler,
    health_handler, matches_handler, metrics_handler, remove_coverage_handler,
    request_time_off_handler,
};
use crate::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: DispatchOrchestrator,
    /// Absent when the app runs over a non-Postgres store (tests).
    pub db_pool: Option<PgPool>,
}

/// Wire Postgres, Twilio and the event hub into an orchestrator.
pub fn build_orchestrator(pool: PgPool, config: &Config) -> DispatchOrchestrator {
    let twilio = Arc::new(TwilioService::new(TwilioOptions::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
    )));

    let deps = ServerDeps::new(
        Arc::new(PgDispatchStore::new(pool)),
        Arc::new(TwilioAdapter::new(twilio)),
        StreamHub::new(),
    );
    DispatchOrchestrator::new(deps)
}

/// Build the Axum application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - allow any origin for the dashboard
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    let webhooks = webhook::router(state.orchestrator.clone());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/issues/:id/dispatch", post(dispatch_issue_handler))
        .route("/api/assignments/:id/cancel", post(cancel_assignment_handler))
        .route("/api/dispatch/events", get(events_handler))
        .route("/api/handymen/:id/metrics", get(metrics_handler))
        .route("/api/handymen/:id/matches", get(matches_handler))
        .route(
            "/api/handymen/:id/availability",
            get(availability_check_handler).put(availability_handler),
        )
        .route("/api/handymen/:id/time-off", post(request_time_off_handler))
        .route("/api/handymen/:id/coverage", post(add_coverage_handler))
        .route(
            "/api/coverage/:id",
            axum::routing::delete(remove_coverage_handler),
        )
        .route("/api/time-off/:id/decision", post(decide_time_off_handler))
        .layer(Extension(state))
        .merge(webhooks)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
