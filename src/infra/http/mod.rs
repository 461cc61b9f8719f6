mod handlers;
mod middleware;
mod models;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::calculator::CalculationService;

pub use self::middleware::REQUEST_ID_HEADER;
use self::middleware::trace_requests;

#[derive(Clone)]
pub struct HttpState {
    pub calculator: Arc<CalculationService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(handlers::hello))
        .route("/calculate", post(handlers::calculate))
        .route("/hist_log", get(handlers::history))
        .route("/setup", post(handlers::setup))
        .route("/_health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(trace_requests))
}
