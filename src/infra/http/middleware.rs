//! Request tracing for the calclog routes.
//!
//! Every request runs inside a `request` span that carries a fresh id, so
//! events emitted by the calculator and the stores are tagged with it. The id
//! is echoed back in the `x-request-id` response header.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub async fn trace_requests(request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        route = %request.uri().path(),
    );
    let started = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    let elapsed_ms = started.elapsed().as_millis();
    let report = response.extensions_mut().remove::<ErrorReport>();
    span.in_scope(|| log_outcome(response.status(), elapsed_ms, report));

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Short label for the response class, matching the public error bodies.
fn outcome(status: StatusCode) -> &'static str {
    if status == StatusCode::BAD_REQUEST {
        "invalid_input"
    } else if status == StatusCode::SERVICE_UNAVAILABLE {
        "not_ready"
    } else if status.is_server_error() {
        "internal_error"
    } else if status.is_client_error() {
        "rejected"
    } else {
        "ok"
    }
}

fn log_outcome(status: StatusCode, elapsed_ms: u128, report: Option<ErrorReport>) {
    let outcome = outcome(status);
    let Some(report) = report else {
        if status.is_server_error() {
            error!(status = status.as_u16(), outcome, elapsed_ms, "request failed");
        } else if status.is_client_error() {
            warn!(status = status.as_u16(), outcome, elapsed_ms, "request rejected");
        } else {
            info!(status = status.as_u16(), outcome, elapsed_ms, "request completed");
        }
        return;
    };

    let detail = report
        .messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");
    if status.is_server_error() {
        error!(
            status = status.as_u16(),
            outcome,
            elapsed_ms,
            source = report.source,
            detail,
            chain = ?report.messages,
            "request failed",
        );
    } else {
        warn!(
            status = status.as_u16(),
            outcome,
            elapsed_ms,
            source = report.source,
            detail,
            "request rejected",
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, middleware::from_fn, routing::get};
    use tower::ServiceExt;
    use tracing::Span;

    use super::*;
    use crate::application::error::HttpError;

    fn router() -> Router {
        Router::new()
            .route(
                "/span",
                get(|| async {
                    Span::current()
                        .metadata()
                        .map(|meta| meta.name())
                        .unwrap_or("none")
                }),
            )
            .route("/bad", get(|| async { HttpError::invalid_input("test", "not numeric") }))
            .layer(from_fn(trace_requests))
    }

    async fn send(uri: &str) -> Response {
        router()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond")
    }

    fn request_id(response: &Response) -> Uuid {
        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("request id header");
        Uuid::parse_str(header.to_str().expect("ascii header")).expect("uuid request id")
    }

    #[tokio::test]
    async fn handlers_run_inside_the_request_span() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());

        let response = send("/span").await;
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .expect("body should collect")
            .to_bytes();
        assert_eq!(&body[..], b"request");
    }

    #[tokio::test]
    async fn every_response_gets_a_distinct_request_id() {
        let first = send("/span").await;
        let second = send("/bad").await;

        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_ne!(request_id(&first), request_id(&second));
    }

    #[tokio::test]
    async fn error_reports_are_consumed_by_the_log() {
        let response = send("/bad").await;
        assert!(response.extensions().get::<ErrorReport>().is_none());
    }

    #[test]
    fn outcome_labels_follow_the_public_responses() {
        assert_eq!(outcome(StatusCode::OK), "ok");
        assert_eq!(outcome(StatusCode::NO_CONTENT), "ok");
        assert_eq!(outcome(StatusCode::BAD_REQUEST), "invalid_input");
        assert_eq!(outcome(StatusCode::NOT_FOUND), "rejected");
        assert_eq!(outcome(StatusCode::INTERNAL_SERVER_ERROR), "internal_error");
        assert_eq!(outcome(StatusCode::SERVICE_UNAVAILABLE), "not_ready");
    }
}
