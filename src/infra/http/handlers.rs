use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    application::{
        calculator::CalculationError,
        error::{ErrorReport, HttpError},
    },
    domain::calculation::InputPair,
};

use super::{
    HttpState,
    models::{CalculateRequest, CalculateResponse, HistoryEntry},
};

const HELLO: &str = "Hello World!\n";
const SETUP_DONE: &str = "hist_log table is ready\n";

pub async fn hello() -> &'static str {
    HELLO
}

pub async fn calculate(
    State(state): State<HttpState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<CalculateResponse>, HttpError> {
    const SOURCE: &str = "infra::http::calculate";

    let Json(body) =
        payload.map_err(|rejection| HttpError::invalid_input(SOURCE, rejection.body_text()))?;
    let request = CalculateRequest::from_body(body)
        .ok_or_else(|| HttpError::invalid_input(SOURCE, "request body is not a JSON object"))?;
    let pair = InputPair::from_json(request.num1.as_ref(), request.num2.as_ref())
        .map_err(CalculationError::from)?;

    let calculation = state.calculator.calculate(pair).await?;
    Ok(Json(CalculateResponse {
        result: calculation.result,
    }))
}

pub async fn history(
    State(state): State<HttpState>,
) -> Result<Json<Vec<HistoryEntry>>, HttpError> {
    let records = state.calculator.recent_history().await?;
    Ok(Json(records.into_iter().map(HistoryEntry::from).collect()))
}

pub async fn setup(State(state): State<HttpState>) -> Result<&'static str, HttpError> {
    state.calculator.setup().await?;
    Ok(SETUP_DONE)
}

pub async fn health(State(state): State<HttpState>) -> Response {
    match state.calculator.readiness().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
