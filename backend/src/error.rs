use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::lab::LabError;
use crate::request_id::RequestId;

const CLIENT_ERROR_MESSAGE: &str = "An error occurred while processing your request.";
const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Debug)]
enum ApiErrorKind {
    BadRequest(String),
    Internal(String),
}

/// HTTP 层统一错误响应：客户端错误返回 400 并附带 detail，其余一律 500 且不泄露内部信息
#[derive(Debug)]
pub struct ApiError {
    request_id: RequestId,
    kind: ApiErrorKind,
}

impl ApiError {
    pub fn bad_request(request_id: &RequestId, detail: impl ToString) -> Self {
        Self {
            request_id: request_id.clone(),
            kind: ApiErrorKind::BadRequest(detail.to_string()),
        }
    }

    pub fn internal(request_id: &RequestId, reason: impl ToString) -> Self {
        Self {
            request_id: request_id.clone(),
            kind: ApiErrorKind::Internal(reason.to_string()),
        }
    }

    /// Lab resolution failures are the caller's fault, never a server fault.
    pub fn from_lab(request_id: &RequestId, err: LabError) -> Self {
        Self::bad_request(request_id, err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.as_str();
        match self.kind {
            ApiErrorKind::BadRequest(detail) => {
                warn!(
                    request_id,
                    "Exception occurred during processing request: {}", detail
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "requestId": request_id,
                        "message": CLIENT_ERROR_MESSAGE,
                        "error": { "detail": detail },
                    })),
                )
                    .into_response()
            }
            ApiErrorKind::Internal(reason) => {
                // method / path come from the enclosing request span
                error!(request_id, "Request that caused the Internal Server Error: {}", reason);
                internal_error_response(request_id)
            }
        }
    }
}

fn internal_error_response(request_id: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "requestId": request_id,
            "message": INTERNAL_ERROR_MESSAGE,
        })),
    )
        .into_response()
}

/// `CatchPanicLayer` hook. The request (and its id) is gone by the time a panic surfaces.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!("Handler panicked: {}", detail);
    internal_error_response(RequestId::unknown().as_str())
}
