use std::time::Duration;

use axum::extract::State;
use axum::http::Method;
use axum::response::Response;
use axum::Json;
use futures_util::stream;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::models::SharedState;
use crate::request_id::RequestId;
use crate::sse::{self, extra, DisconnectLogged, Extra};

const SSE_DEMO_MESSAGES: u32 = 10;

/// One handler for both methods, branching on the method itself.
/// The route only accepts GET and POST; anything else is a 405 from the router.
pub async fn foo_handler(method: Method, request_id: RequestId) -> Json<Value> {
    let message = if method == Method::GET {
        "This endpoint is GET foo."
    } else {
        "This endpoint is POST foo."
    };
    Json(json!({ "requestId": request_id.as_str(), "message": message }))
}

/// Fails on purpose so the error handler has something to render.
pub async fn get_bar_handler(request_id: RequestId) -> Result<Json<Value>, ApiError> {
    Err(ApiError::internal(
        &request_id,
        "To test the error handler, this endpoint fails intentionally.",
    ))
}

pub async fn post_bar_handler(request_id: RequestId) -> Json<Value> {
    Json(json!({ "requestId": request_id.as_str(), "message": "This endpoint is POST bar." }))
}

/// 三个等待并发执行，总耗时约等于最长的一个
pub async fn baz_handler(State(state): State<SharedState>, request_id: RequestId) -> Json<Value> {
    let unit = state.config.baz_unit;
    tokio::join!(
        wait_task("wait 3 units", unit * 3),
        wait_task("wait 2 units", unit * 2),
        wait_task("wait 1 unit", unit),
    );

    Json(json!({
        "requestId": request_id.as_str(),
        "message": "This endpoint is POST baz for testing async view.",
    }))
}

async fn wait_task(name: &str, wait: Duration) {
    tokio::time::sleep(wait).await;
    let now = chrono::Local::now().format("%H:%M:%S");
    info!("name={:?} wait={:?} now={}", name, wait, now);
}

pub async fn sse_demo_handler(
    State(state): State<SharedState>,
    request_id: RequestId,
) -> Response {
    let interval = state.config.sse_interval;
    let rid = request_id.clone();

    let frames = stream::unfold(0u32, move |i| {
        let rid = rid.clone();
        async move {
            let frame = match i {
                0 => sse::format_message(rid.as_str(), "SSE connection started", Extra::new()),
                n if n <= SSE_DEMO_MESSAGES => {
                    tokio::time::sleep(interval).await;
                    let frame = sse::format_message(
                        rid.as_str(),
                        &format!("Message {n} of {SSE_DEMO_MESSAGES}"),
                        extra(json!({ "progress": format!("{}%", n * 10) })),
                    );
                    info!(request_id = %rid, "SSE message sent: {}", n);
                    frame
                }
                n if n == SSE_DEMO_MESSAGES + 1 => {
                    sse::format_completion(rid.as_str(), extra(json!({ "progress": "100%" })))
                }
                _ => return None,
            };
            Some((frame, i + 1))
        }
    });

    sse::event_stream_response(DisconnectLogged::new(request_id, Box::pin(frames)))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
