use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::executor::{execute_streaming, ExecutionItem};
use super::types::{ExecutionRequest, LabError};
use crate::error::ApiError;
use crate::models::SharedState;
use crate::request_id::RequestId;
use crate::sse::{self, extra, DisconnectLogged};

const START_MESSAGE: &str = "Lab module execution started";

#[derive(Deserialize)]
pub struct LabSpecQuery {
    #[serde(default)]
    module: Option<String>,
}

pub async fn get_lab_spec_handler(
    State(state): State<SharedState>,
    request_id: RequestId,
    query: Result<Query<LabSpecQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(&request_id, e.body_text()))?;
    let module = query
        .module
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            ApiError::from_lab(&request_id, LabError::Validation("module is required".to_string()))
        })?;

    let spec = state
        .lab
        .get_spec(&module)
        .map_err(|e| ApiError::from_lab(&request_id, e))?;

    info!(request_id = %request_id, "Lab module spec retrieved: {}", module);
    Ok(Json(json!({
        "requestId": request_id.as_str(),
        "message": "Lab module spec retrieved",
        "data": spec,
    })))
}

pub async fn execute_lab_module_handler(
    State(state): State<SharedState>,
    request_id: RequestId,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(&request_id, e.body_text()))?;
    let req = ExecutionRequest::from_value(body).map_err(|e| ApiError::from_lab(&request_id, e))?;

    let start = sse::format_message(
        request_id.as_str(),
        START_MESSAGE,
        extra(json!({ "module": req.module, "args": req.args })),
    );
    let items = execute_streaming(&state.lab, &req.module, req.args);
    let frames = lab_frames(request_id.clone(), req.module, start, items);

    Ok(sse::event_stream_response(DisconnectLogged::new(
        request_id, frames,
    )))
}

enum Phase {
    Start(String),
    Running,
    Done,
}

struct FrameState {
    request_id: RequestId,
    module: String,
    items: BoxStream<'static, ExecutionItem>,
    phase: Phase,
}

/// start 帧 → 每条消息一帧 → completion 帧；出错时 error 帧即为终止帧，不再追加 completion
fn lab_frames(
    request_id: RequestId,
    module: String,
    start: String,
    items: BoxStream<'static, ExecutionItem>,
) -> BoxStream<'static, String> {
    let state = FrameState {
        request_id,
        module,
        items,
        phase: Phase::Start(start),
    };

    stream::unfold(state, |mut st| async move {
        let frame = match std::mem::replace(&mut st.phase, Phase::Running) {
            Phase::Start(frame) => frame,
            Phase::Done => {
                st.phase = Phase::Done;
                return None;
            }
            Phase::Running => {
                let rid = st.request_id.as_str();
                let module_extra = || extra(json!({ "module": st.module }));
                match st.items.next().await {
                    Some(ExecutionItem::Progress(message)) => {
                        sse::format_message(rid, &message, module_extra())
                    }
                    Some(ExecutionItem::Failed(err)) => {
                        st.phase = Phase::Done;
                        sse::format_error(rid, &err.to_string(), module_extra())
                    }
                    None => {
                        st.phase = Phase::Done;
                        sse::format_completion(rid, module_extra())
                    }
                }
            }
        };
        debug!(request_id = %st.request_id, "SSE frame: {}", frame.trim_end());
        Some((frame, st))
    })
    .boxed()
}
