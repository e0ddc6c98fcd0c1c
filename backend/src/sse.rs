//! Server-Sent Events 帧格式化
//!
//! 每一帧都是一行 `data: <JSON>\n\n`，JSON 固定为
//! `{"requestId": ..., "data": {"message" | "error": ..., "sentAt": ..., ...extra}}`。

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::request_id::RequestId;

pub const COMPLETION_MESSAGE: &str = "Stream completed";

const SENT_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

pub type Extra = Map<String, Value>;

/// Build the extra map from a `json!({...})` object; anything else yields no extras.
pub fn extra(value: Value) -> Extra {
    match value {
        Value::Object(map) => map,
        _ => Extra::new(),
    }
}

pub fn format_message(request_id: &str, message: &str, extra: Extra) -> String {
    frame(request_id, "message", message, extra)
}

pub fn format_error(request_id: &str, error: &str, extra: Extra) -> String {
    frame(request_id, "error", error, extra)
}

pub fn format_completion(request_id: &str, extra: Extra) -> String {
    frame(request_id, "message", COMPLETION_MESSAGE, extra)
}

fn frame(request_id: &str, key: &str, text: &str, extra: Extra) -> String {
    let mut data = Map::new();
    data.insert(key.to_string(), Value::String(text.to_string()));
    data.insert("sentAt".to_string(), Value::String(sent_at()));
    data.extend(extra);

    let payload = json!({
        "requestId": request_id,
        "data": data,
    });
    format!("data: {}\n\n", payload)
}

fn sent_at() -> String {
    chrono::Local::now().format(SENT_AT_FORMAT).to_string()
}

/// Wraps already formatted frames into a `text/event-stream` response.
pub fn event_stream_response<S>(frames: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames.map(Ok::<_, Infallible>)),
    )
        .into_response()
}

/// Logs when the client goes away before the last frame; dropping the body stops the plugin.
pub struct DisconnectLogged<S> {
    request_id: RequestId,
    inner: S,
    finished: bool,
}

impl<S> DisconnectLogged<S> {
    pub fn new(request_id: RequestId, inner: S) -> Self {
        Self {
            request_id,
            inner,
            finished: false,
        }
    }
}

impl<S> Stream for DisconnectLogged<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(None) = polled {
            self.finished = true;
        }
        polled
    }
}

impl<S> Drop for DisconnectLogged<S> {
    fn drop(&mut self) {
        if self.finished {
            info!(request_id = %self.request_id, "SSE stream completed");
        } else {
            info!(
                request_id = %self.request_id,
                "Client disconnected before the SSE stream finished; stopping"
            );
        }
    }
}

#[cfg(test)]
pub(crate) fn parse_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let payload = chunk
                .strip_prefix("data: ")
                .unwrap_or_else(|| panic!("frame without data prefix: {chunk:?}"));
            serde_json::from_str(payload).unwrap()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn parse_one(frame: &str) -> Value {
        assert!(frame.starts_with("data: "), "{frame:?}");
        assert!(frame.ends_with("\n\n"), "{frame:?}");
        let frames = parse_frames(frame);
        assert_eq!(frames.len(), 1);
        frames.into_iter().next().unwrap()
    }

    #[test]
    fn message_frame_shape() {
        let v = parse_one(&format_message("abcd1234", "hello", Extra::new()));
        assert_eq!(v["requestId"], "abcd1234");
        assert_eq!(v["data"]["message"], "hello");
        assert!(v["data"].get("error").is_none());

        let sent_at = v["data"]["sentAt"].as_str().unwrap();
        assert!(DateTime::parse_from_str(sent_at, SENT_AT_FORMAT).is_ok(), "{sent_at}");
    }

    #[test]
    fn error_frame_uses_error_key() {
        let v = parse_one(&format_error("abcd1234", "ERROR: boom", extra(json!({ "module": "foo" }))));
        assert_eq!(v["data"]["error"], "ERROR: boom");
        assert_eq!(v["data"]["module"], "foo");
        assert!(v["data"].get("message").is_none());
    }

    #[test]
    fn completion_has_fixed_text_and_extras_win() {
        let v = parse_one(&format_completion(
            "abcd1234",
            extra(json!({ "progress": "100%", "sentAt": "overridden" })),
        ));
        assert_eq!(v["data"]["message"], COMPLETION_MESSAGE);
        assert_eq!(v["data"]["progress"], "100%");
        assert_eq!(v["data"]["sentAt"], "overridden");
    }

    #[test]
    fn non_object_extra_is_ignored() {
        assert!(extra(json!(["not", "a", "map"])).is_empty());
    }

    #[test]
    fn frames_escape_newlines_inside_payload() {
        let frame = format_message("abcd1234", "line1\n\nline2", Extra::new());
        let v = parse_one(&frame);
        assert_eq!(v["data"]["message"], "line1\n\nline2");
    }
}
