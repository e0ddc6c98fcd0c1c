use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::time::Duration;

fn die(msg: &str) -> ! {
    eprintln!("ERROR: {msg}");
    std::process::exit(1);
}

fn resolve_base_url(arg: Option<String>) -> String {
    if let Some(url) = arg {
        let url = url.trim().to_string();
        if !url.is_empty() {
            return url.trim_end_matches('/').to_string();
        }
    }

    if let Ok(url) = std::env::var("LAB_URL") {
        let url = url.trim().to_string();
        if !url.is_empty() {
            return url.trim_end_matches('/').to_string();
        }
    }

    let port = std::env::var("LAB_PORT")
        .ok()
        .and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or(8001);
    format!("http://127.0.0.1:{port}")
}

fn is_local_base_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    url.starts_with("http://127.0.0.1")
        || url.starts_with("http://localhost")
        || url.starts_with("http://[::1]")
}

fn build_client(base_url: &str) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));
    if is_local_base_url(base_url) {
        // Some system proxies swallow localhost traffic.
        builder = builder.no_proxy();
    }
    builder
        .build()
        .unwrap_or_else(|e| die(&format!("failed to build http client: {e}")))
}

async fn get_json(req: reqwest::RequestBuilder) -> Result<Value, String> {
    let resp = req
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(format!("HTTP {status}: {text}"));
    }
    serde_json::from_str(&text).map_err(|e| format!("invalid json: {e}: {text}"))
}

/// Reads a `text/event-stream` body and prints every frame as it arrives.
async fn follow_stream(req: reqwest::RequestBuilder) -> Result<(), String> {
    let resp = req
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {text}"));
    }

    let mut body = resp.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    let mut failed = false;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| format!("stream interrupted: {e}"))?;
        buf.extend_from_slice(&chunk);
        // Split on raw bytes so multi-byte characters cut across chunks stay intact.
        while let Some(pos) = buf.windows(2).position(|w| w == b"\n\n") {
            let frame = buf.drain(..pos + 2).collect::<Vec<u8>>();
            failed |= print_frame(String::from_utf8_lossy(&frame).trim_end());
        }
    }
    if failed {
        return Err("module reported an error".to_string());
    }
    Ok(())
}

/// Returns true for error frames.
fn print_frame(frame: &str) -> bool {
    let Some(payload) = frame.strip_prefix("data: ") else {
        if !frame.is_empty() {
            println!("{frame}");
        }
        return false;
    };
    let Ok(v) = serde_json::from_str::<Value>(payload) else {
        println!("{payload}");
        return false;
    };

    let data = &v["data"];
    let sent_at = as_str(data, "sentAt");
    if let Some(err) = data.get("error").and_then(|e| e.as_str()) {
        println!("[{sent_at}] !! {err}");
        return true;
    }
    let message = as_str(data, "message");
    match data.get("progress").and_then(|p| p.as_str()) {
        Some(progress) => println!("[{sent_at}] {message} ({progress})"),
        None => println!("[{sent_at}] {message}"),
    }
    false
}

fn print_json(v: &Value) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{v}"),
    }
}

fn as_str(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// `key=value` pairs; values that parse as JSON keep their type, anything else is a string.
fn parse_kv_args(pairs: &[String]) -> Map<String, Value> {
    let mut out = Map::new();
    for pair in pairs {
        let Some((k, v)) = pair.split_once('=') else {
            die(&format!("invalid argument (expected key=value): {pair}"));
        };
        let k = k.trim();
        if k.is_empty() {
            die(&format!("invalid argument (empty key): {pair}"));
        }
        let value = serde_json::from_str::<Value>(v).unwrap_or_else(|_| Value::String(v.to_string()));
        out.insert(k.to_string(), value);
    }
    out
}

fn usage() -> ! {
    eprintln!(
        r#"labctl - lab playground CLI

Usage:
  labctl [--url <base_url>] <command> [args...]

Base URL (if omitted): LAB_URL env > http://127.0.0.1:<LAB_PORT|8001>

Commands:
  spec <module>                    Show a lab module spec (GET /api/app/lab?module=)
  run <module> [key=value ...]     Run a lab module and follow its SSE stream
  sse                              Follow the SSE demo stream (/api/app/sse)
  get <path>                       GET /api/app/<path> (raw JSON)
"#
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    let mut args: Vec<String> = std::env::args().collect();
    let _exe = args.remove(0);

    let mut base_url: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => usage(),
            "--url" => {
                i += 1;
                base_url = args.get(i).cloned();
            }
            _ => break,
        }
        i += 1;
    }

    let args = args[i..].to_vec();
    if args.is_empty() {
        usage();
    }

    let base_url = resolve_base_url(base_url);
    let api = format!("{}/api/app", base_url.trim_end_matches('/'));
    let client = build_client(&base_url);

    match args[0].as_str() {
        "spec" => {
            if args.len() != 2 {
                die("usage: labctl spec <module>");
            }
            let req = client
                .get(format!("{api}/lab"))
                .query(&[("module", args[1].trim())]);
            let v = get_json(req)
                .await
                .unwrap_or_else(|e| die(&e));
            print_json(&v["data"]);
        }
        "run" => {
            if args.len() < 2 {
                die("usage: labctl run <module> [key=value ...]");
            }
            let body = serde_json::json!({
                "module": args[1].trim(),
                "args": parse_kv_args(&args[2..]),
            });
            follow_stream(client.post(format!("{api}/lab")).json(&body))
                .await
                .unwrap_or_else(|e| die(&e));
        }
        "sse" => {
            follow_stream(client.get(format!("{api}/sse")))
                .await
                .unwrap_or_else(|e| die(&e));
        }
        "get" => {
            if args.len() != 2 {
                die("usage: labctl get <path> (example: labctl get foo)");
            }
            let path = args[1].trim().trim_start_matches('/');
            let v = get_json(client.get(format!("{api}/{path}")))
                .await
                .unwrap_or_else(|e| die(&e));
            print_json(&v);
        }
        _ => usage(),
    }
}
