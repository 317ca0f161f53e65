//! HTTP surface: live stream, status JSON, and exported clip downloads.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use scarecrow::StatusBoard;
use tracing::warn;

use crate::mjpeg::MjpegBroadcaster;

pub struct AppState {
    pub broadcaster: Arc<MjpegBroadcaster>,
    pub status: StatusBoard,
    pub clip_dir: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/status", get(status))
        .route("/clips", get(list_clips))
        .route("/clips/:name", get(fetch_clip))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn stream(State(state): State<Arc<AppState>>) -> Response {
    state.broadcaster.subscribe().into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    match state.status.lock() {
        Ok(snapshot) => Json(snapshot.clone()).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn list_clips(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(&state.clip_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.starts_with("fire_event_"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    Json(names)
}

async fn fetch_clip(
    State(state): State<Arc<AppState>>,
    UrlPath(name): UrlPath<String>,
) -> Response {
    if !safe_clip_name(&name) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.clip_dir.join(&name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "video/x-msvideo"),
                (header::CONTENT_DISPOSITION, "attachment"),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            warn!(%name, %err, "clip fetch failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Only plain exported-clip filenames; anything path-like is rejected.
fn safe_clip_name(name: &str) -> bool {
    name.starts_with("fire_event_")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.contains("..")
}

const INDEX_PAGE: &str = r#"<!doctype html>
<html>
<head>
<title>scarecrow turret</title>
<style>
  body { background: #111; color: #ddd; font-family: monospace; margin: 2em; }
  img { border: 1px solid #444; max-width: 100%; }
  pre { color: #8c8; }
</style>
</head>
<body>
<h1>scarecrow turret</h1>
<img src="/stream" alt="live feed">
<pre id="status">loading...</pre>
<p><a href="/clips" style="color:#8af">fire-event clips</a></p>
<script>
  setInterval(async () => {
    const r = await fetch('/status');
    document.getElementById('status').textContent =
      JSON.stringify(await r.json(), null, 2);
  }, 1000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_name_sanitizer() {
        assert!(safe_clip_name("fire_event_20260823-101500.avi"));
        assert!(!safe_clip_name("../etc/passwd"));
        assert!(!safe_clip_name("fire_event_../x.avi"));
        assert!(!safe_clip_name("fire_event_a/b.avi"));
        assert!(!safe_clip_name("notes.txt"));
    }
}
