//! Operator dashboard
//!
//! Read-only HTTP observer: a static status page, a JSON stats snapshot and
//! a server-sent-event stream of engine event lines. Nothing here can touch
//! engine state.

use crate::application::stats::{EngineStats, StatsSnapshot};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>pairarb</title>
<style>
  body { font-family: monospace; background: #111; color: #ddd; margin: 2em; }
  h1 { font-size: 1.2em; }
  table { border-collapse: collapse; margin-bottom: 1em; }
  td { padding: 2px 12px 2px 0; }
  #log { white-space: pre-wrap; border-top: 1px solid #333; padding-top: 0.5em; }
</style>
</head>
<body>
<h1>pairarb</h1>
<table id="stats"></table>
<div id="log"></div>
<script>
  async function refresh() {
    const res = await fetch('/stats');
    const s = await res.json();
    document.getElementById('stats').innerHTML = Object.entries(s)
      .map(([k, v]) => `<tr><td>${k}</td><td>${v}</td></tr>`).join('');
  }
  refresh();
  setInterval(refresh, 2000);

  const log = document.getElementById('log');
  const source = new EventSource('/events');
  source.onmessage = (e) => {
    log.textContent = (e.data + '\n' + log.textContent).slice(0, 20000);
  };
</script>
</body>
</html>
"#;

/// Build the dashboard router.
pub fn router(stats: Arc<EngineStats>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stats", get(stats_snapshot))
        .route("/events", get(event_stream))
        .with_state(stats)
}

/// Serve the dashboard until the process exits.
pub async fn serve(stats: Arc<EngineStats>, port: u16) -> anyhow::Result<()> {
    let app = router(stats);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Dashboard listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn stats_snapshot(State(stats): State<Arc<EngineStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

async fn event_stream(
    State(stats): State<Arc<EngineStats>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = stats.subscribe_events();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(line) => {
                    return Some((Ok::<_, Infallible>(Event::default().data(line)), rx))
                }
                // A slow browser tab just skips ahead
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
