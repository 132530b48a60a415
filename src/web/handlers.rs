use crate::config::settings::Settings;
use crate::registry::service::Registry;
use crate::registry::types::{NodeRecord, RegistryEvent};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;

const INDEX_PAGE: &str = "<!doctype html>\n<html><head><title>nodewatch</title></head>\n<body><h1>nodewatch</h1><p>Connect to <code>/ws</code> for the live node stream.</p></body></html>\n";

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub status: bool,
}

pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn handle_check() -> (StatusCode, Json<CheckResponse>) {
    (StatusCode::OK, Json(CheckResponse { status: true }))
}

/// Full snapshot as JSON. Only routable when the web URL carries the
/// `status` option.
pub async fn handle_nodes(
    Extension(settings): Extension<Arc<Settings>>,
    Extension(registry): Extension<Arc<Registry>>,
) -> (StatusCode, Json<Vec<NodeRecord>>) {
    if !settings.web_status_enabled() {
        return (StatusCode::NOT_FOUND, Json(Vec::new()));
    }

    (StatusCode::OK, Json(registry.nodes().await))
}

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    Extension(registry): Extension<Arc<Registry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_events(socket, registry))
}

/// Push channel: sends the current snapshot once on connect, then relays
/// every registry event verbatim until the client hangs up.
async fn push_events(socket: WebSocket, registry: Arc<Registry>) {
    let (mut outbound, mut inbound) = socket.split();

    let snapshot = registry.nodes().await;
    let hello = serde_json::json!({ "event": "nodes", "nodes": snapshot });
    if outbound
        .send(Message::Text(hello.to_string()))
        .await
        .is_err()
    {
        return;
    }

    let mut subscription = registry.subscribe();

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    let frame = event_frame(&event);
                    if outbound.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = inbound.next() => match incoming {
                // Inbound frames are ignored; the channel is push-only.
                Some(Ok(_)) => continue,
                _ => break,
            },
        }
    }

    registry.unsubscribe(&subscription.id);
}

/// Wire frame for one event. Retirement is pushed as `remove`, which is what
/// dashboard clients act on to drop a node from the view.
pub fn event_frame(event: &RegistryEvent) -> serde_json::Value {
    let name = match event {
        RegistryEvent::Retire { .. } => "remove",
        other => other.name(),
    };

    serde_json::json!({ "event": name, "data": event.payload() })
}
