//! Surface bridge: shell page, SSE stream of surface frames and host effects,
//! and the inbound endpoint for untrusted surface messages.

use crate::shell;
use crate::AppState;
use async_stream::stream;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse,
    },
    Json,
};
use futures_util::stream::Stream;
use preview_core::{HostEffects, SourceDocument, SurfaceFrame};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;

/// Effect the shell performs outside the sandbox.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum HostEffect {
    OpenExternal { url: String },
    OpenResearch { query: String },
    Notify { message: String },
    Navigate { target: String },
}

/// Everything the shell needs to hear about, fanned out to every SSE client.
#[derive(Clone, Debug)]
pub(crate) enum GatewayEvent {
    Frame(SurfaceFrame),
    Effect(HostEffect),
    Source(SourceDocument),
}

impl GatewayEvent {
    fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Frame(SurfaceFrame::Document { .. }) => "document",
            GatewayEvent::Frame(SurfaceFrame::Message { .. }) => "message",
            GatewayEvent::Effect(_) => "effect",
            GatewayEvent::Source(_) => "source",
        }
    }

    fn to_sse(&self) -> Event {
        let data = match self {
            GatewayEvent::Frame(frame) => serde_json::to_string(frame),
            GatewayEvent::Effect(effect) => serde_json::to_string(effect),
            GatewayEvent::Source(doc) => serde_json::to_string(doc),
        };
        Event::default()
            .event(self.name())
            .data(data.unwrap_or_else(|_| "{}".to_string()))
    }
}

/// [`HostEffects`] implementation that hands effects to the connected shells.
pub(crate) struct BroadcastEffects {
    events: broadcast::Sender<GatewayEvent>,
}

impl BroadcastEffects {
    pub(crate) fn new(events: broadcast::Sender<GatewayEvent>) -> Self {
        Self { events }
    }

    fn emit(&self, effect: HostEffect) {
        tracing::info!(target: "preview::gateway", effect = ?effect, "host effect");
        // No connected shell is not an error.
        let _ = self.events.send(GatewayEvent::Effect(effect));
    }
}

#[async_trait::async_trait]
impl HostEffects for BroadcastEffects {
    async fn open_external(&self, url: &str) {
        self.emit(HostEffect::OpenExternal { url: url.to_string() });
    }

    async fn open_research(&self, query: &str) {
        self.emit(HostEffect::OpenResearch {
            query: query.to_string(),
        });
    }

    async fn notify(&self, message: &str) {
        self.emit(HostEffect::Notify {
            message: message.to_string(),
        });
    }

    async fn navigate(&self, target: &str) {
        self.emit(HostEffect::Navigate {
            target: target.to_string(),
        });
    }
}

pub(crate) async fn shell_page(State(state): State<AppState>) -> Html<String> {
    Html(shell::render(&state.config.app_name))
}

/// SSE stream: the current document first, then every frame, effect and source change.
pub(crate) async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let current = state
        .last_document
        .read()
        .ok()
        .and_then(|slot| slot.clone());

    let stream = stream! {
        if let Some(document) = current {
            yield Ok(GatewayEvent::Frame(SurfaceFrame::Document { document }).to_sse());
        }
        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(event.to_sse()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "preview::gateway", skipped, "SSE client lagged; frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// Inbound surface message. The body is untrusted; validation happens in the dispatcher.
pub(crate) async fn post_message(State(state): State<AppState>, Json(raw): Json<Value>) -> impl IntoResponse {
    state.dispatcher.dispatch(&raw);
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}
