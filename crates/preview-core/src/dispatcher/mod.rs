//! Intent dispatcher: the protocol core.
//!
//! Inbound surface messages are validated at the boundary, then routed to local
//! effects, the remote executor or the page synthesizer. Replies are posted
//! back into the surface correlated by `requestId`. Acknowledgments
//! (`INTENT_COMMAND_RESULT`) are resolved inline so a handler waiting on one
//! never blocks its own reply; every other message is handled by one worker
//! task, strictly in arrival order.

mod pending;

use crate::collab::{HostEffects, IntentExecutor};
use crate::protocol::{
    HandlerKind, Intent, IntentRegistry, LocalAction, ProtocolMessage, COMMAND_SCROLL_TO_BOOKING,
};
use crate::shared::{PreviewConfig, SessionContext};
use crate::surface::RenderSurfaceController;
use crate::sync::SourceSyncManager;
use crate::synth::{normalize_page_key, PageRequest, PageSynthesizer};
use crate::vfs::{page_path, VirtualFileTree};
use pending::PendingRequests;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct IntentDispatcher {
    registry: IntentRegistry,
    executor: Arc<dyn IntentExecutor>,
    synthesizer: Arc<PageSynthesizer>,
    surface: Arc<RenderSurfaceController>,
    files: Arc<dyn VirtualFileTree>,
    effects: Arc<dyn HostEffects>,
    source: Option<Arc<SourceSyncManager>>,
    pending: PendingRequests,
    queue: OnceLock<mpsc::UnboundedSender<ProtocolMessage>>,
    session: SessionContext,
    command_timeout: Duration,
    intent_timeout: Duration,
}

impl IntentDispatcher {
    pub fn new(
        config: &PreviewConfig,
        surface: Arc<RenderSurfaceController>,
        executor: Arc<dyn IntentExecutor>,
        synthesizer: Arc<PageSynthesizer>,
        files: Arc<dyn VirtualFileTree>,
        effects: Arc<dyn HostEffects>,
    ) -> Self {
        Self {
            registry: IntentRegistry::new().with_demo_url(config.demo_url.clone()),
            executor,
            synthesizer,
            surface,
            files,
            effects,
            source: None,
            pending: PendingRequests::default(),
            queue: OnceLock::new(),
            session: SessionContext::default(),
            command_timeout: config.command_timeout(),
            intent_timeout: config.intent_timeout(),
        }
    }

    pub fn with_registry(mut self, registry: IntentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    /// Reads the main document from the sync manager's active entry point
    /// instead of the first conventional one that exists.
    pub fn with_source(mut self, source: Arc<SourceSyncManager>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn registry(&self) -> &IntentRegistry {
        &self.registry
    }

    /// Accepts one raw message from the surface. Never fails: invalid input is dropped.
    pub fn dispatch(self: &Arc<Self>, raw: &Value) {
        let message = match ProtocolMessage::from_untrusted(raw) {
            Ok(m) => m,
            Err(reason) => {
                tracing::debug!(target: "preview::dispatcher", %reason, "dropped surface message");
                return;
            }
        };
        match message {
            ProtocolMessage::IntentCommandResult {
                command,
                request_id,
                handled,
            } => {
                if !self.pending.resolve(&request_id, &command, handled) {
                    tracing::debug!(target: "preview::dispatcher", request_id = %request_id, "discarded reply with unknown correlation id");
                }
            }
            ProtocolMessage::ElementSelected(selection) => match self.surface.handle_selection(selection) {
                Ok(true) => tracing::debug!(target: "preview::dispatcher", "element selected"),
                Ok(false) => tracing::debug!(target: "preview::dispatcher", "selection outside edit mode ignored"),
                Err(e) => tracing::debug!(target: "preview::dispatcher", error = %e, "invalid selection dropped"),
            },
            other => {
                let queue = self.queue.get_or_init(|| Self::spawn_worker(Arc::downgrade(self)));
                if queue.send(other).is_err() {
                    tracing::warn!(target: "preview::dispatcher", "dispatch worker stopped; message dropped");
                }
            }
        }
    }

    fn spawn_worker(me: Weak<Self>) -> mpsc::UnboundedSender<ProtocolMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(dispatcher) = me.upgrade() else {
                    break;
                };
                dispatcher.handle(message).await;
            }
        });
        tx
    }

    /// Dispatches every message received on `rx` until the channel closes.
    pub fn spawn_listener(self: &Arc<Self>, mut rx: mpsc::Receiver<Value>) -> JoinHandle<()> {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                me.dispatch(&raw);
            }
            tracing::debug!(target: "preview::dispatcher", "surface message channel closed");
        })
    }

    async fn handle(&self, message: ProtocolMessage) {
        match message {
            ProtocolMessage::IntentTrigger {
                intent,
                payload,
                request_id,
            } => self.handle_trigger(&intent, payload, &request_id).await,
            ProtocolMessage::PreviewNav { intent, path, label } => {
                self.handle_nav(&intent, &path, label.as_deref()).await
            }
            ProtocolMessage::NavPageGenerate {
                page_name,
                page_context,
                nav_label,
                request_id,
            } => {
                self.handle_generate(&page_name, page_context.as_ref(), nav_label, &request_id)
                    .await
            }
            ProtocolMessage::ResearchOpen { payload } => {
                let query = payload.query.trim();
                if !query.is_empty() {
                    self.effects.open_research(query).await;
                }
            }
            other => {
                tracing::debug!(target: "preview::dispatcher", kind = other.type_name(), "no handler for message");
            }
        }
    }

    async fn handle_trigger(&self, raw_intent: &str, payload: Value, request_id: &str) {
        let intent = match raw_intent.parse::<Intent>() {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(target: "preview::dispatcher", request_id = %request_id, intent = %raw_intent, "rejected unknown intent");
                self.reply(request_id, Err(e.to_string())).await;
                return;
            }
        };
        tracing::info!(target: "preview::dispatcher", request_id = %request_id, intent = %intent, "intent triggered");

        match self.registry.handler_for(intent) {
            HandlerKind::Local(action) => {
                let message = match action {
                    LocalAction::HistoryBack => {
                        self.effects.navigate("back").await;
                        intent.success_message().to_string()
                    }
                    LocalAction::Navigate => {
                        let target = str_field(&payload, &["path", "href", "target"]).unwrap_or("/");
                        self.effects.navigate(target).await;
                        intent.success_message().to_string()
                    }
                    LocalAction::OpenResearch => {
                        let query = str_field(&payload, &["query", "label"]).unwrap_or_default();
                        self.effects.open_research(query).await;
                        intent.success_message().to_string()
                    }
                };
                self.reply(request_id, Ok(json!({ "message": message }))).await;
            }
            HandlerKind::Demo { url } => {
                let url = url.or_else(|| {
                    str_field(&payload, &["url", "href"])
                        .filter(|u| is_web_url(u))
                        .map(str::to_string)
                });
                match url {
                    Some(url) => {
                        self.effects.open_external(&url).await;
                        let data = json!({ "message": intent.success_message(), "overlay": false, "url": url });
                        self.reply(request_id, Ok(data)).await;
                    }
                    None => {
                        tracing::warn!(target: "preview::dispatcher", request_id = %request_id, "demo intent without a configured or http(s) link");
                        self.reply(request_id, Err("No demo link is configured".into())).await
                    }
                }
            }
            HandlerKind::ScrollToBooking => {
                let handled = self.send_command(COMMAND_SCROLL_TO_BOOKING).await;
                tracing::debug!(target: "preview::dispatcher", request_id = %request_id, ?handled, "booking scroll finished");
                self.execute_remote(intent, payload, request_id).await;
            }
            HandlerKind::Remote => self.execute_remote(intent, payload, request_id).await,
        }
    }

    async fn execute_remote(&self, intent: Intent, payload: Value, request_id: &str) {
        let ctx = self.session.with_correlation(request_id);
        let call = self.executor.execute(&ctx, intent, payload);
        let result = match tokio::time::timeout(self.intent_timeout, call).await {
            Ok(Ok(outcome)) if outcome.success => Ok(with_message(outcome.data, intent)),
            Ok(Ok(outcome)) => Err(outcome.error.unwrap_or_else(|| "Request failed".to_string())),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("{} timed out", intent)),
        };
        if let Err(error) = &result {
            tracing::warn!(target: "preview::dispatcher", request_id = %request_id, intent = %intent, %error, "intent failed");
            self.effects.notify(error).await;
        }
        self.reply(request_id, result).await;
    }

    /// Posts `command` to the surface and waits for its acknowledgment, bounded
    /// by the command timeout. `None` means no acknowledgment arrived.
    pub async fn send_command(&self, command: &str) -> Option<bool> {
        let (request_id, ack) = self.pending.register(command, self.command_timeout);
        let posted = self
            .surface
            .post_message(ProtocolMessage::IntentCommand {
                command: command.to_string(),
                request_id: request_id.clone(),
            })
            .await;
        if let Err(e) = posted {
            self.pending.remove(&request_id);
            tracing::warn!(target: "preview::dispatcher", request_id = %request_id, error = %e, "command not delivered");
            return None;
        }
        match tokio::time::timeout(self.command_timeout, ack).await {
            Ok(Ok(handled)) => Some(handled),
            Ok(Err(_)) => None,
            Err(_) => {
                self.pending.remove(&request_id);
                tracing::debug!(target: "preview::dispatcher", request_id = %request_id, command = %command, "no acknowledgment before timeout; proceeding");
                None
            }
        }
    }

    async fn handle_nav(&self, raw_intent: &str, path: &str, label: Option<&str>) {
        if matches!(raw_intent.parse::<Intent>(), Ok(Intent::NavBack)) {
            self.effects.navigate("back").await;
            return;
        }
        let path = path.trim();
        if path.starts_with('#') {
            self.effects.navigate(path).await;
            return;
        }
        if matches!(path, "" | "/" | "/index.html" | "index.html") {
            if let Some(source) = self.main_document() {
                if let Err(e) = self.surface.render_now(&source).await {
                    tracing::warn!(target: "preview::dispatcher", error = %e, "could not render main document");
                }
            }
            self.effects.navigate("/").await;
            return;
        }

        let key = normalize_page_key(path);
        let known = self
            .files
            .read(&page_path(&key))
            .or_else(|| self.synthesizer.get_cached(&key));
        match known {
            Some(content) => {
                if let Err(e) = self.surface.show_page(&key, &content).await {
                    tracing::warn!(target: "preview::dispatcher", page = %key, error = %e, "could not show page");
                }
                self.effects.navigate(&key).await;
            }
            None => {
                tracing::debug!(target: "preview::dispatcher", page = %key, "navigation to unknown page");
                let name = label.filter(|l| !l.trim().is_empty()).unwrap_or(key.as_str());
                self.effects
                    .notify(&format!("The page \"{}\" is not available yet", name))
                    .await;
            }
        }
    }

    async fn handle_generate(
        &self,
        page_name: &str,
        page_context: Option<&Value>,
        nav_label: Option<String>,
        request_id: &str,
    ) {
        let key = normalize_page_key(page_name);
        let existing = self.files.read(&page_path(&key));
        let result = match existing {
            Some(content) => Ok(content),
            None => {
                let request = PageRequest {
                    page_name: None,
                    nav_label,
                    page_type: page_context.and_then(|c| str_field(c, &["pageType"])).map(str::to_string),
                    document: self.main_document(),
                };
                self.synthesizer.ensure_page(&key, &request).await
            }
        };

        match result {
            Ok(content) => {
                let ready = ProtocolMessage::NavPageReady {
                    request_id: request_id.to_string(),
                    page_name: key.clone(),
                    page_content: content.clone(),
                };
                if let Err(e) = self.surface.post_message(ready).await {
                    tracing::warn!(target: "preview::dispatcher", request_id = %request_id, error = %e, "could not post page");
                    return;
                }
                if let Err(e) = self.surface.show_page(&key, &content).await {
                    tracing::warn!(target: "preview::dispatcher", page = %key, error = %e, "could not show page");
                }
            }
            Err(e) => {
                tracing::warn!(target: "preview::dispatcher", request_id = %request_id, page = %key, error = %e, "page synthesis failed");
                let error = ProtocolMessage::NavPageError {
                    request_id: request_id.to_string(),
                    page_name: key.clone(),
                    error: e.to_string(),
                };
                if let Err(post_err) = self.surface.post_message(error).await {
                    tracing::warn!(target: "preview::dispatcher", error = %post_err, "could not post page error");
                }
                self.effects
                    .notify(&format!("Could not create the \"{}\" page", key))
                    .await;
            }
        }
    }

    async fn reply(&self, request_id: &str, result: Result<Value, String>) {
        let message = match result {
            Ok(data) => ProtocolMessage::IntentResult {
                request_id: request_id.to_string(),
                success: true,
                data: Some(data),
                error: None,
            },
            Err(error) => ProtocolMessage::IntentResult {
                request_id: request_id.to_string(),
                success: false,
                data: None,
                error: Some(error),
            },
        };
        if let Err(e) = self.surface.post_message(message).await {
            tracing::warn!(target: "preview::dispatcher", request_id = %request_id, error = %e, "could not post intent result");
        }
    }

    fn main_document(&self) -> Option<String> {
        if let Some(source) = &self.source {
            let doc = source.document();
            if doc.revision > 0 {
                if let Some(content) = self.files.read(&doc.entry_point) {
                    return Some(content);
                }
            }
        }
        self.files.read_entry_point()
    }

    /// Drops pending requests whose deadline has passed.
    pub fn sweep_expired(&self) -> usize {
        self.pending.sweep_expired(tokio::time::Instant::now())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Only absolute `http(s)` links may leave the sandbox.
fn is_web_url(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    let rest = match lower.strip_prefix("https://").or_else(|| lower.strip_prefix("http://")) {
        Some(rest) => rest,
        None => return false,
    };
    !rest.is_empty() && !rest.starts_with('/') && !raw.chars().any(|c| c.is_control() || c.is_whitespace())
}

/// Ensures the result data carries a user-facing `message`.
fn with_message(data: Option<Value>, intent: Intent) -> Value {
    match data {
        Some(Value::Object(mut map)) => {
            map.entry("message")
                .or_insert_with(|| Value::String(intent.success_message().to_string()));
            Value::Object(map)
        }
        Some(other) => json!({ "message": intent.success_message(), "result": other }),
        None => json!({ "message": intent.success_message() }),
    }
}
