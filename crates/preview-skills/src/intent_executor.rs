//! Backend intent executor: a mock backend for local previews and a live HTTP
//! client for a real one.

use preview_core::{CollaboratorError, Intent, IntentExecutor, IntentOutcome, PreviewConfig, SessionContext};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Where intents are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendMode {
    #[default]
    Mock,
    Live,
}

impl BackendMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "live" => BackendMode::Live,
            _ => BackendMode::Mock,
        }
    }
}

/// Sessions with a mock cart kept at once; the oldest cart is dropped beyond this.
pub const MAX_MOCK_CARTS: usize = 256;

/// Mock carts keyed by session, evicted oldest first.
#[derive(Default)]
struct MockCarts {
    items: HashMap<String, Vec<Value>>,
    order: VecDeque<String>,
}

impl MockCarts {
    fn cart(&mut self, session_id: &str, capacity: usize) -> &mut Vec<Value> {
        if !self.items.contains_key(session_id) {
            while self.items.len() >= capacity.max(1) {
                let Some(oldest) = self.order.pop_front() else { break };
                self.items.remove(&oldest);
                tracing::debug!(target: "preview::skills", session = %oldest, "mock cart evicted");
            }
            self.order.push_back(session_id.to_string());
        }
        self.items.entry(session_id.to_string()).or_default()
    }

    fn remove(&mut self, session_id: &str) -> bool {
        self.order.retain(|s| s != session_id);
        self.items.remove(session_id).is_some()
    }
}

pub struct BackendExecutor {
    mode: BackendMode,
    client: reqwest::Client,
    base_url: Option<String>,
    carts: Mutex<MockCarts>,
    cart_capacity: usize,
}

impl BackendExecutor {
    pub fn mock() -> Self {
        Self {
            mode: BackendMode::Mock,
            client: reqwest::Client::new(),
            base_url: None,
            carts: Mutex::new(MockCarts::default()),
            cart_capacity: MAX_MOCK_CARTS,
        }
    }

    /// Keeps at most `capacity` mock carts.
    pub fn with_cart_capacity(mut self, capacity: usize) -> Self {
        self.cart_capacity = capacity.max(1);
        self
    }

    /// Forgets the mock cart of a finished session.
    pub fn end_session(&self, session_id: &str) -> bool {
        match self.carts.lock() {
            Ok(mut carts) => carts.remove(session_id),
            Err(poisoned) => poisoned.into_inner().remove(session_id),
        }
    }

    pub fn live(base_url: impl Into<String>) -> Self {
        Self {
            mode: BackendMode::Live,
            base_url: Some(base_url.into().trim_end_matches('/').to_string()),
            ..Self::mock()
        }
    }

    /// Live when `backend_mode = "live"` and a URL is configured, mock otherwise.
    pub fn from_config(config: &PreviewConfig) -> Self {
        match (BackendMode::parse(&config.backend_mode), config.backend_url.as_deref()) {
            (BackendMode::Live, Some(url)) if !url.trim().is_empty() => Self::live(url),
            (BackendMode::Live, _) => {
                tracing::warn!(target: "preview::skills", "backend_mode is live but backend_url is missing; using mock backend");
                Self::mock()
            }
            _ => Self::mock(),
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    /// Endpoint a live execution of `intent` is posted to.
    pub fn endpoint(&self, intent: Intent) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/intents/{}", base, intent.as_str()))
    }

    fn mock_execute(&self, ctx: &SessionContext, intent: Intent, payload: &Value) -> IntentOutcome {
        let reference = || uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        match intent {
            Intent::NewsletterSubscribe | Intent::AuthSignup | Intent::AuthLogin => {
                match field(payload, "email") {
                    Some(email) if email.contains('@') => IntentOutcome::ok(json!({
                        "message": intent.success_message(),
                        "email": email,
                    })),
                    Some(_) => IntentOutcome::failed("Please enter a valid email address"),
                    None => IntentOutcome::failed("Please enter your email address"),
                }
            }
            Intent::ContactSubmit | Intent::LeadSubmit | Intent::QuoteRequest => {
                if let Some(email) = field(payload, "email") {
                    if !email.contains('@') {
                        return IntentOutcome::failed("Please enter a valid email address");
                    }
                }
                IntentOutcome::ok(json!({ "message": intent.success_message(), "reference": reference() }))
            }
            Intent::BookingCreate | Intent::BookingScroll => IntentOutcome::ok(json!({
                "message": intent.success_message(),
                "bookingId": reference(),
            })),
            Intent::CartAdd | Intent::CartRemove | Intent::CartView => {
                let mut carts = match self.carts.lock() {
                    Ok(c) => c,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let cart = carts.cart(ctx.resolved_session_id(), self.cart_capacity);
                match intent {
                    Intent::CartAdd => cart.push(payload.clone()),
                    Intent::CartRemove => {
                        if cart.pop().is_none() {
                            return IntentOutcome::failed("Your cart is already empty");
                        }
                    }
                    _ => {}
                }
                IntentOutcome::ok(json!({
                    "message": intent.success_message(),
                    "cartCount": cart.len(),
                    "items": cart.clone(),
                }))
            }
            Intent::CheckoutStart | Intent::PaymentCheckout => IntentOutcome::ok(json!({
                "message": intent.success_message(),
                "orderId": reference(),
            })),
            Intent::NavGoto | Intent::NavBack | Intent::DemoOpen | Intent::ResearchOpen => {
                IntentOutcome::ok(json!({ "message": intent.success_message() }))
            }
        }
    }

    async fn live_execute(
        &self,
        ctx: &SessionContext,
        intent: Intent,
        payload: Value,
    ) -> Result<IntentOutcome, CollaboratorError> {
        let url = self.endpoint(intent).ok_or("live backend has no base URL")?;
        let body = json!({
            "intent": intent.as_str(),
            "sessionId": ctx.resolved_session_id(),
            "requestId": ctx.correlation_id,
            "payload": payload,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "preview::skills", intent = %intent, %status, "backend rejected intent");
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
            return Ok(IntentOutcome::failed(
                detail.unwrap_or_else(|| format!("Backend returned {}", status)),
            ));
        }
        Ok(response.json::<IntentOutcome>().await?)
    }
}

fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait::async_trait]
impl IntentExecutor for BackendExecutor {
    async fn execute(
        &self,
        ctx: &SessionContext,
        intent: Intent,
        payload: Value,
    ) -> Result<IntentOutcome, CollaboratorError> {
        tracing::debug!(target: "preview::skills", intent = %intent, mode = ?self.mode, "executing intent");
        match self.mode {
            BackendMode::Mock => Ok(self.mock_execute(ctx, intent, &payload)),
            BackendMode::Live => self.live_execute(ctx, intent, payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newsletter_requires_an_email() {
        let exec = BackendExecutor::mock();
        let ctx = SessionContext::default();
        let missing = exec.execute(&ctx, Intent::NewsletterSubscribe, json!({})).await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Please enter your email address"));

        let ok = exec
            .execute(&ctx, Intent::NewsletterSubscribe, json!({ "email": "ada@example.com" }))
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.data.unwrap()["message"], "You're subscribed");
    }

    #[tokio::test]
    async fn mock_carts_are_per_session() {
        let exec = BackendExecutor::mock();
        let a = SessionContext::new("a");
        let b = SessionContext::new("b");
        exec.execute(&a, Intent::CartAdd, json!({ "sku": "bread" })).await.unwrap();
        let second = exec.execute(&a, Intent::CartAdd, json!({ "sku": "jam" })).await.unwrap();
        assert_eq!(second.data.unwrap()["cartCount"], 2);

        let other = exec.execute(&b, Intent::CartView, json!({})).await.unwrap();
        assert_eq!(other.data.unwrap()["cartCount"], 0);
        let empty = exec.execute(&b, Intent::CartRemove, json!({})).await.unwrap();
        assert!(!empty.success);
    }

    #[tokio::test]
    async fn mock_carts_are_bounded_and_end_with_the_session() {
        let exec = BackendExecutor::mock().with_cart_capacity(2);
        for id in ["a", "b", "c"] {
            let ctx = SessionContext::new(id);
            exec.execute(&ctx, Intent::CartAdd, json!({ "sku": id })).await.unwrap();
        }
        let oldest = exec.execute(&SessionContext::new("a"), Intent::CartView, json!({})).await.unwrap();
        assert_eq!(oldest.data.unwrap()["cartCount"], 0);
        let recent = exec.execute(&SessionContext::new("c"), Intent::CartView, json!({})).await.unwrap();
        assert_eq!(recent.data.unwrap()["cartCount"], 1);

        assert!(exec.end_session("c"));
        assert!(!exec.end_session("c"));
        let ended = exec.execute(&SessionContext::new("c"), Intent::CartView, json!({})).await.unwrap();
        assert_eq!(ended.data.unwrap()["cartCount"], 0);
    }

    #[test]
    fn config_selects_the_backend() {
        let mut config = PreviewConfig::default();
        assert_eq!(BackendExecutor::from_config(&config).mode(), BackendMode::Mock);
        config.backend_mode = "live".into();
        assert_eq!(BackendExecutor::from_config(&config).mode(), BackendMode::Mock);
        config.backend_url = Some("https://api.example.com/".into());
        let exec = BackendExecutor::from_config(&config);
        assert_eq!(exec.mode(), BackendMode::Live);
        assert_eq!(
            exec.endpoint(Intent::BookingCreate).as_deref(),
            Some("https://api.example.com/intents/booking.create")
        );
    }

    #[tokio::test]
    async fn unreachable_live_backend_is_an_error() {
        let exec = BackendExecutor::live("http://127.0.0.1:9");
        let ctx = SessionContext::default().with_correlation("r-1");
        assert!(exec.execute(&ctx, Intent::ContactSubmit, json!({})).await.is_err());
    }
}
