//! Collaborator seams: remote intent execution, page generation and host effects.

use crate::error::CollaboratorError;
use crate::protocol::Intent;
use crate::shared::SessionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a remote intent execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Executes intents against the backend (cart, booking, leads, auth...).
#[async_trait::async_trait]
pub trait IntentExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &SessionContext,
        intent: Intent,
        payload: Value,
    ) -> Result<IntentOutcome, CollaboratorError>;
}

/// What kind of page a generator is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageRole {
    Checkout,
    Cart,
    Contact,
    Booking,
    Products,
    Generic,
}

impl PageRole {
    /// Derives the role from a normalized page key (`checkout`, `view-cart`, `book-a-table`...).
    pub fn from_key(key: &str) -> Self {
        let has = |needle: &str| key.split('-').any(|part| part.starts_with(needle));
        if has("checkout") || has("payment") {
            PageRole::Checkout
        } else if has("cart") || has("bag") || has("basket") {
            PageRole::Cart
        } else if has("book") || has("reserv") || has("appointment") {
            PageRole::Booking
        } else if has("contact") || has("quote") {
            PageRole::Contact
        } else if has("product") || has("shop") || has("catalog") || has("menu") || has("collection") {
            PageRole::Products
        } else {
            PageRole::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageRole::Checkout => "checkout",
            PageRole::Cart => "cart",
            PageRole::Contact => "contact",
            PageRole::Booking => "booking",
            PageRole::Products => "products",
            PageRole::Generic => "generic",
        }
    }
}

/// Everything a generator needs to produce an on-brand page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpec {
    pub page_key: String,
    pub page_name: String,
    pub role: PageRole,
    pub nav_label: Option<String>,
    /// Bounded prefix of the current document's styles.
    pub style_excerpt: String,
    pub site_title: Option<String>,
}

#[async_trait::async_trait]
pub trait PageGenerator: Send + Sync {
    async fn generate(&self, spec: &PageSpec) -> Result<String, CollaboratorError>;
}

/// Effects the host performs outside the surface.
#[async_trait::async_trait]
pub trait HostEffects: Send + Sync {
    /// Opens an external reference (demo link) in a new context.
    async fn open_external(&self, url: &str);

    async fn open_research(&self, query: &str);

    /// User-visible notice (navigation to an unknown page, synthesis failure...).
    async fn notify(&self, message: &str);

    /// Host-level navigation (`back` for history, a page key, or an anchor).
    async fn navigate(&self, target: &str);
}
