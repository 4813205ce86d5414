//! Intents and the handler registry.
//!
//! On the wire an intent is a `domain.action` string. It is parsed into the
//! closed [`Intent`] enum at the boundary; anything else is rejected before a
//! handler is looked up.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    NavGoto,
    NavBack,
    CartAdd,
    CartView,
    CartRemove,
    CheckoutStart,
    PaymentCheckout,
    BookingCreate,
    BookingScroll,
    LeadSubmit,
    ContactSubmit,
    NewsletterSubscribe,
    QuoteRequest,
    AuthSignup,
    AuthLogin,
    DemoOpen,
    ResearchOpen,
}

impl Intent {
    pub const ALL: [Intent; 17] = [
        Intent::NavGoto,
        Intent::NavBack,
        Intent::CartAdd,
        Intent::CartView,
        Intent::CartRemove,
        Intent::CheckoutStart,
        Intent::PaymentCheckout,
        Intent::BookingCreate,
        Intent::BookingScroll,
        Intent::LeadSubmit,
        Intent::ContactSubmit,
        Intent::NewsletterSubscribe,
        Intent::QuoteRequest,
        Intent::AuthSignup,
        Intent::AuthLogin,
        Intent::DemoOpen,
        Intent::ResearchOpen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::NavGoto => "nav.goto",
            Intent::NavBack => "nav.back",
            Intent::CartAdd => "cart.add",
            Intent::CartView => "cart.view",
            Intent::CartRemove => "cart.remove",
            Intent::CheckoutStart => "checkout.start",
            Intent::PaymentCheckout => "payment.checkout",
            Intent::BookingCreate => "booking.create",
            Intent::BookingScroll => "booking.scroll",
            Intent::LeadSubmit => "lead.submit",
            Intent::ContactSubmit => "contact.submit",
            Intent::NewsletterSubscribe => "newsletter.subscribe",
            Intent::QuoteRequest => "quote.request",
            Intent::AuthSignup => "auth.signup",
            Intent::AuthLogin => "auth.login",
            Intent::DemoOpen => "demo.open",
            Intent::ResearchOpen => "research.open",
        }
    }

    /// Namespace part (`cart` for `cart.add`).
    pub fn domain(&self) -> &'static str {
        self.as_str().split('.').next().unwrap_or_default()
    }

    /// Handler used when the registry has no override. Exhaustive on purpose.
    pub fn default_handler(&self) -> HandlerKind {
        match self {
            Intent::NavBack => HandlerKind::Local(LocalAction::HistoryBack),
            Intent::NavGoto => HandlerKind::Local(LocalAction::Navigate),
            Intent::ResearchOpen => HandlerKind::Local(LocalAction::OpenResearch),
            Intent::BookingCreate | Intent::BookingScroll => HandlerKind::ScrollToBooking,
            Intent::DemoOpen => HandlerKind::Demo { url: None },
            Intent::CartAdd
            | Intent::CartView
            | Intent::CartRemove
            | Intent::CheckoutStart
            | Intent::PaymentCheckout
            | Intent::LeadSubmit
            | Intent::ContactSubmit
            | Intent::NewsletterSubscribe
            | Intent::QuoteRequest
            | Intent::AuthSignup
            | Intent::AuthLogin => HandlerKind::Remote,
        }
    }

    /// Confirmation copy shown when the remote executor returns no message of its own.
    pub fn success_message(&self) -> &'static str {
        match self {
            Intent::CartAdd => "Added to cart",
            Intent::CartRemove => "Removed from cart",
            Intent::CartView => "Cart updated",
            Intent::CheckoutStart | Intent::PaymentCheckout => "Checkout started",
            Intent::BookingCreate | Intent::BookingScroll => "Booking request received",
            Intent::LeadSubmit | Intent::ContactSubmit => "Thanks! We'll be in touch soon.",
            Intent::NewsletterSubscribe => "You're subscribed",
            Intent::QuoteRequest => "Quote request sent",
            Intent::AuthSignup => "Account created",
            Intent::AuthLogin => "Signed in",
            Intent::NavGoto | Intent::NavBack => "Navigated",
            Intent::DemoOpen => "Demo opened",
            Intent::ResearchOpen => "Research opened",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownIntent(pub String);

impl fmt::Display for UnknownIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown intent: {}", self.0)
    }
}

impl std::error::Error for UnknownIntent {}

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Intent::ALL
            .iter()
            .copied()
            .find(|i| i.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownIntent(s.to_string()))
    }
}

impl Serialize for Intent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Host-side effects that never leave the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    Navigate,
    HistoryBack,
    OpenResearch,
}

/// How an intent is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// Resolved by the host without a remote call.
    Local(LocalAction),
    /// Executed through the remote intent executor.
    Remote,
    /// Opens an external reference outside the surface; no in-surface overlay.
    Demo { url: Option<String> },
    /// Asks the surface to scroll to its booking form, then executes remotely.
    ScrollToBooking,
}

/// Maps every intent to its handler. Overrides replace the per-intent default.
#[derive(Debug, Clone, Default)]
pub struct IntentRegistry {
    overrides: HashMap<Intent, HandlerKind>,
    demo_url: Option<String>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demo_url(mut self, url: Option<String>) -> Self {
        self.demo_url = url;
        self
    }

    pub fn register(&mut self, intent: Intent, handler: HandlerKind) {
        self.overrides.insert(intent, handler);
    }

    pub fn handler_for(&self, intent: Intent) -> HandlerKind {
        match self.overrides.get(&intent) {
            Some(handler) => handler.clone(),
            None => match intent.default_handler() {
                HandlerKind::Demo { url: None } => HandlerKind::Demo {
                    url: self.demo_url.clone(),
                },
                other => other,
            },
        }
    }

    /// Intent names with their resolved handler labels (for status/discovery).
    pub fn describe(&self) -> Vec<(String, String)> {
        Intent::ALL
            .iter()
            .map(|i| {
                let label = match self.handler_for(*i) {
                    HandlerKind::Local(_) => "local",
                    HandlerKind::Remote => "remote",
                    HandlerKind::Demo { .. } => "demo",
                    HandlerKind::ScrollToBooking => "scroll-to-booking",
                };
                (i.as_str().to_string(), label.to_string())
            })
            .collect()
    }
}
