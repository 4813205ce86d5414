//! Page generator: asks an LLM (mock or live API) for a secondary page that
//! matches the site's existing look.

use preview_core::{escape_html, CollaboratorError, PageGenerator, PageRole, PageSpec};
use serde::{Deserialize, Serialize};

const ENV_LLM_MODE: &str = "PREVIEW_LLM_MODE";
const ENV_LLM_API_URL: &str = "PREVIEW_LLM_API_URL";
const ENV_LLM_API_KEY: &str = "PREVIEW_LLM_API_KEY";
const ENV_LLM_MODEL: &str = "PREVIEW_LLM_MODEL";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Mode for LLM invocation: mock (deterministic template pages) or live (calls the configured API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Mock,
    Live,
}

impl LlmMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "live" => LlmMode::Live,
            _ => LlmMode::Mock,
        }
    }

    fn from_env() -> Self {
        std::env::var(ENV_LLM_MODE)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

const SYSTEM_PROMPT: &str = "You write single HTML pages for small business websites. \
Reply with HTML only: one <main> element with an optional <style> block before it. \
No Markdown, no explanations, no external scripts, no inline event handlers. \
Mark actionable buttons with data-intent attributes (cart.add, checkout.start, booking.create, contact.submit, newsletter.subscribe, quote.request).";

/// Generates pages through a mock template or an OpenAI-compatible chat completion endpoint.
pub struct LlmPageGenerator {
    mode: LlmMode,
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    model: String,
}

impl LlmPageGenerator {
    pub fn new() -> Self {
        Self::with_mode(LlmMode::from_env())
    }

    pub fn with_mode(mode: LlmMode) -> Self {
        Self {
            mode,
            client: reqwest::Client::new(),
            api_url: std::env::var(ENV_LLM_API_URL).ok().filter(|v| !v.is_empty()),
            api_key: std::env::var(ENV_LLM_API_KEY).ok().filter(|v| !v.is_empty()),
            model: std::env::var(ENV_LLM_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    /// Points the live mode at an explicit endpoint (tests, non-env setups).
    pub fn with_endpoint(mut self, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self.api_key = Some(api_key.into());
        self
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    /// User prompt for `spec`.
    pub fn build_prompt(spec: &PageSpec) -> String {
        let mut prompt = format!(
            "Create the \"{}\" page (role: {}) for the website{}.\n",
            spec.page_name,
            spec.role.as_str(),
            spec.site_title
                .as_deref()
                .map(|t| format!(" \"{}\"", t))
                .unwrap_or_default()
        );
        if let Some(label) = &spec.nav_label {
            prompt.push_str(&format!("The visitor clicked: \"{}\".\n", label));
        }
        prompt.push_str(role_brief(spec.role));
        prompt.push('\n');
        prompt.push_str("Include a link back to the home page (href=\"/\").\n");
        if !spec.style_excerpt.is_empty() {
            prompt.push_str("Match the existing styles:\n");
            prompt.push_str(&spec.style_excerpt);
            prompt.push('\n');
        }
        prompt
    }

    /// Mock LLM: a deterministic page per role, wired with the same intents a live page would carry.
    fn mock_generate(&self, spec: &PageSpec) -> String {
        let title = escape_html(&spec.page_name);
        let body = match spec.role {
            PageRole::Checkout => "<form data-intent=\"checkout.start\">\
<label>Email <input type=\"email\" name=\"email\" required></label>\
<label>Card number <input name=\"card\" inputmode=\"numeric\"></label>\
<button type=\"submit\" data-intent=\"payment.checkout\">Pay now</button></form>"
                .to_string(),
            PageRole::Cart => "<table class=\"cart\"><thead><tr><th>Item</th><th>Qty</th></tr></thead>\
<tbody><tr><td>Your selected items</td><td>1</td></tr></tbody></table>\
<button data-intent=\"checkout.start\">Proceed to Checkout</button>"
                .to_string(),
            PageRole::Booking => "<form id=\"booking\" data-intent=\"booking.create\">\
<label>Name <input name=\"name\" required></label>\
<label>Date <input type=\"date\" name=\"date\" required></label>\
<label>Guests <input type=\"number\" name=\"guests\" min=\"1\" value=\"2\"></label>\
<button type=\"submit\">Book now</button></form>"
                .to_string(),
            PageRole::Contact => "<form data-intent=\"contact.submit\">\
<label>Name <input name=\"name\" required></label>\
<label>Email <input type=\"email\" name=\"email\" required></label>\
<label>Message <textarea name=\"message\"></textarea></label>\
<button type=\"submit\">Send message</button></form>"
                .to_string(),
            PageRole::Products => (1..=3)
                .map(|i| {
                    format!(
                        "<article class=\"product\"><h3>Product {i}</h3><p>A customer favourite.</p>\
<button data-intent=\"cart.add\" data-sku=\"sku-{i}\">Add to cart</button></article>"
                    )
                })
                .collect::<Vec<_>>()
                .join(""),
            PageRole::Generic => format!(
                "<p>Everything you need to know about {}.</p><a href=\"#contact\">Get in touch</a>",
                title.to_lowercase()
            ),
        };
        let style = if spec.style_excerpt.is_empty() {
            String::new()
        } else {
            format!("<style>{}</style>\n", spec.style_excerpt)
        };
        format!(
            "{style}<main class=\"generated-page page-{role}\">\n<a href=\"/\">Back to home</a>\n<h1>{title}</h1>\n{body}\n</main>",
            style = style,
            role = spec.role.as_str(),
            title = title,
            body = body
        )
    }

    async fn live_generate(&self, spec: &PageSpec) -> Result<String, CollaboratorError> {
        let (Some(url), Some(key)) = (self.api_url.as_deref(), self.api_key.as_deref()) else {
            tracing::warn!(target: "preview::skills", "live LLM mode without {} / {}; using mock page", ENV_LLM_API_URL, ENV_LLM_API_KEY);
            return Ok(self.mock_generate(spec));
        };
        let prompt = Self::build_prompt(spec);
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.4,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or("LLM response contained no choices")?;
        tracing::debug!(target: "preview::skills", page = %spec.page_key, bytes = content.len(), "live page generated");
        Ok(content)
    }
}

impl Default for LlmPageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn role_brief(role: PageRole) -> &'static str {
    match role {
        PageRole::Checkout => "Show an order summary and a payment form; the submit button uses data-intent=\"payment.checkout\".",
        PageRole::Cart => "Show the cart contents with quantities and a \"Proceed to Checkout\" button (data-intent=\"checkout.start\").",
        PageRole::Contact => "Show a contact form (name, email, message) using data-intent=\"contact.submit\".",
        PageRole::Booking => "Show a booking form (name, date, time, party size) using data-intent=\"booking.create\".",
        PageRole::Products => "Show a grid of products, each with an \"Add to cart\" button (data-intent=\"cart.add\").",
        PageRole::Generic => "Write a short, useful content page that fits the site.",
    }
}

#[async_trait::async_trait]
impl PageGenerator for LlmPageGenerator {
    async fn generate(&self, spec: &PageSpec) -> Result<String, CollaboratorError> {
        match self.mode {
            LlmMode::Mock => Ok(self.mock_generate(spec)),
            LlmMode::Live => self.live_generate(spec).await,
        }
    }
}
