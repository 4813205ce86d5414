//! Dynamic page synthesizer: generates secondary pages on demand, caches them
//! per session and coalesces concurrent requests for the same page.

use crate::bundler;
use crate::collab::{PageGenerator, PageRole, PageSpec};
use crate::error::SynthesisError;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::SystemTime;

type Generation = Shared<BoxFuture<'static, Result<String, SynthesisError>>>;

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPage {
    pub page_key: String,
    pub content: String,
    pub generated_at: SystemTime,
}

/// Caller-supplied context for a page request.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Human-readable name; derived from the key when absent.
    pub page_name: Option<String>,
    pub nav_label: Option<String>,
    /// Page type suggested by the classifier (`checkout`, `cart`, ...).
    pub page_type: Option<String>,
    /// Current main document, used for the style excerpt and site title.
    pub document: Option<String>,
}

pub struct PageSynthesizer {
    generator: Arc<dyn PageGenerator>,
    cache: Arc<DashMap<String, GeneratedPage>>,
    inflight: Mutex<HashMap<String, Generation>>,
    style_excerpt_chars: usize,
    generations: Arc<AtomicU64>,
    /// Bumped by `clear`; a generation started under an older epoch is not cached.
    epoch: Arc<AtomicU64>,
    /// Bumped per key by `invalidate`.
    key_epochs: Arc<DashMap<String, u64>>,
}

impl PageSynthesizer {
    pub fn new(generator: Arc<dyn PageGenerator>, style_excerpt_chars: usize) -> Self {
        Self {
            generator,
            cache: Arc::new(DashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            style_excerpt_chars,
            generations: Arc::new(AtomicU64::new(0)),
            epoch: Arc::new(AtomicU64::new(0)),
            key_epochs: Arc::new(DashMap::new()),
        }
    }

    /// Returns the page for `page_key`, generating it at most once. Concurrent
    /// callers for the same key share one generation; failures are not cached.
    pub async fn ensure_page(&self, page_key: &str, request: &PageRequest) -> Result<String, SynthesisError> {
        let key = normalize_page_key(page_key);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(target: "preview::synth", page = %key, "cache hit");
            return Ok(hit.content.clone());
        }

        let generation = {
            let mut inflight = self.lock_inflight();
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit.content.clone());
            }
            let running = inflight.get(&key).filter(|g| g.peek().is_none()).cloned();
            match running {
                Some(running) => {
                    tracing::debug!(target: "preview::synth", page = %key, "joining in-flight generation");
                    running
                }
                None => {
                    let generation = self.start_generation(&key, request);
                    inflight.insert(key.clone(), generation.clone());
                    generation
                }
            }
        };

        let result = generation.clone().await;

        {
            let mut inflight = self.lock_inflight();
            if inflight.get(&key).map(|g| g.ptr_eq(&generation)).unwrap_or(false) {
                inflight.remove(&key);
            }
        }
        result
    }

    fn start_generation(&self, key: &str, request: &PageRequest) -> Generation {
        let spec = self.build_spec(key, request);
        let generator = Arc::clone(&self.generator);
        let cache = Arc::clone(&self.cache);
        let generations = Arc::clone(&self.generations);
        let epoch = Arc::clone(&self.epoch);
        let key_epochs = Arc::clone(&self.key_epochs);
        let started = self.epoch_of(key);
        tracing::info!(target: "preview::synth", page = %spec.page_key, role = spec.role.as_str(), "generating page");

        async move {
            generations.fetch_add(1, Ordering::AcqRel);
            let raw = generator
                .generate(&spec)
                .await
                .map_err(|e| SynthesisError::Generator(e.to_string()))?;
            let content = clean_generated(&raw);
            if content.trim().is_empty() {
                tracing::warn!(target: "preview::synth", page = %spec.page_key, "generator returned empty content");
                return Err(SynthesisError::EmptyContent(spec.page_key.clone()));
            }
            let current = || {
                (
                    epoch.load(Ordering::Acquire),
                    key_epochs.get(&spec.page_key).map(|e| *e).unwrap_or(0),
                )
            };
            if current() != started {
                tracing::debug!(target: "preview::synth", page = %spec.page_key, "cache reset during generation; result not cached");
                return Ok(content);
            }
            cache.insert(
                spec.page_key.clone(),
                GeneratedPage {
                    page_key: spec.page_key.clone(),
                    content: content.clone(),
                    generated_at: SystemTime::now(),
                },
            );
            if current() != started {
                cache.remove(&spec.page_key);
            }
            Ok(content)
        }
        .boxed()
        .shared()
    }

    fn epoch_of(&self, key: &str) -> (u64, u64) {
        (
            self.epoch.load(Ordering::Acquire),
            self.key_epochs.get(key).map(|e| *e).unwrap_or(0),
        )
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, Generation>> {
        match self.inflight.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn build_spec(&self, key: &str, request: &PageRequest) -> PageSpec {
        let role = request
            .page_type
            .as_deref()
            .map(|t| PageRole::from_key(&normalize_page_key(t)))
            .filter(|r| *r != PageRole::Generic)
            .unwrap_or_else(|| PageRole::from_key(key));
        let (style_excerpt, site_title) = match request.document.as_deref() {
            Some(doc) => (bundler::style_excerpt(doc, self.style_excerpt_chars), document_title(doc)),
            None => (String::new(), None),
        };
        PageSpec {
            page_key: key.to_string(),
            page_name: request
                .page_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| title_from_key(key)),
            role,
            nav_label: request.nav_label.clone(),
            style_excerpt,
            site_title,
        }
    }

    pub fn get_cached(&self, page_key: &str) -> Option<String> {
        self.cache
            .get(&normalize_page_key(page_key))
            .map(|e| e.content.clone())
    }

    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Drops the cached page and detaches any generation still running for it.
    pub fn invalidate(&self, page_key: &str) -> bool {
        let key = normalize_page_key(page_key);
        {
            let mut inflight = self.lock_inflight();
            *self.key_epochs.entry(key.clone()).or_insert(0) += 1;
            inflight.remove(&key);
        }
        let removed = self.cache.remove(&key).is_some();
        if removed {
            tracing::debug!(target: "preview::synth", page = %page_key, "cache entry invalidated");
        }
        removed
    }

    /// Evicts every generated page (workspace cleared).
    pub fn clear(&self) {
        {
            let mut inflight = self.lock_inflight();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            inflight.clear();
        }
        self.cache.clear();
        tracing::info!(target: "preview::synth", "page cache cleared");
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of generator calls issued so far.
    pub fn generation_count(&self) -> u64 {
        self.generations.load(Ordering::Acquire)
    }
}

/// `"/Pages/View Cart.html"` → `"view-cart"`; empty → `"page"`.
pub fn normalize_page_key(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut s = lower.trim_start_matches('/');
    s = s.strip_prefix("pages/").unwrap_or(s);
    s = s.strip_suffix(".html").unwrap_or(s);

    let mut key = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c);
        } else if !key.ends_with('-') {
            key.push('-');
        }
    }
    let key = key.trim_matches('-');
    if key.is_empty() {
        "page".to_string()
    } else {
        key.to_string()
    }
}

fn title_from_key(key: &str) -> String {
    key.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"))
}

/// Strips Markdown code fences (and any chatter around a fenced block).
pub fn clean_generated(raw: &str) -> String {
    if let Some(caps) = fenced_block_re().captures(raw) {
        return caps[1].trim().to_string();
    }
    let trimmed = raw.trim();
    let without_open = match trimmed.strip_prefix("```") {
        Some(rest) => rest.split_once('\n').map(|(_, body)| body).unwrap_or(""),
        None => trimmed,
    };
    without_open.trim_end().trim_end_matches("```").trim().to_string()
}

fn document_title(document: &str) -> Option<String> {
    title_re()
        .captures(document)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingGenerator {
        calls: AtomicUsize,
        fail_first: bool,
        reply: String,
        last_spec: Mutex<Option<PageSpec>>,
    }

    impl CountingGenerator {
        fn new(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: false,
                reply: reply.to_string(),
                last_spec: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl PageGenerator for CountingGenerator {
        async fn generate(&self, spec: &PageSpec) -> Result<String, CollaboratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_spec.lock().unwrap() = Some(spec.clone());
            tokio::time::sleep(Duration::from_millis(200)).await;
            if self.fail_first && n == 0 {
                return Err("model overloaded".into());
            }
            Ok(self.reply.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_generation() {
        let gen = Arc::new(CountingGenerator::new("<main>Your cart</main>"));
        let synth = PageSynthesizer::new(gen.clone(), 1500);
        let req = PageRequest::default();
        let (a, b) = tokio::join!(synth.ensure_page("cart", &req), synth.ensure_page("/Cart.html", &req));
        assert_eq!(a.unwrap(), "<main>Your cart</main>");
        assert_eq!(b.unwrap(), "<main>Your cart</main>");
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
        assert_eq!(synth.generation_count(), 1);

        synth.ensure_page("cart", &req).await.unwrap();
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
        assert_eq!(synth.cached_keys(), vec!["cart".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_during_generation_leaves_the_cache_empty() {
        let gen = Arc::new(CountingGenerator::new("<main>Your cart</main>"));
        let synth = PageSynthesizer::new(gen.clone(), 1500);
        let req = PageRequest::default();
        let (page, ()) = tokio::join!(synth.ensure_page("cart", &req), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            synth.clear();
        });
        assert_eq!(page.unwrap(), "<main>Your cart</main>");
        assert!(synth.is_empty());
        assert!(synth.get_cached("cart").is_none());

        synth.ensure_page("cart", &req).await.unwrap();
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
        assert_eq!(synth.cached_keys(), vec!["cart".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_after_invalidate_do_not_join_the_stale_generation() {
        let gen = Arc::new(CountingGenerator::new("<main>Checkout</main>"));
        let synth = PageSynthesizer::new(gen.clone(), 1500);
        let req = PageRequest::default();
        let (first, second) = tokio::join!(synth.ensure_page("checkout", &req), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            synth.invalidate("checkout");
            synth.ensure_page("checkout", &req).await
        });
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
        assert_eq!(synth.cached_keys(), vec!["checkout".to_string()]);

        synth.ensure_page("checkout", &req).await.unwrap();
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_shared_but_never_cached() {
        let mut gen = CountingGenerator::new("<main>Checkout</main>");
        gen.fail_first = true;
        let gen = Arc::new(gen);
        let synth = PageSynthesizer::new(gen.clone(), 1500);
        let req = PageRequest::default();

        let (a, b) = tokio::join!(synth.ensure_page("checkout", &req), synth.ensure_page("checkout", &req));
        assert_eq!(a, Err(SynthesisError::Generator("model overloaded".into())));
        assert_eq!(a, b);
        assert!(synth.get_cached("checkout").is_none());

        assert_eq!(synth.ensure_page("checkout", &req).await.unwrap(), "<main>Checkout</main>");
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_output_is_rejected() {
        let synth = PageSynthesizer::new(Arc::new(CountingGenerator::new("```html\n\n```")), 1500);
        let err = synth.ensure_page("about", &PageRequest::default()).await.unwrap_err();
        assert_eq!(err, SynthesisError::EmptyContent("about".into()));
        assert!(synth.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spec_carries_role_styles_and_title() {
        let gen = Arc::new(CountingGenerator::new("<main>Book</main>"));
        let synth = PageSynthesizer::new(gen.clone(), 12);
        let req = PageRequest {
            page_name: None,
            nav_label: Some("Book a table".into()),
            page_type: None,
            document: Some("<html><head><title>Bistro</title><style>body{color:#222;margin:0}</style></head><body></body></html>".into()),
        };
        synth.ensure_page("Book a Table", &req).await.unwrap();
        let spec = gen.last_spec.lock().unwrap().clone().unwrap();
        assert_eq!(spec.page_key, "book-a-table");
        assert_eq!(spec.page_name, "Book A Table");
        assert_eq!(spec.role, PageRole::Booking);
        assert_eq!(spec.style_excerpt, "body{color:#");
        assert_eq!(spec.site_title.as_deref(), Some("Bistro"));
        assert_eq!(spec.nav_label.as_deref(), Some("Book a table"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_and_clear_force_regeneration() {
        let gen = Arc::new(CountingGenerator::new("<main>x</main>"));
        let synth = PageSynthesizer::new(gen.clone(), 1500);
        let req = PageRequest::default();
        synth.ensure_page("pricing", &req).await.unwrap();
        synth.ensure_page("gallery", &req).await.unwrap();
        assert!(synth.invalidate("/pricing"));
        assert!(!synth.invalidate("pricing"));
        synth.ensure_page("pricing", &req).await.unwrap();
        assert_eq!(gen.calls.load(Ordering::SeqCst), 3);
        synth.clear();
        assert!(synth.cached_keys().is_empty());
    }

    #[test]
    fn page_keys_are_normalized() {
        assert_eq!(normalize_page_key("/Checkout.html"), "checkout");
        assert_eq!(normalize_page_key("pages/view cart.html"), "view-cart");
        assert_eq!(normalize_page_key("  Learn -- More!  "), "learn-more");
        assert_eq!(normalize_page_key("///"), "page");
        assert_eq!(normalize_page_key(""), "page");
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(clean_generated("```html\n<main>Hi</main>\n```"), "<main>Hi</main>");
        assert_eq!(
            clean_generated("Here is your page:\n```html\n<main>Hi</main>\n```\nEnjoy!"),
            "<main>Hi</main>"
        );
        assert_eq!(clean_generated("  <main>Plain</main>\n"), "<main>Plain</main>");
    }
}
