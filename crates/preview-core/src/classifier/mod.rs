//! Label classifier: decides what a click inside the preview means.
//!
//! Pure and deterministic. The cascade below is evaluated top to bottom and the
//! first rule that fires wins:
//!
//! | Step | Rule                                   | Result                          |
//! |------|----------------------------------------|---------------------------------|
//! | 1    | `data-no-intent` on the element        | ignore, 1.0                     |
//! | 2    | declared `data-intent`                 | by namespace                    |
//! | 3    | inside nav/footer chrome               | nav, or redirect ×0.95          |
//! | 4-8  | ignore, external, form, redirect, nav  | pattern tables                  |
//! | 9    | raw `href`                             | nav or redirect(details)        |
//! | 10   | nothing matched                        | nav, 0.5                        |

mod patterns;

use crate::protocol::Intent;
use patterns::{
    external_patterns, first_match, form_patterns, ignore_patterns, nav_patterns,
    redirect_patterns,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence a redirect pattern needs to win over navigation chrome.
const NAV_OVERRIDE_THRESHOLD: f32 = 0.9;
/// Penalty applied when a redirect pattern wins inside navigation chrome.
const NAV_OVERRIDE_FACTOR: f32 = 0.95;
const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Nav,
    Redirect,
    Form,
    External,
    Ignore,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Nav => "nav",
            Category::Redirect => "redirect",
            Category::Form => "form",
            Category::External => "external",
            Category::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Semantic role of a page a click may lead to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    Products,
    Checkout,
    Cart,
    Details,
    Signup,
    Login,
    Pricing,
    Gallery,
    About,
    Contact,
    Booking,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Products => "products",
            PageType::Checkout => "checkout",
            PageType::Cart => "cart",
            PageType::Details => "details",
            PageType::Signup => "signup",
            PageType::Login => "login",
            PageType::Pricing => "pricing",
            PageType::Gallery => "gallery",
            PageType::About => "about",
            PageType::Contact => "contact",
            PageType::Booking => "booking",
        }
    }
}

/// Structural facts about the clicked element, derived per click by the capture script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementContext {
    pub tag_name: Option<String>,
    /// Element sits inside `nav`, `header` or `footer` chrome.
    pub is_in_nav: bool,
    /// Value of a `data-intent` attribute, if declared.
    pub declared_intent: Option<String>,
    /// `data-no-intent` suppression flag.
    pub no_intent: bool,
    pub href: Option<String>,
}

impl ElementContext {
    pub fn in_nav() -> Self {
        Self {
            is_in_nav: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub category: Category,
    /// Advisory; used for UI affordances and tie-breaks only.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_page_type: Option<PageType>,
    pub reason: String,
}

impl ClassificationResult {
    fn new(category: Category, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            category,
            confidence,
            suggested_page_type: None,
            reason: reason.into(),
        }
    }

    fn with_page_type(mut self, page_type: Option<PageType>) -> Self {
        self.suggested_page_type = page_type;
        self
    }
}

/// True when a click should lead to a page that may need synthesizing.
pub fn is_synthesis_candidate(result: &ClassificationResult) -> bool {
    result.category == Category::Redirect && result.suggested_page_type.is_some()
}

/// Trims, collapses whitespace and strips decorative arrows around a label.
/// Glyph-only labels are returned unchanged so the ignore table can see them.
pub fn normalize_label(label: &str) -> String {
    let collapsed = label.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = collapsed
        .trim_matches(|c: char| matches!(c, '→' | '←' | '›' | '‹' | '»' | '«' | '>' | '<' | '↗' | '➜'))
        .trim();
    if stripped.is_empty() {
        collapsed
    } else {
        stripped.to_string()
    }
}

/// Classifies a clicked label. See the module docs for the cascade.
pub fn classify(label: &str, context: Option<&ElementContext>) -> ClassificationResult {
    let default_context = ElementContext::default();
    let ctx = context.unwrap_or(&default_context);
    let label = normalize_label(label);

    if ctx.no_intent {
        return ClassificationResult::new(Category::Ignore, 1.0, "element suppresses intents");
    }

    if let Some(result) = ctx.declared_intent.as_deref().and_then(classify_declared_intent) {
        return result;
    }

    if ctx.is_in_nav {
        return classify_in_nav(&label);
    }

    if let Some(result) = classify_by_patterns(&label) {
        return result;
    }

    if let Some(result) = ctx.href.as_deref().and_then(classify_href) {
        return result;
    }

    ClassificationResult::new(Category::Nav, DEFAULT_CONFIDENCE, "no pattern matched; defaulting to nav")
}

fn classify_declared_intent(raw: &str) -> Option<ClassificationResult> {
    let intent: Intent = raw.parse().ok()?;
    let reason = format!("declared intent {}", intent);
    let result = match intent {
        Intent::NavGoto | Intent::NavBack => ClassificationResult::new(Category::Nav, 1.0, reason),
        Intent::LeadSubmit
        | Intent::ContactSubmit
        | Intent::BookingCreate
        | Intent::BookingScroll
        | Intent::NewsletterSubscribe
        | Intent::QuoteRequest
        | Intent::CartAdd => ClassificationResult::new(Category::Form, 1.0, reason),
        Intent::PaymentCheckout | Intent::CheckoutStart => {
            ClassificationResult::new(Category::Redirect, 1.0, reason).with_page_type(Some(PageType::Checkout))
        }
        Intent::CartView => {
            ClassificationResult::new(Category::Redirect, 1.0, reason).with_page_type(Some(PageType::Cart))
        }
        Intent::AuthSignup => {
            ClassificationResult::new(Category::Redirect, 1.0, reason).with_page_type(Some(PageType::Signup))
        }
        Intent::AuthLogin => {
            ClassificationResult::new(Category::Redirect, 1.0, reason).with_page_type(Some(PageType::Login))
        }
        Intent::DemoOpen | Intent::ResearchOpen => ClassificationResult::new(Category::External, 1.0, reason),
        Intent::CartRemove => ClassificationResult::new(Category::Ignore, 1.0, reason),
    };
    Some(result)
}

fn classify_in_nav(label: &str) -> ClassificationResult {
    if let Some(p) = first_match(ignore_patterns(), label) {
        return ClassificationResult::new(Category::Ignore, p.confidence, format!("ignore pattern '{}'", p.name));
    }
    match first_match(redirect_patterns(), label) {
        Some(p) if p.confidence >= NAV_OVERRIDE_THRESHOLD => ClassificationResult::new(
            Category::Redirect,
            p.confidence * NAV_OVERRIDE_FACTOR,
            format!("redirect pattern '{}' inside navigation", p.name),
        )
        .with_page_type(p.page_type),
        _ => ClassificationResult::new(Category::Nav, 0.9, "element is inside navigation"),
    }
}

fn classify_by_patterns(label: &str) -> Option<ClassificationResult> {
    if let Some(p) = first_match(ignore_patterns(), label) {
        return Some(ClassificationResult::new(
            Category::Ignore,
            p.confidence,
            format!("ignore pattern '{}'", p.name),
        ));
    }
    if let Some(p) = first_match(external_patterns(), label) {
        return Some(
            ClassificationResult::new(Category::Redirect, p.confidence, format!("external pattern '{}'", p.name))
                .with_page_type(Some(PageType::Details)),
        );
    }
    if let Some(p) = first_match(form_patterns(), label) {
        return Some(
            ClassificationResult::new(Category::Form, p.confidence, format!("form pattern '{}'", p.name))
                .with_page_type(p.page_type),
        );
    }
    if let Some(p) = first_match(redirect_patterns(), label) {
        return Some(
            ClassificationResult::new(Category::Redirect, p.confidence, format!("redirect pattern '{}'", p.name))
                .with_page_type(p.page_type),
        );
    }
    first_match(nav_patterns(), label).map(|p| {
        ClassificationResult::new(Category::Nav, p.confidence, format!("nav pattern '{}'", p.name))
    })
}

fn classify_href(href: &str) -> Option<ClassificationResult> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with('#') {
        return Some(ClassificationResult::new(Category::Nav, 0.8, "anchor link"));
    }
    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return Some(
            ClassificationResult::new(Category::Redirect, 0.7, "external link target")
                .with_page_type(Some(PageType::Details)),
        );
    }
    if lower.starts_with("javascript:") {
        return None;
    }
    Some(ClassificationResult::new(Category::Nav, 0.7, "internal link target"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_labels_win_regardless_of_context() {
        for label in ["Sort", "Filter", "42", "→", "×", "Next", "Close"] {
            for ctx in [ElementContext::default(), ElementContext::in_nav()] {
                let r = classify(label, Some(&ctx));
                assert_eq!(r.category, Category::Ignore, "{label}");
                assert!(r.confidence >= 0.9, "{label}");
            }
        }
    }

    #[test]
    fn proceed_to_checkout_is_a_full_confidence_redirect() {
        let r = classify("Proceed to Checkout", None);
        assert_eq!(r.category, Category::Redirect);
        assert_eq!(r.suggested_page_type, Some(PageType::Checkout));
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn book_now_is_a_form_not_a_redirect() {
        let ctx = ElementContext::default();
        let r = classify("Book Now", Some(&ctx));
        assert_eq!(r.category, Category::Form);
        assert_eq!(r.suggested_page_type, Some(PageType::Booking));
    }

    #[test]
    fn about_us_in_nav_is_nav() {
        let r = classify("About Us", Some(&ElementContext::in_nav()));
        assert_eq!(r.category, Category::Nav);
    }

    #[test]
    fn shop_now_in_nav_redirects_at_reduced_confidence() {
        let r = classify("Shop Now", Some(&ElementContext::in_nav()));
        assert_eq!(r.category, Category::Redirect);
        assert_eq!(r.suggested_page_type, Some(PageType::Products));
        assert!((r.confidence - 0.95 * 0.95).abs() < 1e-6);
    }

    #[test]
    fn low_confidence_redirect_does_not_override_nav() {
        let r = classify("Learn More", Some(&ElementContext::in_nav()));
        assert_eq!(r.category, Category::Nav);
    }

    #[test]
    fn suppression_beats_declared_intent() {
        let ctx = ElementContext {
            no_intent: true,
            declared_intent: Some("cart.add".into()),
            ..ElementContext::default()
        };
        let r = classify("Add to cart", Some(&ctx));
        assert_eq!(r.category, Category::Ignore);
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn declared_intents_map_by_namespace() {
        let declared = |intent: &str| ElementContext {
            declared_intent: Some(intent.into()),
            ..ElementContext::default()
        };
        assert_eq!(classify("Anything", Some(&declared("nav.goto"))).category, Category::Nav);
        assert_eq!(classify("Anything", Some(&declared("booking.create"))).category, Category::Form);
        let pay = classify("Anything", Some(&declared("payment.checkout")));
        assert_eq!(pay.category, Category::Redirect);
        assert_eq!(pay.suggested_page_type, Some(PageType::Checkout));
        // Unknown declarations fall through to the label tables.
        assert_eq!(classify("Sort", Some(&declared("foo.bar"))).category, Category::Ignore);
    }

    #[test]
    fn external_phrasing_redirects_to_details() {
        let r = classify("Follow us on Instagram", None);
        assert_eq!(r.category, Category::Redirect);
        assert_eq!(r.suggested_page_type, Some(PageType::Details));
        assert_eq!(classify("Call Now", None).suggested_page_type, Some(PageType::Details));
    }

    #[test]
    fn form_patterns_cover_contact_quote_subscribe_and_cart() {
        for label in ["Get a Free Quote", "Contact Us", "Subscribe", "Add to Cart"] {
            assert_eq!(classify(label, None).category, Category::Form, "{label}");
        }
    }

    #[test]
    fn redirect_patterns_carry_page_types() {
        let cases = [
            ("View Cart", PageType::Cart),
            ("Shop Now", PageType::Products),
            ("Sign Up", PageType::Signup),
            ("Log in", PageType::Login),
            ("See Plans", PageType::Pricing),
            ("Learn more →", PageType::Details),
        ];
        for (label, page_type) in cases {
            let r = classify(label, None);
            assert_eq!(r.category, Category::Redirect, "{label}");
            assert_eq!(r.suggested_page_type, Some(page_type), "{label}");
            assert!(is_synthesis_candidate(&r));
        }
    }

    #[test]
    fn href_fallbacks() {
        let with_href = |href: &str| ElementContext {
            href: Some(href.into()),
            ..ElementContext::default()
        };
        assert_eq!(classify("Zebra", Some(&with_href("#menu"))).category, Category::Nav);
        let ext = classify("Zebra", Some(&with_href("mailto:hi@example.com")));
        assert_eq!(ext.category, Category::Redirect);
        assert_eq!(ext.suggested_page_type, Some(PageType::Details));
        assert_eq!(classify("Zebra", Some(&with_href("/team.html"))).category, Category::Nav);
    }

    #[test]
    fn unknown_labels_default_to_low_confidence_nav() {
        let r = classify("Quantum Llama", None);
        assert_eq!(r.category, Category::Nav);
        assert_eq!(r.confidence, 0.5);
        assert!(!is_synthesis_candidate(&r));
    }

    #[test]
    fn classification_is_deterministic() {
        let ctx = ElementContext::in_nav();
        assert_eq!(classify("Shop Now", Some(&ctx)), classify("Shop Now", Some(&ctx)));
    }

    #[test]
    fn normalize_label_strips_arrows_but_keeps_glyph_only_labels() {
        assert_eq!(normalize_label("  Learn   more  → "), "Learn more");
        assert_eq!(normalize_label("→"), "→");
    }
}
