//! Label pattern tables, checked in a fixed order: ignore, external, form, redirect, nav.

use super::PageType;
use regex::Regex;
use std::sync::OnceLock;

pub(crate) struct LabelPattern {
    pub regex: Regex,
    pub confidence: f32,
    pub page_type: Option<PageType>,
    pub name: &'static str,
}

impl LabelPattern {
    fn new(name: &'static str, pattern: &str, confidence: f32, page_type: Option<PageType>) -> Self {
        // Tables are compile-time constants; a bad pattern is a programming error caught by tests.
        let regex = Regex::new(&format!("(?i){}", pattern))
            .unwrap_or_else(|e| panic!("invalid label pattern {name}: {e}"));
        Self {
            regex,
            confidence,
            page_type,
            name,
        }
    }
}

/// Returns the first pattern in `set` matching `label`.
pub(crate) fn first_match<'a>(set: &'a [LabelPattern], label: &str) -> Option<&'a LabelPattern> {
    set.iter().find(|p| p.regex.is_match(label))
}

pub(crate) fn ignore_patterns() -> &'static [LabelPattern] {
    static SET: OnceLock<Vec<LabelPattern>> = OnceLock::new();
    SET.get_or_init(|| {
        vec![
            LabelPattern::new(
                "sort-filter",
                r"^(sort|sort by\b.*|filter|filters|filter by\b.*|refine|clear( all)?( filters)?|reset( filters)?)$",
                0.95,
                None,
            ),
            LabelPattern::new("close", r"^(close|dismiss|cancel|x|menu|toggle( menu)?)$", 0.95, None),
            LabelPattern::new(
                "pagination",
                r"^(next|prev|previous|first|last|page \d+|load more|show more|show less|see less|read less)$",
                0.9,
                None,
            ),
            LabelPattern::new("number", r"^\d+$", 0.95, None),
            LabelPattern::new("glyph", r"^[^\p{L}\p{N}]+$", 0.95, None),
        ]
    })
}

pub(crate) fn external_patterns() -> &'static [LabelPattern] {
    static SET: OnceLock<Vec<LabelPattern>> = OnceLock::new();
    SET.get_or_init(|| {
        vec![
            LabelPattern::new(
                "social",
                r"\b(facebook|instagram|twitter|linkedin|youtube|tiktok|pinterest|github|whatsapp)\b",
                0.9,
                Some(PageType::Details),
            ),
            LabelPattern::new(
                "visit-site",
                r"^(visit (our )?(website|site|store|shop)|open website|view on \w+)$",
                0.85,
                Some(PageType::Details),
            ),
            LabelPattern::new(
                "call-email",
                r"^(call( us)?( now| today)?|phone( us)?|email( us)?|e-mail( us)?|send (us )?an? email)$",
                0.85,
                Some(PageType::Details),
            ),
        ]
    })
}

pub(crate) fn form_patterns() -> &'static [LabelPattern] {
    static SET: OnceLock<Vec<LabelPattern>> = OnceLock::new();
    SET.get_or_init(|| {
        vec![
            LabelPattern::new("book", r"^(book|reserve|schedule)\b", 0.95, Some(PageType::Booking)),
            LabelPattern::new(
                "appointment",
                r"\b(booking|reservation|appointment|consultation)\b",
                0.9,
                Some(PageType::Booking),
            ),
            LabelPattern::new(
                "quote",
                r"\b(get|request)( a| an| your)?( free)? (quote|estimate)\b",
                0.95,
                Some(PageType::Contact),
            ),
            LabelPattern::new(
                "contact",
                r"^(contact( us)?|get in touch|send( a| us a)? message|send|submit|enquire|inquire)( now| today)?$",
                0.9,
                Some(PageType::Contact),
            ),
            LabelPattern::new(
                "subscribe",
                r"\b(subscribe|sign up for (our )?newsletter|join (our )?(newsletter|mailing list))\b",
                0.9,
                None,
            ),
            LabelPattern::new("add-to-cart", r"\badd to (cart|bag|basket)\b", 0.95, Some(PageType::Cart)),
        ]
    })
}

pub(crate) fn redirect_patterns() -> &'static [LabelPattern] {
    static SET: OnceLock<Vec<LabelPattern>> = OnceLock::new();
    SET.get_or_init(|| {
        vec![
            LabelPattern::new(
                "checkout",
                r"\b(checkout|check out|proceed to (checkout|payment)|buy now|pay now|place (your )?order|complete (your )?(purchase|order))\b",
                1.0,
                Some(PageType::Checkout),
            ),
            LabelPattern::new(
                "cart",
                r"(\b(view|go to|open|see) (your |my )?(cart|bag|basket)\b|^(cart|my cart|bag|basket)$)",
                0.95,
                Some(PageType::Cart),
            ),
            LabelPattern::new(
                "catalog",
                r"^(shop|shop now|shop all|shop the collection|browse( all)?|explore( products| collection)?|order now|start shopping|view (all )?(products|collection|menu)|see (all )?(products|collection))\b",
                0.95,
                Some(PageType::Products),
            ),
            LabelPattern::new(
                "signup",
                r"^(sign ?up|register|create (an |your )?account|join( now| us| free| today)?|get started|start (your )?(free )?trial|try (it )?(for )?free)\b",
                0.9,
                Some(PageType::Signup),
            ),
            LabelPattern::new("login", r"^(log ?in|sign ?in|my account)\b", 0.9, Some(PageType::Login)),
            LabelPattern::new(
                "pricing",
                r"(\b(see|view|compare) (our )?(plans|pricing|prices)\b|\bchoose (a |your )?plan\b)",
                0.9,
                Some(PageType::Pricing),
            ),
            LabelPattern::new(
                "gallery",
                r"\b(view|see|browse) (the |our )?(gallery|portfolio|work|photos)\b",
                0.85,
                Some(PageType::Gallery),
            ),
            LabelPattern::new(
                "learn-more",
                r"\b(learn more|read more|see details|view details|more info|discover more|find out more)\b",
                0.85,
                Some(PageType::Details),
            ),
            LabelPattern::new("about", r"\b(meet (the|our) team|our story)\b", 0.8, Some(PageType::About)),
        ]
    })
}

pub(crate) fn nav_patterns() -> &'static [LabelPattern] {
    static SET: OnceLock<Vec<LabelPattern>> = OnceLock::new();
    SET.get_or_init(|| {
        vec![LabelPattern::new(
            "section",
            r"^(home|about|about us|services|our services|products|menu|faqs?|pricing|plans|blog|news|contact|contact us|team|our team|careers|jobs|portfolio|gallery|testimonials|reviews|locations|events|resources|support|help|shop|store|features|docs|documentation)$",
            0.9,
            None,
        )]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tables_compile() {
        for set in [
            ignore_patterns(),
            external_patterns(),
            form_patterns(),
            redirect_patterns(),
            nav_patterns(),
        ] {
            assert!(!set.is_empty());
            for p in set {
                assert!((0.0..=1.0).contains(&p.confidence), "{}", p.name);
            }
        }
    }

    #[test]
    fn first_match_respects_table_order() {
        let hit = first_match(redirect_patterns(), "Proceed to Checkout").unwrap();
        assert_eq!(hit.name, "checkout");
        assert!(first_match(ignore_patterns(), "Shop Now").is_none());
    }

    #[test]
    fn capture_script_carries_every_label_pattern() {
        // `glyph` uses a Unicode class JS spells differently; nav is the script's fallback.
        let script = crate::bundler::CAPTURE_JS;
        for set in [ignore_patterns(), external_patterns(), form_patterns(), redirect_patterns()] {
            for p in set.iter().filter(|p| p.name != "glyph") {
                let source = p.regex.as_str().trim_start_matches("(?i)");
                assert!(script.contains(source), "capture script is missing label pattern {}", p.name);
            }
        }
    }
}
