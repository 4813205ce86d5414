//! Content bundler: turns arbitrary source into one self-contained document
//! for the render surface.
//!
//! Every bundled document carries a reset stylesheet, an error trap and the
//! interaction-capture script, each tagged with [`SENTINEL_ATTR`]. Tagged
//! blocks are stripped before parsing, so bundling is idempotent: the capture
//! script appears exactly once no matter how often a document is re-bundled.

mod assets;
mod extract;

pub use assets::{CAPTURE_JS, ERROR_TRAP_JS, RESET_CSS, SENTINEL_ATTR};

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    FullDocument,
    Fragment,
    Component,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleOutcome {
    Rendered,
    /// Nothing renderable was found; the document lists the workspace files instead.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    pub src: Option<String>,
    pub script_type: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub kind: SourceKind,
    pub outcome: BundleOutcome,
    /// Body markup with style and script blocks removed.
    pub markup: String,
    /// Concatenated embedded stylesheets.
    pub style: String,
    /// Concatenated inline script code.
    pub script: String,
    /// The self-contained document written into the surface.
    pub document: String,
}

fn injected_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)<(style|script)\b[^>]*\b{}\b[^>]*>.*?</(style|script)\s*>",
            SENTINEL_ATTR
        ))
        .expect("valid regex")
    })
}

fn component_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)(^\s*import\s.+\sfrom\s|\bexport\s+default\b|\bclassName=|\breturn\s*\(\s*<|\buse(State|Effect)\s*\()")
            .expect("valid regex")
    })
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("valid selector"))
}

fn style_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "style")
}

fn script_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "script")
}

fn body_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "body")
}

fn head_keep_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(&SEL, "head link, head meta, head title, head base")
}

/// Classifies source as a full document, an HTML fragment or component-like source.
pub fn detect_kind(source: &str) -> SourceKind {
    let trimmed = source.trim_start();
    let head: String = trimmed.chars().take(2048).collect::<String>().to_ascii_lowercase();
    if head.starts_with("<!doctype") || head.contains("<html") {
        return SourceKind::FullDocument;
    }
    if trimmed.starts_with('<') {
        if trimmed.contains("className=") {
            return SourceKind::Component;
        }
        return SourceKind::Fragment;
    }
    if component_re().is_match(source) {
        SourceKind::Component
    } else {
        SourceKind::Fragment
    }
}

/// Number of capture scripts in `document`.
pub fn capture_count(document: &str) -> usize {
    document
        .matches(&format!("{}=\"capture\"", SENTINEL_ATTR))
        .count()
}

pub fn has_capture(document: &str) -> bool {
    capture_count(document) > 0
}

/// Removes every block previously injected by the bundler.
pub fn strip_injected(source: &str) -> String {
    injected_block_re().replace_all(source, "").into_owned()
}

pub fn bundle(source: &str) -> Bundle {
    bundle_or_placeholder(source, &[])
}

/// Bundles `source`; when nothing renderable can be extracted the result is a
/// placeholder document listing `available_files`.
pub fn bundle_or_placeholder(source: &str, available_files: &[String]) -> Bundle {
    let stripped = strip_injected(source);
    let kind = detect_kind(&stripped);

    let parts = match kind {
        SourceKind::FullDocument => Some(split_document(&stripped)),
        SourceKind::Fragment if !stripped.contains('<') => Some(plain_text_parts(&stripped)),
        SourceKind::Fragment => Some(split_fragment(&stripped)),
        SourceKind::Component => extract::extract_component_markup(&stripped).map(|m| split_fragment(&m)),
    };

    match parts {
        Some(parts) if !parts.is_blank() => {
            let document = assemble(&parts);
            let script = parts
                .scripts
                .iter()
                .filter(|s| s.src.is_none())
                .map(|s| s.code.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            Bundle {
                kind,
                outcome: BundleOutcome::Rendered,
                markup: parts.markup,
                style: parts.style,
                script,
                document,
            }
        }
        _ => {
            tracing::debug!(target: "preview::bundler", kind = ?kind, "no renderable markup; using placeholder");
            let markup = placeholder_markup(available_files);
            let parts = Parts {
                markup: markup.clone(),
                ..Parts::default()
            };
            Bundle {
                kind,
                outcome: BundleOutcome::Placeholder,
                markup,
                style: String::new(),
                script: String::new(),
                document: assemble(&parts),
            }
        }
    }
}

/// Bounded prefix of the styles of `document`, used to keep generated pages on-brand.
pub fn style_excerpt(document: &str, max_chars: usize) -> String {
    let bundled = bundle(document);
    let source = if bundled.style.trim().is_empty() {
        document
    } else {
        bundled.style.as_str()
    };
    source.chars().take(max_chars).collect()
}

#[derive(Debug, Default)]
struct Parts {
    head_extra: String,
    body_attrs: String,
    markup: String,
    style: String,
    scripts: Vec<ScriptBlock>,
}

impl Parts {
    fn is_blank(&self) -> bool {
        self.markup.trim().is_empty() && self.style.trim().is_empty() && self.scripts.is_empty()
    }
}

fn split_document(source: &str) -> Parts {
    let mut html = Html::parse_document(source);
    let mut parts = Parts::default();

    for el in html.select(head_keep_selector()) {
        let meta = el.value().name() == "meta";
        let is_charset = el.value().attr("charset").is_some();
        let is_viewport = el.value().attr("name").map(|n| n.eq_ignore_ascii_case("viewport")).unwrap_or(false);
        if meta && (is_charset || is_viewport) {
            continue;
        }
        parts.head_extra.push_str(&el.html());
        parts.head_extra.push('\n');
    }

    take_styles_and_scripts(&mut html, &mut parts);

    if let Some(body) = html.select(body_selector()).next() {
        for (name, value) in body.value().attrs() {
            let _ = write!(parts.body_attrs, " {}=\"{}\"", name, escape_html(value));
        }
        parts.markup = body.inner_html().trim().to_string();
    }
    parts
}

fn split_fragment(source: &str) -> Parts {
    let mut html = Html::parse_fragment(source);
    let mut parts = Parts::default();
    take_styles_and_scripts(&mut html, &mut parts);
    parts.markup = html.root_element().inner_html().trim().to_string();
    parts
}

fn plain_text_parts(source: &str) -> Parts {
    Parts {
        markup: format!("<pre class=\"preview-plain\">{}</pre>", escape_html(source.trim())),
        ..Parts::default()
    }
}

/// Moves `<style>` text and `<script>` blocks out of the tree, in document order.
fn take_styles_and_scripts(html: &mut Html, parts: &mut Parts) {
    let mut detach = Vec::new();
    let mut styles = Vec::new();
    for el in html.select(style_selector()) {
        styles.push(el.text().collect::<String>().trim().to_string());
        detach.push(el.id());
    }
    for el in html.select(script_selector()) {
        parts.scripts.push(ScriptBlock {
            src: el.value().attr("src").map(str::to_string),
            script_type: el.value().attr("type").map(str::to_string),
            code: el.text().collect::<String>(),
        });
        detach.push(el.id());
    }
    for id in detach {
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }
    parts.style = styles.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n");
}

fn assemble(parts: &Parts) -> String {
    let mut doc = String::with_capacity(parts.markup.len() + CAPTURE_JS.len() + 4096);
    doc.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    doc.push_str("<meta charset=\"utf-8\">\n");
    doc.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = writeln!(doc, "<style {}=\"reset\">{}</style>", SENTINEL_ATTR, RESET_CSS);
    let _ = writeln!(doc, "<script {}=\"error-trap\">{}</script>", SENTINEL_ATTR, ERROR_TRAP_JS);
    doc.push_str(&parts.head_extra);
    if !parts.style.is_empty() {
        let _ = writeln!(doc, "<style>\n{}\n</style>", parts.style);
    }
    let _ = writeln!(doc, "</head>\n<body{}>", parts.body_attrs);
    doc.push_str(&parts.markup);
    doc.push('\n');
    for script in &parts.scripts {
        doc.push_str("<script");
        if let Some(t) = &script.script_type {
            let _ = write!(doc, " type=\"{}\"", escape_html(t));
        }
        if let Some(src) = &script.src {
            let _ = write!(doc, " src=\"{}\"", escape_html(src));
        }
        let _ = writeln!(doc, ">{}</script>", script.code);
    }
    let _ = writeln!(doc, "<script {}=\"capture\">{}</script>", SENTINEL_ATTR, CAPTURE_JS);
    doc.push_str("</body>\n</html>\n");
    doc
}

fn placeholder_markup(available_files: &[String]) -> String {
    let mut out = String::from(
        "<div class=\"preview-placeholder\"><h2>Preview unavailable</h2>\
<p>No renderable markup could be extracted from this source.</p>",
    );
    if available_files.is_empty() {
        out.push_str("<p>The workspace has no files yet.</p>");
    } else {
        out.push_str("<p>Available files:</p><ul>");
        for f in available_files {
            let _ = write!(out, "<li><code>{}</code></li>", escape_html(f));
        }
        out.push_str("</ul>");
    }
    out.push_str("</div>");
    out
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Bakery</title>
  <link rel="stylesheet" href="https://fonts.example.com/inter.css">
  <style>body { background: #fff7ed; } .hero { padding: 4rem; }</style>
</head>
<body class="site">
  <nav><a href="/about">About</a></nav>
  <section class="hero"><h1>Fresh bread</h1></section>
  <script>console.log('ready');</script>
</body>
</html>"#;

    #[test]
    fn detects_source_kinds() {
        assert_eq!(detect_kind(DOC), SourceKind::FullDocument);
        assert_eq!(detect_kind("<section><h1>Hi</h1></section>"), SourceKind::Fragment);
        assert_eq!(detect_kind("export default function App() { return (<div/>); }"), SourceKind::Component);
        assert_eq!(detect_kind("<div className=\"x\">Hi</div>"), SourceKind::Component);
        assert_eq!(detect_kind("just some words"), SourceKind::Fragment);
    }

    #[test]
    fn full_documents_keep_head_assets_and_move_blocks() {
        let b = bundle(DOC);
        assert_eq!(b.kind, SourceKind::FullDocument);
        assert_eq!(b.outcome, BundleOutcome::Rendered);
        assert!(b.style.contains(".hero { padding: 4rem; }"));
        assert!(b.script.contains("console.log('ready')"));
        assert!(!b.markup.contains("<script"));
        assert!(b.markup.contains("<h1>Fresh bread</h1>"));
        assert!(b.document.contains("<title>Bakery</title>"));
        assert!(b.document.contains("inter.css"));
        assert!(b.document.contains("<body class=\"site\">"));
        assert_eq!(b.document.matches("<meta charset").count(), 1);
        assert!(b.document.contains(RESET_CSS));
        assert!(b.document.contains(ERROR_TRAP_JS));
        assert_eq!(capture_count(&b.document), 1);
    }

    #[test]
    fn rebundling_never_duplicates_the_capture_script() {
        let first = bundle(DOC);
        let from_markup = bundle(&first.markup);
        assert_eq!(capture_count(&from_markup.document), 1);
        let from_document = bundle(&first.document);
        assert_eq!(capture_count(&from_document.document), 1);
        assert_eq!(from_document.document.matches(ERROR_TRAP_JS).count(), 1);
        let third = bundle(&from_document.document);
        assert_eq!(capture_count(&third.document), 1);
        assert_eq!(third.style, first.style);
    }

    #[test]
    fn fragments_are_wrapped() {
        let b = bundle("<style>.a{color:red}</style><p class=\"a\">Hello</p>");
        assert_eq!(b.kind, SourceKind::Fragment);
        assert_eq!(b.markup, "<p class=\"a\">Hello</p>");
        assert_eq!(b.style, ".a{color:red}");
        assert!(b.document.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn plain_text_is_escaped() {
        let b = bundle("Fish & \"chips\"");
        assert_eq!(b.markup, "<pre class=\"preview-plain\">Fish &amp; &quot;chips&quot;</pre>");
    }

    #[test]
    fn component_source_is_rendered_best_effort() {
        let src = "export default function App() {\n  return (\n    <main className=\"page\"><h1>{'Menu'}</h1></main>\n  );\n}\n";
        let b = bundle(src);
        assert_eq!(b.kind, SourceKind::Component);
        assert_eq!(b.outcome, BundleOutcome::Rendered);
        assert!(b.markup.contains("<main class=\"page\"><h1>Menu</h1></main>"));
    }

    #[test]
    fn unextractable_component_degrades_to_placeholder() {
        let files = vec!["src/App.jsx".to_string(), "src/<odd>.css".to_string()];
        let b = bundle_or_placeholder("export const x = 1; export default x;", &files);
        assert_eq!(b.outcome, BundleOutcome::Placeholder);
        assert!(b.markup.contains("<code>src/App.jsx</code>"));
        assert!(b.markup.contains("src/&lt;odd&gt;.css"));
        assert_eq!(capture_count(&b.document), 1);
    }

    #[test]
    fn forged_sentinel_blocks_are_stripped() {
        let src = format!("<p>x</p><script {}=\"capture\">alert(1)</script>", SENTINEL_ATTR);
        let b = bundle(&src);
        assert!(!b.document.contains("alert(1)"));
        assert_eq!(capture_count(&b.document), 1);
    }

    #[test]
    fn style_excerpt_is_bounded() {
        let excerpt = style_excerpt(DOC, 20);
        assert_eq!(excerpt.chars().count(), 20);
        assert!(excerpt.starts_with("body {"));
    }
}
