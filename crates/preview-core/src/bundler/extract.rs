//! Best-effort markup extraction from component-like (JSX) source.
//!
//! Lossy by contract: the returned markup of the default component is turned
//! into plain HTML by rewriting `className`/`htmlFor`, inlining string-literal
//! expressions and dropping every other `{…}` expression. `None` means nothing
//! renderable was found, which callers handle with a placeholder.

use regex::Regex;
use std::sync::OnceLock;

fn default_export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"export\s+default\s+(function|class|const|\(|[A-Za-z_])").expect("valid regex")
    })
}

fn return_paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(return|=>)\s*\(\s*<").expect("valid regex"))
}

fn bare_return_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"return\s*<").expect("valid regex"))
}

fn jsx_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(className|htmlFor)=").expect("valid regex"))
}

fn fragment_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?>").expect("valid regex"))
}

/// Returns the JSX returned by the default component (or the first component), as HTML.
pub(crate) fn extract_component_markup(source: &str) -> Option<String> {
    let search_from = default_export_re()
        .find(source)
        .map(|m| m.start())
        .unwrap_or(0);
    let jsx = find_returned_jsx(&source[search_from..]).or_else(|| find_returned_jsx(source))?;
    let html = jsx_to_html(&jsx);
    let html = html.trim();
    if html.contains('<') && html.contains('>') {
        Some(html.to_string())
    } else {
        None
    }
}

fn find_returned_jsx(source: &str) -> Option<String> {
    if let Some(m) = return_paren_re().find(source) {
        let open = source[m.start()..].find('(')? + m.start();
        let close = matching_close(source, open, '(', ')')?;
        return Some(source[open + 1..close].to_string());
    }
    // `return <div>…</div>;` without parentheses: take up to the statement end.
    let m = bare_return_re().find(source)?;
    let start = m.end() - 1;
    let end = source[start..].find(";\n").map(|i| start + i).unwrap_or(source.len());
    Some(source[start..end].to_string())
}

/// Index of the delimiter closing the one at `open`, skipping quoted strings.
fn matching_close(source: &str, open: usize, open_ch: char, close_ch: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for (i, ch) in source[open..].char_indices() {
        match quote {
            Some(q) => {
                if ch == q && prev != '\\' {
                    quote = None;
                }
            }
            None => {
                if ch == '"' || ch == '\'' || ch == '`' {
                    // Apostrophes in JSX text ("Don't") are not string openers.
                    if ch != '\'' || !prev.is_alphanumeric() {
                        quote = Some(ch);
                    }
                } else if ch == open_ch {
                    depth += 1;
                } else if ch == close_ch {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(open + i);
                    }
                }
            }
        }
        prev = ch;
    }
    None
}

fn jsx_to_html(jsx: &str) -> String {
    let renamed = jsx_attr_re().replace_all(jsx, |caps: &regex::Captures| match &caps[1] {
        "className" => "class=".to_string(),
        _ => "for=".to_string(),
    });
    let without_fragments = fragment_tag_re().replace_all(&renamed, "");
    replace_expressions(&without_fragments)
}

/// Inlines string-literal `{…}` expressions and drops the rest. An attribute
/// whose value is a dropped expression is removed entirely.
fn replace_expressions(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('{') {
        let (before, from_brace) = rest.split_at(pos);
        let Some(close) = matching_close(from_brace, 0, '{', '}') else {
            out.push_str(before);
            rest = "";
            break;
        };
        let expr = from_brace[1..close].trim();
        let in_attribute = before.ends_with('=');
        match string_literal(expr) {
            Some(text) if in_attribute => {
                out.push_str(before);
                out.push('"');
                out.push_str(&text.replace('"', "&quot;"));
                out.push('"');
            }
            Some(text) => {
                out.push_str(before);
                out.push_str(&text);
            }
            None if in_attribute => {
                out.push_str(strip_attribute_name(before));
            }
            None => out.push_str(before),
        }
        rest = &from_brace[close + 1..];
    }
    out.push_str(rest);
    out
}

fn string_literal(expr: &str) -> Option<String> {
    let mut chars = expr.chars();
    let first = chars.next()?;
    let last = expr.chars().last()?;
    if expr.len() >= 2 && matches!(first, '"' | '\'' | '`') && first == last {
        let inner = &expr[1..expr.len() - 1];
        if first == '`' && inner.contains("${") {
            return None;
        }
        if inner.contains(first) {
            return None;
        }
        return Some(inner.to_string());
    }
    None
}

/// Drops ` name=` from the end of `before`.
fn strip_attribute_name(before: &str) -> &str {
    let without_eq = &before[..before.len() - 1];
    let name_start = without_eq
        .rfind(|c: char| c.is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    without_eq[..name_start].trim_end_matches(|c: char| c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_default_component_markup() {
        let src = r#"
import React, { useState } from 'react';

function Helper() {
  return (<span>helper</span>);
}

export default function App() {
  const [open, setOpen] = useState(false);
  return (
    <div className="hero" onClick={() => setOpen(!open)}>
      <h1>{"Fresh Bread Daily"}</h1>
      <label htmlFor="email">Email</label>
      {open && <p>Hidden</p>}
      <p>Don't miss out</p>
    </div>
  );
}
"#;
        let html = extract_component_markup(src).unwrap();
        assert!(html.starts_with("<div class=\"hero\">"), "{html}");
        assert!(html.contains("<h1>Fresh Bread Daily</h1>"));
        assert!(html.contains("<label for=\"email\">"));
        assert!(html.contains("Don't miss out"));
        assert!(!html.contains("helper"));
        assert!(!html.contains("onClick"));
        assert!(!html.contains('{'));
    }

    #[test]
    fn literal_attribute_expressions_become_quoted_values() {
        let src = "const App = () => (<a href={'/menu'} title={label}>Menu</a>);\nexport default App;";
        let html = extract_component_markup(src).unwrap();
        assert_eq!(html, "<a href=\"/menu\">Menu</a>");
    }

    #[test]
    fn fragments_and_bare_returns_are_handled() {
        let src = "export default function Page() {\n  return <><main>Hi</main></>;\n}\n";
        assert_eq!(extract_component_markup(src).unwrap(), "<main>Hi</main>");
    }

    #[test]
    fn unrenderable_source_yields_none() {
        assert!(extract_component_markup("export const add = (a, b) => a + b;").is_none());
        assert!(extract_component_markup("export default function App() { return null; }").is_none());
    }
}
