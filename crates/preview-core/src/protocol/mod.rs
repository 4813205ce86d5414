//! Wire protocol between the host and the render surface.
//!
//! The surface executes generated markup, so everything it sends is treated as
//! hostile: [`ProtocolMessage::from_untrusted`] accepts only surface-originated
//! message types, only their structured fields, and only within size bounds.

mod intent;

pub use intent::{HandlerKind, Intent, IntentRegistry, LocalAction, UnknownIntent};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Longest accepted string field (labels, paths, ids, selectors).
pub const MAX_FIELD_LEN: usize = 2048;
/// Longest accepted serialized payload from the surface.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;
const MAX_REQUEST_ID_LEN: usize = 128;

/// Commands the host can ask the surface to perform locally.
pub const COMMAND_SCROLL_TO_BOOKING: &str = "scroll-to-booking";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    /// surface→host: user action classified as an actionable intent.
    #[serde(rename = "INTENT_TRIGGER", rename_all = "camelCase")]
    IntentTrigger {
        intent: String,
        #[serde(default)]
        payload: Value,
        request_id: String,
    },
    /// host→surface: correlated outcome of an intent.
    #[serde(rename = "INTENT_RESULT", rename_all = "camelCase")]
    IntentResult {
        request_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// host→surface: perform a local action (e.g. scroll to the booking form).
    #[serde(rename = "INTENT_COMMAND", rename_all = "camelCase")]
    IntentCommand { command: String, request_id: String },
    /// surface→host: reply to a command.
    #[serde(rename = "INTENT_COMMAND_RESULT", rename_all = "camelCase")]
    IntentCommandResult {
        command: String,
        request_id: String,
        #[serde(default)]
        handled: bool,
    },
    /// surface→host: navigation request.
    #[serde(rename = "preview-nav", rename_all = "camelCase")]
    PreviewNav {
        #[serde(default = "default_nav_intent")]
        intent: String,
        path: String,
        #[serde(default)]
        label: Option<String>,
    },
    /// surface→host: synthesize a page that does not exist yet.
    #[serde(rename = "NAV_PAGE_GENERATE", rename_all = "camelCase")]
    NavPageGenerate {
        page_name: String,
        #[serde(default)]
        page_context: Option<Value>,
        #[serde(default)]
        nav_label: Option<String>,
        request_id: String,
    },
    /// host→surface: synthesized page content.
    #[serde(rename = "NAV_PAGE_READY", rename_all = "camelCase")]
    NavPageReady {
        request_id: String,
        page_name: String,
        page_content: String,
    },
    /// host→surface: synthesis failed.
    #[serde(rename = "NAV_PAGE_ERROR", rename_all = "camelCase")]
    NavPageError {
        request_id: String,
        page_name: String,
        error: String,
    },
    /// surface→host: contextual lookup request.
    #[serde(rename = "RESEARCH_OPEN")]
    ResearchOpen {
        #[serde(default)]
        payload: ResearchPayload,
    },
    /// host→surface: toggle hover/select instrumentation.
    #[serde(rename = "SET_EDIT_MODE")]
    SetEditMode { enabled: bool },
    /// host→surface: mutate one live element in place.
    #[serde(rename = "UPDATE_ELEMENT")]
    UpdateElement { selector: String, patch: ElementPatch },
    /// surface→host: element picked in edit mode.
    #[serde(rename = "ELEMENT_SELECTED")]
    ElementSelected(SelectedElement),
}

fn default_nav_intent() -> String {
    Intent::NavGoto.as_str().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchPayload {
    #[serde(default)]
    pub query: String,
}

/// Direct edit applied to a live element without a full re-render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ElementPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.styles.is_empty() && self.attributes.is_empty()
    }
}

/// Structured payload emitted when an element is clicked in edit mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectedElement {
    pub selector: String,
    pub tag_name: String,
    pub text: String,
    pub classes: Vec<String>,
}

/// Why an inbound message was dropped at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotAnObject,
    MissingType,
    UnexpectedType(String),
    Oversized(&'static str),
    Malformed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotAnObject => f.write_str("message is not an object"),
            RejectReason::MissingType => f.write_str("message has no type"),
            RejectReason::UnexpectedType(t) => write!(f, "type '{}' is not accepted from the surface", t),
            RejectReason::Oversized(field) => write!(f, "field '{}' exceeds its size bound", field),
            RejectReason::Malformed(e) => write!(f, "malformed message: {}", e),
        }
    }
}

impl std::error::Error for RejectReason {}

/// Message types the surface is allowed to send.
const INBOUND_TYPES: [&str; 6] = [
    "INTENT_TRIGGER",
    "INTENT_COMMAND_RESULT",
    "preview-nav",
    "NAV_PAGE_GENERATE",
    "RESEARCH_OPEN",
    "ELEMENT_SELECTED",
];

impl ProtocolMessage {
    /// Validates a raw message from the surface.
    pub fn from_untrusted(raw: &Value) -> Result<Self, RejectReason> {
        let obj = raw.as_object().ok_or(RejectReason::NotAnObject)?;
        let kind = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(RejectReason::MissingType)?;
        if !INBOUND_TYPES.contains(&kind) {
            return Err(RejectReason::UnexpectedType(truncate(kind, 64)));
        }
        if let Some(payload) = obj.get("payload") {
            let size = serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(usize::MAX);
            if size > MAX_PAYLOAD_BYTES {
                return Err(RejectReason::Oversized("payload"));
            }
        }
        let message: ProtocolMessage =
            serde_json::from_value(raw.clone()).map_err(|e| RejectReason::Malformed(e.to_string()))?;
        message.check_bounds()?;
        Ok(message)
    }

    fn check_bounds(&self) -> Result<(), RejectReason> {
        fn field(name: &'static str, value: &str, max: usize) -> Result<(), RejectReason> {
            if value.len() > max {
                Err(RejectReason::Oversized(name))
            } else {
                Ok(())
            }
        }
        fn request_id(value: &str) -> Result<(), RejectReason> {
            if value.trim().is_empty() {
                return Err(RejectReason::Malformed("empty requestId".into()));
            }
            field("requestId", value, MAX_REQUEST_ID_LEN)
        }
        match self {
            ProtocolMessage::IntentTrigger { intent, request_id: id, .. } => {
                field("intent", intent, 128)?;
                request_id(id)
            }
            ProtocolMessage::IntentCommandResult { command, request_id: id, .. } => {
                field("command", command, 128)?;
                request_id(id)
            }
            ProtocolMessage::PreviewNav { intent, path, label } => {
                field("intent", intent, 128)?;
                field("path", path, MAX_FIELD_LEN)?;
                field("label", label.as_deref().unwrap_or_default(), MAX_FIELD_LEN)
            }
            ProtocolMessage::NavPageGenerate {
                page_name,
                page_context,
                nav_label,
                request_id: id,
            } => {
                field("pageName", page_name, MAX_FIELD_LEN)?;
                field("navLabel", nav_label.as_deref().unwrap_or_default(), MAX_FIELD_LEN)?;
                let ctx_len = page_context
                    .as_ref()
                    .and_then(|c| serde_json::to_vec(c).ok())
                    .map(|v| v.len())
                    .unwrap_or(0);
                if ctx_len > MAX_PAYLOAD_BYTES {
                    return Err(RejectReason::Oversized("pageContext"));
                }
                request_id(id)
            }
            ProtocolMessage::ResearchOpen { payload } => field("query", &payload.query, MAX_FIELD_LEN),
            ProtocolMessage::ElementSelected(sel) => {
                field("selector", &sel.selector, MAX_FIELD_LEN)?;
                field("text", &sel.text, MAX_FIELD_LEN)?;
                if sel.classes.len() > 64 {
                    return Err(RejectReason::Oversized("classes"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Wire `type` of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProtocolMessage::IntentTrigger { .. } => "INTENT_TRIGGER",
            ProtocolMessage::IntentResult { .. } => "INTENT_RESULT",
            ProtocolMessage::IntentCommand { .. } => "INTENT_COMMAND",
            ProtocolMessage::IntentCommandResult { .. } => "INTENT_COMMAND_RESULT",
            ProtocolMessage::PreviewNav { .. } => "preview-nav",
            ProtocolMessage::NavPageGenerate { .. } => "NAV_PAGE_GENERATE",
            ProtocolMessage::NavPageReady { .. } => "NAV_PAGE_READY",
            ProtocolMessage::NavPageError { .. } => "NAV_PAGE_ERROR",
            ProtocolMessage::ResearchOpen { .. } => "RESEARCH_OPEN",
            ProtocolMessage::SetEditMode { .. } => "SET_EDIT_MODE",
            ProtocolMessage::UpdateElement { .. } => "UPDATE_ELEMENT",
            ProtocolMessage::ElementSelected(_) => "ELEMENT_SELECTED",
        }
    }

    /// Correlation id carried by this message, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            ProtocolMessage::IntentTrigger { request_id, .. }
            | ProtocolMessage::IntentResult { request_id, .. }
            | ProtocolMessage::IntentCommand { request_id, .. }
            | ProtocolMessage::IntentCommandResult { request_id, .. }
            | ProtocolMessage::NavPageGenerate { request_id, .. }
            | ProtocolMessage::NavPageReady { request_id, .. }
            | ProtocolMessage::NavPageError { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intent_trigger_uses_camel_case_fields() {
        let raw = json!({
            "type": "INTENT_TRIGGER",
            "intent": "cart.add",
            "payload": { "sku": "A1" },
            "requestId": "r-1",
            "__proto__": { "polluted": true }
        });
        let msg = ProtocolMessage::from_untrusted(&raw).unwrap();
        assert_eq!(
            msg,
            ProtocolMessage::IntentTrigger {
                intent: "cart.add".into(),
                payload: json!({ "sku": "A1" }),
                request_id: "r-1".into(),
            }
        );
        assert_eq!(msg.correlation_id(), Some("r-1"));
    }

    #[test]
    fn host_only_types_are_rejected_from_the_surface() {
        let raw = json!({ "type": "INTENT_RESULT", "requestId": "x", "success": true });
        assert_eq!(
            ProtocolMessage::from_untrusted(&raw),
            Err(RejectReason::UnexpectedType("INTENT_RESULT".into()))
        );
        assert_eq!(ProtocolMessage::from_untrusted(&json!("hi")), Err(RejectReason::NotAnObject));
        assert_eq!(ProtocolMessage::from_untrusted(&json!({})), Err(RejectReason::MissingType));
    }

    #[test]
    fn oversized_and_empty_ids_are_rejected() {
        let raw = json!({
            "type": "NAV_PAGE_GENERATE",
            "pageName": "x".repeat(MAX_FIELD_LEN + 1),
            "requestId": "r"
        });
        assert_eq!(ProtocolMessage::from_untrusted(&raw), Err(RejectReason::Oversized("pageName")));
        let raw = json!({ "type": "INTENT_COMMAND_RESULT", "command": "scroll-to-booking", "requestId": " " });
        assert!(matches!(ProtocolMessage::from_untrusted(&raw), Err(RejectReason::Malformed(_))));
    }

    #[test]
    fn preview_nav_defaults_its_intent() {
        let raw = json!({ "type": "preview-nav", "path": "/about", "label": "About" });
        match ProtocolMessage::from_untrusted(&raw).unwrap() {
            ProtocolMessage::PreviewNav { intent, path, .. } => {
                assert_eq!(intent, "nav.goto");
                assert_eq!(path, "/about");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outbound_messages_serialize_with_wire_names() {
        let msg = ProtocolMessage::IntentResult {
            request_id: "r-9".into(),
            success: false,
            data: None,
            error: Some("backend down".into()),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, json!({ "type": "INTENT_RESULT", "requestId": "r-9", "success": false, "error": "backend down" }));
        let patch = ProtocolMessage::UpdateElement {
            selector: "#hero h1".into(),
            patch: ElementPatch {
                text: Some("Hello".into()),
                ..ElementPatch::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "type": "UPDATE_ELEMENT", "selector": "#hero h1", "patch": { "text": "Hello" } })
        );
    }

    #[test]
    fn element_selected_is_a_flat_message() {
        let raw = json!({
            "type": "ELEMENT_SELECTED",
            "selector": "main > h1",
            "tagName": "H1",
            "text": "Welcome",
            "classes": ["title"]
        });
        match ProtocolMessage::from_untrusted(&raw).unwrap() {
            ProtocolMessage::ElementSelected(sel) => {
                assert_eq!(sel.tag_name, "H1");
                assert_eq!(sel.classes, vec!["title".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
