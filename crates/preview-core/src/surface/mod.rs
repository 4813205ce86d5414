//! Render surface controller: owns the single isolated surface, writes bundled
//! documents into it and drives edit mode.

use crate::bundler::{self, BundleOutcome};
use crate::debounce::Debouncer;
use crate::error::{PreviewError, Result};
use crate::protocol::{ElementPatch, ProtocolMessage, SelectedElement, MAX_FIELD_LEN};
use crate::vfs::VirtualFileTree;
use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sandbox tokens for the surface. Same-origin and top-navigation are never granted.
pub struct SandboxPolicy;

impl SandboxPolicy {
    pub const TOKENS: [&'static str; 3] = ["allow-scripts", "allow-forms", "allow-modals"];

    /// Value of the iframe `sandbox` attribute.
    pub fn attribute() -> &'static str {
        "allow-scripts allow-forms allow-modals"
    }

    pub fn permits(token: &str) -> bool {
        Self::TOKENS.contains(&token)
    }
}

/// Transport to the real sandbox.
#[async_trait::async_trait]
pub trait RenderSurface: Send + Sync {
    async fn write_document(&self, document: String) -> Result<()>;

    async fn post_message(&self, message: ProtocolMessage) -> Result<()>;
}

/// Frame delivered to whatever hosts the sandbox (e.g. the gateway's SSE stream).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceFrame {
    Document { document: String },
    Message { message: ProtocolMessage },
}

/// Surface that forwards frames over a tokio channel.
pub struct ChannelSurface {
    tx: mpsc::Sender<SurfaceFrame>,
}

impl ChannelSurface {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<SurfaceFrame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl RenderSurface for ChannelSurface {
    async fn write_document(&self, document: String) -> Result<()> {
        self.tx
            .send(SurfaceFrame::Document { document })
            .await
            .map_err(|_| PreviewError::SurfaceClosed)
    }

    async fn post_message(&self, message: ProtocolMessage) -> Result<()> {
        self.tx
            .send(SurfaceFrame::Message { message })
            .await
            .map_err(|_| PreviewError::SurfaceClosed)
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    edit_mode: bool,
    selected: Option<SelectedElement>,
    current_page: Option<String>,
    last_outcome: Option<BundleOutcome>,
}

pub struct RenderSurfaceController {
    surface: Arc<dyn RenderSurface>,
    files: Option<Arc<dyn VirtualFileTree>>,
    debouncer: Debouncer,
    state: Mutex<SurfaceState>,
    renders: AtomicU64,
    me: Weak<RenderSurfaceController>,
}

impl RenderSurfaceController {
    pub fn new(surface: Arc<dyn RenderSurface>, render_debounce: Duration) -> Arc<Self> {
        Self::build(surface, None, render_debounce)
    }

    /// Controller whose placeholder documents list the files of `files`.
    pub fn with_files(
        surface: Arc<dyn RenderSurface>,
        files: Arc<dyn VirtualFileTree>,
        render_debounce: Duration,
    ) -> Arc<Self> {
        Self::build(surface, Some(files), render_debounce)
    }

    fn build(
        surface: Arc<dyn RenderSurface>,
        files: Option<Arc<dyn VirtualFileTree>>,
        render_debounce: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            surface,
            files,
            debouncer: Debouncer::new(render_debounce),
            state: Mutex::new(SurfaceState::default()),
            renders: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    /// Bundles `source` and writes it into the surface immediately.
    pub async fn render_now(&self, source: &str) -> Result<BundleOutcome> {
        let outcome = self.write_bundled(source).await?;
        self.with_state(|s| s.current_page = None);
        Ok(outcome)
    }

    /// Debounced [`render_now`](Self::render_now); only the last source within the window is rendered.
    pub fn schedule_render(&self, source: String) {
        let me = self.me.clone();
        self.debouncer.schedule(async move {
            let Some(controller) = me.upgrade() else {
                return;
            };
            if let Err(e) = controller.render_now(&source).await {
                tracing::warn!(target: "preview::surface", error = %e, "scheduled render failed");
            }
        });
    }

    /// Renders a synthesized or hand-written secondary page.
    pub async fn show_page(&self, page_name: &str, content: &str) -> Result<BundleOutcome> {
        self.debouncer.cancel();
        let outcome = self.write_bundled(content).await?;
        self.with_state(|s| s.current_page = Some(page_name.to_string()));
        tracing::debug!(target: "preview::surface", page = %page_name, "page shown");
        Ok(outcome)
    }

    pub async fn set_edit_mode(&self, enabled: bool) -> Result<()> {
        self.with_state(|s| {
            s.edit_mode = enabled;
            if !enabled {
                s.selected = None;
            }
        });
        self.surface
            .post_message(ProtocolMessage::SetEditMode { enabled })
            .await
    }

    /// Stores an `ELEMENT_SELECTED` payload. Ignored outside edit mode.
    pub fn handle_selection(&self, selection: SelectedElement) -> Result<bool> {
        validate_selector(&selection.selector)?;
        let accepted = self.with_state(|s| {
            if s.edit_mode {
                s.selected = Some(selection);
            }
            s.edit_mode
        });
        Ok(accepted)
    }

    pub async fn update_element(&self, selector: &str, patch: ElementPatch) -> Result<()> {
        validate_selector(selector)?;
        validate_patch(&patch)?;
        self.surface
            .post_message(ProtocolMessage::UpdateElement {
                selector: selector.to_string(),
                patch,
            })
            .await
    }

    pub async fn post_message(&self, message: ProtocolMessage) -> Result<()> {
        self.surface.post_message(message).await
    }

    pub fn edit_mode(&self) -> bool {
        self.with_state(|s| s.edit_mode)
    }

    pub fn selected(&self) -> Option<SelectedElement> {
        self.with_state(|s| s.selected.clone())
    }

    /// Secondary page on display; `None` while the main document is shown.
    pub fn current_page(&self) -> Option<String> {
        self.with_state(|s| s.current_page.clone())
    }

    pub fn last_outcome(&self) -> Option<BundleOutcome> {
        self.with_state(|s| s.last_outcome)
    }

    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Acquire)
    }

    async fn write_bundled(&self, source: &str) -> Result<BundleOutcome> {
        let files = self.files.as_ref().map(|f| f.paths()).unwrap_or_default();
        let bundle = bundler::bundle_or_placeholder(source, &files);
        self.surface.write_document(bundle.document).await?;
        self.renders.fetch_add(1, Ordering::AcqRel);
        self.with_state(|s| s.last_outcome = Some(bundle.outcome));
        tracing::debug!(target: "preview::surface", kind = ?bundle.kind, outcome = ?bundle.outcome, "document written");
        Ok(bundle.outcome)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SurfaceState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

fn attribute_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_:][-A-Za-z0-9_:.]*$").expect("valid regex"))
}

fn style_property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-{0,2}[A-Za-z][-A-Za-z0-9]*$").expect("valid regex"))
}

pub fn validate_selector(selector: &str) -> Result<()> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(PreviewError::InvalidSelector("empty selector".into()));
    }
    if trimmed.len() > MAX_FIELD_LEN {
        return Err(PreviewError::InvalidSelector("selector too long".into()));
    }
    if trimmed.contains('<') {
        return Err(PreviewError::InvalidSelector("selector contains markup".into()));
    }
    Ok(())
}

pub fn validate_patch(patch: &ElementPatch) -> Result<()> {
    if patch.is_empty() {
        return Err(PreviewError::InvalidPatch("patch changes nothing".into()));
    }
    if patch.text.as_ref().map(|t| t.len() > MAX_FIELD_LEN * 8).unwrap_or(false) {
        return Err(PreviewError::InvalidPatch("text too long".into()));
    }
    for (name, value) in &patch.styles {
        if !style_property_re().is_match(name) {
            return Err(PreviewError::InvalidPatch(format!("invalid style property '{}'", name)));
        }
        let lower = value.to_ascii_lowercase();
        if value.len() > MAX_FIELD_LEN || lower.contains("javascript:") || lower.contains("expression(") {
            return Err(PreviewError::InvalidPatch(format!("invalid value for '{}'", name)));
        }
    }
    for (name, value) in &patch.attributes {
        if !attribute_name_re().is_match(name) {
            return Err(PreviewError::InvalidPatch(format!("invalid attribute '{}'", name)));
        }
        let lower_name = name.to_ascii_lowercase();
        if lower_name.starts_with("on") || lower_name == "srcdoc" {
            return Err(PreviewError::InvalidPatch(format!("attribute '{}' is not editable", name)));
        }
        if value.len() > MAX_FIELD_LEN || value.trim_start().to_ascii_lowercase().starts_with("javascript:") {
            return Err(PreviewError::InvalidPatch(format!("invalid value for '{}'", name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::InMemoryFileTree;
    use std::collections::BTreeMap;

    fn controller() -> (Arc<RenderSurfaceController>, mpsc::Receiver<SurfaceFrame>) {
        let (surface, rx) = ChannelSurface::new(32);
        (RenderSurfaceController::new(Arc::new(surface), Duration::from_millis(300)), rx)
    }

    #[test]
    fn sandbox_never_grants_same_origin() {
        let attr = SandboxPolicy::attribute();
        assert!(!attr.contains("allow-same-origin"));
        assert!(!attr.contains("allow-top-navigation"));
        assert!(SandboxPolicy::permits("allow-forms"));
        assert_eq!(attr.split(' ').collect::<Vec<_>>(), SandboxPolicy::TOKENS.to_vec());
    }

    #[tokio::test]
    async fn render_now_writes_a_bundled_document() {
        let (c, mut rx) = controller();
        let outcome = c.render_now("<h1>Hello</h1>").await.unwrap();
        assert_eq!(outcome, BundleOutcome::Rendered);
        match rx.recv().await.unwrap() {
            SurfaceFrame::Document { document } => {
                assert!(document.contains("<h1>Hello</h1>"));
                assert_eq!(bundler::capture_count(&document), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.render_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_renders_are_debounced() {
        let (c, mut rx) = controller();
        for i in 0..5 {
            c.schedule_render(format!("<p>rev {i}</p>"));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        match rx.try_recv().unwrap() {
            SurfaceFrame::Document { document } => assert!(document.contains("rev 4")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(c.render_count(), 1);
    }

    #[tokio::test]
    async fn placeholder_lists_tree_files() {
        let (surface, mut rx) = ChannelSurface::new(4);
        let tree = Arc::new(InMemoryFileTree::new());
        tree.write("src/App.jsx", "export const x = 1;");
        let c = RenderSurfaceController::with_files(Arc::new(surface), tree, Duration::from_millis(10));
        let outcome = c.render_now("export default function App() { return null; }").await.unwrap();
        assert_eq!(outcome, BundleOutcome::Placeholder);
        match rx.recv().await.unwrap() {
            SurfaceFrame::Document { document } => assert!(document.contains("<code>src/App.jsx</code>")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_mode_gates_selection() {
        let (c, mut rx) = controller();
        let sel = SelectedElement {
            selector: "body > h1:nth-of-type(1)".into(),
            tag_name: "H1".into(),
            ..SelectedElement::default()
        };
        assert!(!c.handle_selection(sel.clone()).unwrap());
        assert!(c.selected().is_none());

        c.set_edit_mode(true).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            SurfaceFrame::Message { message: ProtocolMessage::SetEditMode { enabled: true } }
        ));
        assert!(c.handle_selection(sel.clone()).unwrap());
        assert_eq!(c.selected(), Some(sel));

        c.set_edit_mode(false).await.unwrap();
        assert!(c.selected().is_none());
    }

    #[tokio::test]
    async fn update_element_validates_selector_and_patch() {
        let (c, mut rx) = controller();
        let text = ElementPatch {
            text: Some("New headline".into()),
            ..ElementPatch::default()
        };
        assert!(matches!(
            c.update_element("  ", text.clone()).await,
            Err(PreviewError::InvalidSelector(_))
        ));
        assert!(matches!(
            c.update_element("<img src=x>", text.clone()).await,
            Err(PreviewError::InvalidSelector(_))
        ));
        assert!(matches!(
            c.update_element("h1", ElementPatch::default()).await,
            Err(PreviewError::InvalidPatch(_))
        ));
        let mut attributes = BTreeMap::new();
        attributes.insert("onClick".to_string(), "alert(1)".to_string());
        let handler = ElementPatch {
            attributes,
            ..ElementPatch::default()
        };
        assert!(matches!(c.update_element("h1", handler).await, Err(PreviewError::InvalidPatch(_))));

        c.update_element("#hero h1", text).await.unwrap();
        match rx.recv().await.unwrap() {
            SurfaceFrame::Message {
                message: ProtocolMessage::UpdateElement { selector, patch },
            } => {
                assert_eq!(selector, "#hero h1");
                assert_eq!(patch.text.as_deref(), Some("New headline"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_page_tracks_the_current_page() {
        let (c, _rx) = controller();
        c.show_page("cart", "<main>Cart</main>").await.unwrap();
        assert_eq!(c.current_page().as_deref(), Some("cart"));
        c.render_now("<main>Home</main>").await.unwrap();
        assert!(c.current_page().is_none());
    }

    #[tokio::test]
    async fn closed_surface_is_reported() {
        let (c, rx) = controller();
        drop(rx);
        assert!(matches!(c.render_now("<p>x</p>").await, Err(PreviewError::SurfaceClosed)));
    }
}
