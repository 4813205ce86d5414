//! Source synchronization: keeps the editor buffer, the virtual file tree and
//! the rendered surface in agreement without update cycles.
//!
//! A programmatic tree write records the path and content it is writing; tree
//! listeners run synchronously, so the echo of our own write is recognized
//! while that record is set, and only if the tree still holds exactly what we
//! wrote. A concurrent write by someone else is never mistaken for an echo.
//! Echoes arriving later are dropped because their content equals the buffer.
//! Editing the buffer cancels a pending tree → buffer pull, and a pull never
//! overwrites buffer edits that are still waiting to be written.

use crate::bundler::{detect_kind, SourceKind};
use crate::debounce::Debouncer;
use crate::surface::RenderSurfaceController;
use crate::vfs::{normalize_path, VirtualFileTree, COMPONENT_ENTRY_POINT, HTML_ENTRY_POINT};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// The editable buffer and what it was classified as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDocument {
    pub content: String,
    pub kind: SourceKind,
    pub entry_point: String,
    pub revision: u64,
}

impl Default for SourceDocument {
    fn default() -> Self {
        Self {
            content: String::new(),
            kind: SourceKind::Fragment,
            entry_point: HTML_ENTRY_POINT.to_string(),
            revision: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Buffer → tree writes.
    pub tree_writes: u64,
    /// Tree → buffer copies.
    pub buffer_writes: u64,
    /// Tree notifications ignored as echoes of our own writes.
    pub suppressed: u64,
}

/// Entry point that holds content of `kind`.
pub fn entry_point_for(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::FullDocument | SourceKind::Fragment => HTML_ENTRY_POINT,
        SourceKind::Component => COMPONENT_ENTRY_POINT,
    }
}

pub struct SourceSyncManager {
    tree: Arc<dyn VirtualFileTree>,
    surface: Option<Arc<RenderSurfaceController>>,
    document: watch::Sender<SourceDocument>,
    /// `(path, content)` of the tree write in progress.
    writing: Mutex<Option<(String, String)>>,
    to_tree: Debouncer,
    to_buffer: Debouncer,
    tree_writes: AtomicU64,
    buffer_writes: AtomicU64,
    suppressed: AtomicU64,
    me: Weak<SourceSyncManager>,
}

impl SourceSyncManager {
    /// Creates the manager and subscribes it to `tree`. Settled changes are
    /// re-rendered through `surface` when one is given.
    pub fn new(
        tree: Arc<dyn VirtualFileTree>,
        surface: Option<Arc<RenderSurfaceController>>,
        debounce: Duration,
    ) -> Arc<Self> {
        let (document, _) = watch::channel(SourceDocument::default());
        let manager = Arc::new_cyclic(|me| Self {
            tree: Arc::clone(&tree),
            surface,
            document,
            writing: Mutex::new(None),
            to_tree: Debouncer::new(debounce),
            to_buffer: Debouncer::new(debounce),
            tree_writes: AtomicU64::new(0),
            buffer_writes: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            me: me.clone(),
        });

        let weak = Arc::downgrade(&manager);
        tree.on_change(Arc::new(move |path: &str| {
            if let Some(manager) = weak.upgrade() {
                manager.on_tree_change(path);
            }
        }));
        manager
    }

    /// Records an editor change; the tree is updated once edits settle.
    pub fn edit_buffer(&self, content: impl Into<String>) {
        let content = content.into();
        let kind = detect_kind(&content);
        self.document.send_modify(|doc| {
            doc.kind = kind;
            doc.entry_point = entry_point_for(kind).to_string();
            doc.content = content;
            doc.revision += 1;
        });
        self.to_buffer.cancel();
        let me = self.me.clone();
        self.to_tree.schedule(async move {
            if let Some(manager) = me.upgrade() {
                manager.write_to_tree();
            }
        });
    }

    /// Writes the buffer to its entry point now, cancelling any pending flush.
    pub fn flush_to_tree(&self) -> bool {
        self.to_tree.cancel();
        self.write_to_tree()
    }

    fn write_to_tree(&self) -> bool {
        let doc = self.document.borrow().clone();
        if doc.revision == 0 {
            return false;
        }
        if self.tree.read(&doc.entry_point).as_deref() == Some(doc.content.as_str()) {
            return false;
        }

        self.set_writing(Some((doc.entry_point.clone(), doc.content.clone())));
        self.tree.write(&doc.entry_point, &doc.content);
        self.set_writing(None);

        self.tree_writes.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(target: "preview::sync", path = %doc.entry_point, revision = doc.revision, kind = ?doc.kind, "buffer written to tree");
        self.refresh_surface(doc.content);
        true
    }

    fn set_writing(&self, write: Option<(String, String)>) {
        match self.writing.lock() {
            Ok(mut slot) => *slot = write,
            Err(poisoned) => *poisoned.into_inner() = write,
        }
    }

    /// True when the change at `path` is our own in-progress write.
    fn is_own_echo(&self, path: &str) -> bool {
        let writing = match self.writing.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match writing {
            Some((written_path, content)) => {
                written_path == path && self.tree.read(path).as_deref() == Some(content.as_str())
            }
            None => false,
        }
    }

    fn on_tree_change(&self, path: &str) {
        let path = normalize_path(path);
        if self.is_own_echo(&path) {
            self.suppressed.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(target: "preview::sync", path = %path, "suppressed echo of own write");
            return;
        }
        if !self.watches(&path) {
            return;
        }
        let me = self.me.clone();
        self.to_buffer.schedule(async move {
            if let Some(manager) = me.upgrade() {
                manager.pull_from_tree(&path);
            }
        });
    }

    /// Only the current entry point is watched; before the first edit either entry point qualifies.
    fn watches(&self, path: &str) -> bool {
        let doc = self.document.borrow();
        if doc.revision == 0 && doc.content.is_empty() {
            path == HTML_ENTRY_POINT || path == COMPONENT_ENTRY_POINT
        } else {
            path == doc.entry_point
        }
    }

    fn pull_from_tree(&self, path: &str) {
        if self.to_tree.is_pending() {
            tracing::debug!(target: "preview::sync", path = %path, "buffer has unsaved edits; tree change not pulled");
            return;
        }
        let Some(content) = self.tree.read(path) else {
            return;
        };
        if self.document.borrow().content == content {
            self.suppressed.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(target: "preview::sync", path = %path, "tree content already in buffer");
            return;
        }
        let kind = detect_kind(&content);
        self.document.send_modify(|doc| {
            doc.content = content.clone();
            doc.kind = kind;
            doc.entry_point = path.to_string();
            doc.revision += 1;
        });
        self.buffer_writes.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(target: "preview::sync", path = %path, "tree change copied into buffer");
        self.refresh_surface(content);
    }

    fn refresh_surface(&self, content: String) {
        if let Some(surface) = &self.surface {
            surface.schedule_render(content);
        }
    }

    pub fn buffer(&self) -> String {
        self.document.borrow().content.clone()
    }

    pub fn document(&self) -> SourceDocument {
        self.document.borrow().clone()
    }

    /// Observes buffer changes (the editor side of the gateway).
    pub fn subscribe(&self) -> watch::Receiver<SourceDocument> {
        self.document.subscribe()
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            tree_writes: self.tree_writes.load(Ordering::Acquire),
            buffer_writes: self.buffer_writes.load(Ordering::Acquire),
            suppressed: self.suppressed.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{ChannelSurface, SurfaceFrame};
    use crate::vfs::InMemoryFileTree;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn manager() -> (Arc<SourceSyncManager>, Arc<InMemoryFileTree>) {
        let tree = Arc::new(InMemoryFileTree::new());
        (SourceSyncManager::new(tree.clone(), None, DEBOUNCE), tree)
    }

    #[tokio::test(start_paused = true)]
    async fn quick_edits_produce_one_tree_write() {
        let (sync, tree) = manager();
        for i in 0..10 {
            sync.edit_buffer(format!("<p>draft {i}</p>"));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(tree.write_count(), 0);
        tokio::time::sleep(DEBOUNCE * 2).await;

        assert_eq!(tree.write_count(), 1);
        assert_eq!(tree.read(HTML_ENTRY_POINT).as_deref(), Some("<p>draft 9</p>"));
        let stats = sync.stats();
        assert_eq!(stats.tree_writes, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.buffer_writes, 0);
        assert_eq!(sync.document().revision, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn full_documents_land_byte_identical_in_index_html() {
        let (sync, tree) = manager();
        let doc = "<!DOCTYPE html>\n<html><head><title>Shop</title>\n<style>h1 { color: teal }</style></head>\r\n<body>\t<h1>Hi</h1>  </body></html>\n";
        sync.edit_buffer(doc);
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(tree.read(HTML_ENTRY_POINT).as_deref(), Some(doc));
        assert_eq!(sync.document().kind, SourceKind::FullDocument);
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(sync.stats().buffer_writes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn components_go_to_the_component_entry_point() {
        let (sync, tree) = manager();
        let src = "export default function App() {\n  return (<h1>Hi</h1>);\n}\n";
        sync.edit_buffer(src);
        assert!(sync.flush_to_tree());
        assert_eq!(tree.read(COMPONENT_ENTRY_POINT).as_deref(), Some(src));
        assert!(tree.read(HTML_ENTRY_POINT).is_none());
        assert!(!sync.flush_to_tree());
    }

    #[tokio::test(start_paused = true)]
    async fn direct_entry_point_edit_is_copied_once() {
        let (sync, tree) = manager();
        sync.edit_buffer("<p>v1</p>");
        tokio::time::sleep(DEBOUNCE * 2).await;
        let updates = sync.subscribe();

        tree.write("/index.html", "<p>v2 from the file tree</p>");
        tree.write("styles.css", "p { margin: 0 }");
        tokio::time::sleep(DEBOUNCE * 2).await;

        assert_eq!(sync.buffer(), "<p>v2 from the file tree</p>");
        assert_eq!(sync.stats().buffer_writes, 1);
        assert_eq!(sync.stats().tree_writes, 1);
        assert!(updates.has_changed().unwrap());

        // The buffer change must not bounce back into the tree.
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(tree.write_count(), 3);
        assert_eq!(sync.stats().buffer_writes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_echoes_with_equal_content_are_ignored() {
        let (sync, tree) = manager();
        sync.edit_buffer("<p>same</p>");
        tokio::time::sleep(DEBOUNCE * 2).await;
        // Delayed echo of content the buffer already holds.
        tree.remove(HTML_ENTRY_POINT);
        tree.write(HTML_ENTRY_POINT, "<p>same</p>");
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(sync.stats().buffer_writes, 0);
        assert_eq!(sync.stats().suppressed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn user_edit_during_a_pending_pull_wins() {
        let (sync, tree) = manager();
        sync.edit_buffer("<p>v1</p>");
        tokio::time::sleep(DEBOUNCE * 2).await;

        tree.write(HTML_ENTRY_POINT, "<p>external</p>");
        tokio::time::sleep(Duration::from_millis(100)).await;
        sync.edit_buffer("<p>user</p>");
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(sync.buffer(), "<p>user</p>");
        assert_eq!(tree.read(HTML_ENTRY_POINT).as_deref(), Some("<p>user</p>"));
        assert_eq!(sync.stats().buffer_writes, 0);
        assert_eq!(sync.stats().tree_writes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pull_skips_while_buffer_edits_are_unsaved() {
        let (sync, tree) = manager();
        sync.edit_buffer("<p>v1</p>");
        tokio::time::sleep(DEBOUNCE * 2).await;

        sync.edit_buffer("<p>typing</p>");
        tree.write(HTML_ENTRY_POINT, "<p>external</p>");
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(sync.buffer(), "<p>typing</p>");
        assert_eq!(tree.read(HTML_ENTRY_POINT).as_deref(), Some("<p>typing</p>"));
    }

    /// Tree where another writer lands on the same path while our write is in progress.
    struct RacingTree {
        inner: InMemoryFileTree,
        race: std::sync::Mutex<Option<String>>,
    }

    impl VirtualFileTree for RacingTree {
        fn write(&self, path: &str, content: &str) {
            self.inner.write(path, content);
            let racing = self.race.lock().unwrap().take();
            if let Some(other) = racing {
                self.inner.write(path, &other);
            }
        }
        fn read(&self, path: &str) -> Option<String> {
            self.inner.read(path)
        }
        fn paths(&self) -> Vec<String> {
            self.inner.paths()
        }
        fn on_change(&self, listener: crate::vfs::ChangeListener) {
            self.inner.on_change(listener)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_external_write_is_not_taken_for_an_echo() {
        let tree = Arc::new(RacingTree {
            inner: InMemoryFileTree::new(),
            race: std::sync::Mutex::new(None),
        });
        let sync = SourceSyncManager::new(tree.clone(), None, DEBOUNCE);
        sync.edit_buffer("<p>v1</p>");
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(sync.stats().suppressed, 1);

        *tree.race.lock().unwrap() = Some("<p>from another writer</p>".to_string());
        sync.edit_buffer("<p>v2</p>");
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(sync.stats().suppressed, 2);
        assert_eq!(sync.stats().buffer_writes, 1);
        assert_eq!(sync.buffer(), "<p>from another writer</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn settled_changes_refresh_the_surface() {
        let tree = Arc::new(InMemoryFileTree::new());
        let (channel, mut frames) = ChannelSurface::new(8);
        let surface = RenderSurfaceController::new(Arc::new(channel), DEBOUNCE);
        let sync = SourceSyncManager::new(tree.clone(), Some(surface.clone()), DEBOUNCE);

        sync.edit_buffer("<h1>one</h1>");
        sync.edit_buffer("<h1>two</h1>");
        tokio::time::sleep(DEBOUNCE * 3).await;

        match frames.try_recv().unwrap() {
            SurfaceFrame::Document { document } => assert!(document.contains("<h1>two</h1>")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(frames.try_recv().is_err());
        assert_eq!(surface.render_count(), 1);
    }
}
