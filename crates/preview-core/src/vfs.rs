//! Virtual file tree: path → content, with synchronous change notification.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Entry point for HTML documents and fragments.
pub const HTML_ENTRY_POINT: &str = "index.html";
/// Entry point for component-like source.
pub const COMPONENT_ENTRY_POINT: &str = "src/App.jsx";
/// Directory holding synthesized and hand-written secondary pages.
pub const PAGES_DIR: &str = "pages";

/// Called with the normalized path after every content change.
pub type ChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

/// File tree collaborator. Listeners run synchronously inside `write`, which is
/// what lets the sync manager's re-entrancy flag suppress echoes.
pub trait VirtualFileTree: Send + Sync {
    fn write(&self, path: &str, content: &str);

    fn read(&self, path: &str) -> Option<String>;

    fn paths(&self) -> Vec<String>;

    fn on_change(&self, listener: ChangeListener);

    /// Content of the first conventional entry point that exists.
    fn read_entry_point(&self) -> Option<String> {
        [HTML_ENTRY_POINT, COMPONENT_ENTRY_POINT]
            .iter()
            .find_map(|p| self.read(p))
    }
}

/// Strips leading `/` and `./` so `/index.html`, `./index.html` and `index.html` agree.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.trim();
    loop {
        if let Some(rest) = p.strip_prefix("./") {
            p = rest;
        } else if let Some(rest) = p.strip_prefix('/') {
            p = rest;
        } else {
            break;
        }
    }
    p.to_string()
}

/// Path of a secondary page for a normalized page key.
pub fn page_path(page_key: &str) -> String {
    format!("{}/{}.html", PAGES_DIR, page_key)
}

#[derive(Default)]
pub struct InMemoryFileTree {
    files: RwLock<BTreeMap<String, String>>,
    listeners: Mutex<Vec<ChangeListener>>,
    writes: AtomicU64,
}

impl InMemoryFileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that changed content.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        let path = normalize_path(path);
        let removed = self.files.write().ok()?.remove(&path);
        if removed.is_some() {
            self.notify(&path);
        }
        removed
    }

    fn notify(&self, path: &str) {
        // Clone out so a listener may write back without deadlocking.
        let listeners: Vec<ChangeListener> = match self.listeners.lock() {
            Ok(l) => l.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(path);
        }
    }
}

impl VirtualFileTree for InMemoryFileTree {
    fn write(&self, path: &str, content: &str) {
        let path = normalize_path(path);
        let changed = match self.files.write() {
            Ok(mut files) => {
                let unchanged = files.get(&path).map(|c| c == content).unwrap_or(false);
                if !unchanged {
                    files.insert(path.clone(), content.to_string());
                }
                !unchanged
            }
            Err(_) => false,
        };
        if changed {
            self.writes.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(target: "preview::vfs", path = %path, bytes = content.len(), "file written");
            self.notify(&path);
        }
    }

    fn read(&self, path: &str) -> Option<String> {
        let path = normalize_path(path);
        self.files.read().ok()?.get(&path).cloned()
    }

    fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn on_change(&self, listener: ChangeListener) {
        if let Ok(mut l) = self.listeners.lock() {
            l.push(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize_path("/index.html"), "index.html");
        assert_eq!(normalize_path("./src/App.jsx"), "src/App.jsx");
        assert_eq!(page_path("cart"), "pages/cart.html");
    }

    #[test]
    fn listeners_fire_once_per_content_change() {
        let tree = InMemoryFileTree::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        tree.on_change(Arc::new(move |p: &str| sink.lock().unwrap().push(p.to_string())));

        tree.write("/index.html", "<p>a</p>");
        tree.write("index.html", "<p>a</p>");
        tree.write("styles.css", "body{}");

        assert_eq!(*seen.lock().unwrap(), vec!["index.html".to_string(), "styles.css".to_string()]);
        assert_eq!(tree.write_count(), 2);
        assert_eq!(tree.read_entry_point().as_deref(), Some("<p>a</p>"));
        assert_eq!(tree.paths(), vec!["index.html".to_string(), "styles.css".to_string()]);
    }

    #[test]
    fn entry_point_falls_back_to_component_source() {
        let tree = InMemoryFileTree::new();
        assert!(tree.read_entry_point().is_none());
        tree.write(COMPONENT_ENTRY_POINT, "export default function App() {}");
        assert!(tree.read_entry_point().unwrap().starts_with("export default"));
        assert!(tree.remove(COMPONENT_ENTRY_POINT).is_some());
        assert!(tree.read_entry_point().is_none());
    }
}
