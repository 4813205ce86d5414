//! preview-core: the preview control protocol.
//!
//! Renders untrusted generated markup into an isolated surface, classifies the
//! interactions inside it and routes them to local handlers, a remote executor
//! or on-demand page synthesis, while keeping the editor buffer, the virtual
//! file tree and the rendered surface consistent.

mod bundler;
mod classifier;
mod collab;
mod debounce;
mod dispatcher;
mod error;
mod protocol;
mod shared;
mod surface;
mod sync;
mod synth;
mod vfs;

// Shared
pub use error::{CollaboratorError, PreviewError, Result, SynthesisError};
pub use shared::{PreviewConfig, SessionContext, DEFAULT_SESSION_ID};

// Classification
pub use classifier::{
    classify, is_synthesis_candidate, normalize_label, Category, ClassificationResult,
    ElementContext, PageType,
};

// Bundling
pub use bundler::{
    bundle, bundle_or_placeholder, capture_count, detect_kind, escape_html, has_capture,
    strip_injected, style_excerpt, Bundle, BundleOutcome, ScriptBlock, SourceKind, SENTINEL_ATTR,
};

// Wire protocol
pub use protocol::{
    ElementPatch, HandlerKind, Intent, IntentRegistry, LocalAction, ProtocolMessage,
    RejectReason, ResearchPayload, SelectedElement, UnknownIntent, COMMAND_SCROLL_TO_BOOKING,
    MAX_FIELD_LEN, MAX_PAYLOAD_BYTES,
};

// Collaborators
pub use collab::{HostEffects, IntentExecutor, IntentOutcome, PageGenerator, PageRole, PageSpec};
pub use vfs::{
    normalize_path, page_path, ChangeListener, InMemoryFileTree, VirtualFileTree,
    COMPONENT_ENTRY_POINT, HTML_ENTRY_POINT, PAGES_DIR,
};

// Runtime components
pub use debounce::Debouncer;
pub use dispatcher::IntentDispatcher;
pub use surface::{
    validate_patch, validate_selector, ChannelSurface, RenderSurface, RenderSurfaceController,
    SandboxPolicy, SurfaceFrame,
};
pub use sync::{entry_point_for, SourceDocument, SourceSyncManager, SyncStats};
pub use synth::{clean_generated, normalize_page_key, GeneratedPage, PageRequest, PageSynthesizer};
