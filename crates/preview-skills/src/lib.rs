//! Concrete collaborators for the preview host.

pub use preview_core::{IntentExecutor, PageGenerator};

mod intent_executor;
mod page_generator;

pub use intent_executor::{BackendExecutor, BackendMode, MAX_MOCK_CARTS};
pub use page_generator::{LlmMode, LlmPageGenerator};
