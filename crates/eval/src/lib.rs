//! OTA update resolution -- accepts an update query and a bundle store,
//! produces an UPDATE / ROLLBACK decision or nothing.
//!
//! The pipeline for one query:
//! 1. Fetch the platform + channel snapshot from the store
//! 2. Narrow it to enabled bundles whose target admits the device
//! 3. Order candidates (range specificity, then id descending)
//! 4. Select UPDATE / ROLLBACK / rollback-to-baseline / nothing
//! 5. Gate an UPDATE through the device's rollout bucket
//!
//! Every store backend feeds the same pipeline, so decisions cannot differ
//! between backends.

pub mod engine;
pub mod file_url;
pub mod narrow;
pub mod rollout;
pub mod selector;

pub use engine::{resolve, ResolutionEngine, ResolveError, UpdateResponse};
pub use file_url::{FileUrlError, FileUrlResolver, PassthroughResolver, SignedUrlResolver};
pub use selector::Selection;
