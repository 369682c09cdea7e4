mod apply;
mod caching;
pub mod conformance;
mod error;
mod json;
mod memory;
mod scope;
mod sqlite;
mod traits;

pub use caching::CachingStore;
pub use error::StorageError;
pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use scope::{BundleFilter, BundlePage, BundleScope, BundleSnapshot};
pub use sqlite::SqliteStore;
pub use traits::BundleStore;
