//! Data model and compatibility primitives for OTA bundle resolution.
//!
//! This crate is pure and synchronous. It knows what a published bundle
//! looks like, how a device describes itself in an update query, and how
//! to decide whether a bundle's compatibility target admits a device:
//!
//! - [`range`]: the version-range grammar used by `targetAppVersion`
//! - [`version`]: coercion of device-reported versions to `major.minor.patch`
//! - [`fingerprint`]: the dual-half native fingerprint scheme
//!
//! Selection, rollout gating and storage live in `ota-eval` and `ota-storage`.

pub mod bundle;
pub mod changeset;
pub mod error;
pub mod fingerprint;
pub mod query;
pub mod range;
pub mod update;
pub mod version;

pub use bundle::{Bundle, BundleId, BundleTarget, Platform, DEFAULT_CHANNEL};
pub use changeset::{Change, ChangeOperation, ChangeSet};
pub use error::{BundleError, QueryError, RangeError};
pub use query::{RawUpdateQuery, UpdateQuery, UpdateStrategy};
pub use range::VersionRange;
pub use update::{UpdateInfo, UpdateStatus};
