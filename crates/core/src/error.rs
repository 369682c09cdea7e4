/// A bundle record that violates the structural invariants of the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    /// Neither `targetAppVersion` nor `fingerprintHash` is set.
    #[error("bundle {id} has neither targetAppVersion nor fingerprintHash")]
    MissingTarget { id: String },

    /// Both `targetAppVersion` and `fingerprintHash` are set.
    #[error("bundle {id} sets both targetAppVersion and fingerprintHash")]
    ConflictingTarget { id: String },

    /// `rolloutPercentage` is outside `0..=100`.
    #[error("bundle {id} has rolloutPercentage {percentage}, expected 0-100")]
    RolloutOutOfRange { id: String, percentage: u8 },

    /// The channel name is empty.
    #[error("bundle {id} has an empty channel")]
    EmptyChannel { id: String },
}

/// An update query that cannot be handed to the resolution engine.
///
/// These are client errors: transports reject the request before any
/// store access happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A required identifying field is absent or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Neither an app version nor a fingerprint hash was supplied.
    #[error("missing required field: appVersion or fingerprintHash")]
    MissingStrategy,

    /// The platform is not one of `ios` / `android`.
    #[error("invalid platform '{0}', expected 'ios' or 'android'")]
    InvalidPlatform(String),

    /// A bundle id field is not a UUID.
    #[error("invalid {field} '{value}': not a UUID")]
    InvalidBundleId { field: &'static str, value: String },
}

/// A version range expression that does not follow the range grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version range '{range}': {reason}")]
pub struct RangeError {
    pub range: String,
    pub reason: String,
}

impl RangeError {
    pub(crate) fn new(range: &str, reason: impl Into<String>) -> Self {
        Self {
            range: range.to_string(),
            reason: reason.into(),
        }
    }
}
