use thiserror::Error;

/// Failures surfaced by the tagging pipeline and the relay.
///
/// `MissingCredential` and `InvalidTagValue` abort a batch before any network
/// call. Everything else is recorded on the failing item and the batch moves
/// on. `RateLimited` only appears once every 429 retry has been used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("no API token configured")]
    MissingCredential,

    #[error("API token expired, update it with `bulktag token set`")]
    CredentialExpired,

    #[error("rate limited by remote service")]
    RateLimited,

    #[error("could not resolve {filename}: {reason}")]
    ResolutionFailed { filename: String, reason: String },

    #[error("update failed ({status}): {body}")]
    UpdateFailed { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid {value_type} value: {value:?}")]
    InvalidTagValue { value_type: String, value: String },

    #[error("relay error: {0}")]
    Relay(String),
}

impl TagError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TagError::CredentialExpired)
    }
}

pub type Result<T, E = TagError> = std::result::Result<T, E>;
