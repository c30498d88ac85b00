//! Error types for the CI client, the annotation store, and the translator.
//!
//! Every [`TranslateError`] is rendered by the HTTP layer as a `404` with a
//! plain-text body; the variants exist so callers and logs can tell the
//! cases apart.

/// Failures talking to the CI server or decoding its job configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(String),

    /// The CI host could not be reached (DNS failure, refused connection).
    #[error("CI server unreachable: {0}")]
    Unreachable(String),

    #[error("CI server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("CI request failed: {0}")]
    Transport(String),

    #[error("invalid job configuration: {0}")]
    Xml(String),

    /// Rendering was requested for a job kind the builder does not produce.
    #[error("cannot render configuration for {0} job")]
    UnsupportedKind(String),
}

/// Failures reading or writing annotation records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("annotation record {0} not found")]
    NotFound(String),

    #[error("annotation store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("annotation store request failed: {0}")]
    Transport(String),

    #[error("invalid annotation record: {0}")]
    Decode(String),
}

/// Errors surfaced by BuildConfig operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    /// The request body could not be decoded as a BuildConfig.
    #[error("invalid request body: {0}")]
    Body(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
