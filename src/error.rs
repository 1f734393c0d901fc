use thiserror::Error;

/// Failures of the quote source.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// Every attempt was rejected or failed.
    #[error("quote source exhausted after {attempts} attempts")]
    SourceExhausted { attempts: u32 },
}

/// Failures of the publish step as a whole. Per-identity failures are
/// recorded in the report instead.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("No authenticated users found. Run /auth first.")]
    NoIdentities,

    #[error("all {attempted} identities failed to publish")]
    AllIdentitiesFailed { attempted: usize },
}

/// Errors from the OAuth consent flow and token endpoint.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("unknown or expired OAuth state")]
    UnknownState,

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("token endpoint responded with {status_code}: {message}")]
    TokenEndpoint { status_code: u16, message: String },

    #[error("identity has no refresh token")]
    MissingRefreshToken,
}
