//! Error types surfaced by the client.

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registration cannot proceed: neither an application identifier nor a
    /// custom App ID is configured.
    #[error("no application identifier configured; set one on the builder or via set_app_id")]
    MissingIdentifier,

    /// The operation requires a registered device but no credentials are persisted.
    #[error("the device is not registered for notifications")]
    DeviceCredentials,

    /// Network, TLS, or HTTP-level failure. Always propagated as-is and never
    /// retried by the client itself.
    #[error("request failed: {0}")]
    Transport(#[from] anyhow::Error),

    /// The API answered with a body that could not be decoded as expected.
    #[error("invalid response from the Pushy API: {0}")]
    InvalidResponse(String),

    /// The API reported an explicit `{error}` body.
    #[error("Pushy API error: {0}")]
    Api(String),

    /// The API rejected a topic subscribe/unsubscribe request.
    #[error("topic change rejected: {0}")]
    PubSub(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to encode request body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error building a [`PushyClient`](crate::PushyClient).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to build the HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to open the settings store: {0}")]
    Settings(String),
}
