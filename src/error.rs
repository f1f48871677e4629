/// Crate error type

use thiserror::Error;

/// The common error type used by this crate.
///
/// Errors are `Clone` so a single in-flight refresh can hand the same
/// outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No usable credential is available without user interaction
    #[error("Not signed in")]
    NotSignedIn,

    /// The identity provider rejected a request
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// A network call failed before a response could be interpreted
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The document store or local key-value storage failed
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// A call across the JavaScript bridge failed
    #[error("Browser bridge call failed: {0}")]
    Bridge(String),

    /// The extension configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A record could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A versioned write lost a race with another writer
    #[error("Write conflict on {0}")]
    Conflict(String),

    #[error("Label already exists: {0}")]
    LabelExists(String),

    #[error("Label not found: {0}")]
    LabelNotFound(String),

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// Caller supplied input that can never succeed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Slack integration is not configured")]
    SlackNotConfigured,

    #[error("Slack is not connected")]
    SlackNotConnected,

    /// Slack answered with `ok: false`
    #[error("Slack error: {0}")]
    Slack(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Http(error.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::InvalidInput(format!("bad url: {}", error))
    }
}

impl From<Error> for wasm_bindgen::JsValue {
    fn from(error: Error) -> Self {
        wasm_bindgen::JsValue::from_str(&error.to_string())
    }
}
