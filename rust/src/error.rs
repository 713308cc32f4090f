use thiserror::Error;

/// Failures reported by the request/response API and the realtime channel.
///
/// None of these are fatal to a conversation screen: the actor turns them into
/// toasts (or debug logs) and leaves the message stream consistent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("backend unavailable")]
    Unavailable,
}
