use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error response from a [`RemoteSource`](crate::RemoteSource).
///
/// Follows the status conventions of HTTP-flavoured APIs, so `code` is the
/// primary discriminant: `404` for a missing object, `403` for a denied request,
/// `409` for a conflicting write and `410` for a resource version that is no longer served.
#[derive(Error, Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    pub code: u16,
}

impl ErrorResponse {
    fn failure(code: u16, reason: &str, message: impl Into<String>) -> Self {
        Self {
            status: "Failure".into(),
            message: message.into(),
            reason: reason.into(),
            code,
        }
    }

    /// The requested object does not exist
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(404, "NotFound", message)
    }

    /// The caller is not allowed to perform the request
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::failure(403, "Forbidden", message)
    }

    /// The write conflicts with an existing object
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::failure(409, "AlreadyExists", message)
    }

    /// The requested resource version is too old to be served
    pub fn gone(message: impl Into<String>) -> Self {
        Self::failure(410, "Expired", message)
    }

    /// Whether this response signals that the requested resource version has expired
    pub fn is_gone(&self) -> bool {
        self.code == 410
    }
}

/// Possible errors returned by a [`RemoteSource`](crate::RemoteSource)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The source answered with an error status
    #[error("ApiError: {0} ({0:?})")]
    Api(#[source] ErrorResponse),

    /// The source could not be reached, or the connection broke mid-request
    #[error("ConnectionError: {0}")]
    Connection(String),

    /// Request parameters were rejected before anything was sent
    #[error("Request validation failed with {0}")]
    Validation(String),
}

impl Error {
    fn code(&self) -> Option<u16> {
        match self {
            Error::Api(resp) => Some(resp.code),
            _ => None,
        }
    }

    /// The object was not found
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(404)
    }

    /// The request was refused
    pub fn is_forbidden(&self) -> bool {
        self.code() == Some(403)
    }

    /// The resource version used by the request is too old, and a full re-list is required
    pub fn is_gone(&self) -> bool {
        self.code() == Some(410)
    }
}

impl From<ErrorResponse> for Error {
    fn from(resp: ErrorResponse) -> Self {
        Error::Api(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorResponse};

    #[test]
    fn error_kinds_follow_status_code() {
        assert!(Error::from(ErrorResponse::not_found("pods \"a\" not found")).is_not_found());
        assert!(Error::from(ErrorResponse::forbidden("nope")).is_forbidden());
        assert!(Error::from(ErrorResponse::gone("too old")).is_gone());
        assert!(!Error::Connection("reset by peer".into()).is_gone());
    }

    #[test]
    fn error_response_roundtrips_with_defaults() {
        let resp: ErrorResponse = serde_json::from_str(r#"{"status":"Failure","code":410}"#).unwrap();
        assert!(resp.is_gone());
        assert_eq!(resp.message, "");
    }
}
