//! Error taxonomy for mirai-api-http calls.
//!
//! Every outbound call resolves to an [`ApiResult`]. Errors produced from the
//! server's numeric status codes go through [`ApiError::from_code`], which is
//! the single place that table lives.

use serde_json::Value;
use thiserror::Error;

// =============================================================================
// API Errors
// =============================================================================

/// Error type for every call made against mirai-api-http.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server could not be reached or the request timed out.
    #[error("unable to reach mirai-api-http: {0}")]
    Network(String),

    /// Credential rejected, bot unknown or session not verified.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Session is missing or has expired.
    #[error("session error: {0}")]
    Session(String),

    /// The bot lacks the privilege required by the call.
    #[error("insufficient privilege: {0}")]
    Privilege(String),

    /// The message target does not exist.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// The server rejected the arguments or url.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Non-success HTTP status or a malformed response envelope.
    #[error("server error: {0}")]
    Server(String),

    /// A nonzero status code that is not part of the known table.
    #[error("unrecognized status code {code}: {message}")]
    UnrecognizedCode { code: i64, message: String },

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A caller-supplied argument cannot be sent as-is.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Local I/O failure (e.g. reading a file for upload).
    #[error("I/O error: {0}")]
    Io(String),

    /// The transport does not provide this capability.
    #[error("transport does not support {0}")]
    NotSupported(&'static str),
}

impl ApiError {
    /// Maps a nonzero server status code to its error kind.
    ///
    /// `message` is the server-supplied `msg` field, used only for codes
    /// outside the known table.
    pub fn from_code(code: i64, message: Option<&str>) -> Self {
        match code {
            1 => Self::Authentication("incorrect verify key".into()),
            2 => Self::Authentication("bot does not exist".into()),
            3 => Self::Session("session does not exist or has expired".into()),
            4 => Self::Authentication("session is not verified".into()),
            5 => Self::UnknownTarget("message target does not exist".into()),
            10 => Self::Privilege("bot does not have the required privilege".into()),
            400 => Self::BadRequest("bad request, check arguments and url".into()),
            _ => Self::UnrecognizedCode {
                code,
                message: message.unwrap_or("unknown status code").to_string(),
            },
        }
    }

    /// Whether the failure can be recovered by a fresh handshake.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Authentication(_) | Self::Session(_)
        )
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Response Envelope
// =============================================================================

/// Kind of request a response came back from; they treat a missing `code`
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    /// Multipart upload; the server replies with the bare payload.
    Upload,
}

/// Checks the `{ "code": .., ...payload }` envelope of a decoded response.
///
/// GET and upload responses often carry bare payloads, so a missing code is
/// success. A JSON POST response always carries one; its absence means the
/// server sent nothing useful.
pub fn check_envelope(method: Method, body: Value) -> ApiResult<Value> {
    let code = body.get("code").and_then(Value::as_i64);
    match (code, method) {
        (Some(0), _) | (None, Method::Get | Method::Upload) => Ok(body),
        (None, Method::Post) => Err(ApiError::Server("empty response".into())),
        (Some(code), _) => {
            let message = body.get("msg").and_then(Value::as_str);
            Err(ApiError::from_code(code, message))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
