//! Transport capability traits.
//!
//! # Overview
//!
//! The session manager and command facade only ever talk to an
//! `Arc<dyn Transport>`; which network stack sits behind it is decided by
//! whoever constructs the [`Bot`](crate::bot::Bot).
//!
//! | Capability | Method | Notes |
//! |-----------|--------|-------|
//! | REST query | [`get`](Transport::get) | `query` is a JSON object flattened into url parameters |
//! | REST command | [`post`](Transport::post) | JSON body |
//! | File upload | [`upload_file`](Transport::upload_file) | multipart form |
//! | Event stream | [`open_event_stream`](Transport::open_event_stream) | pushes frames into a [`StreamHandler`] |
//!
//! Every method returns the checked response payload (see
//! [`check_envelope`](crate::error::check_envelope)) or a typed
//! [`ApiError`](crate::error::ApiError).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Receives frames from an open event stream.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Called once per received frame with its decoded JSON.
    async fn on_event(&self, payload: Value);

    /// Called exactly once when the remote end closes the stream.
    async fn on_close(&self) {}
}

/// Network access to a mirai-api-http server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a GET request.
    async fn get(&self, path: &str, query: Value) -> ApiResult<Value>;

    /// Sends a POST request with a JSON body.
    async fn post(&self, path: &str, body: Value) -> ApiResult<Value>;

    /// Uploads a local file as a multipart form.
    ///
    /// `field` names the file part; `fields` are sent as plain text parts.
    async fn upload_file(
        &self,
        _path: &str,
        _fields: Vec<(String, String)>,
        _field: &str,
        _file: &Path,
    ) -> ApiResult<Value> {
        Err(ApiError::NotSupported("file upload"))
    }

    /// Opens a long-lived event stream and pumps it until the remote end
    /// closes it.
    ///
    /// `path` includes the query string. The stream is never retried here;
    /// callers that want a new stream call this again. Dropping the returned
    /// future closes the connection.
    async fn open_event_stream(
        &self,
        _path: &str,
        _handler: Arc<dyn StreamHandler>,
    ) -> ApiResult<()> {
        Err(ApiError::NotSupported("event streams"))
    }
}

/// Shared transport handle.
pub type BoxedTransport = Arc<dyn Transport>;
