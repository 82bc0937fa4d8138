//! Scripted in-memory [`Transport`] for tests.
//!
//! Responses are looked up per path: one-shot responses queued with
//! [`MockTransport::respond_once`] win, then the standing response set with
//! [`MockTransport::respond`], then a bare `{ "code": 0 }`. Every call is
//! recorded and can be inspected afterwards.
//!
//! Event streams are scripted too. Each call to `open_event_stream` takes
//! the next script; a script either fails to connect or emits its frames and
//! then closes or stays open. With no scripts left the stream stays open
//! until dropped.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::endpoints;
use crate::error::{ApiError, ApiResult};
use crate::transport::{StreamHandler, Transport};

/// Kind of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Get,
    Post,
    Upload,
    Stream,
}

/// One call made against the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub path: String,
    pub payload: Value,
}

enum StreamScript {
    Frames(Vec<Value>),
    Open(Vec<Value>),
    Fail(ApiError),
}

#[derive(Default)]
pub struct MockTransport {
    once: Mutex<HashMap<String, VecDeque<ApiResult<Value>>>>,
    standing: Mutex<HashMap<String, ApiResult<Value>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose `/verify` hands out `session_key`.
    pub fn with_session(session_key: &str) -> Self {
        let mock = Self::new();
        mock.respond(endpoints::VERIFY, json!({ "code": 0, "session": session_key }));
        mock
    }

    /// Sets the standing response for `path`.
    pub fn respond(&self, path: &str, response: Value) {
        self.standing.lock().insert(path.to_string(), Ok(response));
    }

    /// Sets a standing error for `path`.
    pub fn respond_err(&self, path: &str, error: ApiError) {
        self.standing.lock().insert(path.to_string(), Err(error));
    }

    /// Queues a response used by the next call to `path` only.
    pub fn respond_once(&self, path: &str, response: ApiResult<Value>) {
        self.once
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queues an event stream session that emits `frames` and then closes.
    pub fn push_stream(&self, frames: Vec<Value>) {
        self.streams.lock().push_back(StreamScript::Frames(frames));
    }

    /// Queues an event stream session that emits `frames` and then stays
    /// open until dropped.
    pub fn push_open_stream(&self, frames: Vec<Value>) {
        self.streams.lock().push_back(StreamScript::Open(frames));
    }

    /// Queues an event stream session that fails to connect.
    pub fn push_stream_failure(&self, error: ApiError) {
        self.streams.lock().push_back(StreamScript::Fail(error));
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls made to `path`, in order. Stream paths are matched without
    /// their query string.
    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.path.split('?').next() == Some(path))
            .cloned()
            .collect()
    }

    fn record(&self, kind: CallKind, path: &str, payload: Value) {
        self.calls.lock().push(RecordedCall {
            kind,
            path: path.to_string(),
            payload,
        });
    }

    fn lookup(&self, path: &str) -> ApiResult<Value> {
        if let Some(response) = self.once.lock().get_mut(path).and_then(VecDeque::pop_front) {
            return response;
        }
        self.standing
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Ok(json!({ "code": 0 })))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str, query: Value) -> ApiResult<Value> {
        self.record(CallKind::Get, path, query);
        self.lookup(path)
    }

    async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        self.record(CallKind::Post, path, body);
        self.lookup(path)
    }

    async fn upload_file(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
        field: &str,
        file: &Path,
    ) -> ApiResult<Value> {
        let fields: serde_json::Map<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.record(
            CallKind::Upload,
            path,
            json!({ "fields": fields, "field": field, "file": file.display().to_string() }),
        );
        self.lookup(path)
    }

    async fn open_event_stream(
        &self,
        path: &str,
        handler: Arc<dyn StreamHandler>,
    ) -> ApiResult<()> {
        self.record(CallKind::Stream, path, Value::Null);
        let script = self.streams.lock().pop_front();
        match script {
            Some(StreamScript::Fail(error)) => Err(error),
            Some(StreamScript::Frames(frames)) => {
                for frame in frames {
                    handler.on_event(frame).await;
                }
                handler.on_close().await;
                Ok(())
            }
            Some(StreamScript::Open(frames)) => {
                for frame in frames {
                    handler.on_event(frame).await;
                }
                std::future::pending::<()>().await;
                Ok(())
            }
            None => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
