//! HTTP transport over reqwest.

use std::path::Path;
#[cfg(feature = "ws-client")]
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder, RequestBuilder, Url};
use serde_json::Value;
use tracing::{debug, trace};

#[cfg(feature = "ws-client")]
use mirai_core::StreamHandler;
use mirai_core::{ApiError, ApiResult, Method, Transport, check_envelope};

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base url of the mirai-api-http server, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Timeout of a single REST request.
    pub timeout: Duration,
    /// Interval between websocket pings; `None` disables them.
    pub heartbeat: Option<Duration>,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(5),
            heartbeat: Some(Duration::from_secs(30)),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A zero interval is treated as `None`.
    pub fn heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat = interval.filter(|period| !period.is_zero());
        self
    }
}

/// [`Transport`] talking to mirai-api-http over HTTP, with websocket event
/// streams when the `ws-client` feature is on.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    #[cfg_attr(not(feature = "ws-client"), allow(dead_code))]
    heartbeat: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidArgument(format!("base url {}: {e}", config.base_url)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidArgument(format!(
                "base url must be http or https, got {}",
                base_url.scheme()
            )));
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            heartbeat: config.heartbeat.filter(|period| !period.is_zero()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins `path` (which may carry a query string) onto the base url.
    pub(crate) fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| ApiError::InvalidArgument(format!("{joined}: {e}")))
    }

    async fn send(&self, method: Method, path: &str, request: RequestBuilder) -> ApiResult<Value> {
        trace!(path, ?method, "Sending request");
        let response = request.send().await.map_err(|e| {
            debug!(path, error = %e, "Request failed");
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Server(format!("HTTP {} on {path}: {text}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Server(format!("invalid JSON from {path}: {e}")))?;
        trace!(path, response = %body, "Received response");
        check_envelope(method, body)
    }
}

/// Flattens a JSON object into url query pairs.
fn query_pairs(query: &Value) -> Vec<(String, String)> {
    let Some(map) = query.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: Value) -> ApiResult<Value> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().extend_pairs(query_pairs(&query));
        self.send(Method::Get, path, self.client.get(url)).await
    }

    async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        let url = self.endpoint(path)?;
        self.send(Method::Post, path, self.client.post(url).json(&body))
            .await
    }

    async fn upload_file(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
        field: &str,
        file: &Path,
    ) -> ApiResult<Value> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        form = form.part(field.to_string(), Part::bytes(bytes).file_name(file_name));

        let url = self.endpoint(path)?;
        self.send(Method::Upload, path, self.client.post(url).multipart(form))
            .await
    }

    #[cfg(feature = "ws-client")]
    async fn open_event_stream(
        &self,
        path: &str,
        handler: Arc<dyn StreamHandler>,
    ) -> ApiResult<()> {
        let url = crate::ws_client::stream_url(&self.base_url, path)?;
        crate::ws_client::run_event_stream(url, handler, self.heartbeat).await
    }
}
