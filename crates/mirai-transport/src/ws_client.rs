//! WebSocket event stream.
//!
//! One call to [`run_event_stream`] is one connection: it pumps frames into
//! the handler until the server closes the socket and then returns. It never
//! reconnects on its own. Pings are answered here and never reach the
//! handler.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use mirai_core::{ApiError, ApiResult, StreamHandler};

/// Builds the websocket url for `path` (with query) on an http base url.
pub fn stream_url(base_url: &Url, path: &str) -> ApiResult<Url> {
    let scheme = match base_url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    let rest = base_url
        .as_str()
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or_default()
        .trim_end_matches('/');
    let joined = format!("{scheme}://{rest}{path}");
    Url::parse(&joined).map_err(|e| ApiError::InvalidArgument(format!("{joined}: {e}")))
}

/// Connects to `url` and forwards every frame to `handler` until the stream
/// ends.
///
/// `on_close` fires exactly once after a connection was established, however
/// the stream ended. A read error ends the stream with
/// [`ApiError::Network`]; a clean close returns `Ok(())`.
pub async fn run_event_stream(
    url: Url,
    handler: Arc<dyn StreamHandler>,
    heartbeat: Option<Duration>,
) -> ApiResult<()> {
    let heartbeat = heartbeat.filter(|period| !period.is_zero());
    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ApiError::Network(format!("websocket connection failed: {e}")))?;
    info!(path = url.path(), "Event stream connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let period = heartbeat.unwrap_or(Duration::from_secs(3600));
    let mut ticker = interval_at(Instant::now() + period, period);

    let result = loop {
        tokio::select! {
            _ = ticker.tick(), if heartbeat.is_some() => {
                trace!("Sending heartbeat ping");
                if let Err(e) = ws_tx.send(Message::Ping(Default::default())).await {
                    warn!(error = %e, "Heartbeat failed");
                    break Err(ApiError::Network(e.to_string()));
                }
            }

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => forward(&handler, text.as_bytes()).await,
                Some(Ok(Message::Binary(data))) => forward(&handler, &data).await,
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received ping, sending pong");
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) => trace!("Received pong"),
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Server closed event stream");
                    break Ok(());
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Event stream error");
                    break Err(ApiError::Network(e.to_string()));
                }
                None => {
                    info!("Event stream ended");
                    break Ok(());
                }
            }
        }
    };

    let _ = ws_tx.close().await;
    handler.on_close().await;
    result
}

async fn forward(handler: &Arc<dyn StreamHandler>, data: &[u8]) {
    match serde_json::from_slice::<Value>(data) {
        Ok(payload) => handler.on_event(payload).await,
        Err(e) => debug!(error = %e, len = data.len(), "Skipping frame that is not JSON"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Value>>,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl StreamHandler for Recorder {
        async fn on_event(&self, payload: Value) {
            self.events.lock().push(payload);
        }

        async fn on_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_stream_forwards_json_frames_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"BotOnlineEvent","qq":10001}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Close(None)).await.unwrap();

            let mut pongs = 0;
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Pong(_)) {
                    pongs += 1;
                }
            }
            pongs
        });

        let recorder = Arc::new(Recorder::default());
        let url = Url::parse(&format!("ws://{addr}/all?sessionKey=abc&qq=10001")).unwrap();
        let result = run_event_stream(url, recorder.clone(), None).await;

        assert!(result.is_ok());
        let events = recorder.events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "BotOnlineEvent");
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert!(server.await.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_refused_connection_skips_on_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let recorder = Arc::new(Recorder::default());
        let url = Url::parse(&format!("ws://{addr}/all")).unwrap();
        let err = run_event_stream(url, recorder.clone(), Some(Duration::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stream_url_from_http() {
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        let url = stream_url(&base, "/all?sessionKey=abc&qq=10001").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/all?sessionKey=abc&qq=10001");
    }

    #[test]
    fn test_stream_url_from_https_with_prefix() {
        let base = Url::parse("https://bot.example.com/mirai/").unwrap();
        let url = stream_url(&base, "/message?sessionKey=k&qq=1").unwrap();
        assert_eq!(url.as_str(), "wss://bot.example.com/mirai/message?sessionKey=k&qq=1");
        assert_eq!(url.query(), Some("sessionKey=k&qq=1"));
    }
}
