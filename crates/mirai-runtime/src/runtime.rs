//! The connection supervisor.
//!
//! [`MiraiRuntime`] owns one [`Bot`] and one [`Dispatcher`] and keeps events
//! flowing between them:
//!
//! ```text
//!   handshake ──► ingestion task ──► mpsc ──► dispatch loop ──► handlers
//!      ▲            (ws stream or polling)          │
//!      └──────────── channel closed ◄───────────────┘
//! ```
//!
//! - Handshakes are retried with a fixed delay until one succeeds.
//! - The ingestion task decodes frames and queues the events in arrival order.
//! - The dispatch loop handles one event completely before taking the next.
//! - When the ingestion task ends the channel closes; the loop waits for
//!   the task and starts over with a fresh handshake. A failed source, or
//!   one that closed sooner than the reconnect delay, waits that delay first.
//! - When a call marks the session lost, ingestion is stopped, the events
//!   already queued are dispatched and the loop starts over.
//! - Shutdown interrupts the backoff sleep and the wait for events, then
//!   releases the session.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mirai_runtime::MiraiRuntime;
//!
//! let mut runtime = MiraiRuntime::builder()
//!     .config_file("mirai.toml")
//!     .build()?;
//!
//! runtime.dispatcher_mut().on_message(echo);
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mirai_core::{ApiResult, Bot, BoxedTransport, Event, StreamHandler, decode, endpoints};
use mirai_framework::{Dispatcher, Handler};
use mirai_transport::{HttpTransport, HttpTransportConfig};
use serde_json::Value;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, trace, warn};

use crate::config::{
    ConfigLoader, ConfigResult, IngestionConfig, IngestionMode, MiraiConfig, validate_config,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Keeps one bot connected and its events dispatched.
pub struct MiraiRuntime {
    config: MiraiConfig,
    bot: Arc<Bot>,
    dispatcher: Dispatcher,
    span: Span,
    running: AtomicBool,
}

impl MiraiRuntime {
    /// Creates a runtime builder that loads configuration from files and the
    /// environment.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime talking HTTP to the configured server.
    ///
    /// Installs the global log subscriber described by `config.logging`.
    pub fn from_config(config: &MiraiConfig) -> RuntimeResult<Self> {
        validate_config(config)?;

        #[cfg(not(feature = "ws-client"))]
        {
            if config.ingestion.mode == IngestionMode::WebSocket {
                return Err(crate::config::ConfigError::validation(
                    "websocket ingestion needs the ws-client feature",
                )
                .into());
            }
        }

        logging::init_from_config(&config.logging);

        let transport = HttpTransport::new(
            HttpTransportConfig::new(config.connection.base_url.clone())
                .timeout(config.connection.timeout())
                .heartbeat(config.ingestion.heartbeat()),
        )?;

        info!(
            base_url = %config.connection.base_url,
            qq = config.connection.qq,
            mode = ?config.ingestion.mode,
            "Runtime initialized from configuration"
        );

        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a runtime on top of an existing transport.
    pub fn with_transport(config: &MiraiConfig, transport: BoxedTransport) -> RuntimeResult<Self> {
        validate_config(config)?;

        let span = info_span!("mirai", qq = config.connection.qq);
        let bot = Bot::new(
            transport,
            config.connection.verify_key.clone(),
            config.connection.qq,
        )
        .with_span(info_span!(parent: &span, "bot"));
        let dispatcher = Dispatcher::new().with_span(info_span!(parent: &span, "dispatcher"));

        Ok(Self {
            config: config.clone(),
            bot: Arc::new(bot),
            dispatcher,
            span,
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MiraiConfig {
        &self.config
    }

    /// The bot, for calls made outside of handlers.
    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handlers are registered here before the runtime starts.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Shorthand for [`Dispatcher::on_message`].
    pub fn on_message(&mut self, handler: impl Handler) -> &mut Self {
        self.dispatcher.on_message(handler);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs until Ctrl+C or SIGTERM, then releases the session.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!(parent: &self.span, "Mirai runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes, then releases the session.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let stop = async {
            shutdown.await;
            info!(parent: &self.span, "Shutdown requested");
            token.cancel();
        };
        tokio::join!(self.serve(token.clone()), stop);

        let released = self.bot.release().await;
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = &released {
            warn!(parent: &self.span, error = %e, "Failed to release session");
        }
        info!(parent: &self.span, "Runtime stopped");
        released.map_err(Into::into)
    }

    /// Connects, ingests and dispatches until `token` is cancelled.
    ///
    /// Does not release the session; [`MiraiRuntime::run_until`] does that.
    pub async fn serve(&self, token: CancellationToken) {
        self.supervise(token).instrument(self.span.clone()).await
    }

    async fn supervise(&self, token: CancellationToken) {
        let ingestion = &self.config.ingestion;

        loop {
            if !self.connect(&token).await {
                break;
            }

            let started = Instant::now();
            let (tx, mut rx) = mpsc::channel(ingestion.channel_capacity);
            let stop_ingest = token.child_token();
            let ingest: JoinHandle<ApiResult<()>> = tokio::spawn(
                ingest(Arc::clone(&self.bot), ingestion.clone(), tx, stop_ingest.clone())
                    .instrument(Span::current()),
            );

            let mut lost = false;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = self.bot.session().lost(), if !lost => {
                        warn!("Session lost, restarting event source");
                        lost = true;
                        stop_ingest.cancel();
                    }
                    event = rx.recv() => match event {
                        Some(event) => {
                            self.dispatcher.dispatch(Arc::new(event), &self.bot).await;
                        }
                        None => break,
                    },
                }
            }

            let failed = match ingest.await {
                Ok(Ok(())) => {
                    info!("Event source closed");
                    false
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Event source failed");
                    true
                }
                Err(e) => {
                    error!(error = %e, "Ingestion task panicked");
                    true
                }
            };

            if token.is_cancelled() {
                break;
            }
            let short_lived = !lost && started.elapsed() < ingestion.reconnect_delay();
            if (failed || short_lived) && !self.backoff(&token).await {
                break;
            }
            info!("Reconnecting");
        }

        debug!("Supervisor stopped");
    }

    /// Handshakes until one succeeds. Returns false if cancelled first.
    async fn connect(&self, token: &CancellationToken) -> bool {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = token.cancelled() => return false,
                result = self.bot.handshake() => result,
            };
            match result {
                Ok(()) => {
                    info!(attempt, "Connected");
                    return true;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        delay_secs = self.config.ingestion.reconnect_delay_secs,
                        "Handshake failed, retrying"
                    );
                }
            }
            if !self.backoff(token).await {
                return false;
            }
        }
    }

    /// Sleeps the reconnect delay. Returns false if cancelled first.
    async fn backoff(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.config.ingestion.reconnect_delay()) => true,
        }
    }
}

impl std::fmt::Debug for MiraiRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiraiRuntime")
            .field("qq", &self.bot.qq())
            .field("mode", &self.config.ingestion.mode)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Ingestion
// =============================================================================

/// Feeds events into `events` until the source ends or `token` is cancelled.
async fn ingest(
    bot: Arc<Bot>,
    ingestion: IngestionConfig,
    events: mpsc::Sender<Event>,
    token: CancellationToken,
) -> ApiResult<()> {
    let source = async {
        match ingestion.mode {
            IngestionMode::WebSocket => stream_events(&bot, &ingestion, events).await,
            IngestionMode::Polling => poll_events(&bot, &ingestion, events).await,
        }
    };
    tokio::select! {
        _ = token.cancelled() => Ok(()),
        result = source => result,
    }
}

/// Decodes stream frames straight into the dispatch queue.
struct ChannelSink {
    events: mpsc::Sender<Event>,
}

#[async_trait]
impl StreamHandler for ChannelSink {
    async fn on_event(&self, payload: Value) {
        let Some(event) = decode(payload) else {
            return;
        };
        trace!(kind = %event.kind(), "Queued event");
        if self.events.send(event).await.is_err() {
            debug!("Dispatch loop is gone, dropping event");
        }
    }

    async fn on_close(&self) {
        debug!("Event stream closed");
    }
}

async fn stream_events(
    bot: &Bot,
    ingestion: &IngestionConfig,
    events: mpsc::Sender<Event>,
) -> ApiResult<()> {
    let key = bot.session().require_key()?;
    let path = endpoints::event_stream(ingestion.listen, &key, bot.qq());
    debug!(listen = ingestion.listen.as_str(), "Opening event stream");
    bot.transport()
        .open_event_stream(&path, Arc::new(ChannelSink { events }))
        .await
}

/// Polls `/fetchMessage`; a full batch is followed by another poll right away.
async fn poll_events(
    bot: &Bot,
    ingestion: &IngestionConfig,
    events: mpsc::Sender<Event>,
) -> ApiResult<()> {
    loop {
        let batch = match bot.fetch_batch(ingestion.poll_batch_size).await {
            Ok(batch) => batch,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Poll failed");
                Vec::new()
            }
        };

        let drained = batch.len() < ingestion.poll_batch_size;
        trace!(count = batch.len(), "Fetched batch");
        for event in batch.into_iter().filter_map(decode) {
            if events.send(event).await.is_err() {
                return Ok(());
            }
        }

        if drained {
            tokio::time::sleep(ingestion.poll_interval()).await;
        }
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl+C only"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`MiraiRuntime`] from layered configuration.
///
/// ```rust,ignore
/// let runtime = MiraiRuntime::builder()
///     .config_file("config/mirai.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: MiraiConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration without building the runtime.
    pub fn load(self) -> ConfigResult<MiraiConfig> {
        self.config_loader.load()
    }

    pub fn build(self) -> RuntimeResult<MiraiRuntime> {
        let config = self.config_loader.load()?;
        MiraiRuntime::from_config(&config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirai_core::ApiError;
    use mirai_core::testing::MockTransport;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::{Instant, sleep, timeout};

    fn config(mode: IngestionMode) -> MiraiConfig {
        let mut config = MiraiConfig::default();
        config.connection.verify_key = "INITKEY".to_string();
        config.connection.qq = 10001;
        config.ingestion.mode = mode;
        config.ingestion.reconnect_delay_secs = 1;
        config.ingestion.poll_interval_ms = 10;
        config.ingestion.poll_batch_size = 2;
        config
    }

    fn friend_message(id: i64, text: &str) -> Value {
        json!({
            "type": "FriendMessage",
            "messageChain": [
                { "type": "Source", "id": id, "time": 1_600_000_000 },
                { "type": "Plain", "text": text }
            ],
            "sender": { "id": 42, "nickname": "alice", "remark": "" }
        })
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn runtime_with_log(mock: &Arc<MockTransport>, mode: IngestionMode) -> (MiraiRuntime, Log) {
        let mut runtime = MiraiRuntime::with_transport(&config(mode), mock.clone()).unwrap();
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        runtime.on_message(move |event: Arc<Event>, _bot: Arc<Bot>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event.plain_text());
            }
        });
        (runtime, log)
    }

    async fn until(condition: impl Fn() -> bool) {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_stream_events_dispatched_in_order() {
        let mock = Arc::new(MockTransport::with_session("SESSION"));
        mock.push_stream(vec![
            json!({ "syncId": "", "data": { "code": 0, "session": "SESSION" } }),
            friend_message(1, "E1"),
            friend_message(2, "E2"),
            friend_message(3, "E3"),
        ]);
        let (runtime, log) = runtime_with_log(&mock, IngestionMode::WebSocket);

        let watched = Arc::clone(&log);
        timeout(
            Duration::from_secs(5),
            runtime.run_until(until(move || watched.lock().len() >= 3)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(*log.lock(), vec!["E1", "E2", "E3"]);
        let streams = mock.calls_to("/all");
        assert_eq!(streams[0].path, "/all?sessionKey=SESSION&qq=10001");
        assert_eq!(mock.calls_to(endpoints::RELEASE).len(), 1);
        assert!(!runtime.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_stream_close() {
        let mock = Arc::new(MockTransport::with_session("SESSION"));
        mock.push_stream(vec![friend_message(1, "E1"), friend_message(2, "E2")]);
        mock.push_stream(vec![friend_message(3, "E3")]);
        let (runtime, log) = runtime_with_log(&mock, IngestionMode::WebSocket);

        let watched = Arc::clone(&log);
        let transport = Arc::clone(&mock);
        timeout(
            Duration::from_secs(5),
            runtime.run_until(until(move || {
                watched.lock().len() >= 3 && transport.calls_to("/all").len() >= 3
            })),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(*log.lock(), vec!["E1", "E2", "E3"]);
        assert_eq!(mock.calls_to(endpoints::VERIFY).len(), 3);
        assert_eq!(mock.calls_to(endpoints::BIND).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_retried_until_success() {
        let mock = Arc::new(MockTransport::with_session("SESSION"));
        mock.respond_once(endpoints::VERIFY, Err(ApiError::Network("refused".into())));
        mock.respond_once(endpoints::VERIFY, Err(ApiError::Network("refused".into())));
        mock.push_stream(vec![friend_message(1, "E1")]);
        mock.push_stream_failure(ApiError::Network("refused".into()));
        let (runtime, log) = runtime_with_log(&mock, IngestionMode::WebSocket);

        let watched = Arc::clone(&log);
        let transport = Arc::clone(&mock);
        runtime
            .run_until(until(move || {
                !watched.lock().is_empty() && transport.calls_to("/all").len() >= 3
            }))
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["E1"]);
        // two failures, the first session, then one per stream ending
        assert_eq!(mock.calls_to(endpoints::VERIFY).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_stream_waits_before_reconnecting() {
        let mock = Arc::new(MockTransport::with_session("SESSION"));
        mock.push_stream(Vec::new());
        mock.push_stream(Vec::new());
        let runtime =
            MiraiRuntime::with_transport(&config(IngestionMode::WebSocket), mock.clone()).unwrap();

        let started = Instant::now();
        let transport = Arc::clone(&mock);
        timeout(
            Duration::from_secs(30),
            runtime.run_until(until(move || transport.calls_to("/all").len() >= 3)),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(mock.calls_to(endpoints::VERIFY).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_call_restarts_event_source() {
        let mock = Arc::new(MockTransport::new());
        let session = json!({ "code": 0, "session": "SESSION" });
        mock.respond(endpoints::VERIFY, session.clone());
        mock.respond_once(endpoints::VERIFY, Ok(session));
        mock.respond_once(endpoints::VERIFY, Err(ApiError::Network("refused".into())));
        mock.respond_once(endpoints::RECALL, Err(ApiError::from_code(3, None)));
        mock.push_open_stream(vec![friend_message(1, "E1")]);

        let mut runtime =
            MiraiRuntime::with_transport(&config(IngestionMode::WebSocket), mock.clone()).unwrap();
        let results: Arc<Mutex<Vec<ApiResult<()>>>> = Arc::default();
        let sink = Arc::clone(&results);
        runtime.on_message(move |_event: Arc<Event>, bot: Arc<Bot>| {
            let sink = Arc::clone(&sink);
            async move {
                let result = bot.recall(1).await;
                sink.lock().push(result);
            }
        });

        let transport = Arc::clone(&mock);
        timeout(
            Duration::from_secs(60),
            runtime.run_until(until(move || transport.calls_to("/all").len() >= 2)),
        )
        .await
        .unwrap()
        .unwrap();

        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ApiError::Network(_))));
        // initial handshake, the facade's retry, then the supervisor's
        assert_eq!(mock.calls_to(endpoints::VERIFY).len(), 3);
        let streams = mock.calls_to("/all");
        assert_eq!(streams[1].path, "/all?sessionKey=SESSION&qq=10001");
        assert!(!runtime.bot().session().is_lost());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_err(endpoints::VERIFY, ApiError::Network("refused".into()));
        let mut config = config(IngestionMode::WebSocket);
        config.ingestion.reconnect_delay_secs = 60;
        let runtime = MiraiRuntime::with_transport(&config, mock.clone()).unwrap();

        let started = Instant::now();
        runtime
            .run_until(sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(mock.calls_to(endpoints::VERIFY).len(), 1);
        assert!(mock.calls_to(endpoints::RELEASE).is_empty());
    }

    #[tokio::test]
    async fn test_polling_preserves_order() {
        let mock = Arc::new(MockTransport::with_session("SESSION"));
        mock.respond(endpoints::FETCH_MESSAGE, json!({ "code": 0, "data": [] }));
        mock.respond_once(
            endpoints::FETCH_MESSAGE,
            Ok(json!({ "code": 0, "data": [friend_message(1, "E1"), friend_message(2, "E2")] })),
        );
        mock.respond_once(
            endpoints::FETCH_MESSAGE,
            Ok(json!({ "code": 0, "data": [friend_message(3, "E3")] })),
        );
        let (runtime, log) = runtime_with_log(&mock, IngestionMode::Polling);

        let watched = Arc::clone(&log);
        timeout(
            Duration::from_secs(5),
            runtime.run_until(until(move || watched.lock().len() >= 3)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(*log.lock(), vec!["E1", "E2", "E3"]);
        let polls = mock.calls_to(endpoints::FETCH_MESSAGE);
        assert_eq!(polls[0].payload["count"], 2);
        assert_eq!(polls[0].payload["sessionKey"], "SESSION");
        assert!(mock.calls_to("/all").is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mock = Arc::new(MockTransport::new());
        let result = MiraiRuntime::with_transport(&MiraiConfig::default(), mock);
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let mock = Arc::new(MockTransport::with_session("SESSION"));
        let runtime = MiraiRuntime::with_transport(&config(IngestionMode::WebSocket), mock.clone())
            .unwrap();

        let second = async {
            until(|| runtime.is_running()).await;
            let result = runtime.run_until(async {}).await;
            assert!(matches!(result, Err(RuntimeError::AlreadyRunning)));
        };
        runtime.run_until(second).await.unwrap();
    }
}
