//! Mirai Runtime - configuration, logging and the connection supervisor.
//!
//! This crate provides:
//! - Layered configuration (`mirai.toml`, `MIRAI_*` variables) in [`config`]
//! - Subscriber setup for the `tracing` events the other crates emit in [`logging`]
//! - [`MiraiRuntime`], which handshakes, ingests events over a websocket or by
//!   polling, dispatches them in order and reconnects when the source drops
//!
//! ```ignore
//! use mirai_runtime::MiraiRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = MiraiRuntime::builder().build()?;
//!     runtime.on_message(my_handler);
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, IngestionMode, MiraiConfig, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{MiraiRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
