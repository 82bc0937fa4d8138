//! # Mirai
//!
//! An async client SDK for QQ bots served by mirai-api-http.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  frames   ┌──────────┐  Event   ┌────────────┐
//! │   Transport   │──────────▶│ decode() │─────────▶│ Dispatcher │──▶ handlers
//! │ (HTTP + ws)   │           └──────────┘          └────────────┘       │
//! └───────────────┘◀───────────────── Bot (retry once) ◀─────────────────┘
//!         ▲
//!         └── MiraiRuntime: handshake, reconnect, shutdown
//! ```
//!
//! - **Transport**: REST calls and the event stream (`mirai-transport`)
//! - **Bot**: session handling and every command, with one retry after a
//!   fresh handshake on network or session errors (`mirai-core`)
//! - **Dispatcher**: ordered handlers per event kind (`mirai-framework`)
//! - **Runtime**: configuration, logging and the reconnect loop (`mirai-runtime`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mirai::prelude::*;
//!
//! async fn ping(event: Arc<Event>, bot: Arc<Bot>) -> anyhow::Result<bool> {
//!     if event.plain_text().trim() == "/ping" {
//!         bot.reply(&event, "pong", false).await?;
//!         return Ok(true);
//!     }
//!     Ok(false)
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = MiraiRuntime::builder().build()?;
//!     runtime.on_message(ping);
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `mirai.toml` configuration files
//! - `yaml-config`: `mirai.yaml` configuration files
//! - `json-log`: JSON log lines
//! - `ws-client` *(default)*: websocket event stream

pub use mirai_core as core;
pub use mirai_framework as framework;
pub use mirai_runtime as runtime;
pub use mirai_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mirai::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use mirai_runtime::{MiraiConfig, MiraiRuntime};

    // Dispatch
    pub use mirai_framework::{Dispatcher, Handler, Outcome};

    // Commands and models
    pub use mirai_core::{
        ApiError, ApiResult, Bot, Component, Event, EventKind, MemberJoinRequestResponse,
        MessageChain, MessageTarget, NewFriendRequestResponse,
    };
}
