//! # mirai-transport
//!
//! Network implementations of [`mirai_core::Transport`].
//!
//! ## Features
//!
//! - `http-client`: [`HttpTransport`], REST calls and multipart upload over reqwest
//! - `ws-client`: event streams over tokio-tungstenite for [`HttpTransport`]
//! - `full`: both
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  mirai-runtime      │  (ingestion loop, dispatch)
//! ├─────────────────────┤
//! │  mirai-core         │  (Transport trait, Session, Bot)
//! ├─────────────────────┤
//! │  mirai-transport    │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (HTTP/WS)  │
//! └─────────────────────┘
//! ```
//!
//! Without `ws-client`, opening an event stream on [`HttpTransport`] reports
//! [`mirai_core::ApiError::NotSupported`] and only polling ingestion works.

#[cfg(feature = "http-client")]
pub mod http_client;
#[cfg(feature = "ws-client")]
pub mod ws_client;

#[cfg(feature = "http-client")]
pub use http_client::{HttpTransport, HttpTransportConfig};
