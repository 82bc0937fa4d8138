//! # mirai-core
//!
//! Models and session logic for a mirai-api-http QQ bot client.
//!
//! ## Modules
//!
//! - [`model`]: entities, message components and the event taxonomy
//! - [`decode`]: raw payload to [`Event`] decoding and normalization
//! - [`transport`]: the [`Transport`] capability the rest of the crate talks through
//! - [`session`]: verify/bind/release of the session key
//! - [`bot`]: the command facade with its retry-once policy
//! - [`error`]: the error taxonomy and status-code table
//!
//! Concrete transports live in `mirai-transport`; dispatch and the
//! long-running ingestion loop live in `mirai-framework` and `mirai-runtime`.

pub mod bot;
pub mod decode;
pub mod endpoints;
pub mod error;
pub mod model;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use bot::{Bot, MUTE_MAX, MUTE_MIN, MessageTarget, ServerConfig, clamp_mute};
pub use decode::{decode, strip_quote_mention};
pub use endpoints::Listen;
pub use error::{ApiError, ApiResult, Method, check_envelope};
pub use model::*;
pub use session::Session;
pub use transport::{BoxedTransport, StreamHandler, Transport};
