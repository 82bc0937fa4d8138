//! # Mirai Framework
//!
//! Handler registration and event dispatch for bot applications.
//!
//! This layer provides:
//! - The [`Handler`] trait, implemented for plain async functions and closures
//! - [`Outcome`] for letting a handler stop later handlers from running
//! - The [`Dispatcher`], which routes each event to the handlers of its kind
//!   strictly in registration order
//!
//! The framework knows nothing about connections; the runtime feeds it
//! decoded events one at a time.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::{Dispatcher, HandlerRegistration};
pub use handler::{BoxedHandler, Handler, HandlerResult, IntoOutcome, Outcome};
