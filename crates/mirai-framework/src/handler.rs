//! Handlers and their outcomes.
//!
//! Any `Fn(Arc<Event>, Arc<Bot>) -> impl Future` whose output implements
//! [`IntoOutcome`] is a [`Handler`], so plain async closures and functions
//! can be registered directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use mirai_framework::{Dispatcher, Outcome};
//!
//! async fn echo(event: Arc<Event>, bot: Arc<Bot>) -> anyhow::Result<Outcome> {
//!     let text = event.plain_text();
//!     if let Some(rest) = text.strip_prefix("/echo ") {
//!         bot.reply(&event, rest, true).await?;
//!         return Ok(Outcome::Handled);
//!     }
//!     Ok(Outcome::Continue)
//! }
//!
//! dispatcher.on_message(echo);
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use mirai_core::{Bot, Event};

/// What a handler decided about the event it saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    /// Let the next handler see the event.
    #[default]
    Continue,
    /// Stop here; later handlers for this event are skipped.
    Handled,
}

impl From<bool> for Outcome {
    fn from(handled: bool) -> Self {
        if handled {
            Outcome::Handled
        } else {
            Outcome::Continue
        }
    }
}

/// Result type every handler is reduced to.
pub type HandlerResult = anyhow::Result<Outcome>;

/// Return values a handler may produce.
pub trait IntoOutcome: Send {
    fn into_outcome(self) -> HandlerResult;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> HandlerResult {
        Ok(Outcome::Continue)
    }
}

impl IntoOutcome for bool {
    fn into_outcome(self) -> HandlerResult {
        Ok(self.into())
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> HandlerResult {
        Ok(self)
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<anyhow::Error> + Send,
{
    fn into_outcome(self) -> HandlerResult {
        match self {
            Ok(value) => value.into_outcome(),
            Err(e) => Err(e.into()),
        }
    }
}

/// An event handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, event: Arc<Event>, bot: Arc<Bot>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Arc<Event>, Arc<Bot>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome,
{
    fn call(&self, event: Arc<Event>, bot: Arc<Bot>) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(event, bot);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Shared handler handle.
pub type BoxedHandler = Arc<dyn Handler>;
