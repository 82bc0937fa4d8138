//! Event dispatcher.
//!
//! The [`Dispatcher`] maps each [`EventKind`] to an ordered list of handlers.
//! When an event is dispatched:
//!
//! 1. Handlers registered for its kind run in registration order
//! 2. Each handler is awaited to completion before the next one starts
//! 3. A handler returning [`Outcome::Handled`] stops the chain
//! 4. A handler that fails or panics is logged and the chain goes on
//!
//! ```rust,ignore
//! use mirai_framework::Dispatcher;
//! use mirai_core::EventKind;
//!
//! let mut dispatcher = Dispatcher::new();
//!
//! // Sees every message first, never blocks
//! dispatcher.on_message(log_message);
//!
//! // Blocks later handlers when it answers
//! dispatcher.register(&[EventKind::GroupMessage], echo);
//!
//! dispatcher.on(EventKind::NewFriendRequestEvent, accept_friends);
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use mirai_core::{Bot, Event, EventKind};
use tracing::{Instrument, Span, debug, error, trace};

use crate::handler::{BoxedHandler, Handler, Outcome};

/// One handler together with the kinds it listens to.
///
/// Owned by the dispatcher for its whole lifetime.
pub struct HandlerRegistration {
    order: usize,
    kinds: Vec<EventKind>,
    handler: BoxedHandler,
}

impl HandlerRegistration {
    /// Position among all registrations, starting at 0.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }
}

/// Routes decoded events to registered handlers.
///
/// `Dispatcher` is `Send + Sync`; build it up front and share it behind an
/// `Arc` once the event loop runs.
pub struct Dispatcher {
    registrations: Vec<Arc<HandlerRegistration>>,
    by_kind: HashMap<EventKind, Vec<Arc<HandlerRegistration>>>,
    span: Span,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a new, empty dispatcher.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            by_kind: HashMap::new(),
            span: Span::current(),
        }
    }

    /// Replaces the span dispatch logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Appends `handler` to the list of every kind in `kinds`.
    ///
    /// Listing a kind twice registers the handler once for it.
    pub fn register(&mut self, kinds: &[EventKind], handler: impl Handler) -> &mut Self {
        let mut unique = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }

        let registration = Arc::new(HandlerRegistration {
            order: self.registrations.len(),
            kinds: unique,
            handler: Arc::new(handler),
        });
        for kind in &registration.kinds {
            self.by_kind
                .entry(*kind)
                .or_default()
                .push(Arc::clone(&registration));
        }
        debug!(
            parent: &self.span,
            order = registration.order,
            kinds = ?registration.kinds,
            "Registered handler"
        );
        self.registrations.push(registration);
        self
    }

    /// Registers `handler` for a single kind.
    pub fn on(&mut self, kind: EventKind, handler: impl Handler) -> &mut Self {
        self.register(&[kind], handler)
    }

    /// Registers `handler` for friend, group and temp messages.
    pub fn on_message(&mut self, handler: impl Handler) -> &mut Self {
        self.register(EventKind::MESSAGES, handler)
    }

    /// All registrations in registration order.
    pub fn registrations(&self) -> &[Arc<HandlerRegistration>] {
        &self.registrations
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Runs the handlers registered for the event's kind, one after another.
    ///
    /// Returns [`Outcome::Handled`] if some handler stopped the chain.
    pub async fn dispatch(&self, event: Arc<Event>, bot: &Arc<Bot>) -> Outcome {
        let kind = event.kind();
        let span = tracing::debug_span!(parent: &self.span, "dispatch", kind = %kind);
        self.run_chain(kind, event, bot).instrument(span).await
    }

    async fn run_chain(&self, kind: EventKind, event: Arc<Event>, bot: &Arc<Bot>) -> Outcome {
        let Some(chain) = self.by_kind.get(&kind) else {
            trace!("No handlers registered");
            return Outcome::Continue;
        };

        for registration in chain {
            let call = registration
                .handler
                .call(Arc::clone(&event), Arc::clone(bot));

            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(Outcome::Handled)) => {
                    debug!(order = registration.order, "Handler consumed event, stopping dispatch");
                    return Outcome::Handled;
                }
                Ok(Ok(Outcome::Continue)) => {}
                Ok(Err(e)) => {
                    error!(order = registration.order, error = %e, "Handler failed, continuing with next handler");
                }
                Err(_) => {
                    error!(order = registration.order, "Handler panicked, continuing with next handler");
                }
            }
        }

        Outcome::Continue
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.registrations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirai_core::testing::MockTransport;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn mock_bot() -> Arc<Bot> {
        Arc::new(Bot::new(Arc::new(MockTransport::new()), "KEY", 1))
    }

    fn online() -> Arc<Event> {
        Arc::new(mirai_core::decode(json!({ "type": "BotOnlineEvent", "qq": 1 })).unwrap())
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str, handled: bool) -> impl Handler {
        let log = Arc::clone(log);
        move |_event: Arc<Event>, _bot: Arc<Bot>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                handled
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_no_handlers() {
        let dispatcher = Dispatcher::new();
        let outcome = dispatcher.dispatch(online(), &mock_bot()).await;
        assert_eq!(outcome, Outcome::Continue);
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let log: Log = Arc::default();
        let mut dispatcher = Dispatcher::new();

        let slow_log = Arc::clone(&log);
        dispatcher.on(EventKind::BotOnlineEvent, move |_e: Arc<Event>, _b: Arc<Bot>| {
            let log = Arc::clone(&slow_log);
            async move {
                log.lock().push("a-start");
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().push("a-end");
            }
        });
        dispatcher.on(EventKind::BotOnlineEvent, recorder(&log, "b", false));

        dispatcher.dispatch(online(), &mock_bot()).await;

        assert_eq!(*log.lock(), vec!["a-start", "a-end", "b"]);
    }

    #[tokio::test]
    async fn test_handled_short_circuits() {
        let log: Log = Arc::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(EventKind::BotOnlineEvent, recorder(&log, "a", true));
        dispatcher.on(EventKind::BotOnlineEvent, recorder(&log, "b", false));

        let outcome = dispatcher.dispatch(online(), &mock_bot()).await;

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_chain() {
        let log: Log = Arc::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.on(EventKind::BotOnlineEvent, |_e: Arc<Event>, _b: Arc<Bot>| async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        });
        dispatcher.on(EventKind::BotOnlineEvent, |_e: Arc<Event>, _b: Arc<Bot>| async {
            if true {
                panic!("handler bug");
            }
            Outcome::Continue
        });
        dispatcher.on(EventKind::BotOnlineEvent, recorder(&log, "after", false));

        dispatcher.dispatch(online(), &mock_bot()).await;

        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_routes_by_kind() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();

        let c = Arc::clone(&counter);
        dispatcher.register(
            &[EventKind::BotOnlineEvent, EventKind::BotOnlineEvent, EventKind::Unknown],
            move |_e: Arc<Event>, _b: Arc<Bot>| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        let log: Log = Arc::default();
        dispatcher.on_message(recorder(&log, "message", false));

        let bot = mock_bot();
        dispatcher.dispatch(online(), &bot).await;
        dispatcher
            .dispatch(Arc::new(Event::Unknown(json!({ "type": "New" }))), &bot)
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.handler_count(EventKind::BotOnlineEvent), 1);
        assert_eq!(dispatcher.handler_count(EventKind::GroupMessage), 1);
        assert_eq!(dispatcher.registrations()[1].order(), 1);
    }
}
