//! Typed publish/subscribe fan-out of inbound frames.
//!
//! Subscribers register per message kind and receive every inbound
//! envelope of that kind, in registration order. The handler table is
//! only mutated from the session's logical context, but dispatch iterates
//! over a snapshot, so a handler may register or unsubscribe — itself
//! included — without corrupting the in-flight cycle; such changes take
//! effect from the next dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use protocol::{Envelope, MessageKind};
use uuid::Uuid;

/// A subscriber callback. Failures are isolated and logged at the
/// dispatch boundary; they never block delivery to later handlers.
pub type Handler = Arc<dyn Fn(&Envelope) -> anyhow::Result<()> + Send + Sync>;

struct Registered {
    id: Uuid,
    handler: Handler,
}

type HandlerTable = Mutex<HashMap<MessageKind, Vec<Registered>>>;

/// Fan-out table from message kind to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Arc<HandlerTable>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a message kind.
    ///
    /// Returns a [`Subscription`] owned by the caller; it must be
    /// released on teardown so retired state is never invoked again.
    /// Unknown kinds subscribe by their literal tag
    /// (`MessageKind::from("some-tag")`).
    pub fn on<F>(&self, kind: MessageKind, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.handlers
            .lock()
            .unwrap()
            .entry(kind.clone())
            .or_default()
            .push(Registered {
                id,
                handler: Arc::new(handler),
            });

        Subscription {
            handlers: Arc::downgrade(&self.handlers),
            kind,
            id,
        }
    }

    /// Deliver an envelope to every handler registered for its kind,
    /// synchronously and in registration order.
    pub fn dispatch(&self, envelope: &Envelope) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(&envelope.kind) {
                Some(registered) => registered.iter().map(|r| Arc::clone(&r.handler)).collect(),
                None => return,
            }
        };

        for handler in snapshot {
            if let Err(e) = handler(envelope) {
                tracing::warn!(kind = %envelope.kind, "message handler failed: {e:#}");
            }
        }
    }

    /// Number of handlers registered for a kind.
    pub fn handler_count(&self, kind: &MessageKind) -> usize {
        self.handlers
            .lock()
            .unwrap()
            .get(kind)
            .map(|registered| registered.len())
            .unwrap_or(0)
    }

    /// Release every subscription. Called at session teardown.
    pub fn clear(&self) {
        self.handlers.lock().unwrap().clear();
    }
}

/// Handle to one registration.
///
/// Dropping the subscription does not unregister the handler; release is
/// explicit via [`Subscription::unsubscribe`], which is idempotent.
pub struct Subscription {
    handlers: Weak<HandlerTable>,
    kind: MessageKind,
    id: Uuid,
}

impl Subscription {
    /// Remove the handler. Calling this twice is a no-op.
    pub fn unsubscribe(&self) {
        let Some(handlers) = self.handlers.upgrade() else {
            return;
        };
        let mut handlers = handlers.lock().unwrap();
        if let Some(registered) = handlers.get_mut(&self.kind) {
            registered.retain(|r| r.id != self.id);
            if registered.is_empty() {
                handlers.remove(&self.kind);
            }
        }
    }

    /// The kind this subscription listens to.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn edit_envelope() -> Envelope {
        Envelope {
            kind: MessageKind::Edit,
            document_id: 1,
            user_id: 2,
            username: "alice".to_string(),
            payload: Some(serde_json::json!({"content": "x"})),
        }
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let _sub = dispatcher.on(MessageKind::Edit, move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        dispatcher.dispatch(&edit_envelope());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let sub = {
            let calls = Arc::clone(&calls);
            dispatcher.on(MessageKind::Edit, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        dispatcher.dispatch(&edit_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        dispatcher.dispatch(&edit_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.handler_count(&MessageKind::Edit), 0);
    }

    #[test]
    fn test_failing_handler_does_not_block_later_handlers() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _failing = dispatcher.on(MessageKind::Edit, |_| anyhow::bail!("boom"));
        let _counting = {
            let calls = Arc::clone(&calls);
            dispatcher.on(MessageKind::Edit, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        dispatcher.dispatch(&edit_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutation_during_dispatch_does_not_corrupt_the_cycle() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));

        // The first handler registers another handler mid-dispatch; the
        // new registration only sees the next cycle.
        let _registering = {
            let dispatcher_ref = Arc::clone(&dispatcher);
            let calls = Arc::clone(&calls);
            dispatcher.on(MessageKind::Edit, move |_| {
                let calls_late = Arc::clone(&calls);
                let _late = dispatcher_ref.on(MessageKind::Edit, move |_| {
                    calls_late.fetch_add(10, Ordering::SeqCst);
                    Ok(())
                });
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        dispatcher.dispatch(&edit_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_unsubscribing_itself_during_dispatch() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let sub = {
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            dispatcher.on(MessageKind::Edit, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(sub) = slot.lock().unwrap().take() {
                    sub.unsubscribe();
                }
                Ok(())
            })
        };
        *slot.lock().unwrap() = Some(sub);

        dispatcher.dispatch(&edit_envelope());
        dispatcher.dispatch(&edit_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_kind_delivered_by_literal_tag() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _sub = {
            let calls = Arc::clone(&calls);
            dispatcher.on(MessageKind::from("reaction"), move |envelope| {
                assert_eq!(envelope.kind.as_str(), "reaction");
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        let envelope = Envelope {
            kind: MessageKind::from("reaction"),
            document_id: 1,
            user_id: 2,
            username: "bob".to_string(),
            payload: None,
        };
        dispatcher.dispatch(&envelope);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_releases_everything() {
        let dispatcher = EventDispatcher::new();
        let _a = dispatcher.on(MessageKind::Edit, |_| Ok(()));
        let _b = dispatcher.on(MessageKind::Join, |_| Ok(()));

        dispatcher.clear();
        assert_eq!(dispatcher.handler_count(&MessageKind::Edit), 0);
        assert_eq!(dispatcher.handler_count(&MessageKind::Join), 0);
    }

    #[test]
    fn test_unsubscribe_after_dispatcher_dropped_is_a_no_op() {
        let dispatcher = EventDispatcher::new();
        let sub = dispatcher.on(MessageKind::Edit, |_| Ok(()));
        drop(dispatcher);
        sub.unsubscribe();
    }
}
