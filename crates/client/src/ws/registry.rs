//! Handler registry and fan-out dispatcher.
//!
//! Consumers register a [`HandlerSet`] under an id of their choosing, or take
//! a [`Subscription`] for a single typed callback. Every event is delivered
//! to every registered set, in registration order.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use hubbub_shared::{EventName, ServerEvent};
use parking_lot::Mutex;

use super::events::Event;

/// A callback over the raw event.
pub type Callback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// A named bundle of optional callbacks, one per event kind.
pub struct HandlerSet {
    id: String,
    callbacks: HashMap<EventName, Callback>,
    fallback: Option<Callback>,
}

impl HandlerSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            callbacks: HashMap::new(),
            fallback: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the typed callback for `E`, replacing any previous one.
    pub fn on<E: Event>(mut self, callback: impl Fn(&E::Payload) + Send + Sync + 'static) -> Self {
        let wrapped: Callback = Arc::new(move |event: &ServerEvent| {
            if let Some(payload) = E::payload(event) {
                callback(payload);
            }
        });
        self.callbacks.insert(E::NAME, wrapped);
        self
    }

    /// Set a callback for `name` that receives the whole event.
    pub fn on_event(
        mut self,
        name: EventName,
        callback: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.insert(name, Arc::new(callback));
        self
    }

    /// Set a callback that sees every event, after the specific callback if any.
    pub fn on_any(mut self, callback: impl Fn(&ServerEvent) + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(callback));
        self
    }

    /// Run this set's callbacks for `event`. A panicking callback is logged and
    /// contained. Returns how many callbacks ran to completion.
    fn deliver(&self, event: &ServerEvent) -> usize {
        let name = event.name();
        let mut delivered = 0;
        for callback in self.callbacks.get(&name).into_iter().chain(&self.fallback) {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        handler = %self.id,
                        event = %name,
                        "handler panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        delivered
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.callbacks.keys().map(EventName::as_str).collect();
        events.sort_unstable();
        f.debug_struct("HandlerSet")
            .field("id", &self.id)
            .field("events", &events)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

/// Registered handler sets, in registration order.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    sets: Mutex<Vec<Arc<HandlerSet>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `set` unless its id is already registered. Returns whether it was added.
    pub fn register(&self, set: HandlerSet) -> bool {
        let mut sets = self.sets.lock();
        if sets.iter().any(|s| s.id == set.id) {
            tracing::debug!("handler set '{}' already registered, ignoring", set.id);
            return false;
        }
        sets.push(Arc::new(set));
        true
    }

    /// Remove the set registered under `id`. Returns whether one was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut sets = self.sets.lock();
        let before = sets.len();
        sets.retain(|s| s.id != id);
        sets.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sets.lock().iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.lock().is_empty()
    }

    /// Fan `event` out to every registered set.
    ///
    /// The set list is snapshotted first, so callbacks may register or
    /// unregister (including themselves) without deadlocking; such changes
    /// take effect from the next event. Returns the number of callbacks that
    /// completed.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        self.dispatch_while(event, || true)
    }

    /// Like [`dispatch`](Self::dispatch), but `proceed` is checked before each
    /// set and fan-out stops at the first `false`.
    pub fn dispatch_while(&self, event: &ServerEvent, proceed: impl Fn() -> bool) -> usize {
        let snapshot: Vec<Arc<HandlerSet>> = self.sets.lock().clone();
        let mut delivered = 0;
        for set in &snapshot {
            if !proceed() {
                tracing::debug!("dispatch of {} cut short", event.name());
                break;
            }
            delivered += set.deliver(event);
        }
        delivered
    }
}

/// Handle for a callback added with [`crate::RealtimeClient::subscribe`].
///
/// The callback stays registered until the handle is dropped or
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a Subscription removes its callback immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: String,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    pub(crate) fn register<E: Event>(
        registry: &Arc<HandlerRegistry>,
        callback: impl Fn(&E::Payload) + Send + Sync + 'static,
    ) -> Self {
        let id = format!("subscription-{}", uuid::Uuid::new_v4());
        registry.register(HandlerSet::new(id.clone()).on::<E>(callback));
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id);
        }
    }
}
