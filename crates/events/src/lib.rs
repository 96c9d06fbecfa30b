//! Event bus primitives.
//!
//! Publishers hand events to an [`EventBus`]. Listeners registered while the
//! bus is being built run synchronously inside `publish`, so state they keep
//! is consistent as soon as the publishing call returns. Anything that can
//! lag behind subscribes to the broadcast channel instead.

use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Synchronous consumer of published events.
pub trait Listener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

pub struct EventBus<E> {
    listeners: Vec<Arc<dyn Listener<E>>>,
    sender: broadcast::Sender<E>,
}

impl<E> EventBus<E>
where
    E: Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            listeners: Vec::new(),
            sender,
        }
    }

    /// Attach a synchronous listener.
    pub fn with_listener(mut self, listener: Arc<dyn Listener<E>>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: E) {
        tracing::debug!(target: "bookshelf-events", ?event, "publishing event");

        for listener in &self.listeners {
            listener.on_event(&event);
        }

        // No receivers is the normal case for a bus nobody tails.
        let _ = self.sender.send(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
