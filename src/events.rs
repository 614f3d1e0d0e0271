//! Lifecycle and query events
//!
//! Listeners observe the engine from the outside: every rendered query
//! passes through [`EventListener::before_query`] (which may rewrite
//! bind values before execution) and the persistence operations emit
//! model-level notifications around INSERT, UPDATE and DELETE.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::value::{Record, SqlValue};

/// Emitted before any statement executes. The parameter map is the one
/// the adapter will receive, so mutations here take effect.
#[derive(Debug, Clone)]
pub struct BeforeQuery {
    pub sql: String,
    pub parameters: BTreeMap<String, SqlValue>,
}

/// Emitted after a statement executed.
#[derive(Debug, Clone)]
pub struct AfterQuery {
    pub sql: String,
    pub row_count: u64,
}

/// Emitted after a model-scoped SELECT fetched its rows. Carries the
/// result set so listeners can inspect what a model actually loaded.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub model: &'static str,
    pub sql: String,
    pub rows: Vec<Record>,
}

/// Payload for create and update notifications.
#[derive(Debug, Clone)]
pub struct PersistEvent {
    pub model: &'static str,
    pub sql: String,
    pub data: Record,
}

/// Payload for delete notifications.
#[derive(Debug, Clone)]
pub struct DeleteEvent {
    pub model: &'static str,
    pub sql: String,
}

/// Observer interface; every method defaults to a no-op so listeners
/// implement only what they care about.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn before_query(&self, _event: &mut BeforeQuery) {}
    async fn after_query(&self, _event: &AfterQuery) {}

    async fn model_queried(&self, _event: &QueryEvent) {}

    async fn before_create(&self, _event: &PersistEvent) {}
    async fn after_create(&self, _event: &PersistEvent) {}

    async fn before_update(&self, _event: &PersistEvent) {}
    async fn after_update(&self, _event: &PersistEvent) {}

    async fn before_delete(&self, _event: &DeleteEvent) {}
    async fn after_delete(&self, _event: &DeleteEvent) {}
}

/// Fan-out dispatcher; listeners run in subscription order.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub(crate) async fn emit_before_query(&self, event: &mut BeforeQuery) {
        for listener in &self.listeners {
            listener.before_query(event).await;
        }
    }

    pub(crate) async fn emit_after_query(&self, event: &AfterQuery) {
        for listener in &self.listeners {
            listener.after_query(event).await;
        }
    }

    pub(crate) async fn emit_model_queried(&self, event: &QueryEvent) {
        for listener in &self.listeners {
            listener.model_queried(event).await;
        }
    }

    pub(crate) async fn emit_before_create(&self, event: &PersistEvent) {
        for listener in &self.listeners {
            listener.before_create(event).await;
        }
    }

    pub(crate) async fn emit_after_create(&self, event: &PersistEvent) {
        for listener in &self.listeners {
            listener.after_create(event).await;
        }
    }

    pub(crate) async fn emit_before_update(&self, event: &PersistEvent) {
        for listener in &self.listeners {
            listener.before_update(event).await;
        }
    }

    pub(crate) async fn emit_after_update(&self, event: &PersistEvent) {
        for listener in &self.listeners {
            listener.after_update(event).await;
        }
    }

    pub(crate) async fn emit_before_delete(&self, event: &DeleteEvent) {
        for listener in &self.listeners {
            listener.before_delete(event).await;
        }
    }

    pub(crate) async fn emit_after_delete(&self, event: &DeleteEvent) {
        for listener in &self.listeners {
            listener.after_delete(event).await;
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
