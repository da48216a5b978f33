//! In-memory registry of active brackets
//!
//! All mutations happen under one mutex, held only around field access and
//! never across an await. Monitors work on cloned snapshots.

use mexcbot_core::{BracketOrder, Error, PositionId, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lifecycle events published by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered(PositionId),
    Removed(PositionId),
}

/// Map from local position id to its bracket
#[derive(Default)]
pub struct PositionRegistry {
    inner: Mutex<HashMap<PositionId, BracketOrder>>,
    events: Mutex<Option<mpsc::UnboundedSender<RegistryEvent>>>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to lifecycle events; only the latest subscriber receives
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock_events() = Some(tx);
        rx
    }

    /// Track a newly submitted bracket.
    /// Two live brackets must never share a main order id.
    pub fn register(&self, bracket: BracketOrder) -> Result<()> {
        let id = bracket.id;
        {
            let mut inner = self.lock_inner();
            if inner
                .values()
                .any(|b| b.main_order_id == bracket.main_order_id)
            {
                return Err(Error::InvalidData(format!(
                    "a live bracket already tracks main order {}",
                    bracket.main_order_id
                )));
            }
            inner.insert(id, bracket);
        }
        info!("Bracket {id} registered");
        self.emit(RegistryEvent::Registered(id));
        Ok(())
    }

    pub fn get(&self, id: &PositionId) -> Option<BracketOrder> {
        self.lock_inner().get(id).cloned()
    }

    /// Copies of every tracked bracket
    pub fn snapshot(&self) -> Vec<BracketOrder> {
        self.lock_inner().values().cloned().collect()
    }

    /// Mutate one bracket under the lock; returns the updated copy
    pub fn update<F>(&self, id: &PositionId, mutate: F) -> Option<BracketOrder>
    where
        F: FnOnce(&mut BracketOrder),
    {
        let mut inner = self.lock_inner();
        let bracket = inner.get_mut(id)?;
        mutate(bracket);
        Some(bracket.clone())
    }

    /// Stop tracking a bracket that reached a terminal state
    pub fn remove(&self, id: &PositionId) -> Option<BracketOrder> {
        let removed = self.lock_inner().remove(id);
        if removed.is_some() {
            info!("Bracket {id} removed from registry");
            self.emit(RegistryEvent::Removed(*id));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock_inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, event: RegistryEvent) {
        debug!("Registry event: {event:?}");
        let mut sender = self.lock_events();
        if let Some(tx) = sender.as_ref() {
            if tx.send(event).is_err() {
                // subscriber went away
                *sender = None;
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, HashMap<PositionId, BracketOrder>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<RegistryEvent>>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mexcbot_core::OrderSide;
    use rust_decimal_macros::dec;

    fn bracket(main_order_id: &str) -> BracketOrder {
        let mut bracket = BracketOrder::new(
            "XRPUSDT",
            OrderSide::Buy,
            dec!(5),
            dec!(1.10),
            dec!(1.00),
            dec!(5.00),
        )
        .unwrap();
        bracket.main_order_id = main_order_id.to_string();
        bracket
    }

    #[test]
    fn rejects_duplicate_main_order_ids() {
        let registry = PositionRegistry::new();
        registry.register(bracket("42")).unwrap();
        assert!(registry.register(bracket("42")).is_err());
        assert!(registry.register(bracket("43")).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn snapshots_are_independent_copies() {
        let registry = PositionRegistry::new();
        let original = bracket("42");
        let id = original.id;
        registry.register(original).unwrap();

        let mut snapshot = registry.snapshot();
        snapshot[0].main_order_id = "tampered".to_string();
        assert_eq!(registry.get(&id).unwrap().main_order_id, "42");
    }

    #[test]
    fn update_mutates_under_the_lock() {
        let registry = PositionRegistry::new();
        let b = bracket("42");
        let id = b.id;
        registry.register(b).unwrap();

        let updated = registry
            .update(&id, |b| b.last_error = Some("timeout".to_string()))
            .unwrap();
        assert_eq!(updated.last_error.as_deref(), Some("timeout"));
        assert_eq!(
            registry.get(&id).unwrap().last_error.as_deref(),
            Some("timeout")
        );
    }

    #[test]
    fn emits_registered_and_removed_events() {
        let registry = PositionRegistry::new();
        let mut events = registry.subscribe();

        let b = bracket("42");
        let id = b.id;
        registry.register(b).unwrap();
        registry.remove(&id);
        // removing twice is a no-op and emits nothing further
        assert!(registry.remove(&id).is_none());

        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Registered(id));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Removed(id));
        assert!(events.try_recv().is_err());
    }
}
