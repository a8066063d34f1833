//! Update and purge notifications

use crate::error::PercolatorError;
use crate::storage::IndexRecord;
use parking_lot::RwLock;
use std::sync::Arc;

/// Receives index lifecycle events; every method defaults to a no-op
pub trait UpdateListener: Send + Sync {
    /// Before records are committed
    fn before_update(&self, _records: &[IndexRecord]) {}

    /// After records were committed
    fn after_update(&self, _records: &[IndexRecord]) {}

    /// Before pending deletions are committed
    fn before_delete(&self) {}

    /// After pending deletions were committed
    fn after_delete(&self) {}

    /// After the cache was rebuilt
    fn on_purge(&self) {}

    /// A cache rebuild failed; the previous cache stays in place
    fn on_purge_error(&self, _error: &PercolatorError) {}
}

/// Listeners notified in registration order
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn UpdateListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn each(&self, f: impl Fn(&dyn UpdateListener)) {
        // Snapshot so a listener may register another without deadlocking
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    pub fn before_commit(&self, records: Option<&[IndexRecord]>) {
        match records {
            Some(records) => self.each(|l| l.before_update(records)),
            None => self.each(|l| l.before_delete()),
        }
    }

    pub fn after_commit(&self, records: Option<&[IndexRecord]>) {
        match records {
            Some(records) => self.each(|l| l.after_update(records)),
            None => self.each(|l| l.after_delete()),
        }
    }

    pub fn after_purge(&self) {
        self.each(|l| l.on_purge());
    }

    pub fn after_purge_error(&self, error: &PercolatorError) {
        log::error!("Query cache purge failed: {}", error);
        self.each(|l| l.on_purge_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl UpdateListener for Recorder {
        fn before_delete(&self) {
            self.events.lock().push(format!("{}:before_delete", self.name));
        }

        fn after_delete(&self) {
            self.events.lock().push(format!("{}:after_delete", self.name));
        }

        fn on_purge_error(&self, error: &PercolatorError) {
            self.events.lock().push(format!("{}:error:{}", self.name, error));
        }
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.add(Arc::new(Recorder { name: "a", events: events.clone() }));
        registry.add(Arc::new(Recorder { name: "b", events: events.clone() }));

        registry.before_commit(None);
        registry.after_commit(None);
        registry.after_purge();
        registry.after_purge_error(&PercolatorError::Generic("x".to_string()));

        assert_eq!(
            *events.lock(),
            vec![
                "a:before_delete",
                "b:before_delete",
                "a:after_delete",
                "b:after_delete",
                "a:error:Generic error: x",
                "b:error:Generic error: x",
            ]
        );
    }
}
