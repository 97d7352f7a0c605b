use std::sync::{Arc, RwLock};

///
/// DeleteNotifier
///
/// Observer of entry removals. `on_before_remove` runs to completion before
/// the physical delete is issued; `on_after_remove` runs only after the
/// delete succeeded.
///

pub trait DeleteNotifier: Send + Sync {
    fn on_before_remove(&self, dn: &str, object_classes: &[String]);
    fn on_after_remove(&self, dn: &str, object_classes: &[String]);
}

///
/// DeleteNotifierRegistry
///
/// Concurrent subscriber list. Notification iterates a snapshot, so a
/// notifier unsubscribing from within a hook does not deadlock.
///

#[derive(Default)]
pub struct DeleteNotifierRegistry {
    subscribers: RwLock<Vec<Arc<dyn DeleteNotifier>>>,
}

impl DeleteNotifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, notifier: Arc<dyn DeleteNotifier>) {
        self.subscribers
            .write()
            .expect("notifier registry poisoned")
            .push(notifier);
    }

    pub fn unsubscribe(&self, notifier: &Arc<dyn DeleteNotifier>) {
        self.subscribers
            .write()
            .expect("notifier registry poisoned")
            .retain(|existing| !Arc::ptr_eq(existing, notifier));
    }

    pub fn notify_before(&self, dn: &str, object_classes: &[String]) {
        for notifier in self.snapshot() {
            notifier.on_before_remove(dn, object_classes);
        }
    }

    pub fn notify_after(&self, dn: &str, object_classes: &[String]) {
        for notifier in self.snapshot() {
            notifier.on_after_remove(dn, object_classes);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn DeleteNotifier>> {
        self.subscribers
            .read()
            .expect("notifier registry poisoned")
            .clone()
    }
}

///
/// TESTS
///
