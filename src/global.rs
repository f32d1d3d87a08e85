//! Process-wide dispatcher slot for routing OS notification callbacks.
//!
//! The host OS delivers notification events against a registered delegate
//! type, not against a particular client instance, so a process-wide
//! resolution step is required to route those events back into the active
//! client's [`NotificationDispatcher`]. The slot is set by the first client
//! constructed and never cleared automatically; embedders running multiple
//! clients can override it explicitly with [`set_shared`].
//!
//! Reads are lock-free: a single atomic load plus a cheap `Arc` clone.

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;

use crate::dispatch::{NotificationDispatcher, Payload};

static SHARED: OnceLock<ArcSwapOption<NotificationDispatcher>> = OnceLock::new();

#[inline]
fn slot() -> &'static ArcSwapOption<NotificationDispatcher> {
    SHARED.get_or_init(|| ArcSwapOption::from(None))
}

/// Installs `dispatcher` as the shared instance unless one is already set.
/// First construction wins.
pub(crate) fn install(dispatcher: &Arc<NotificationDispatcher>) {
    let slot = slot();
    if slot.load().is_none() {
        slot.store(Some(dispatcher.clone()));
    }
}

/// Returns the dispatcher of the active client, if any client was built.
pub fn shared() -> Option<Arc<NotificationDispatcher>> {
    slot().load_full()
}

/// Replaces the shared dispatcher unconditionally. Intended for embedders
/// managing several clients and for test hygiene.
pub fn set_shared(dispatcher: Arc<NotificationDispatcher>) {
    slot().store(Some(dispatcher));
}

/// Entry point for the OS notification-click callback: routes the payload
/// attached at display time into the active client's click listener.
pub fn on_notification_click(payload: &Payload) {
    if let Some(dispatcher) = shared() {
        dispatcher.on_click(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LogNotificationCenter;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn set_shared_replaces_and_routes_clicks() {
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(LogNotificationCenter)));

        let clicked = Arc::new(Mutex::new(0));
        let sink = clicked.clone();
        dispatcher.set_click_listener(move |_| *sink.lock().unwrap() += 1);

        set_shared(dispatcher.clone());
        assert!(Arc::ptr_eq(&shared().unwrap(), &dispatcher));

        let payload = json!({"title": "Hi"}).as_object().unwrap().clone();
        on_notification_click(&payload);
        assert_eq!(*clicked.lock().unwrap(), 1);
    }
}
