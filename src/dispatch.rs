//! Turns decoded inbound pushes into local-notification display requests and
//! fans them out to the caller-supplied handlers.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::Value;
use tracing::{info, warn};

/// Decoded inbound push payload: an arbitrary JSON object.
pub type Payload = serde_json::Map<String, Value>;

type Callback = Box<dyn Fn(&Payload) + Send + Sync>;

/// Seam to the host OS notification UI.
///
/// Both methods are fire-and-forget from the dispatcher's point of view:
/// permission outcome never gates registration, and display failures are
/// logged, never propagated to message handlers.
pub trait NotificationCenter: Send + Sync + 'static {
    /// Ask the user for permission to display notifications. Must not block.
    fn request_permission(&self) {}

    /// Display a local notification.
    fn show(&self, notification: &LocalNotification) -> anyhow::Result<()>;
}

/// Display request built from an inbound push payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalNotification {
    pub title: Option<String>,
    pub body: Option<String>,
    pub badge: Option<i64>,
    /// Full payload, attached as opaque metadata for click correlation.
    pub payload: Payload,
}

impl LocalNotification {
    fn from_payload(payload: &Payload) -> Self {
        Self {
            title: payload
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_owned),
            body: payload
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            badge: payload.get("badge").and_then(Value::as_i64),
            payload: payload.clone(),
        }
    }
}

/// Default display sink used when the embedder does not wire up an OS
/// integration: logs the notification content instead of showing UI.
#[derive(Debug, Default)]
pub struct LogNotificationCenter;

impl NotificationCenter for LogNotificationCenter {
    fn show(&self, notification: &LocalNotification) -> anyhow::Result<()> {
        info!(
            title = notification.title.as_deref().unwrap_or(""),
            body = notification.body.as_deref().unwrap_or(""),
            "push notification"
        );
        Ok(())
    }
}

/// Fans inbound messages out to the OS notification center and the
/// process-wide handlers.
///
/// Both handler slots are single-slot with replace semantics: the last
/// registration wins, there is no subscriber list.
pub struct NotificationDispatcher {
    center: Arc<dyn NotificationCenter>,
    handler: ArcSwapOption<Callback>,
    click_listener: ArcSwapOption<Callback>,
}

impl NotificationDispatcher {
    pub(crate) fn new(center: Arc<dyn NotificationCenter>) -> Self {
        Self {
            center,
            handler: ArcSwapOption::from(None),
            click_listener: ArcSwapOption::from(None),
        }
    }

    pub(crate) fn request_permission(&self) {
        self.center.request_permission();
    }

    /// Replaces the notification handler invoked for every inbound message.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.handler.store(Some(Arc::new(Box::new(handler))));
    }

    /// Replaces the listener invoked when the user interacts with a
    /// displayed notification.
    pub fn set_click_listener<F>(&self, listener: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.click_listener.store(Some(Arc::new(Box::new(listener))));
    }

    /// Handles one decoded inbound message: requests OS display and invokes
    /// the handler. The handler runs whether or not display succeeded.
    pub fn on_message(&self, payload: &Payload) {
        let notification = LocalNotification::from_payload(payload);
        if let Err(e) = self.center.show(&notification) {
            warn!(error = %e, "failed to display notification");
        }

        if let Some(handler) = self.handler.load_full() {
            handler(payload);
        }
    }

    /// Invoked by the OS notification-click callback with the payload that
    /// was attached at display time.
    pub fn on_click(&self, payload: &Payload) {
        if let Some(listener) = self.click_listener.load_full() {
            listener(payload);
        }
    }
}
