//! Always-on push session over MQTT.
//!
//! [`ConnectionManager`] owns at most one live session at a time. A session
//! is a background task running a [`kernel::ConnectionKernel`] that keeps
//! reconnecting until explicitly disconnected or until the broker rejects the
//! device permanently.

mod backoff;
mod kernel;
mod state;

pub use state::ConnectionState;

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rumqttc::{AsyncClient, MqttOptions, Transport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants;
use crate::dispatch::NotificationDispatcher;
use crate::registration::DeviceCredential;
use crate::settings::SettingsStore;

struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub(crate) struct ConnectionManager {
    settings: Arc<dyn SettingsStore>,
    dispatcher: Arc<NotificationDispatcher>,
    session: tokio::sync::Mutex<Option<SessionHandle>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    #[cfg(test)]
    sessions_started: AtomicUsize,
}

impl ConnectionManager {
    pub(crate) fn new(
        settings: Arc<dyn SettingsStore>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            settings,
            dispatcher,
            session: tokio::sync::Mutex::new(None),
            state_tx,
            state_rx,
            #[cfg(test)]
            sessions_started: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub(crate) fn is_connecting(&self) -> bool {
        self.state().is_connecting()
    }

    /// Starts the push session for the registered device. No-op when no
    /// credential is stored or a session is already running.
    pub(crate) async fn connect(&self) {
        let Some(credential) = self.credential() else {
            debug!("no device credential stored, skipping push connection");
            return;
        };

        let mut session = self.session.lock().await;
        if let Some(handle) = session.as_ref() {
            if !handle.task.is_finished() {
                debug!("push session already running");
                return;
            }
        }

        let _ = self.state_tx.send(ConnectionState::Connecting);

        let options = self.mqtt_options(&credential);
        let (client, event_loop) = AsyncClient::new(options, 16);

        let cancel = CancellationToken::new();
        let kernel = kernel::ConnectionKernel::new(
            client,
            event_loop,
            self.dispatcher.clone(),
            self.state_tx.clone(),
            cancel.clone(),
        );

        info!(token = %credential.token, "starting push session");
        let task = tokio::spawn(kernel.run());
        *session = Some(SessionHandle { cancel, task });
        #[cfg(test)]
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Tears down the running session, if any. The session never reconnects
    /// after this; a fresh `connect` call is required.
    pub(crate) async fn disconnect(&self) {
        let handle = self.session.lock().await.take();
        if let Some(handle) = handle {
            info!("stopping push session");
            handle.cancel.cancel();
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
    }

    fn credential(&self) -> Option<DeviceCredential> {
        let token = self.settings.get_string(constants::TOKEN_KEY)?;
        let auth = self.settings.get_string(constants::TOKEN_AUTH_KEY)?;
        Some(DeviceCredential { token, auth })
    }

    fn keep_alive(&self) -> Duration {
        self.settings
            .get_i64(constants::KEEP_ALIVE_KEY)
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(constants::DEFAULT_KEEP_ALIVE)
    }

    fn mqtt_options(&self, credential: &DeviceCredential) -> MqttOptions {
        let mut options = MqttOptions::new(
            &credential.token,
            session_host(),
            constants::MQTT_PORT,
        );
        options.set_credentials(&credential.token, &credential.auth);
        options.set_keep_alive(self.keep_alive());
        options.set_transport(Transport::tls_with_default_config());
        options
    }

    #[cfg(test)]
    pub(crate) fn sessions_started(&self) -> usize {
        self.sessions_started.load(Ordering::Relaxed)
    }
}

/// Broker hostname for a fresh session. The timestamp placeholder spreads
/// sessions across the broker fleet and defeats stale DNS caching.
fn session_host() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    constants::MQTT_HOSTNAME_TEMPLATE.replace("{ts}", &now.to_string())
}
