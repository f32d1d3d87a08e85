//! The public client facade tying registration, the push session and
//! notification dispatch together.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::api::{ApiClient, SuccessResponse};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::constants;
use crate::dispatch::{
    LogNotificationCenter, NotificationCenter, NotificationDispatcher, Payload,
};
use crate::errors::{BuildError, Error, Result};
use crate::global;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::registration::{DeviceCredential, RegistrationManager};
use crate::settings::{FileSettings, SettingsStore};

/// The client most applications want: [`PushyClient`] over the production
/// HTTP transport.
pub type Client = PushyClient<ReqwestTransport>;

#[derive(Serialize)]
struct TopicsRequest<'a> {
    token: &'a str,
    auth: &'a str,
    topics: &'a [&'a str],
}

/// Device-side Pushy client.
///
/// One instance per application. Cheap to share behind an `Arc`; every
/// method takes `&self`.
pub struct PushyClient<H: HttpTransport> {
    api: ApiClient<H>,
    registration: RegistrationManager<H>,
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<NotificationDispatcher>,
    settings: Arc<dyn SettingsStore>,
}

impl Client {
    pub fn builder() -> PushyClientBuilder {
        PushyClientBuilder::default()
    }
}

impl<H: HttpTransport> PushyClient<H> {
    /// Registers the device and starts the push session.
    ///
    /// Idempotent: an already-registered device is validated and reused, a
    /// stale registration is silently replaced. Returns the device token.
    pub async fn register(&self) -> Result<String> {
        self.dispatcher.request_permission();
        let token = self.registration.register().await?;
        self.connection.connect().await;
        Ok(token)
    }

    /// Clears the stored device credential and tears down the push session.
    /// Purely local; the backend is not notified.
    pub async fn unregister(&self) {
        self.registration.unregister();
        self.connection.disconnect().await;
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_registered()
    }

    /// Device token of the current registration, if any.
    pub fn device_token(&self) -> Option<String> {
        self.device_credentials().map(|c| c.token)
    }

    pub fn device_credentials(&self) -> Option<DeviceCredential> {
        self.registration.credentials()
    }

    /// Current push session state. Always `Disconnected` for an unregistered
    /// device.
    pub fn connection_state(&self) -> ConnectionState {
        if !self.is_registered() {
            return ConnectionState::Disconnected;
        }
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.connection_state().is_connecting()
    }

    /// Subscribes the device to a single topic.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscribe_topics(&[topic]).await
    }

    /// Subscribes the device to several topics in one call.
    pub async fn subscribe_topics(&self, topics: &[&str]) -> Result<()> {
        self.pubsub("/devices/subscribe", topics).await
    }

    /// Unsubscribes the device from a single topic.
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.unsubscribe_topics(&[topic]).await
    }

    /// Unsubscribes the device from several topics in one call.
    pub async fn unsubscribe_topics(&self, topics: &[&str]) -> Result<()> {
        self.pubsub("/devices/unsubscribe", topics).await
    }

    async fn pubsub(&self, path: &str, topics: &[&str]) -> Result<()> {
        let Some(credential) = self.device_credentials() else {
            return Err(Error::DeviceCredentials);
        };

        let request = TopicsRequest {
            token: &credential.token,
            auth: &credential.auth,
            topics,
        };

        match self.api.post::<_, SuccessResponse>(path, &request).await {
            Ok(SuccessResponse { success: true }) => Ok(()),
            Ok(SuccessResponse { success: false }) => Err(Error::PubSub(format!(
                "the API declined the {path} request"
            ))),
            Err(Error::InvalidResponse(reason)) => Err(Error::PubSub(reason)),
            Err(e) => Err(e),
        }
    }

    /// Overrides the registration App ID. Changing it invalidates the current
    /// device, so the client unregisters before persisting the new value.
    /// `None` restores registration by application identifier.
    pub async fn set_app_id(&self, app_id: Option<&str>) {
        let current = self.settings.get_string(constants::APP_ID_KEY);
        if current.as_deref() == app_id {
            return;
        }

        info!(app_id = app_id.unwrap_or(""), "switching App ID");
        self.unregister().await;
        self.settings.set_string(constants::APP_ID_KEY, app_id);
    }

    /// Points the client at a Pushy Enterprise deployment. A trailing slash
    /// is stripped so path concatenation stays predictable. Changing the
    /// endpoint unregisters the device first; clearing it with `None` does
    /// not, since existing registrations stay valid on their home endpoint.
    pub async fn set_enterprise_config(&self, endpoint: Option<&str>) {
        let Some(endpoint) = endpoint else {
            self.settings.set_string(constants::ENTERPRISE_API_KEY, None);
            return;
        };

        let endpoint = endpoint.trim_end_matches('/');
        let current = self.settings.get_string(constants::ENTERPRISE_API_KEY);
        if current.as_deref() == Some(endpoint) {
            return;
        }

        info!(%endpoint, "switching to enterprise endpoint");
        self.unregister().await;
        self.settings
            .set_string(constants::ENTERPRISE_API_KEY, Some(endpoint));
    }

    /// Sets the MQTT keep-alive interval in seconds. Takes effect on the next
    /// session, not the one currently running. `None` restores the default.
    pub fn set_keep_alive_interval(&self, seconds: Option<u64>) {
        debug!(seconds = seconds.unwrap_or(0), "updating keep-alive interval");
        self.settings
            .set_i64(constants::KEEP_ALIVE_KEY, seconds.map(|s| s as i64));
    }

    /// Effective API base URL, accounting for an enterprise override.
    pub fn api_endpoint(&self) -> String {
        self.api.endpoint()
    }

    /// Replaces the handler invoked for every inbound push.
    pub fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.dispatcher.set_handler(handler);
    }

    /// Replaces the listener invoked when a displayed notification is
    /// clicked.
    pub fn set_notification_click_listener<F>(&self, listener: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.dispatcher.set_click_listener(listener);
    }
}

/// Builder for [`PushyClient`].
///
/// Defaults: file-backed settings in the platform config directory, a
/// log-only notification center, and the `reqwest` transport.
#[derive(Default)]
pub struct PushyClientBuilder {
    app: Option<String>,
    settings: Option<Arc<dyn SettingsStore>>,
    center: Option<Arc<dyn NotificationCenter>>,
}

impl PushyClientBuilder {
    /// Application identifier used for registration.
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Custom credential store. Defaults to JSON settings under the platform
    /// config directory.
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// OS notification integration. Defaults to a log-only sink.
    pub fn notification_center(mut self, center: Arc<dyn NotificationCenter>) -> Self {
        self.center = Some(center);
        self
    }

    pub fn build(self) -> Result<Client, BuildError> {
        let transport = ReqwestTransport::new()?;
        self.build_with_transport(transport)
    }

    /// Builds the client over a caller-supplied HTTP transport.
    pub fn build_with_transport<H: HttpTransport>(
        self,
        transport: H,
    ) -> Result<PushyClient<H>, BuildError> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => {
                let file = FileSettings::open_default()
                    .map_err(|e| BuildError::Settings(e.to_string()))?;
                Arc::new(file)
            }
        };

        let center = self
            .center
            .unwrap_or_else(|| Arc::new(LogNotificationCenter));
        let dispatcher = Arc::new(NotificationDispatcher::new(center));
        global::install(&dispatcher);

        let api = ApiClient::new(transport, settings.clone());
        let registration = RegistrationManager::new(api.clone(), settings.clone(), self.app);
        let connection = Arc::new(ConnectionManager::new(settings.clone(), dispatcher.clone()));

        Ok(PushyClient {
            api,
            registration,
            connection,
            dispatcher,
            settings,
        })
    }
}
