//! Device identity lifecycle: first-time registration, credential validation,
//! and re-registration when the backend no longer recognizes the device.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{ApiClient, SuccessResponse};
use crate::constants;
use crate::errors::{Error, Result};
use crate::http::HttpTransport;
use crate::settings::SettingsStore;

/// The (token, auth secret) pair identifying a registered device to the backend.
///
/// Both fields are persisted together and cleared together; the store never
/// holds one without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredential {
    pub token: String,
    pub auth: String,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    platform: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    app: Option<&'a str>,
    #[serde(rename = "appId", skip_serializing_if = "Option::is_none")]
    app_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    token: String,
    auth: String,
}

#[derive(Serialize)]
struct CredentialBody<'a> {
    token: &'a str,
    auth: &'a str,
}

pub(crate) struct RegistrationManager<H: HttpTransport> {
    api: ApiClient<H>,
    settings: Arc<dyn SettingsStore>,
    /// Host application identifier, supplied at build time. Used for
    /// registration unless a custom App ID is persisted.
    app: Option<String>,
    /// Serializes concurrent register attempts so they cannot race to create
    /// two divergent device identities.
    guard: tokio::sync::Mutex<()>,
}

impl<H: HttpTransport> RegistrationManager<H> {
    pub(crate) fn new(
        api: ApiClient<H>,
        settings: Arc<dyn SettingsStore>,
        app: Option<String>,
    ) -> Self {
        Self {
            api,
            settings,
            app,
            guard: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn credentials(&self) -> Option<DeviceCredential> {
        let token = self.settings.get_string(constants::TOKEN_KEY)?;
        let auth = self.settings.get_string(constants::TOKEN_AUTH_KEY)?;
        Some(DeviceCredential { token, auth })
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.settings.get_string(constants::TOKEN_KEY).is_some()
    }

    /// Idempotent registration entry point. Returns the device token.
    ///
    /// A device with persisted credentials is validated against the API
    /// first; a rejected credential silently falls through to re-registration
    /// (the expected path when the prior registration expired server-side).
    /// Only genuine transport or decode failures surface as errors, without
    /// touching stored state.
    pub(crate) async fn register(&self) -> Result<String> {
        let _guard = self.guard.lock().await;

        let Some(credential) = self.credentials() else {
            return self.create_new_device().await;
        };

        if self.validate_credentials(&credential).await? {
            Ok(credential.token)
        } else {
            debug!("stored credentials no longer valid, registering a new device");
            self.create_new_device().await
        }
    }

    /// Registers a brand new device with the API and persists its credentials.
    async fn create_new_device(&self) -> Result<String> {
        let custom_app_id = self.settings.get_string(constants::APP_ID_KEY);

        let request = match (custom_app_id.as_deref(), self.app.as_deref()) {
            // A custom App ID takes precedence over the application identifier.
            (Some(app_id), _) => RegisterRequest {
                platform: constants::PLATFORM,
                app: None,
                app_id: Some(app_id),
            },
            (None, Some(app)) => RegisterRequest {
                platform: constants::PLATFORM,
                app: Some(app),
                app_id: None,
            },
            (None, None) => return Err(Error::MissingIdentifier),
        };

        let response: RegisterResponse = self.api.post("/register", &request).await?;

        // Token and auth always land in the store together.
        self.settings
            .set_string(constants::TOKEN_KEY, Some(&response.token));
        self.settings
            .set_string(constants::TOKEN_AUTH_KEY, Some(&response.auth));

        info!(token = %response.token, "registered new device");
        Ok(response.token)
    }

    /// Asks the API whether the persisted credential is still recognized.
    ///
    /// An explicit API error body means the credential is stale, which is not
    /// a caller-visible failure; only transport and decode errors propagate.
    async fn validate_credentials(&self, credential: &DeviceCredential) -> Result<bool> {
        let body = CredentialBody {
            token: &credential.token,
            auth: &credential.auth,
        };

        match self
            .api
            .post::<_, SuccessResponse>("/devices/auth", &body)
            .await
        {
            Ok(response) => Ok(response.success),
            Err(Error::Api(reason)) => {
                debug!(%reason, "API rejected stored credentials");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Clears the persisted credential unconditionally. Purely local, never
    /// fails, no network call.
    pub(crate) fn unregister(&self) {
        self.settings.set_string(constants::TOKEN_KEY, None);
        self.settings.set_string(constants::TOKEN_AUTH_KEY, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::settings::MemorySettings;
    use serde_json::json;

    fn manager(
        transport: MockTransport,
        app: Option<&str>,
    ) -> (RegistrationManager<MockTransport>, Arc<MemorySettings>) {
        let settings = Arc::new(MemorySettings::new());
        let store: Arc<dyn SettingsStore> = settings.clone();
        let api = ApiClient::new(transport, store.clone());
        let manager = RegistrationManager::new(api, store, app.map(str::to_owned));
        (manager, settings)
    }

    #[tokio::test]
    async fn first_register_creates_device_and_persists_both_keys() {
        let transport = MockTransport::new();
        transport.respond("/register", 200, json!({"token": "T", "auth": "A"}));
        let (manager, settings) = manager(transport.clone(), Some("com.example.app"));

        let token = manager.register().await.unwrap();
        assert_eq!(token, "T");
        assert_eq!(transport.calls("/register"), 1);
        assert_eq!(transport.calls("/devices/auth"), 0);
        assert_eq!(
            settings.get_string(constants::TOKEN_KEY),
            Some("T".to_string())
        );
        assert_eq!(
            settings.get_string(constants::TOKEN_AUTH_KEY),
            Some("A".to_string())
        );
        assert_eq!(
            transport.last_body("/register").unwrap(),
            json!({"platform": "macos", "app": "com.example.app"})
        );
    }

    #[tokio::test]
    async fn register_twice_validates_without_reregistering() {
        let transport = MockTransport::new();
        transport.respond("/devices/auth", 200, json!({"success": true}));
        let (manager, settings) = manager(transport.clone(), Some("com.example.app"));
        settings.set_string(constants::TOKEN_KEY, Some("T"));
        settings.set_string(constants::TOKEN_AUTH_KEY, Some("A"));

        assert_eq!(manager.register().await.unwrap(), "T");
        assert_eq!(manager.register().await.unwrap(), "T");

        assert_eq!(transport.calls("/register"), 0);
        assert_eq!(transport.calls("/devices/auth"), 2);
        assert_eq!(
            transport.last_body("/devices/auth").unwrap(),
            json!({"token": "T", "auth": "A"})
        );
    }

    #[tokio::test]
    async fn rejected_validation_reregisters_silently() {
        let transport = MockTransport::new();
        transport.respond("/devices/auth", 200, json!({"success": false}));
        transport.respond("/register", 200, json!({"token": "T2", "auth": "A2"}));
        let (manager, settings) = manager(transport.clone(), Some("com.example.app"));
        settings.set_string(constants::TOKEN_KEY, Some("T1"));
        settings.set_string(constants::TOKEN_AUTH_KEY, Some("A1"));

        let token = manager.register().await.unwrap();
        assert_eq!(token, "T2");
        assert_eq!(transport.calls("/register"), 1);
        assert_eq!(
            settings.get_string(constants::TOKEN_AUTH_KEY),
            Some("A2".to_string())
        );
    }

    #[tokio::test]
    async fn api_error_body_during_validation_reregisters_silently() {
        let transport = MockTransport::new();
        transport.respond("/devices/auth", 200, json!({"error": "unknown device"}));
        transport.respond("/register", 200, json!({"token": "T2", "auth": "A2"}));
        let (manager, settings) = manager(transport.clone(), Some("com.example.app"));
        settings.set_string(constants::TOKEN_KEY, Some("T1"));
        settings.set_string(constants::TOKEN_AUTH_KEY, Some("A1"));

        assert_eq!(manager.register().await.unwrap(), "T2");
    }

    #[tokio::test]
    async fn transport_failure_during_validation_leaves_state_untouched() {
        let transport = MockTransport::new();
        transport.fail("/devices/auth", "connection reset");
        let (manager, settings) = manager(transport.clone(), Some("com.example.app"));
        settings.set_string(constants::TOKEN_KEY, Some("T"));
        settings.set_string(constants::TOKEN_AUTH_KEY, Some("A"));

        let result = manager.register().await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(transport.calls("/register"), 0);
        assert_eq!(
            settings.get_string(constants::TOKEN_KEY),
            Some("T".to_string())
        );
    }

    #[tokio::test]
    async fn missing_identifier_fails_without_network_call() {
        let transport = MockTransport::new();
        let (manager, _) = manager(transport.clone(), None);

        let result = manager.register().await;
        assert!(matches!(result, Err(Error::MissingIdentifier)));
        assert_eq!(transport.calls("/register"), 0);
    }

    #[tokio::test]
    async fn custom_app_id_replaces_app_in_payload() {
        let transport = MockTransport::new();
        transport.respond("/register", 200, json!({"token": "T", "auth": "A"}));
        let (manager, settings) = manager(transport.clone(), Some("com.example.app"));
        settings.set_string(constants::APP_ID_KEY, Some("X"));

        manager.register().await.unwrap();
        assert_eq!(
            transport.last_body("/register").unwrap(),
            json!({"platform": "macos", "appId": "X"})
        );
    }

    #[tokio::test]
    async fn unregister_clears_both_keys() {
        let transport = MockTransport::new();
        let (manager, settings) = manager(transport, Some("com.example.app"));
        settings.set_string(constants::TOKEN_KEY, Some("T"));
        settings.set_string(constants::TOKEN_AUTH_KEY, Some("A"));

        manager.unregister();
        assert_eq!(settings.get_string(constants::TOKEN_KEY), None);
        assert_eq!(settings.get_string(constants::TOKEN_AUTH_KEY), None);
        assert!(!manager.is_registered());
    }

    #[tokio::test]
    async fn credential_invariant_holds_across_register_unregister_cycle() {
        let transport = MockTransport::new();
        transport.respond("/register", 200, json!({"token": "T", "auth": "A"}));
        let (manager, settings) = manager(transport, Some("com.example.app"));

        manager.register().await.unwrap();
        let both_present = settings.get_string(constants::TOKEN_KEY).is_some()
            && settings.get_string(constants::TOKEN_AUTH_KEY).is_some();
        assert!(both_present);

        manager.unregister();
        let both_absent = settings.get_string(constants::TOKEN_KEY).is_none()
            && settings.get_string(constants::TOKEN_AUTH_KEY).is_none();
        assert!(both_absent);
    }
}
