//! JSON POST client for the Pushy registration API.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::constants;
use crate::errors::{Error, Result};
use crate::http::HttpTransport;
use crate::settings::SettingsStore;

/// Body shape the backend uses to signal failures, regardless of HTTP status.
#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Common `{success: bool}` response body.
#[derive(Deserialize)]
pub(crate) struct SuccessResponse {
    pub(crate) success: bool,
}

#[derive(Clone)]
pub(crate) struct ApiClient<H: HttpTransport> {
    transport: H,
    settings: Arc<dyn SettingsStore>,
}

impl<H: HttpTransport> ApiClient<H> {
    pub(crate) fn new(transport: H, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Effective API base URL: the persisted enterprise endpoint if one is
    /// configured, otherwise the public default.
    pub(crate) fn endpoint(&self) -> String {
        self.settings
            .get_string(constants::ENTERPRISE_API_KEY)
            .unwrap_or_else(|| constants::API_BASE_URL.to_string())
    }

    /// POSTs `body` to `path` under the effective endpoint and decodes the
    /// response.
    ///
    /// An explicit `{error}` body becomes [`Error::Api`] no matter the HTTP
    /// status; a response that decodes as neither `{error}` nor `T` becomes
    /// [`Error::InvalidResponse`]. Transport failures propagate as
    /// [`Error::Transport`].
    pub(crate) async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = Url::parse(&format!("{}{}", self.endpoint(), path))?;
        debug!(%url, "posting to the Pushy API");

        let payload = serde_json::to_vec(body)?;
        let response = self.transport.post_json(url, payload).await?;

        if let Ok(err) = serde_json::from_slice::<ApiErrorBody>(&response.body) {
            return Err(Error::Api(err.error));
        }
        if !response.status.is_success() {
            return Err(Error::InvalidResponse(format!(
                "unexpected status {} for {}",
                response.status, path
            )));
        }
        serde_json::from_slice(&response.body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::settings::MemorySettings;
    use serde_json::json;

    fn api(transport: MockTransport) -> (ApiClient<MockTransport>, Arc<MemorySettings>) {
        let settings = Arc::new(MemorySettings::new());
        (ApiClient::new(transport, settings.clone()), settings)
    }

    #[tokio::test]
    async fn decodes_success_body() {
        let transport = MockTransport::new();
        transport.respond("/devices/auth", 200, json!({"success": true}));
        let (api, _) = api(transport);

        let response: SuccessResponse = api
            .post("/devices/auth", &json!({"token": "T", "auth": "A"}))
            .await
            .unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn error_body_wins_over_status() {
        let transport = MockTransport::new();
        transport.respond("/register", 200, json!({"error": "invalid app"}));
        let (api, _) = api(transport);

        let result: Result<SuccessResponse> = api.post("/register", &json!({})).await;
        assert!(matches!(result, Err(Error::Api(message)) if message == "invalid app"));
    }

    #[tokio::test]
    async fn unexpected_status_is_invalid_response() {
        let transport = MockTransport::new();
        transport.respond("/register", 500, json!({"unrelated": 1}));
        let (api, _) = api(transport);

        let result: Result<SuccessResponse> = api.post("/register", &json!({})).await;
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let transport = MockTransport::new();
        transport.fail("/register", "connection reset");
        let (api, _) = api(transport);

        let result: Result<SuccessResponse> = api.post("/register", &json!({})).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn enterprise_endpoint_overrides_default() {
        let transport = MockTransport::new();
        transport.respond("/devices/auth", 200, json!({"success": true}));
        let (api, settings) = api(transport.clone());

        assert_eq!(api.endpoint(), crate::constants::API_BASE_URL);
        settings.set_string(
            crate::constants::ENTERPRISE_API_KEY,
            Some("https://pushy.example.com"),
        );
        assert_eq!(api.endpoint(), "https://pushy.example.com");

        let _: SuccessResponse = api.post("/devices/auth", &json!({})).await.unwrap();
        assert_eq!(
            transport.last_url().unwrap(),
            "https://pushy.example.com/devices/auth"
        );
    }
}
