//! Service endpoints, defaults, and persisted setting keys.

use std::time::Duration;

/// Public Pushy API endpoint. Overridable per device with
/// [`PushyClient::set_enterprise_config`](crate::PushyClient::set_enterprise_config).
pub const API_BASE_URL: &str = "https://api.pushy.me";

/// MQTT gateway hostname template. `{ts}` is substituted with the current Unix
/// timestamp so DNS load balancing is not defeated by resolver caching.
pub const MQTT_HOSTNAME_TEMPLATE: &str = "mqtt-{ts}.pushy.io";

/// MQTT gateway port (TLS).
pub const MQTT_PORT: u16 = 443;

/// Keep-alive interval used when no override is persisted (5 minutes).
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60 * 5);

/// Platform tag reported in registration payloads.
pub const PLATFORM: &str = "macos";

pub const DEFAULT_USER_AGENT: &str = concat!("pushy-rust", "@", env!("CARGO_PKG_VERSION"));

// === Persisted setting keys ===

/// Device token assigned by the API on registration.
pub const TOKEN_KEY: &str = "pushyToken";
/// Auth secret paired with the device token. Written and cleared together
/// with [`TOKEN_KEY`], never one without the other.
pub const TOKEN_AUTH_KEY: &str = "pushyTokenAuth";
/// Custom Pushy App ID, used instead of the application identifier when set.
pub const APP_ID_KEY: &str = "pushyAppId";
/// Self-hosted (enterprise) API endpoint override.
pub const ENTERPRISE_API_KEY: &str = "pushyEnterpriseApi";
/// Keep-alive interval override, in seconds.
pub const KEEP_ALIVE_KEY: &str = "pushyKeepAlive";
