//! Device-side client for the Pushy push notification service.
//!
//! The crate registers a device against the Pushy API, keeps the resulting
//! credentials fresh, and maintains an always-reconnecting MQTT session over
//! TLS to receive pushes in real time. The [`PushyClient`] facade exposes the
//! whole lifecycle: register, unregister, topic subscribe/unsubscribe and
//! endpoint configuration.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = pushy::Client::builder().app("com.example.myapp").build()?;
//!
//! client.set_notification_handler(|payload| {
//!     println!("push received: {payload:?}");
//! });
//!
//! let token = client.register().await?;
//! println!("device token: {token}");
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

mod api;
mod client;
mod connection;
pub mod constants;
mod dispatch;
pub mod errors;
pub mod global;
mod http;
mod registration;
mod settings;

// --- PUBLIC API EXPORTS ---
pub use client::{Client, PushyClient, PushyClientBuilder};
pub use connection::ConnectionState;
pub use dispatch::{LocalNotification, NotificationCenter, NotificationDispatcher, Payload};
pub use errors::{BuildError, Error, Result};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};
pub use registration::DeviceCredential;
pub use settings::{FileSettings, MemorySettings, SettingsStore};
