//! The per-session event loop driving one MQTT connection until it is
//! cancelled or hits a fatal error.

use std::sync::Arc;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::state::ConnectionState;
use crate::dispatch::{NotificationDispatcher, Payload};

pub(crate) struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    dispatcher: Arc<NotificationDispatcher>,
    state: watch::Sender<ConnectionState>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl ConnectionKernel {
    pub(crate) fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        dispatcher: Arc<NotificationDispatcher>,
        state: watch::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            event_loop,
            dispatcher,
            state,
            backoff: Backoff::default(),
            cancel,
        }
    }

    /// Drives the session until cancellation or a fatal broker error.
    ///
    /// Transient failures never end the loop: the kernel waits out the
    /// backoff delay and lets `rumqttc` re-dial on the next poll. A fatal
    /// exit publishes `Disconnected`; a cancelled session publishes nothing,
    /// since the manager has already taken over the state channel (and may
    /// have handed it to a newer session).
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("push session cancelled");
                    // Best effort: the socket may already be gone.
                    let _ = self.client.disconnect().await;
                    return;
                }
                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(&event),
                    Err(err) if is_fatal(&err) => {
                        error!(error = %err, "push session failed permanently");
                        self.publish(ConnectionState::Disconnected);
                        return;
                    }
                    Err(err) => {
                        let delay = self.backoff.next_delay();
                        warn!(
                            error = %err,
                            attempt = self.backoff.attempt(),
                            delay_secs = delay.as_secs(),
                            "push connection lost, will reconnect"
                        );
                        self.publish(ConnectionState::Connecting);
                        tokio::select! {
                            _ = self.cancel.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    /// Publishes a state transition unless this session was cancelled. A
    /// cancelled kernel no longer owns the channel and must stay silent.
    fn publish(&self, state: ConnectionState) {
        if !self.cancel.is_cancelled() {
            let _ = self.state.send(state);
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                info!("push connection established");
                self.backoff.reset();
                self.publish(ConnectionState::Connected);
            }
            Event::Incoming(Packet::Publish(publish)) => {
                if let Some(payload) = decode_payload(&publish.payload) {
                    self.dispatcher.on_message(&payload);
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("broker requested disconnect");
                self.publish(ConnectionState::Connecting);
            }
            Event::Outgoing(Outgoing::PingReq) => {
                debug!("sending keep-alive ping");
            }
            _ => {}
        }
    }
}

/// Decodes an inbound publish payload into a JSON object.
///
/// Anything that is not a valid JSON object is dropped with a log line; a
/// malformed push must never take down the session or reach handlers.
pub(crate) fn decode_payload(bytes: &[u8]) -> Option<Payload> {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(other) => {
            warn!(kind = other_kind(&other), "dropping non-object push payload");
            None
        }
        Err(err) => {
            warn!(error = %err, "dropping malformed push payload");
            None
        }
    }
}

fn other_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Errors that retrying cannot fix: bad credentials, rejected client, TLS
/// misconfiguration, or the client half being dropped.
fn is_fatal(err: &ConnectionError) -> bool {
    match err {
        ConnectionError::Tls(_) => true,
        ConnectionError::ConnectionRefused(code) => matches!(
            code,
            ConnectReturnCode::RefusedProtocolVersion
                | ConnectReturnCode::BadClientId
                | ConnectReturnCode::BadUserNamePassword
                | ConnectReturnCode::NotAuthorized
        ),
        ConnectionError::RequestsDone => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_json_object_payloads() {
        let payload = decode_payload(br#"{"title": "Hi", "badge": 1}"#).unwrap();
        assert_eq!(payload.get("title").and_then(|v| v.as_str()), Some("Hi"));
    }

    #[test]
    fn drops_malformed_payloads() {
        assert!(decode_payload(b"not json").is_none());
        assert!(decode_payload(b"").is_none());
        assert!(decode_payload(&[0xff, 0xfe]).is_none());
    }

    #[test]
    fn drops_non_object_json() {
        assert!(decode_payload(b"[1, 2, 3]").is_none());
        assert!(decode_payload(b"\"hello\"").is_none());
        assert!(decode_payload(b"42").is_none());
    }

    #[test]
    fn credential_rejections_are_fatal() {
        assert!(is_fatal(&ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword
        )));
        assert!(is_fatal(&ConnectionError::ConnectionRefused(
            ConnectReturnCode::NotAuthorized
        )));
        assert!(!is_fatal(&ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable
        )));
    }

    #[test]
    fn io_errors_are_transient() {
        let err = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(!is_fatal(&err));
    }
}
