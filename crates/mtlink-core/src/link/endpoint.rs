//! Labelled socket endpoints and the registry that owns them.
//!
//! Every endpoint is one TCP connection to the terminal host, identified by a
//! short label such as `"SUB"` or `"PUSH"`. The registry validates the
//! requested set, connects each endpoint, and keeps the write halves plus the
//! last raw line seen per endpoint. Read halves move into the session's
//! receive loop at connect time.

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::info;

use crate::error::LinkError;

// ---------------------------------------------------------------------------
// Role / EndpointSpec
// ---------------------------------------------------------------------------

/// Direction an endpoint participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
    SenderReceiver,
}

impl Role {
    pub fn can_send(self) -> bool {
        matches!(self, Self::Sender | Self::SenderReceiver)
    }

    pub fn can_receive(self) -> bool {
        matches!(self, Self::Receiver | Self::SenderReceiver)
    }
}

/// A requested endpoint: label, port on the shared host, role.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub label: String,
    pub port: u16,
    pub role: Role,
}

impl EndpointSpec {
    pub fn new(label: impl Into<String>, port: u16, role: Role) -> Self {
        Self {
            label: label.into(),
            port,
            role,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Connected endpoint state held by the registry.
///
/// The write half stays open for every role so the socket keeps both
/// directions alive; role checks gate actual use.
pub(crate) struct Endpoint {
    pub(crate) label: String,
    pub(crate) port: u16,
    pub(crate) role: Role,
    pub(crate) writer: Option<OwnedWriteHalf>,
    pub(crate) cache: String,
}

/// Read half of an endpoint, owned by the receive loop, with its partial-line
/// buffer.
pub(crate) struct RxEndpoint {
    pub(crate) label: String,
    pub(crate) reader: OwnedReadHalf,
    pub(crate) buf: Vec<u8>,
}

/// All endpoints of one session, in the order they were opened.
pub(crate) struct Registry {
    endpoints: Vec<Endpoint>,
    closed: bool,
}

impl Registry {
    /// Validate the requested endpoints and connect each one. Returns the
    /// registry plus the read halves for the receive loop.
    pub(crate) async fn open(
        host: &str,
        specs: &[EndpointSpec],
    ) -> Result<(Self, Vec<RxEndpoint>), LinkError> {
        if specs.is_empty() {
            return Err(LinkError::Config("no endpoints requested".to_string()));
        }
        for (i, spec) in specs.iter().enumerate() {
            for other in &specs[..i] {
                if other.label == spec.label {
                    return Err(LinkError::Config(format!(
                        "duplicate endpoint label \"{}\"",
                        spec.label
                    )));
                }
                if other.port == spec.port {
                    return Err(LinkError::Config(format!(
                        "port {} requested by both \"{}\" and \"{}\"",
                        spec.port, other.label, spec.label
                    )));
                }
            }
        }

        let mut endpoints = Vec::with_capacity(specs.len());
        let mut readers = Vec::new();
        for spec in specs {
            let stream = TcpStream::connect((host, spec.port)).await.map_err(|e| {
                LinkError::Transport(format!(
                    "{} failed to connect to {host}:{}: {e}",
                    spec.label, spec.port
                ))
            })?;
            let _ = stream.set_nodelay(true);
            let (reader, writer) = stream.into_split();
            if spec.role.can_receive() {
                readers.push(RxEndpoint {
                    label: spec.label.clone(),
                    reader,
                    buf: Vec::new(),
                });
            }
            endpoints.push(Endpoint {
                label: spec.label.clone(),
                port: spec.port,
                role: spec.role,
                writer: Some(writer),
                cache: String::new(),
            });
            info!("[Init] {} connected to {host}:{}", spec.label, spec.port);
        }
        Ok((
            Self {
                endpoints,
                closed: false,
            },
            readers,
        ))
    }

    fn find(&self, label: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.label == label)
    }

    pub(crate) fn get_mut(&mut self, label: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.label == label)
    }

    /// Whether the labelled endpoint exists and may send.
    pub fn send_capable(&self, label: &str) -> bool {
        self.find(label).is_some_and(|e| e.role.can_send())
    }

    /// Whether the labelled endpoint exists and may receive.
    pub fn receive_capable(&self, label: &str) -> bool {
        self.find(label).is_some_and(|e| e.role.can_receive())
    }

    /// Last raw line sent or received on the labelled endpoint.
    pub fn last_message(&self, label: &str) -> Option<&str> {
        self.find(label).map(|e| e.cache.as_str())
    }

    pub(crate) fn set_cache(&mut self, label: &str, raw: &str) {
        if let Some(endpoint) = self.get_mut(label) {
            endpoint.cache = raw.to_string();
        }
    }

    /// Labels of all send-capable endpoints, in open order.
    pub fn sender_labels(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .filter(|e| e.role.can_send())
            .map(|e| e.label.clone())
            .collect()
    }

    /// Labels of all receive-capable endpoints, in open order.
    pub fn receiver_labels(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .filter(|e| e.role.can_receive())
            .map(|e| e.label.clone())
            .collect()
    }

    /// Drop every write half and mark the registry closed. Safe to call more
    /// than once.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for endpoint in &mut self.endpoints {
            if endpoint.writer.take().is_some() {
                info!(
                    "[Exit] {} disconnected from port {}",
                    endpoint.label, endpoint.port
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_capabilities() {
        assert!(Role::Sender.can_send());
        assert!(!Role::Sender.can_receive());
        assert!(!Role::Receiver.can_send());
        assert!(Role::Receiver.can_receive());
        assert!(Role::SenderReceiver.can_send());
        assert!(Role::SenderReceiver.can_receive());
    }

    #[tokio::test]
    async fn open_rejects_duplicate_labels() {
        let specs = vec![
            EndpointSpec::new("SUB", 19001, Role::Receiver),
            EndpointSpec::new("SUB", 19002, Role::Sender),
        ];
        let err = Registry::open("127.0.0.1", &specs).await.err().unwrap();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[tokio::test]
    async fn open_rejects_shared_ports() {
        let specs = vec![
            EndpointSpec::new("SUB", 19001, Role::Receiver),
            EndpointSpec::new("PUSH", 19001, Role::Sender),
        ];
        let err = Registry::open("127.0.0.1", &specs).await.err().unwrap();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[tokio::test]
    async fn open_rejects_empty_spec() {
        let err = Registry::open("127.0.0.1", &[]).await.err().unwrap();
        assert!(matches!(err, LinkError::Config(_)));
    }
}
