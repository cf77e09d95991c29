//! Protocol session: connected endpoints, one receive loop, startup check,
//! cooperative shutdown.
//!
//! A session owns the endpoint registry and a single background task that
//! polls every receive-capable endpoint. Inbound lines are decoded and handed
//! to the session's [`MessageHandler`]; the raw text is cached on the
//! endpoint either way, which is what the startup check inspects.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::select_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{self, Command, Inbound};
use crate::config::{DEFAULT_CHECK_WAIT_MS, DEFAULT_HOST, DEFAULT_SHUTDOWN_GRACE_MS};
use crate::error::LinkError;
use crate::link::endpoint::{EndpointSpec, Registry, RxEndpoint};

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Handler outcome for one inbound message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Logged as a warning; the loop keeps running.
    #[error("{0}")]
    Recoverable(String),
    /// Disables communication and stops the receive loop.
    #[error("{0}")]
    Fatal(String),
}

/// Receives every decoded inbound message from the session's receive loop.
///
/// Implementations run on the loop task and serve every endpoint, so they
/// must not block for long.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, endpoint: &str, message: Inbound) -> Result<(), HandlerError>;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Connection parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host every endpoint connects to.
    pub host: String,
    /// Endpoints to open, in order.
    pub endpoints: Vec<EndpointSpec>,
    /// Wait per receiver endpoint during the startup check.
    pub check_wait: Duration,
    /// Grace period between the shutdown notice and teardown.
    pub shutdown_grace: Duration,
}

impl SessionConfig {
    pub fn new(endpoints: Vec<EndpointSpec>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            endpoints,
            check_wait: Duration::from_millis(DEFAULT_CHECK_WAIT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

/// A live link to the terminal.
pub struct Session {
    registry: Arc<Mutex<Registry>>,
    comm_enabled: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    loop_task: Option<JoinHandle<()>>,
    check_wait: Duration,
    shutdown_grace: Duration,
}

impl Session {
    /// Connect every endpoint, start the receive loop, and run the startup
    /// check. A failed check tears the session back down.
    pub async fn connect(
        config: SessionConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, LinkError> {
        let (registry, rx_endpoints) = Registry::open(&config.host, &config.endpoints).await?;
        let registry = Arc::new(Mutex::new(registry));
        let comm_enabled = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let loop_task = tokio::spawn(receive_loop(
            rx_endpoints,
            Arc::clone(&registry),
            handler,
            Arc::clone(&comm_enabled),
            shutdown_rx,
        ));

        let mut session = Self {
            registry,
            comm_enabled,
            shutdown_tx,
            loop_task: Some(loop_task),
            check_wait: config.check_wait,
            shutdown_grace: config.shutdown_grace,
        };

        if !session.check().await {
            error!("[Check] no answer from the terminal, tearing down");
            session.shutdown(false).await;
            return Err(LinkError::Handshake(
                "terminal did not answer the startup check".to_string(),
            ));
        }
        info!("[Check] terminal link established");
        Ok(session)
    }

    /// Probe every sender endpoint, then verify every receiver endpoint saw
    /// traffic within the configured wait.
    pub async fn check(&self) -> bool {
        let (senders, receivers) = {
            let Ok(registry) = self.registry.lock() else {
                return false;
            };
            (registry.sender_labels(), registry.receiver_labels())
        };
        for label in &senders {
            if let Err(e) = self.send(label, &Command::Check.render()) {
                warn!("[Check] probe on {label} failed: {e}");
            }
        }
        for label in &receivers {
            tokio::time::sleep(self.check_wait).await;
            let answered = {
                let Ok(registry) = self.registry.lock() else {
                    return false;
                };
                registry.last_message(label).is_some_and(|m| !m.is_empty())
            };
            if !answered {
                error!("[Check] {label} saw no traffic");
                return false;
            }
        }
        true
    }

    /// Pad and send one command line without blocking. Backpressure drops the
    /// line with a warning rather than stalling the caller.
    pub fn send(&self, label: &str, message: &str) -> Result<(), LinkError> {
        let line = codec::pad(message);
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| LinkError::Transport("endpoint registry lock poisoned".to_string()))?;
        let Some(endpoint) = registry.get_mut(label) else {
            return Err(LinkError::Validation(format!(
                "unknown endpoint \"{label}\""
            )));
        };
        if !endpoint.role.can_send() {
            warn!("[Send] {label} is not a sender endpoint");
            return Err(LinkError::Validation(format!(
                "endpoint \"{label}\" cannot send"
            )));
        }
        endpoint.cache = line.clone();
        let Some(writer) = endpoint.writer.as_mut() else {
            return Err(LinkError::Transport(format!(
                "endpoint \"{label}\" is closed"
            )));
        };
        let mut framed = line;
        framed.push('\n');
        match writer.try_write(framed.as_bytes()) {
            Ok(n) if n == framed.len() => {
                debug!("[Send] {label} <- {}", framed.trim_end());
                Ok(())
            }
            Ok(n) => {
                warn!(
                    "[Send] {label} wrote {n}/{} bytes, line truncated by backpressure",
                    framed.len()
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!("[Send] {label} has no capacity, line dropped");
                Ok(())
            }
            Err(e) => Err(LinkError::Transport(format!("send on {label}: {e}"))),
        }
    }

    /// Cooperative teardown. Optionally tells the terminal to close its side,
    /// waits out the grace period, stops the receive loop, and closes every
    /// endpoint. Safe to call more than once.
    pub async fn shutdown(&mut self, notify_remote: bool) {
        let Some(task) = self.loop_task.take() else {
            return;
        };
        if notify_remote {
            let senders = match self.registry.lock() {
                Ok(registry) => registry.sender_labels(),
                Err(_) => Vec::new(),
            };
            for label in &senders {
                if let Err(e) = self.send(label, &Command::Shutdown.render()) {
                    warn!("[Exit] shutdown notice on {label} failed: {e}");
                }
            }
        }
        tokio::time::sleep(self.shutdown_grace).await;
        self.comm_enabled.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut registry) = self.registry.lock() {
            registry.close();
        }
        let _ = task.await;
        info!("[Exit] session closed");
    }

    /// Whether the receive loop is still allowed to process traffic.
    pub fn comm_enabled(&self) -> bool {
        self.comm_enabled.load(Ordering::SeqCst)
    }

    /// Last raw line sent or received on an endpoint.
    pub fn last_message(&self, label: &str) -> Option<String> {
        self.registry
            .lock()
            .ok()
            .and_then(|r| r.last_message(label).map(String::from))
    }

    pub fn send_capable(&self, label: &str) -> bool {
        self.registry
            .lock()
            .is_ok_and(|r| r.send_capable(label))
    }

    pub fn receive_capable(&self, label: &str) -> bool {
        self.registry
            .lock()
            .is_ok_and(|r| r.receive_capable(label))
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

enum DrainState {
    Open,
    Eof,
    Failed(io::Error),
}

/// One task serving every receive-capable endpoint. Blocks until some socket
/// is readable or shutdown is signalled, then sweeps all endpoints with
/// non-blocking reads, splitting complete lines out of per-endpoint buffers.
async fn receive_loop(
    mut endpoints: Vec<RxEndpoint>,
    registry: Arc<Mutex<Registry>>,
    handler: Arc<dyn MessageHandler>,
    comm_enabled: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("[Recv] loop started with {} endpoints", endpoints.len());
    'outer: while comm_enabled.load(Ordering::SeqCst) {
        if endpoints.is_empty() {
            debug!("[Recv] no receive-capable endpoints left");
            break;
        }

        let woke = {
            let readables: Vec<_> = endpoints
                .iter()
                .map(|ep| Box::pin(ep.reader.readable()))
                .collect();
            tokio::select! {
                _ = shutdown_rx.changed() => None,
                (ready, index, _) = select_all(readables) => Some((index, ready)),
            }
        };
        let Some((wake_index, ready)) = woke else {
            break;
        };
        if let Err(e) = ready {
            warn!("[Recv] {}: poll failed: {e}", endpoints[wake_index].label);
            endpoints.remove(wake_index);
            continue;
        }

        let mut index = 0;
        while index < endpoints.len() {
            let (lines, state) = drain_lines(&mut endpoints[index]);
            let label = endpoints[index].label.clone();
            for raw in &lines {
                handle_line(&label, raw, &registry, handler.as_ref(), &comm_enabled);
                if !comm_enabled.load(Ordering::SeqCst) {
                    break 'outer;
                }
            }
            match state {
                DrainState::Open => index += 1,
                DrainState::Eof => {
                    info!("[Recv] {label} closed by peer");
                    endpoints.remove(index);
                }
                DrainState::Failed(e) => {
                    warn!("[Recv] {label}: read failed: {e}");
                    endpoints.remove(index);
                }
            }
        }
    }
    debug!("[Recv] loop stopped");
}

/// Pull everything currently readable into the endpoint buffer and split out
/// complete lines. Trailing bytes without a newline stay buffered.
fn drain_lines(ep: &mut RxEndpoint) -> (Vec<String>, DrainState) {
    let mut state = DrainState::Open;
    let mut chunk = [0u8; 4096];
    loop {
        match ep.reader.try_read(&mut chunk) {
            Ok(0) => {
                state = DrainState::Eof;
                break;
            }
            Ok(n) => ep.buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                state = DrainState::Failed(e);
                break;
            }
        }
    }

    let mut lines = Vec::new();
    while let Some(pos) = ep.buf.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = ep.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    (lines, state)
}

/// Decode one line and hand it to the handler, then record the raw text on
/// the endpoint. The cache records that traffic arrived whether or not the
/// message was usable.
fn handle_line(
    label: &str,
    raw: &str,
    registry: &Mutex<Registry>,
    handler: &dyn MessageHandler,
    comm_enabled: &AtomicBool,
) {
    match codec::decode(raw) {
        Ok(message) => match handler.on_message(label, message) {
            Ok(()) => debug!("[Recv] {label} -> {raw}"),
            Err(HandlerError::Recoverable(reason)) => warn!("[Recv] {label}: {reason}"),
            Err(HandlerError::Fatal(reason)) => {
                error!("[Recv] {label}: {reason}, disabling communication");
                comm_enabled.store(false, Ordering::SeqCst);
            }
        },
        Err(e) => warn!("[Recv] {label}: {e} -> {raw}"),
    }
    if let Ok(mut registry) = registry.lock() {
        registry.set_cache(label, raw);
    }
}
