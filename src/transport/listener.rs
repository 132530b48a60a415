use super::endpoint::{Endpoint, Scheme};
use super::protocol;
use crate::error::Error;
use crate::events::bus::EventBus;
use crate::registry::service::HeartbeatSender;
use crate::registry::types::RegistryEvent;

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{TcpListener, UdpSocket, UnixListener};
use tokio::task::JoinHandle;

/// A bound transport endpoint delivering decoded heartbeats to the registry.
///
/// Each listener runs its own receive/accept task (stream transports add one
/// task per accepted connection). Listeners are stateless beyond decoding:
/// per-message failures become `error` events and the traffic continues, so
/// one malformed sender never disables an endpoint.
#[derive(Debug)]
pub struct Listener {
    endpoint: Endpoint,
    /// Actual bound address for udp/tcp; relevant when the spec named port 0.
    local_addr: Option<SocketAddr>,
    accept_task: JoinHandle<()>,
}

impl Listener {
    /// Binds the endpoint and starts receiving. Bind failures (port in use,
    /// path permission denied, stale socket that cannot be unlinked) are
    /// [`Error::Configuration`] and leave nothing running.
    pub async fn bind(
        endpoint: Endpoint,
        sender: HeartbeatSender,
        bus: Arc<EventBus>,
    ) -> Result<Self, Error> {
        let (accept_task, local_addr) = match endpoint.scheme {
            Scheme::Udp => bind_udp(&endpoint, sender, bus).await?,
            Scheme::Tcp => bind_tcp(&endpoint, sender, bus).await?,
            Scheme::Unix => (bind_unix(&endpoint, sender, bus).await?, None),
        };

        tracing::info!("Listening on {}", endpoint.spec);

        Ok(Self {
            endpoint,
            local_addr,
            accept_task,
        })
    }

    pub fn spec(&self) -> &str {
        &self.endpoint.spec
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stops receiving and releases the bound resource before returning: the
    /// socket is dropped, and for filesystem-path sockets the file is
    /// unlinked. Heartbeats already handed to the registry are unaffected;
    /// connections in flight finish on their own.
    pub async fn stop(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;

        if self.endpoint.scheme == Scheme::Unix {
            if let Some(path) = &self.endpoint.path {
                let _ = tokio::fs::remove_file(path).await;
            }
        }

        tracing::info!("Listener {} stopped", self.endpoint.spec);
    }
}

async fn bind_udp(
    endpoint: &Endpoint,
    sender: HeartbeatSender,
    bus: Arc<EventBus>,
) -> Result<(JoinHandle<()>, Option<SocketAddr>), Error> {
    let addr = endpoint.addr.as_deref().unwrap_or_default();
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|e| Error::configuration(&endpoint.spec, e.to_string()))?;

    let local_addr = socket.local_addr().ok();
    let via = endpoint.spec.clone();

    let task = tokio::spawn(async move {
        receive_datagrams(socket, via, sender, bus).await;
    });

    Ok((task, local_addr))
}

async fn receive_datagrams(
    socket: UdpSocket,
    via: String,
    sender: HeartbeatSender,
    bus: Arc<EventBus>,
) {
    let mut buf = vec![0u8; protocol::MAX_PAYLOAD_BYTES];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match protocol::decode(&buf[..len], &via) {
                Ok(heartbeat) => {
                    tracing::trace!("Datagram heartbeat from {} via {}", src, via);
                    sender.submit(heartbeat);
                }
                Err(e) => report(&bus, &via, &e),
            },
            Err(e) => {
                report(&bus, &via, &Error::transport(&via, e));
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn bind_tcp(
    endpoint: &Endpoint,
    sender: HeartbeatSender,
    bus: Arc<EventBus>,
) -> Result<(JoinHandle<()>, Option<SocketAddr>), Error> {
    let addr = endpoint.addr.as_deref().unwrap_or_default();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::configuration(&endpoint.spec, e.to_string()))?;

    let local_addr = listener.local_addr().ok();
    let via = endpoint.spec.clone();

    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Connection from {} on {}", peer, via);

                    let via = via.clone();
                    let sender = sender.clone();
                    let bus = bus.clone();
                    tokio::spawn(async move {
                        read_stream(stream, via, sender, bus).await;
                    });
                }
                Err(e) => {
                    report(&bus, &via, &Error::transport(&via, e));
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    });

    Ok((task, local_addr))
}

async fn bind_unix(
    endpoint: &Endpoint,
    sender: HeartbeatSender,
    bus: Arc<EventBus>,
) -> Result<JoinHandle<()>, Error> {
    let path = endpoint
        .path
        .clone()
        .ok_or_else(|| Error::configuration(&endpoint.spec, "socket path required"))?;

    // A leftover socket file from a previous run blocks the bind.
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::debug!("Removed stale socket file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::configuration(
                &endpoint.spec,
                format!("could not unlink stale socket: {}", e),
            ));
        }
    }

    let listener = UnixListener::bind(&path)
        .map_err(|e| Error::configuration(&endpoint.spec, e.to_string()))?;

    if let Some(mode) = endpoint.mode {
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            Error::configuration(&endpoint.spec, format!("could not set socket mode: {}", e))
        })?;
        tracing::debug!("Set mode {:o} on {}", mode, path.display());
    }

    let via = endpoint.spec.clone();

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let via = via.clone();
                    let sender = sender.clone();
                    let bus = bus.clone();
                    tokio::spawn(async move {
                        read_stream(stream, via, sender, bus).await;
                    });
                }
                Err(e) => {
                    report(&bus, &via, &Error::transport(&via, e));
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }))
}

/// Reads newline-framed heartbeats off one stream connection until the peer
/// hangs up. Teardown carries no liveness meaning; only heartbeat recency
/// does, which keeps datagram and stream transports interchangeable from the
/// registry's point of view.
async fn read_stream<S>(stream: S, via: String, sender: HeartbeatSender, bus: Arc<EventBus>)
where
    S: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match protocol::decode(line.as_bytes(), &via) {
                    Ok(heartbeat) => sender.submit(heartbeat),
                    Err(e) => report(&bus, &via, &e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                report(&bus, &via, &Error::transport(&via, e));
                break;
            }
        }
    }
}

/// Non-fatal listener failures surface on the event stream only.
fn report(bus: &EventBus, via: &str, error: &Error) {
    tracing::warn!("{}", error);

    bus.publish(&RegistryEvent::Error {
        via: via.to_string(),
        message: error.to_string(),
    });
}
