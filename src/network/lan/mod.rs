//! UDP transport for local networks
//!
//! Senders broadcast an `Announce` beacon on the discovery port and unicast
//! audio to every receiver that has recently sent them a `Subscribe`.
//! Receivers resolve a source name through [`LanDiscovery`] and feed what
//! arrives into a [`SyncBuffer`] that the realtime thread reads from.

pub mod discovery;
pub mod receiver;
pub mod sender;
pub mod sync;
pub mod wire;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::{Discovery, MediaNetwork, SourceInfo};

pub use discovery::LanDiscovery;
pub use receiver::LanFrameSync;
pub use sender::LanSender;
pub use sync::SyncBuffer;

/// How long blocking socket reads wait before checking for shutdown
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The LAN media network: one discovery listener shared by every receiver
pub struct LanNetwork {
    config: NetworkConfig,
    discovery: Arc<LanDiscovery>,
}

impl LanNetwork {
    /// Bind the discovery port and start listening for announcements
    pub fn start(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let discovery = LanDiscovery::bind(config)?;
        tracing::info!(
            "LAN network listening for sources on port {}",
            config.discovery_port
        );
        Ok(Self {
            config: config.clone(),
            discovery: Arc::new(discovery),
        })
    }

    /// A network that only publishes streams and never binds the discovery
    /// port, so a receiver on the same host keeps all loopback beacons.
    pub fn publisher(config: &NetworkConfig) -> Self {
        Self {
            config: config.clone(),
            discovery: Arc::new(LanDiscovery::detached(Duration::from_millis(
                config.source_timeout_ms,
            ))),
        }
    }

    pub fn discovery(&self) -> &Arc<LanDiscovery> {
        &self.discovery
    }
}

impl Discovery for LanNetwork {
    fn current_sources(&self) -> Vec<SourceInfo> {
        self.discovery.current_sources()
    }
}

impl MediaNetwork for LanNetwork {
    type Sender = LanSender;
    type Sync = LanFrameSync;

    fn create_sender(&self, name: &str) -> Result<LanSender, NetworkError> {
        LanSender::start(name, &self.config)
    }

    fn create_receiver(&self, source: &str) -> Result<LanFrameSync, NetworkError> {
        LanFrameSync::start(source, self.discovery.clone(), &self.config)
    }
}

/// Create a UDP socket through socket2 so the reuse and broadcast options can
/// be set before binding.
pub(crate) fn create_socket(
    addr: SocketAddr,
    broadcast: bool,
    reuse: bool,
) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if reuse {
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
    }
    if broadcast {
        socket.set_broadcast(true)?;
    }

    socket.bind(&addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    Ok(socket)
}

/// Parse the configured bind address, falling back to all interfaces
pub(crate) fn bind_ip(config: &NetworkConfig) -> IpAddr {
    config.bind_address.parse().unwrap_or_else(|_| {
        tracing::warn!(
            "Invalid network bind address {:?}, using 0.0.0.0",
            config.bind_address
        );
        IpAddr::from([0, 0, 0, 0])
    })
}

pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// A background thread stopped by dropping its channel sender
pub(crate) struct Worker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, NetworkError>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let (stop, rx) = crossbeam_channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(StopSignal(rx)))
            .map_err(|e| NetworkError::Init(format!("cannot spawn {}: {}", name, e)))?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Network thread panicked");
            }
        }
    }
}

/// Receiving side of a [`Worker`]'s stop channel
pub(crate) struct StopSignal(Receiver<()>);

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        matches!(self.0.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_worker_stops_on_drop() {
        let loops = Arc::new(AtomicUsize::new(0));
        let counter = loops.clone();
        let worker = Worker::spawn("test-worker", move |stop| {
            while !stop.is_stopped() {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        drop(worker);
        let after = loops.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(loops.load(Ordering::SeqCst), after);
    }

    #[test]
    fn test_bind_ip_fallback() {
        let mut config = NetworkConfig::default();
        config.bind_address = "not an address".into();
        assert_eq!(bind_ip(&config), IpAddr::from([0, 0, 0, 0]));

        config.bind_address = "127.0.0.1".into();
        assert_eq!(bind_ip(&config), IpAddr::from([127, 0, 0, 1]));
    }

    #[test]
    fn test_publisher_discovers_nothing() {
        let network = LanNetwork::publisher(&NetworkConfig::default());
        assert!(network.current_sources().is_empty());
    }

    #[test]
    fn test_create_socket_ephemeral() {
        let socket = create_socket("127.0.0.1:0".parse().unwrap(), false, false).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }
}
