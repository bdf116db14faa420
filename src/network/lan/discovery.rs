//! Source discovery from sender beacons

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::wire::Packet;
use super::{bind_ip, create_socket, is_timeout, Worker};
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::SourceInfo;

#[derive(Debug, Clone, Copy)]
struct Seen {
    audio_addr: SocketAddr,
    last_seen: Instant,
}

/// Tracks which senders are currently announcing themselves
pub struct LanDiscovery {
    sources: Arc<DashMap<String, Seen>>,
    timeout: Duration,
    _listener: Option<Worker>,
}

impl LanDiscovery {
    /// Listen for announcements on the configured discovery port
    pub fn bind(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let addr = SocketAddr::new(bind_ip(config), config.discovery_port);
        let socket = create_socket(addr, true, true)
            .map_err(|e| NetworkError::Init(format!("discovery port {}: {}", addr, e)))?;

        let sources: Arc<DashMap<String, Seen>> = Arc::new(DashMap::new());
        let table = sources.clone();

        let listener = Worker::spawn("lan-discovery", move |stop| {
            let mut buf = vec![0u8; 2048];
            while !stop.is_stopped() {
                match socket.recv_from(&mut buf) {
                    Ok((len, from)) => {
                        if let Ok(Packet::Announce { name, audio_port }) = Packet::decode(&buf[..len]) {
                            record(&table, name, SocketAddr::new(from.ip(), audio_port));
                        }
                    }
                    Err(e) if is_timeout(&e) => {}
                    Err(e) => {
                        tracing::warn!("Discovery receive error: {}", e);
                        std::thread::sleep(super::POLL_INTERVAL);
                    }
                }
            }
        })?;

        Ok(Self {
            sources,
            timeout: Duration::from_millis(config.source_timeout_ms),
            _listener: Some(listener),
        })
    }

    /// A table fed only through [`observe`](Self::observe)
    pub fn detached(timeout: Duration) -> Self {
        Self {
            sources: Arc::new(DashMap::new()),
            timeout,
            _listener: None,
        }
    }

    /// Record an announcement
    pub fn observe(&self, name: &str, audio_addr: SocketAddr) {
        record(&self.sources, name.to_string(), audio_addr);
    }

    /// Audio address of a live source
    pub fn lookup(&self, name: &str) -> Option<SocketAddr> {
        self.sources
            .get(name)
            .filter(|seen| seen.last_seen.elapsed() < self.timeout)
            .map(|seen| seen.audio_addr)
    }

    /// Live sources sorted by name. Expired entries are pruned.
    pub fn current_sources(&self) -> Vec<SourceInfo> {
        self.sources
            .retain(|_, seen| seen.last_seen.elapsed() < self.timeout);

        let mut sources: Vec<SourceInfo> = self
            .sources
            .iter()
            .map(|entry| SourceInfo {
                name: entry.key().clone(),
                url: Some(entry.value().audio_addr.to_string()),
            })
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }
}

fn record(table: &DashMap<String, Seen>, name: String, audio_addr: SocketAddr) {
    let fresh = Seen {
        audio_addr,
        last_seen: Instant::now(),
    };
    if table.insert(name.clone(), fresh).is_none() {
        tracing::debug!("Discovered source {} at {}", name, audio_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], port))
    }

    #[test]
    fn test_sources_sorted_by_name() {
        let discovery = LanDiscovery::detached(Duration::from_secs(10));
        discovery.observe("Zeta", addr(1));
        discovery.observe("Alpha", addr(2));
        discovery.observe("Mid", addr(3));

        let names: Vec<_> = discovery
            .current_sources()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn test_url_is_audio_address() {
        let discovery = LanDiscovery::detached(Duration::from_secs(10));
        discovery.observe("Studio", addr(40000));
        let sources = discovery.current_sources();
        assert_eq!(sources[0].url.as_deref(), Some("192.168.1.20:40000"));
        assert_eq!(discovery.lookup("Studio"), Some(addr(40000)));
        assert_eq!(discovery.lookup("Other"), None);
    }

    #[test]
    fn test_expired_sources_dropped() {
        let discovery = LanDiscovery::detached(Duration::from_millis(20));
        discovery.observe("Old", addr(1));
        std::thread::sleep(Duration::from_millis(40));
        discovery.observe("New", addr(2));

        let sources = discovery.current_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "New");
        assert_eq!(discovery.lookup("Old"), None);
    }

    #[test]
    fn test_reannounce_updates_address() {
        let discovery = LanDiscovery::detached(Duration::from_secs(10));
        discovery.observe("Studio", addr(1));
        discovery.observe("Studio", addr(2));
        assert_eq!(discovery.current_sources().len(), 1);
        assert_eq!(discovery.lookup("Studio"), Some(addr(2)));
    }
}
