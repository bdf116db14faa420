//! Publishing side of the LAN transport

use dashmap::DashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::wire::{AudioPacket, Packet};
use super::{bind_ip, create_socket, is_timeout, Worker};
use crate::audio::convert::NetworkFrame;
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::FrameSender;

/// Announces a named stream and unicasts audio to its subscribers
pub struct LanSender {
    socket: Arc<UdpSocket>,
    subscribers: Arc<DashMap<SocketAddr, Instant>>,
    timeout: Duration,
    sequence: u64,
    _service: Worker,
}

impl LanSender {
    pub fn start(name: &str, config: &NetworkConfig) -> Result<Self, NetworkError> {
        let socket = create_socket(SocketAddr::new(bind_ip(config), 0), true, false)
            .map_err(|e| NetworkError::Init(format!("sender socket: {}", e)))?;
        let audio_port = socket
            .local_addr()
            .map_err(|e| NetworkError::Init(e.to_string()))?
            .port();
        let socket = Arc::new(socket);

        let beacon = Packet::Announce {
            name: name.to_string(),
            audio_port,
        }
        .encode()?;
        let targets = [
            SocketAddr::from((Ipv4Addr::BROADCAST, config.discovery_port)),
            SocketAddr::from((Ipv4Addr::LOCALHOST, config.discovery_port)),
        ];
        let interval = Duration::from_millis(config.beacon_interval_ms.max(1));

        let subscribers: Arc<DashMap<SocketAddr, Instant>> = Arc::new(DashMap::new());
        let service = {
            let socket = socket.clone();
            let subscribers = subscribers.clone();
            let name = name.to_string();

            Worker::spawn("lan-sender", move |stop| {
                let mut buf = vec![0u8; 2048];
                let mut next_beacon = Instant::now();

                while !stop.is_stopped() {
                    if Instant::now() >= next_beacon {
                        for target in &targets {
                            if let Err(e) = socket.send_to(&beacon, target) {
                                tracing::trace!("Beacon to {} failed: {}", target, e);
                            }
                        }
                        next_beacon += interval;
                    }

                    match socket.recv_from(&mut buf) {
                        Ok((len, from)) => match Packet::decode(&buf[..len]) {
                            Ok(Packet::Subscribe { name: wanted }) if wanted == name => {
                                if subscribers.insert(from, Instant::now()).is_none() {
                                    tracing::info!("Receiver {} subscribed to {}", from, name);
                                }
                            }
                            _ => {}
                        },
                        Err(e) if is_timeout(&e) => {}
                        Err(e) => tracing::trace!("Sender receive error: {}", e),
                    }
                }
            })?
        };

        tracing::info!("Publishing stream {:?} on port {}", name, audio_port);

        Ok(Self {
            socket,
            subscribers,
            timeout: Duration::from_millis(config.source_timeout_ms),
            sequence: 0,
            _service: service,
        })
    }

    /// Port subscribers send to and audio is sent from
    pub fn audio_port(&self) -> u16 {
        self.socket.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

}

impl FrameSender for LanSender {
    fn send_audio(&mut self, frame: &NetworkFrame) -> Result<(), NetworkError> {
        let timeout = self.timeout;
        self.subscribers.retain(|addr, seen| {
            let live = seen.elapsed() < timeout;
            if !live {
                tracing::info!("Receiver {} went away", addr);
            }
            live
        });

        let packets = AudioPacket::split(frame, self.sequence);
        self.sequence += packets.len() as u64;
        if self.subscribers.is_empty() {
            return Ok(());
        }

        let mut last_error = None;
        for packet in packets {
            let bytes = Packet::Audio(packet).encode()?;
            for subscriber in self.subscribers.iter() {
                if let Err(e) = self.socket.send_to(&bytes, *subscriber.key()) {
                    last_error = Some(NetworkError::SendFailed(format!(
                        "{}: {}",
                        subscriber.key(),
                        e
                    )));
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
