//! Receiving side of the LAN transport

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::discovery::LanDiscovery;
use super::sync::SyncBuffer;
use super::wire::Packet;
use super::{bind_ip, create_socket, is_timeout, Worker};
use crate::audio::convert::NetworkFrame;
use crate::config::NetworkConfig;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;
use crate::network::FrameSync;

/// Frame synchronizer for one subscribed source
pub struct LanFrameSync {
    source: String,
    sync: Arc<SyncBuffer>,
    _receiver: Worker,
}

impl LanFrameSync {
    /// Subscribe to `source` and start buffering its audio. The source does
    /// not have to be visible yet; subscription is retried until it is.
    pub fn start(
        source: &str,
        discovery: Arc<LanDiscovery>,
        config: &NetworkConfig,
    ) -> Result<Self, NetworkError> {
        let socket = create_socket(SocketAddr::new(bind_ip(config), 0), false, false)
            .map_err(|e| NetworkError::Init(format!("receiver socket: {}", e)))?;
        let subscribe = Packet::Subscribe {
            name: source.to_string(),
        }
        .encode()?;
        let interval = Duration::from_millis(config.beacon_interval_ms.max(1));

        let sync = Arc::new(SyncBuffer::new(config.sync_latency_ms));
        let buffer = sync.clone();
        let name = source.to_string();

        let receiver = Worker::spawn("lan-receiver", move |stop| {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let mut next_subscribe = Instant::now();
            let mut sender: Option<SocketAddr> = None;

            while !stop.is_stopped() {
                if Instant::now() >= next_subscribe {
                    let resolved = discovery.lookup(&name);
                    if resolved != sender {
                        match resolved {
                            Some(addr) => tracing::info!("Source {} resolved to {}", name, addr),
                            None => tracing::warn!("Source {} is not visible", name),
                        }
                        sender = resolved;
                    }
                    if let Some(addr) = sender {
                        if let Err(e) = socket.send_to(&subscribe, addr) {
                            tracing::debug!("Subscribe to {} failed: {}", addr, e);
                        }
                    }
                    next_subscribe = Instant::now() + interval;
                }

                match socket.recv_from(&mut buf) {
                    Ok((len, from)) if Some(from) == sender => {
                        if let Ok(Packet::Audio(packet)) = Packet::decode(&buf[..len]) {
                            buffer.push(&packet);
                        }
                    }
                    Ok(_) => {}
                    Err(e) if is_timeout(&e) => {}
                    Err(e) => tracing::trace!("Receiver error: {}", e),
                }
            }
        })?;

        Ok(Self {
            source: source.to_string(),
            sync,
            _receiver: receiver,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn buffer(&self) -> &SyncBuffer {
        &self.sync
    }
}

impl FrameSync for LanFrameSync {
    fn capture_audio(
        &mut self,
        frame: &mut NetworkFrame,
        sample_rate: u32,
        channels: usize,
        frames: usize,
    ) -> bool {
        self.sync.capture(frame, sample_rate, channels, frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::convert::{to_network_frame, GainSpec};
    use crate::network::lan::LanSender;
    use crate::network::FrameSender;

    fn loopback_config() -> NetworkConfig {
        NetworkConfig {
            bind_address: "127.0.0.1".into(),
            beacon_interval_ms: 10,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_loopback_stream() {
        let config = loopback_config();
        let mut sender = LanSender::start("Loopback", &config).unwrap();

        let discovery = Arc::new(LanDiscovery::detached(Duration::from_secs(10)));
        discovery.observe(
            "Loopback",
            SocketAddr::from(([127, 0, 0, 1], sender.audio_port())),
        );
        let mut sync = LanFrameSync::start("Loopback", discovery, &config).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while sender.subscriber_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sender.subscriber_count(), 1);

        let samples = vec![0.25f32; 64];
        let frame = to_network_frame(&[&samples[..]], 64, 48000, 1, GainSpec::UNITY);
        sender.send_audio(&frame).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while sync.buffer().buffered() < 64 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut out = NetworkFrame::with_capacity(1, 64);
        assert!(sync.capture_audio(&mut out, 48000, 1, 64));
        assert!(out.channel(0).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_unknown_source_yields_no_frames() {
        let discovery = Arc::new(LanDiscovery::detached(Duration::from_secs(10)));
        let mut sync = LanFrameSync::start("Nowhere", discovery, &loopback_config()).unwrap();
        let mut out = NetworkFrame::with_capacity(2, 32);
        assert!(!sync.capture_audio(&mut out, 48000, 2, 32));
        assert_eq!(sync.source(), "Nowhere");
    }
}
