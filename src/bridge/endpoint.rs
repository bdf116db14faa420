//! One bridged stream
//!
//! A send endpoint copies JACK input ports into pooled bundles on the
//! realtime thread and hands them to a worker through a [`HandoffQueue`];
//! the worker converts and transmits. A receive endpoint pulls from a frame
//! synchronizer straight into the output ports, applying gain.

use arrayvec::ArrayVec;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::bundle::{BundlePool, FrameBundle};
use crate::audio::convert::{from_network_frame, to_network_frame, GainSpec, NetworkFrame};
use crate::audio::gain::{ChannelGains, MasterGain};
use crate::audio::host::{AudioClient, AudioHost, AudioProcessor, Cycle, PortLayout};
use crate::audio::queue::{HandoffQueue, Wait};
use crate::config::AudioConfig;
use crate::constants::{BUNDLE_POOL_SLACK, MAX_CHANNELS};
use crate::error::{AudioError, NetworkError, Result};
use crate::network::{FrameSender, FrameSync, MediaNetwork};

/// How often the send worker reports drops when the stream is idle or lossy
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Which way audio flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// JACK inputs to the network
    Send,
    /// Network to JACK outputs
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Receive => write!(f, "receive"),
        }
    }
}

/// Per-endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// JACK client name
    pub client_name: String,
    pub channels: usize,
    pub auto_connect: bool,
    /// Handoff queue depth (send only)
    pub queue_depth: usize,
}

impl From<&AudioConfig> for EndpointConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            client_name: audio.client_name.clone(),
            channels: audio.channels,
            auto_connect: audio.auto_connect,
            queue_depth: audio.queue_depth,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Constructing,
    Active,
    TearingDown,
    Destroyed,
}

/// Counters shared with the realtime and worker threads
#[derive(Debug, Default)]
pub struct EndpointStats {
    cycles: AtomicU64,
    frames_sent: AtomicU64,
    send_errors: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of an endpoint's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Realtime callbacks run
    pub cycles: u64,
    /// Frames handed to the network
    pub frames_sent: u64,
    pub send_errors: u64,
    /// Bundles evicted by the handoff queue
    pub bundles_dropped: u64,
    /// Callbacks skipped because the bundle pool was empty
    pub pool_exhausted: u64,
    /// Callbacks with no audio from the synchronizer
    pub underruns: u64,
}

/// Anything the registry can report on
pub trait EndpointStatus {
    fn stats(&self) -> StatsSnapshot;
}

/// A running bridge between JACK and one network stream
pub struct StreamEndpoint {
    remote: String,
    direction: Direction,
    channels: usize,
    sample_rate: u32,
    state: EndpointState,
    exiting: Arc<AtomicBool>,
    client: Option<Box<dyn Send>>,
    queue: Option<Arc<HandoffQueue<FrameBundle>>>,
    pool: Option<Arc<BundlePool>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<EndpointStats>,
    gains: Option<Arc<ChannelGains>>,
}

impl StreamEndpoint {
    fn constructing(remote: &str, direction: Direction, channels: usize) -> Self {
        Self {
            remote: remote.to_string(),
            direction,
            channels,
            sample_rate: 0,
            state: EndpointState::Constructing,
            exiting: Arc::new(AtomicBool::new(false)),
            client: None,
            queue: None,
            pool: None,
            worker: None,
            stats: Arc::new(EndpointStats::default()),
            gains: None,
        }
    }

    /// Publish the JACK client's inputs as the network stream `name`
    pub fn start_send<H, N>(
        host: &H,
        network: &N,
        name: &str,
        config: &EndpointConfig,
    ) -> Result<Self>
    where
        H: AudioHost,
        N: MediaNetwork,
    {
        let channels = checked_channels(config.channels)?;
        let mut endpoint = Self::constructing(name, Direction::Send, channels);

        let sender = network.create_sender(name)?;
        let client = host.open(&config.client_name, PortLayout::capture(channels))?;
        endpoint.sample_rate = client.sample_rate();

        let depth = config.queue_depth.max(1);
        let pool = Arc::new(BundlePool::new(
            depth + BUNDLE_POOL_SLACK,
            channels,
            client.buffer_size(),
        ));
        let queue = Arc::new(HandoffQueue::new(depth));

        let worker = SendWorker {
            queue: queue.clone(),
            pool: pool.clone(),
            sender,
            sample_rate: endpoint.sample_rate,
            channels,
            stats: endpoint.stats.clone(),
            exiting: endpoint.exiting.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("send-{}", name))
            .spawn(move || worker.run())
            .map_err(|e| NetworkError::Init(format!("cannot spawn send worker: {}", e)))?;

        endpoint.queue = Some(queue.clone());
        endpoint.pool = Some(pool.clone());
        endpoint.worker = Some(handle);

        let processor = SendProcessor {
            pool,
            queue,
            sequence: 0,
            stats: endpoint.stats.clone(),
        };
        // on failure `endpoint` drops here, which closes the queue and joins
        // the worker
        let active = client.activate(Box::new(processor), config.auto_connect)?;
        endpoint.client = Some(Box::new(active));
        endpoint.state = EndpointState::Active;

        tracing::info!(
            remote = %endpoint.remote,
            direction = %endpoint.direction,
            channels,
            sample_rate = endpoint.sample_rate,
            "Endpoint active"
        );
        Ok(endpoint)
    }

    /// Play the network stream `source` on the JACK client's outputs
    pub fn start_receive<H, N>(
        host: &H,
        network: &N,
        source: &str,
        config: &EndpointConfig,
        master: MasterGain,
    ) -> Result<Self>
    where
        H: AudioHost,
        N: MediaNetwork,
    {
        let channels = checked_channels(config.channels)?;
        let mut endpoint = Self::constructing(source, Direction::Receive, channels);

        let sync = network.create_receiver(source)?;
        let client = host.open(&config.client_name, PortLayout::playback(channels))?;
        endpoint.sample_rate = client.sample_rate();

        let gains = Arc::new(ChannelGains::unity(channels));
        endpoint.gains = Some(gains.clone());

        let processor = ReceiveProcessor {
            sync,
            frame: NetworkFrame::with_capacity(channels, client.buffer_size()),
            sample_rate: endpoint.sample_rate,
            channels,
            master,
            gains,
            stats: endpoint.stats.clone(),
        };
        let active = client.activate(Box::new(processor), config.auto_connect)?;
        endpoint.client = Some(Box::new(active));
        endpoint.state = EndpointState::Active;

        tracing::info!(
            remote = %endpoint.remote,
            direction = %endpoint.direction,
            channels,
            sample_rate = endpoint.sample_rate,
            "Endpoint active"
        );
        Ok(endpoint)
    }

    /// Stop callbacks, wake and join the worker, release handles. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        if self.state == EndpointState::Destroyed {
            return;
        }
        let was_active = self.state == EndpointState::Active;
        self.state = EndpointState::TearingDown;
        self.exiting.store(true, Ordering::SeqCst);

        // deactivates the client; no callback runs after this returns
        self.client.take();

        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(remote = %self.remote, "Send worker panicked");
            }
        }
        self.pool.take();
        self.state = EndpointState::Destroyed;

        if was_active {
            tracing::info!(remote = %self.remote, direction = %self.direction, "Endpoint closed");
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }

    /// Set one output channel's gain. Only receive endpoints have gains.
    pub fn set_channel_gain(&self, channel: usize, gain: f32) -> bool {
        self.gains
            .as_ref()
            .map_or(false, |gains| gains.set(channel, gain))
    }

    pub fn channel_gain(&self, channel: usize) -> Option<f32> {
        self.gains.as_ref().and_then(|gains| gains.get(channel))
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            send_errors: self.stats.send_errors.load(Ordering::Relaxed),
            bundles_dropped: self.queue.as_ref().map_or(0, |q| q.dropped()),
            pool_exhausted: self.pool.as_ref().map_or(0, |p| p.exhausted_count() as u64),
            underruns: self.stats.underruns.load(Ordering::Relaxed),
        }
    }
}

impl EndpointStatus for StreamEndpoint {
    fn stats(&self) -> StatsSnapshot {
        StreamEndpoint::stats(self)
    }
}

impl Drop for StreamEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn checked_channels(channels: usize) -> std::result::Result<usize, AudioError> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(AudioError::ChannelCount(channels));
    }
    Ok(channels)
}

/// Realtime half of a send endpoint
struct SendProcessor {
    pool: Arc<BundlePool>,
    queue: Arc<HandoffQueue<FrameBundle>>,
    sequence: u64,
    stats: Arc<EndpointStats>,
}

impl AudioProcessor for SendProcessor {
    fn process(&mut self, cycle: &mut Cycle<'_>) {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let Some(mut bundle) = self.pool.acquire() else {
            return;
        };
        bundle.fill(&cycle.inputs, cycle.frames, self.sequence);
        self.sequence += 1;

        let pool = &self.pool;
        self.queue.push_with(bundle, |old| pool.release(old));
    }

    fn buffer_size(&mut self, frames: usize) {
        self.pool.resize(frames);
    }
}

/// Non-realtime half of a send endpoint
struct SendWorker<S> {
    queue: Arc<HandoffQueue<FrameBundle>>,
    pool: Arc<BundlePool>,
    sender: S,
    sample_rate: u32,
    channels: usize,
    stats: Arc<EndpointStats>,
    exiting: Arc<AtomicBool>,
}

impl<S: FrameSender> SendWorker<S> {
    fn run(mut self) {
        let mut last_report = Instant::now();
        let mut reported_drops = 0;
        let mut reported_errors = 0;

        loop {
            match self.queue.wait_for_data_timeout(STATS_INTERVAL) {
                Wait::Closed => break,
                Wait::TimedOut | Wait::Ready => {}
            }
            if self.exiting.load(Ordering::SeqCst) {
                break;
            }

            while let Some(bundle) = self.queue.pop_if_any() {
                self.transmit(bundle);
            }

            if last_report.elapsed() >= STATS_INTERVAL {
                let drops = self.queue.dropped();
                if drops > reported_drops {
                    tracing::warn!(
                        "Dropped {} bundles in the last {:?}",
                        drops - reported_drops,
                        last_report.elapsed()
                    );
                    reported_drops = drops;
                }
                let errors = self.stats.send_errors.load(Ordering::Relaxed);
                if errors > reported_errors {
                    tracing::warn!("{} network sends failed", errors - reported_errors);
                    reported_errors = errors;
                }
                last_report = Instant::now();
            }
        }

        tracing::debug!("Send worker exiting");
    }

    fn transmit(&mut self, bundle: FrameBundle) {
        let channels: ArrayVec<&[f32], MAX_CHANNELS> = bundle.channels().collect();
        let frame = to_network_frame(
            &channels,
            bundle.frames(),
            self.sample_rate,
            self.channels,
            GainSpec::UNITY,
        );
        drop(channels);
        self.pool.restock(bundle);

        match self.sender.send_audio(&frame) {
            Ok(()) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if self.stats.send_errors.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!("Network send failed: {}", e);
                }
            }
        }
    }
}

/// Realtime half of a receive endpoint
struct ReceiveProcessor<S> {
    sync: S,
    frame: NetworkFrame,
    sample_rate: u32,
    channels: usize,
    master: MasterGain,
    gains: Arc<ChannelGains>,
    stats: Arc<EndpointStats>,
}

impl<S: FrameSync> AudioProcessor for ReceiveProcessor<S> {
    fn process(&mut self, cycle: &mut Cycle<'_>) {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let captured = self.sync.capture_audio(
            &mut self.frame,
            self.sample_rate,
            self.channels,
            cycle.frames,
        );
        if !captured {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
            for output in cycle.outputs.iter_mut() {
                output.fill(0.0);
            }
            return;
        }

        let gains = self.gains.snapshot();
        let gain = GainSpec {
            master: self.master.get(),
            channel: &gains,
        };
        from_network_frame(&self.frame, &mut cycle.outputs, gain);
    }

    fn buffer_size(&mut self, frames: usize) {
        self.frame = NetworkFrame::with_capacity(self.channels, frames);
    }
}
