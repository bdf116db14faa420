//! In-process stand-ins for JACK and the network, so endpoints, the
//! registry and the control surface can be tested without either.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::convert::NetworkFrame;
use crate::audio::host::{AudioClient, AudioHost, AudioProcessor, Cycle, PortLayout};
use crate::error::{AudioError, NetworkError};
use crate::network::{Discovery, FrameSender, FrameSync, MediaNetwork, SourceInfo};

type ProcessorSlot = Arc<Mutex<Option<Box<dyn AudioProcessor>>>>;

#[derive(Default)]
struct HostState {
    opened: Mutex<Vec<String>>,
    processors: Mutex<Vec<ProcessorSlot>>,
    fail_open: AtomicBool,
}

/// Audio host whose callbacks are run by the test
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<HostState>,
}

impl FakeHost {
    pub const SAMPLE_RATE: u32 = 48000;
    pub const BUFFER_SIZE: usize = 64;

    /// A host that refuses every client
    pub fn failing() -> Self {
        let host = Self::default();
        host.state.fail_open.store(true, Ordering::SeqCst);
        host
    }

    /// Client names opened so far
    pub fn opened(&self) -> Vec<String> {
        self.state.opened.lock().clone()
    }

    /// Clients activated and not yet dropped
    pub fn active_count(&self) -> usize {
        self.state
            .processors
            .lock()
            .iter()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Run one cycle of the `index`th activated client. Returns false if
    /// that client has been closed.
    pub fn drive(
        &self,
        index: usize,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) -> bool {
        let Some(slot) = self.state.processors.lock().get(index).cloned() else {
            return false;
        };
        let mut guard = slot.lock();
        let Some(processor) = guard.as_mut() else {
            return false;
        };

        let mut cycle = Cycle {
            frames,
            inputs: inputs.iter().copied().collect(),
            outputs: outputs.iter_mut().map(|o| &mut **o).collect(),
        };
        processor.process(&mut cycle);
        true
    }

    /// Announce a new buffer size to the `index`th activated client
    pub fn resize(&self, index: usize, frames: usize) -> bool {
        let Some(slot) = self.state.processors.lock().get(index).cloned() else {
            return false;
        };
        let mut guard = slot.lock();
        let Some(processor) = guard.as_mut() else {
            return false;
        };
        processor.buffer_size(frames);
        true
    }
}

impl AudioHost for FakeHost {
    type Client = FakeClient;

    fn open(&self, name: &str, layout: PortLayout) -> Result<FakeClient, AudioError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(AudioError::ClientOpen("fake server refused".into()));
        }
        self.state.opened.lock().push(name.to_string());
        Ok(FakeClient {
            state: self.state.clone(),
            _layout: layout,
        })
    }
}

pub struct FakeClient {
    state: Arc<HostState>,
    _layout: PortLayout,
}

/// Dropping it detaches the processor, like deactivating a JACK client
pub struct FakeActive {
    slot: ProcessorSlot,
}

impl Drop for FakeActive {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

impl AudioClient for FakeClient {
    type Active = FakeActive;

    fn sample_rate(&self) -> u32 {
        FakeHost::SAMPLE_RATE
    }

    fn buffer_size(&self) -> usize {
        FakeHost::BUFFER_SIZE
    }

    fn activate(
        self,
        processor: Box<dyn AudioProcessor>,
        _auto_connect: bool,
    ) -> Result<FakeActive, AudioError> {
        let slot: ProcessorSlot = Arc::new(Mutex::new(Some(processor)));
        self.state.processors.lock().push(slot.clone());
        Ok(FakeActive { slot })
    }
}

#[derive(Default)]
struct NetworkState {
    sources: Mutex<Vec<SourceInfo>>,
    sent: Mutex<Vec<(String, NetworkFrame)>>,
    receivers: Mutex<Vec<String>>,
    refused: Mutex<HashSet<String>>,
    level: Mutex<Option<f32>>,
    hold: Mutex<bool>,
    released: Condvar,
    held: AtomicUsize,
}

/// Media network that records what is sent and plays a constant level
#[derive(Clone, Default)]
pub struct FakeNetwork {
    state: Arc<NetworkState>,
}

impl FakeNetwork {
    pub fn set_sources(&self, names: &[&str]) {
        *self.state.sources.lock() = names
            .iter()
            .map(|name| SourceInfo {
                name: name.to_string(),
                url: Some(format!("10.0.0.1:{}", 5000 + name.len())),
            })
            .collect();
    }

    /// Frames sent so far, tagged with the stream name
    pub fn sent(&self) -> Vec<(String, NetworkFrame)> {
        self.state.sent.lock().clone()
    }

    /// Sources receivers were created for
    pub fn receivers(&self) -> Vec<String> {
        self.state.receivers.lock().clone()
    }

    /// Make receiver creation fail for `name`
    pub fn refuse(&self, name: &str) {
        self.state.refused.lock().insert(name.to_string());
    }

    /// Make every send block until [`FakeNetwork::release_sends`]
    pub fn hold_sends(&self) {
        *self.state.hold.lock() = true;
    }

    pub fn release_sends(&self) {
        *self.state.hold.lock() = false;
        self.state.released.notify_all();
    }

    /// Sends that have blocked on the hold so far
    pub fn held_sends(&self) -> usize {
        self.state.held.load(Ordering::SeqCst)
    }

    /// Level every synchronizer produces; `None` means no audio
    pub fn set_level(&self, level: Option<f32>) {
        *self.state.level.lock() = level;
    }
}

impl Discovery for FakeNetwork {
    fn current_sources(&self) -> Vec<SourceInfo> {
        self.state.sources.lock().clone()
    }
}

impl MediaNetwork for FakeNetwork {
    type Sender = FakeSender;
    type Sync = FakeSync;

    fn create_sender(&self, name: &str) -> Result<FakeSender, NetworkError> {
        Ok(FakeSender {
            name: name.to_string(),
            state: self.state.clone(),
        })
    }

    fn create_receiver(&self, source: &str) -> Result<FakeSync, NetworkError> {
        if self.state.refused.lock().contains(source) {
            return Err(NetworkError::ReceiveFailed(format!("{} refused", source)));
        }
        self.state.receivers.lock().push(source.to_string());
        Ok(FakeSync {
            state: self.state.clone(),
        })
    }
}

pub struct FakeSender {
    name: String,
    state: Arc<NetworkState>,
}

impl FrameSender for FakeSender {
    fn send_audio(&mut self, frame: &NetworkFrame) -> Result<(), NetworkError> {
        let mut hold = self.state.hold.lock();
        if *hold {
            self.state.held.fetch_add(1, Ordering::SeqCst);
            while *hold {
                self.state.released.wait(&mut hold);
            }
        }
        drop(hold);

        self.state.sent.lock().push((self.name.clone(), frame.clone()));
        Ok(())
    }
}

pub struct FakeSync {
    state: Arc<NetworkState>,
}

impl FrameSync for FakeSync {
    fn capture_audio(
        &mut self,
        frame: &mut NetworkFrame,
        sample_rate: u32,
        channels: usize,
        frames: usize,
    ) -> bool {
        let Some(level) = *self.state.level.lock() else {
            return false;
        };
        frame.prepare(sample_rate, channels, frames);
        for channel in 0..channels {
            frame.channel_mut(channel).fill(level);
        }
        true
    }
}
