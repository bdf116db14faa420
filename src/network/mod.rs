//! Network media subsystem
//!
//! The bridge talks to the network through these traits: discovery of remote
//! sources, transmitting frames, and a frame synchronizer that adapts a
//! remote stream to the local sample clock. [`lan`] implements them over UDP.

pub mod lan;

use serde::{Deserialize, Serialize};

use crate::audio::convert::NetworkFrame;
use crate::error::NetworkError;

pub use lan::LanNetwork;

/// A source visible on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Logical stream name; the registry key
    pub name: String,
    /// Where the source can be reached, when known
    pub url: Option<String>,
}

impl SourceInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }
}

/// Snapshot of currently visible sources
pub trait Discovery: Send + Sync + 'static {
    fn current_sources(&self) -> Vec<SourceInfo>;
}

/// Transmits frames for one named stream. Used from the send worker only.
pub trait FrameSender: Send + 'static {
    fn send_audio(&mut self, frame: &NetworkFrame) -> Result<(), NetworkError>;
}

/// Adapts one remote stream to the local clock. Called on the realtime
/// thread, so it must not block or allocate in steady state.
pub trait FrameSync: Send + 'static {
    /// Fill `frame` with exactly `frames` samples per channel at
    /// `sample_rate`. Returns false when no audio is available this cycle.
    fn capture_audio(
        &mut self,
        frame: &mut NetworkFrame,
        sample_rate: u32,
        channels: usize,
        frames: usize,
    ) -> bool;
}

/// Factory for senders and receivers
pub trait MediaNetwork: Send + Sync + 'static {
    type Sender: FrameSender;
    type Sync: FrameSync;

    /// Start publishing a stream under `name`
    fn create_sender(&self, name: &str) -> Result<Self::Sender, NetworkError>;

    /// Start receiving the stream published as `source`
    fn create_receiver(&self, source: &str) -> Result<Self::Sync, NetworkError>;
}
