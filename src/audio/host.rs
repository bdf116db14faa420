//! Audio server abstraction
//!
//! The realtime binding layer (JACK in production) drives an
//! [`AudioProcessor`] once per cycle with a [`Cycle`] view of the client's
//! port buffers. Endpoints never see the server API directly.

use arrayvec::ArrayVec;

use crate::constants::MAX_CHANNELS;
use crate::error::AudioError;

/// Port buffers for one process cycle. Valid only for the duration of the
/// callback.
pub struct Cycle<'a> {
    /// Frames in this cycle
    pub frames: usize,
    /// Input port buffers in registration order
    pub inputs: ArrayVec<&'a [f32], MAX_CHANNELS>,
    /// Output port buffers in registration order
    pub outputs: ArrayVec<&'a mut [f32], MAX_CHANNELS>,
}

/// Work done on the realtime thread.
///
/// Implementations must not block, perform I/O, or allocate in `process`.
pub trait AudioProcessor: Send + 'static {
    /// Called once per cycle
    fn process(&mut self, cycle: &mut Cycle<'_>);

    /// Called when the server changes its buffer size, before the next cycle
    fn buffer_size(&mut self, _frames: usize) {}
}

/// Ports a client registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    pub inputs: usize,
    pub outputs: usize,
}

impl PortLayout {
    pub fn capture(channels: usize) -> Self {
        Self { inputs: channels, outputs: 0 }
    }

    pub fn playback(channels: usize) -> Self {
        Self { inputs: 0, outputs: channels }
    }
}

/// An audio server that can open clients
pub trait AudioHost: Send + Sync + 'static {
    type Client: AudioClient;

    /// Connect to the server and register ports
    fn open(&self, name: &str, layout: PortLayout) -> Result<Self::Client, AudioError>;
}

/// An opened, not yet active client
pub trait AudioClient: Send {
    /// Keeps the callback running; dropping it deactivates and closes the
    /// client, after which the processor is never invoked again.
    type Active: Send + 'static;

    fn sample_rate(&self) -> u32;

    /// Current frames per cycle
    fn buffer_size(&self) -> usize;

    /// Bind the processor and start callbacks. With `auto_connect` the
    /// client's ports are wired to the server's physical ports.
    fn activate(
        self,
        processor: Box<dyn AudioProcessor>,
        auto_connect: bool,
    ) -> Result<Self::Active, AudioError>;
}
