//! Frame bundles and the pool that recycles them
//!
//! JACK port buffers are only valid inside the process callback, so the send
//! path copies them into a [`FrameBundle`] taken from a preallocated
//! [`BundlePool`]. Bundles go back to the pool when the worker is done with
//! them or when the handoff queue evicts them, so steady-state operation
//! never allocates on the realtime thread.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One callback's worth of audio across all channels
#[derive(Debug, Clone)]
pub struct FrameBundle {
    /// Planar samples, `channels * stride` long
    samples: Vec<f32>,
    channels: usize,
    /// Frames reserved per channel
    stride: usize,
    /// Valid frames in this bundle
    frames: usize,
    /// Callback sequence number
    pub sequence: u64,
}

impl FrameBundle {
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Self {
            samples: vec![0.0; channels * max_frames],
            channels,
            stride: max_frames,
            frames: 0,
            sequence: 0,
        }
    }

    /// Make room for callbacks of up to `max_frames`. Existing samples are
    /// not preserved.
    pub fn reserve(&mut self, max_frames: usize) {
        if max_frames > self.stride {
            self.stride = max_frames;
            self.samples.resize(self.channels * max_frames, 0.0);
        }
    }

    /// Copy port buffers into the bundle.
    ///
    /// Only reallocates if `frames` exceeds the reserved size, which can
    /// happen for a bundle that was in flight when the pool was resized.
    pub fn fill(&mut self, inputs: &[&[f32]], frames: usize, sequence: u64) {
        self.reserve(frames);

        for channel in 0..self.channels {
            let dst = &mut self.samples[channel * self.stride..channel * self.stride + frames];
            match inputs.get(channel) {
                Some(src) if src.len() >= frames => dst.copy_from_slice(&src[..frames]),
                Some(src) => {
                    dst[..src.len()].copy_from_slice(src);
                    dst[src.len()..].fill(0.0);
                }
                None => dst.fill(0.0),
            }
        }

        self.frames = frames;
        self.sequence = sequence;
    }

    /// Valid samples of one channel
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.stride;
        &self.samples[start..start + self.frames]
    }

    /// Iterate over channel buffers in port order
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.channels).map(move |c| self.channel(c))
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    #[cfg(test)]
    pub(crate) fn max_frames(&self) -> usize {
        self.stride
    }
}

/// Fixed set of reusable bundles shared by the realtime thread and a worker
pub struct BundlePool {
    free: ArrayQueue<FrameBundle>,
    /// Frames every bundle should hold
    max_frames: AtomicUsize,
    exhausted: AtomicUsize,
}

impl BundlePool {
    /// Preallocate `size` bundles of `channels x max_frames`
    pub fn new(size: usize, channels: usize, max_frames: usize) -> Self {
        let size = size.max(1);
        let free = ArrayQueue::new(size);
        for _ in 0..size {
            let _ = free.push(FrameBundle::new(channels, max_frames));
        }

        Self {
            free,
            max_frames: AtomicUsize::new(max_frames),
            exhausted: AtomicUsize::new(0),
        }
    }

    /// Take a bundle. `None` means every bundle is in flight.
    pub fn acquire(&self) -> Option<FrameBundle> {
        match self.free.pop() {
            Some(bundle) => Some(bundle),
            None => {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Return a bundle to the pool
    pub fn release(&self, bundle: FrameBundle) {
        // a full pool means the bundle came from elsewhere; let it drop
        let _ = self.free.push(bundle);
    }

    /// Return a bundle from a non-realtime thread, growing it to the pool's
    /// current size first
    pub fn restock(&self, mut bundle: FrameBundle) {
        bundle.reserve(self.max_frames.load(Ordering::Relaxed));
        self.release(bundle);
    }

    /// Grow the idle bundles for a new callback size. Bundles in flight catch
    /// up when they are restocked.
    pub fn resize(&self, max_frames: usize) {
        self.max_frames.fetch_max(max_frames, Ordering::Relaxed);
        for _ in 0..self.free.len() {
            let Some(mut bundle) = self.free.pop() else {
                break;
            };
            bundle.reserve(max_frames);
            self.release(bundle);
        }
    }

    /// Bundles currently available
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Times `acquire` found the pool empty
    pub fn exhausted_count(&self) -> usize {
        self.exhausted.load(Ordering::Relaxed)
    }
}
