//! Frame synchronizer for the LAN receiver
//!
//! The network thread pushes packets in as they arrive; the realtime thread
//! pulls exactly one callback's worth at the local rate. A rate mismatch is
//! absorbed by linear interpolation, and the buffered audio is kept under a
//! latency bound by discarding the oldest samples.

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::wire::AudioPacket;
use crate::audio::convert::NetworkFrame;
use crate::constants::MAX_CHANNELS;

struct SyncState {
    sample_rate: u32,
    fifos: Vec<VecDeque<f32>>,
    /// Fractional read position into the fifos
    position: f64,
}

/// Shared between a LAN receiver thread and a realtime callback.
///
/// Each fifo is allocated with room for the whole latency bound when the
/// stream format is first seen, and is never filled past it, so neither side
/// allocates while holding the lock.
pub struct SyncBuffer {
    state: Mutex<SyncState>,
    latency_ms: u32,
}

impl SyncBuffer {
    pub fn new(latency_ms: u32) -> Self {
        Self {
            state: Mutex::new(SyncState {
                sample_rate: 0,
                fifos: Vec::new(),
                position: 0.0,
            }),
            latency_ms: latency_ms.max(1),
        }
    }

    fn limit(&self, sample_rate: u32) -> usize {
        (sample_rate as usize * self.latency_ms as usize / 1000).max(1)
    }

    /// Append a received packet, discarding the oldest audio beyond the
    /// latency bound. A change of channel count or rate restarts the stream.
    pub fn push(&self, packet: &AudioPacket) {
        if !packet.is_consistent() || packet.sample_rate == 0 {
            return;
        }
        let channels = (packet.channels as usize).min(MAX_CHANNELS);
        let limit = self.limit(packet.sample_rate);

        // only this thread changes the format, so the check stays valid
        // while the new fifos are built unlocked
        let restart = {
            let state = self.state.lock();
            state.sample_rate != packet.sample_rate || state.fifos.len() != channels
        };
        let fresh: Option<Vec<VecDeque<f32>>> =
            restart.then(|| (0..channels).map(|_| VecDeque::with_capacity(limit)).collect());

        let frames = packet.samples_per_channel as usize;
        let skip = frames.saturating_sub(limit);
        let incoming = frames - skip;

        let mut state = self.state.lock();
        let retired = fresh.map(|fifos| {
            state.sample_rate = packet.sample_rate;
            state.position = 0.0;
            std::mem::replace(&mut state.fifos, fifos)
        });

        let buffered = state.fifos.first().map_or(0, VecDeque::len);
        let excess = (buffered + incoming).saturating_sub(limit);
        for (channel, fifo) in state.fifos.iter_mut().enumerate() {
            fifo.drain(..excess.min(fifo.len()));
            fifo.extend(packet.channel(channel).iter().skip(skip));
        }
        drop(state);
        drop(retired);

        if excess + skip > 0 {
            tracing::trace!("Discarded {} late frames", excess + skip);
        }
    }

    /// Produce `frames` samples per channel at `sample_rate`. Returns false,
    /// leaving `frame` untouched, when nothing is buffered or the network
    /// thread holds the buffer.
    pub fn capture(
        &self,
        frame: &mut NetworkFrame,
        sample_rate: u32,
        channels: usize,
        frames: usize,
    ) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            return false;
        };
        let available = state.fifos.first().map_or(0, VecDeque::len);
        if available == 0 || sample_rate == 0 {
            return false;
        }

        frame.prepare(sample_rate, channels, frames);
        let step = state.sample_rate as f64 / sample_rate as f64;
        let start = state.position;

        for (channel, fifo) in state.fifos.iter().enumerate().take(channels) {
            let out = frame.channel_mut(channel);
            for (i, sample) in out.iter_mut().enumerate() {
                let pos = start + i as f64 * step;
                let index = pos as usize;
                let frac = (pos - index as f64) as f32;
                *sample = match (fifo.get(index), fifo.get(index + 1)) {
                    (Some(&a), Some(&b)) => a + (b - a) * frac,
                    (Some(&a), None) => a,
                    _ => 0.0,
                };
            }
        }

        let end = start + frames as f64 * step;
        let consumed = (end as usize).min(available);
        for fifo in &mut state.fifos {
            fifo.drain(..consumed.min(fifo.len()));
        }
        state.position = if consumed < end as usize { 0.0 } else { end - consumed as f64 };

        true
    }

    /// Frames currently buffered
    pub fn buffered(&self) -> usize {
        self.state.lock().fifos.first().map_or(0, VecDeque::len)
    }

    #[cfg(test)]
    fn fifo_capacity(&self) -> usize {
        self.state.lock().fifos.first().map_or(0, VecDeque::capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(rate: u32, channels: u16, samples: Vec<f32>) -> AudioPacket {
        AudioPacket {
            sequence: 0,
            sample_rate: rate,
            channels,
            samples_per_channel: (samples.len() / channels as usize) as u32,
            data: samples,
        }
    }

    #[test]
    fn test_empty_buffer_reports_no_frame() {
        let sync = SyncBuffer::new(100);
        let mut frame = NetworkFrame::with_capacity(2, 64);
        assert!(!sync.capture(&mut frame, 48000, 2, 64));
    }

    #[test]
    fn test_same_rate_passthrough() {
        let sync = SyncBuffer::new(100);
        let mut data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        data.extend((0..8).map(|i| -(i as f32)));
        sync.push(&packet(48000, 2, data));

        let mut frame = NetworkFrame::with_capacity(2, 4);
        assert!(sync.capture(&mut frame, 48000, 2, 4));
        assert_eq!(frame.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frame.channel(1), &[0.0, -1.0, -2.0, -3.0]);
        assert_eq!(sync.buffered(), 4);

        assert!(sync.capture(&mut frame, 48000, 2, 4));
        assert_eq!(frame.channel(0), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_underrun_pads_with_silence() {
        let sync = SyncBuffer::new(100);
        sync.push(&packet(48000, 1, vec![1.0, 1.0]));

        let mut frame = NetworkFrame::with_capacity(1, 4);
        assert!(sync.capture(&mut frame, 48000, 1, 4));
        assert_eq!(frame.channel(0), &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(sync.buffered(), 0);
    }

    #[test]
    fn test_resamples_to_local_rate() {
        let sync = SyncBuffer::new(1000);
        // 24 kHz ramp pulled at 48 kHz: every other sample is interpolated
        sync.push(&packet(24000, 1, vec![0.0, 2.0, 4.0, 6.0, 8.0]));

        let mut frame = NetworkFrame::with_capacity(1, 8);
        assert!(sync.capture(&mut frame, 48000, 1, 8));
        assert_eq!(frame.channel(0), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_latency_bound_discards_oldest() {
        // 1 ms at 8 kHz = 8 samples
        let sync = SyncBuffer::new(1);
        sync.push(&packet(8000, 1, (0..20).map(|i| i as f32).collect()));
        assert_eq!(sync.buffered(), 8);

        let mut frame = NetworkFrame::with_capacity(1, 2);
        assert!(sync.capture(&mut frame, 8000, 1, 2));
        assert_eq!(frame.channel(0), &[12.0, 13.0]);
    }

    #[test]
    fn test_missing_channels_are_silent() {
        let sync = SyncBuffer::new(100);
        sync.push(&packet(48000, 1, vec![0.5; 4]));

        let mut frame = NetworkFrame::with_capacity(2, 4);
        assert!(sync.capture(&mut frame, 48000, 2, 4));
        assert_eq!(frame.channel(1), &[0.0; 4]);
    }

    #[test]
    fn test_format_change_restarts() {
        let sync = SyncBuffer::new(100);
        sync.push(&packet(48000, 2, vec![1.0; 8]));
        sync.push(&packet(44100, 1, vec![2.0; 3]));
        assert_eq!(sync.buffered(), 3);
    }

    #[test]
    fn test_inconsistent_packet_ignored() {
        let sync = SyncBuffer::new(100);
        let mut bad = packet(48000, 2, vec![1.0; 8]);
        bad.samples_per_channel = 10;
        sync.push(&bad);
        assert_eq!(sync.buffered(), 0);
    }

    #[test]
    fn test_large_packet_stays_within_reserved_capacity() {
        // 40 ms at 48 kHz = 1920 frames
        let sync = SyncBuffer::new(40);
        sync.push(&packet(48000, 2, vec![0.1; 2 * 256]));
        let capacity = sync.fifo_capacity();
        assert!(capacity >= 1920);

        let big = AudioPacket::max_frames(2).min(4096);
        sync.push(&packet(48000, 2, vec![0.2; 2 * big]));
        assert_eq!(sync.buffered(), 1920);
        assert_eq!(sync.fifo_capacity(), capacity);

        sync.push(&packet(48000, 2, vec![0.3; 2 * 64]));
        assert_eq!(sync.buffered(), 1920);
        assert_eq!(sync.fifo_capacity(), capacity);

        // newest audio survives, oldest is gone
        let mut frame = NetworkFrame::with_capacity(2, 1920);
        assert!(sync.capture(&mut frame, 48000, 2, 1920));
        assert_eq!(frame.channel(0)[0], 0.2);
        assert_eq!(frame.channel(1)[1919], 0.3);
    }

    #[test]
    fn test_packet_longer_than_bound_keeps_tail() {
        let sync = SyncBuffer::new(1);
        sync.push(&packet(8000, 1, vec![9.0; 3]));
        let capacity = sync.fifo_capacity();
        sync.push(&packet(8000, 1, (0..20).map(|i| i as f32).collect()));
        assert_eq!(sync.buffered(), 8);
        assert_eq!(sync.fifo_capacity(), capacity);

        let mut frame = NetworkFrame::with_capacity(1, 8);
        assert!(sync.capture(&mut frame, 8000, 1, 8));
        assert_eq!(frame.channel(0), &[12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0]);
    }

    #[test]
    fn test_capture_does_not_wait_for_network_thread() {
        let sync = SyncBuffer::new(100);
        sync.push(&packet(48000, 1, vec![0.5; 64]));

        let held = sync.state.lock();
        let mut frame = NetworkFrame::with_capacity(1, 32);
        assert!(!sync.capture(&mut frame, 48000, 1, 32));
        drop(held);

        assert!(sync.capture(&mut frame, 48000, 1, 32));
        assert_eq!(sync.buffered(), 32);
    }
}
