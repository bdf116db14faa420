//! Conversion between JACK per-port buffers and planar network frames
//!
//! A network frame stores channel `c` at `[c * stride, c * stride + samples)`
//! of one contiguous buffer. Gains are plain multipliers with no clamping;
//! keeping the result in range is the caller's business.

/// Planar audio frame as carried on the network
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkFrame {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: usize,
    /// Valid samples in each channel
    pub samples_per_channel: usize,
    /// Distance between channel starts, in samples
    pub channel_stride: usize,
    /// Planar sample storage, `channels * channel_stride` long
    pub data: Vec<f32>,
}

impl NetworkFrame {
    /// Create a zeroed frame with `channel_stride == samples_per_channel`
    pub fn new(sample_rate: u32, channels: usize, samples_per_channel: usize) -> Self {
        Self {
            sample_rate,
            channels,
            samples_per_channel,
            channel_stride: samples_per_channel,
            data: vec![0.0; channels * samples_per_channel],
        }
    }

    /// An empty frame whose storage is sized for later reuse on the realtime
    /// thread via [`NetworkFrame::prepare`]
    pub fn with_capacity(channels: usize, max_samples: usize) -> Self {
        Self {
            sample_rate: 0,
            channels: 0,
            samples_per_channel: 0,
            channel_stride: 0,
            data: Vec::with_capacity(channels * max_samples),
        }
    }

    /// Reshape for reuse. Only allocates when the requested shape is larger
    /// than anything this frame has held before.
    pub fn prepare(&mut self, sample_rate: u32, channels: usize, samples_per_channel: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.samples_per_channel = samples_per_channel;
        self.channel_stride = samples_per_channel;
        self.data.clear();
        self.data.resize(channels * samples_per_channel, 0.0);
    }

    pub fn is_empty(&self) -> bool {
        self.channels == 0 || self.samples_per_channel == 0
    }

    /// Samples of one channel
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.channel_stride;
        self.data
            .get(start..start + self.samples_per_channel)
            .unwrap_or(&[])
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * self.channel_stride;
        let end = start + self.samples_per_channel;
        self.data.get_mut(start..end).unwrap_or(&mut [])
    }

    /// Channel stride in bytes, as network SDKs usually express it
    pub fn channel_stride_bytes(&self) -> usize {
        self.channel_stride * std::mem::size_of::<f32>()
    }
}

/// Master and per-channel gain applied during conversion
#[derive(Debug, Clone, Copy)]
pub struct GainSpec<'a> {
    pub master: f32,
    /// Missing entries count as unity
    pub channel: &'a [f32],
}

impl GainSpec<'static> {
    pub const UNITY: GainSpec<'static> = GainSpec { master: 1.0, channel: &[] };
}

impl GainSpec<'_> {
    #[inline]
    pub fn factor(&self, channel: usize) -> f32 {
        self.master * self.channel.get(channel).copied().unwrap_or(1.0)
    }

    #[inline]
    fn is_unity(&self, channel: usize) -> bool {
        self.factor(channel) == 1.0
    }
}

/// Copy per-port buffers into a freshly allocated planar frame.
///
/// Channels beyond `buffers.len()` are left zeroed, as are samples past the
/// end of a short buffer. The returned frame is owned by the caller and is
/// released when it goes out of scope.
pub fn to_network_frame(
    buffers: &[&[f32]],
    frame_count: usize,
    sample_rate: u32,
    channel_count: usize,
    gain: GainSpec<'_>,
) -> NetworkFrame {
    let mut frame = NetworkFrame::new(sample_rate, channel_count, frame_count);

    for (channel, src) in buffers.iter().take(channel_count).enumerate() {
        let factor = gain.factor(channel);
        let dst = frame.channel_mut(channel);
        let n = src.len().min(dst.len());

        if factor == 1.0 {
            dst[..n].copy_from_slice(&src[..n]);
        } else {
            for (d, s) in dst[..n].iter_mut().zip(&src[..n]) {
                *d = s * factor;
            }
        }
    }

    frame
}

/// Copy a planar frame into per-port output buffers, applying gain.
///
/// Output channels the frame does not carry, and output samples past the
/// frame's length, are filled with silence. Returns the number of samples
/// copied per channel.
pub fn from_network_frame(
    frame: &NetworkFrame,
    outputs: &mut [&mut [f32]],
    gain: GainSpec<'_>,
) -> usize {
    let mut copied = 0;

    for (channel, dst) in outputs.iter_mut().enumerate() {
        let src = if channel < frame.channels { frame.channel(channel) } else { &[] };
        let n = src.len().min(dst.len());

        if gain.is_unity(channel) {
            dst[..n].copy_from_slice(&src[..n]);
        } else {
            let factor = gain.factor(channel);
            for (d, s) in dst[..n].iter_mut().zip(&src[..n]) {
                *d = s * factor;
            }
        }
        dst[n..].fill(0.0);
        copied = copied.max(n);
    }

    copied
}
