//! Gain controls shared between the control surface and realtime callbacks

use arrayvec::ArrayVec;
use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::constants::MAX_CHANNELS;

/// Master gain applied to every receive endpoint.
/// Cloning shares the same value.
#[derive(Debug, Clone)]
pub struct MasterGain(Arc<AtomicF32>);

impl MasterGain {
    pub fn new(gain: f32) -> Self {
        Self(Arc::new(AtomicF32::new(sanitize(gain).unwrap_or(1.0))))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Set the gain. Negative or non-finite values are ignored.
    pub fn set(&self, gain: f32) -> bool {
        match sanitize(gain) {
            Some(gain) => {
                self.0.store(gain, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl Default for MasterGain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Per-channel gains of one endpoint
#[derive(Debug)]
pub struct ChannelGains(Box<[AtomicF32]>);

impl ChannelGains {
    /// Unity gain on every channel
    pub fn unity(channels: usize) -> Self {
        Self((0..channels).map(|_| AtomicF32::new(1.0)).collect())
    }

    pub fn get(&self, channel: usize) -> Option<f32> {
        self.0.get(channel).map(|g| g.load(Ordering::Relaxed))
    }

    pub fn set(&self, channel: usize, gain: f32) -> bool {
        match (self.0.get(channel), sanitize(gain)) {
            (Some(slot), Some(gain)) => {
                slot.store(gain, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy current values onto the stack for one callback
    pub fn snapshot(&self) -> ArrayVec<f32, MAX_CHANNELS> {
        self.0
            .iter()
            .take(MAX_CHANNELS)
            .map(|g| g.load(Ordering::Relaxed))
            .collect()
    }
}

fn sanitize(gain: f32) -> Option<f32> {
    (gain.is_finite() && gain >= 0.0).then_some(gain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_gain_shared() {
        let gain = MasterGain::new(1.0);
        let other = gain.clone();
        assert!(gain.set(0.25));
        assert_eq!(other.get(), 0.25);
    }

    #[test]
    fn test_rejects_invalid_gain() {
        let gain = MasterGain::new(0.5);
        assert!(!gain.set(-1.0));
        assert!(!gain.set(f32::NAN));
        assert!(!gain.set(f32::INFINITY));
        assert_eq!(gain.get(), 0.5);
        assert_eq!(MasterGain::new(f32::NAN).get(), 1.0);
    }

    #[test]
    fn test_channel_gains() {
        let gains = ChannelGains::unity(2);
        assert!(gains.set(1, 0.8));
        assert!(!gains.set(2, 0.8));
        assert_eq!(gains.snapshot().as_slice(), &[1.0, 0.8]);
        assert_eq!(gains.get(5), None);
    }
}
