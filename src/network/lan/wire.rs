//! Datagram format for the LAN transport
//!
//! Every datagram is one bincode-encoded [`Packet`]. Audio is planar f32,
//! split across several packets when a frame would not fit in one datagram.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::audio::convert::NetworkFrame;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;

/// Encoded size of an `Audio` packet excluding samples, rounded up
const AUDIO_HEADER_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// Sender beacon, broadcast on the discovery port
    Announce { name: String, audio_port: u16 },
    /// Receiver asking a sender for its stream, sent to the audio port
    Subscribe { name: String },
    /// Audio from a sender to a subscriber
    Audio(AudioPacket),
}

/// A run of planar samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPacket {
    pub sequence: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples_per_channel: u32,
    /// `channels * samples_per_channel` samples, channel after channel
    pub data: Vec<f32>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_DATAGRAM_SIZE as u64)
        .with_fixint_encoding()
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        options().serialize(self).map_err(|e| match *e {
            bincode::ErrorKind::SizeLimit => NetworkError::PacketTooLarge(self.approx_size()),
            _ => NetworkError::SendFailed(e.to_string()),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkError> {
        options()
            .deserialize(bytes)
            .map_err(|_| NetworkError::InvalidPacket)
    }

    fn approx_size(&self) -> usize {
        match self {
            Packet::Audio(audio) => AUDIO_HEADER_SIZE + audio.data.len() * 4,
            Packet::Announce { name, .. } | Packet::Subscribe { name } => 16 + name.len(),
        }
    }
}

impl AudioPacket {
    /// Most frames per packet for a channel count
    pub fn max_frames(channels: usize) -> usize {
        ((MAX_DATAGRAM_SIZE - AUDIO_HEADER_SIZE) / (4 * channels.max(1))).max(1)
    }

    /// Split a frame into packets that each fit a datagram. Sequence numbers
    /// continue from `first_sequence`.
    pub fn split(frame: &NetworkFrame, first_sequence: u64) -> Vec<AudioPacket> {
        let max_frames = Self::max_frames(frame.channels);
        let mut packets = Vec::new();
        let mut offset = 0;

        while offset < frame.samples_per_channel {
            let n = (frame.samples_per_channel - offset).min(max_frames);
            let mut data = Vec::with_capacity(n * frame.channels);
            for channel in 0..frame.channels {
                data.extend_from_slice(&frame.channel(channel)[offset..offset + n]);
            }

            packets.push(AudioPacket {
                sequence: first_sequence + packets.len() as u64,
                sample_rate: frame.sample_rate,
                channels: frame.channels as u16,
                samples_per_channel: n as u32,
                data,
            });
            offset += n;
        }

        packets
    }

    /// Samples of one channel
    pub fn channel(&self, channel: usize) -> &[f32] {
        let n = self.samples_per_channel as usize;
        self.data.get(channel * n..(channel + 1) * n).unwrap_or(&[])
    }

    /// Header fields agree with the payload length
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.channels as usize * self.samples_per_channel as usize
    }
}
