//! # JACK Network Bridge
//!
//! Bridges a JACK audio graph and LAN audio streams in both directions.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── SEND (jack2net) ─────────────────────────────┐
//! │  JACK input ports                                                         │
//! │        │  realtime callback: copy port buffers into a pooled FrameBundle  │
//! │        ▼                                                                   │
//! │  ┌──────────────┐  drop-oldest   ┌───────────────┐   ┌────────────────┐  │
//! │  │ HandoffQueue │ ─────────────▶ │  Send worker  │──▶│  FrameSender   │  │
//! │  │ (max depth 1)│  wait/notify   │ to_network_fr │   │ (LAN unicast)  │  │
//! │  └──────────────┘                └───────────────┘   └────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────── RECEIVE (net2jack) ───────────────────────────┐
//! │  Browser ──ws──▶ ControlSurface ──▶ StreamRegistry (N slots)              │
//! │                                        │ slot 0   slot 1  ...  slot N-1   │
//! │                                        ▼                                   │
//! │  LAN receiver ─▶ FrameSync ─▶ realtime callback ─▶ gain ─▶ JACK outputs   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The send direction needs a queue because a network send cannot run on the
//! realtime thread. The receive direction reads straight from the frame
//! synchronizer, which already buffers and paces.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Maximum number of concurrently bridged streams
    pub const DEFAULT_REGISTRY_CAPACITY: usize = 30;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: usize = 2;

    /// Upper bound on ports per endpoint; realtime port views are stack arrays
    pub const MAX_CHANNELS: usize = 64;

    /// Default handoff queue depth ("latest wins")
    pub const DEFAULT_QUEUE_DEPTH: usize = 1;

    /// Default UDP port for discovery beacons
    pub const DEFAULT_DISCOVERY_PORT: u16 = 5960;

    /// Default HTTP/WebSocket port for control
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default frame synchronizer latency bound in milliseconds
    pub const DEFAULT_SYNC_LATENCY_MS: u32 = 40;

    /// Largest datagram the LAN transport will emit
    pub const MAX_DATAGRAM_SIZE: usize = 65_000;

    /// Spare bundles kept in the pool beyond the queue depth
    pub const BUNDLE_POOL_SLACK: usize = 2;
}
