//! Audio subsystem module

pub mod bundle;
pub mod convert;
pub mod gain;
pub mod host;
pub mod jack;
pub mod queue;

pub use bundle::{BundlePool, FrameBundle};
pub use convert::{from_network_frame, to_network_frame, GainSpec, NetworkFrame};
pub use gain::{ChannelGains, MasterGain};
pub use host::{AudioClient, AudioHost, AudioProcessor, Cycle, PortLayout};
pub use queue::{HandoffQueue, Wait};
