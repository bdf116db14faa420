//! Stream endpoints and the registry that owns them

pub mod endpoint;
pub mod presets;
pub mod registry;

pub use endpoint::{
    Direction, EndpointConfig, EndpointState, EndpointStatus, StatsSnapshot, StreamEndpoint,
};
pub use registry::{BridgeFactory, EndpointFactory, StreamRegistry};
