//! Error types for the bridge

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is an infrastructure failure the process cannot
    /// continue past (audio server or media network unusable).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Audio(_) | Error::Network(NetworkError::Init(_)))
    }
}

/// Audio server (JACK) errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Cannot connect to audio server: {0}")]
    ClientOpen(String),

    #[error("Port registration failed for {port}: {reason}")]
    PortRegistration { port: String, reason: String },

    #[error("Client activation failed: {0}")]
    Activation(String),

    #[error("No physical {0} ports available")]
    NoPhysicalPorts(&'static str),

    #[error("Unsupported channel count: {0}")]
    ChannelCount(usize),
}

/// Media network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network initialization failed: {0}")]
    Init(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Invalid packet format")]
    InvalidPacket,
}

/// Stream registry errors. These are reported to the caller and never
/// bring the process down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Already bridging stream: {0}")]
    Duplicate(String),

    #[error("All {0} slots are in use")]
    Capacity(usize),

    #[error("Slot not found: {0}")]
    NotFound(usize),

    #[error("Stream name is empty")]
    EmptyName,

    #[error("No discovered source at index {0}")]
    UnknownSource(usize),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let err: Error = AudioError::ClientOpen("server not running".into()).into();
        assert!(err.is_fatal());

        let err: Error = NetworkError::Init("no interface".into()).into();
        assert!(err.is_fatal());

        let err: Error = RegistryError::Duplicate("Studio A".into()).into();
        assert!(!err.is_fatal());

        let err: Error = NetworkError::SendFailed("host unreachable".into()).into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_registry_error_messages() {
        assert_eq!(
            RegistryError::Duplicate("Cam 1".into()).to_string(),
            "Already bridging stream: Cam 1"
        );
        assert_eq!(RegistryError::Capacity(30).to_string(), "All 30 slots are in use");
    }
}
