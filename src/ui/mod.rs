//! Web control surface

pub mod control;
pub mod server;
pub mod websocket;

pub use control::{ControlHandler, ControlSurface, StatusReport};
pub use server::WebServer;
