//! JACK implementation of the audio host
//!
//! Each endpoint owns its own JACK client. If the server shuts the client
//! down, [`server_lost`] starts returning true and the binaries exit with
//! status 1; there is no reconnection.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::host::{AudioClient, AudioHost, AudioProcessor, Cycle, PortLayout};
use crate::constants::MAX_CHANNELS;
use crate::error::AudioError;

static SERVER_LOST: AtomicBool = AtomicBool::new(false);

/// Whether any client has been shut down by the JACK server
pub fn server_lost() -> bool {
    SERVER_LOST.load(Ordering::SeqCst)
}

/// Opens JACK clients
pub struct JackHost {
    options: jack::ClientOptions,
}

impl std::fmt::Debug for JackHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JackHost")
            .field("options", &self.options.bits())
            .finish()
    }
}

impl Clone for JackHost {
    fn clone(&self) -> Self {
        Self {
            options: jack::ClientOptions::from_bits_retain(self.options.bits()),
        }
    }
}

impl JackHost {
    /// Connect only to an already running server
    pub fn new() -> Self {
        Self {
            options: jack::ClientOptions::NO_START_SERVER,
        }
    }
}

impl Default for JackHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for JackHost {
    type Client = JackClient;

    fn open(&self, name: &str, layout: PortLayout) -> Result<JackClient, AudioError> {
        if layout.inputs > MAX_CHANNELS || layout.outputs > MAX_CHANNELS {
            return Err(AudioError::ChannelCount(layout.inputs.max(layout.outputs)));
        }

        let (client, status) = jack::Client::new(
            name,
            jack::ClientOptions::from_bits_retain(self.options.bits()),
        )
            .map_err(|e| AudioError::ClientOpen(format!("{} ({:?})", e, name)))?;

        if status.contains(jack::ClientStatus::SERVER_STARTED) {
            tracing::info!("JACK server started");
        }
        if status.contains(jack::ClientStatus::NAME_NOT_UNIQUE) {
            tracing::debug!("Unique JACK client name assigned: {}", client.name());
        }

        let mut inputs = Vec::with_capacity(layout.inputs);
        for i in 0..layout.inputs {
            let port_name = input_port_name(i);
            let port = client
                .register_port(&port_name, jack::AudioIn::default())
                .map_err(|e| AudioError::PortRegistration {
                    port: port_name.clone(),
                    reason: e.to_string(),
                })?;
            tracing::debug!("Registered JACK port {}:{}", client.name(), port_name);
            inputs.push(port);
        }

        let mut outputs = Vec::with_capacity(layout.outputs);
        for i in 0..layout.outputs {
            let port_name = output_port_name(i);
            let port = client
                .register_port(&port_name, jack::AudioOut::default())
                .map_err(|e| AudioError::PortRegistration {
                    port: port_name.clone(),
                    reason: e.to_string(),
                })?;
            tracing::debug!("Registered JACK port {}:{}", client.name(), port_name);
            outputs.push(port);
        }

        Ok(JackClient { client, inputs, outputs })
    }
}

/// Capture ports are numbered from 0 and playback ports from 1, the names
/// existing patchbay setups connect by.
fn input_port_name(index: usize) -> String {
    format!("input{}", index)
}

fn output_port_name(index: usize) -> String {
    format!("output{}", index + 1)
}

/// A JACK client with its ports registered
pub struct JackClient {
    client: jack::Client,
    inputs: Vec<jack::Port<jack::AudioIn>>,
    outputs: Vec<jack::Port<jack::AudioOut>>,
}

/// Active JACK client. Dropping it deactivates and closes the client.
pub struct JackActive {
    _client: jack::AsyncClient<ShutdownNotifier, JackProcess>,
}

impl AudioClient for JackClient {
    type Active = JackActive;

    fn sample_rate(&self) -> u32 {
        self.client.sample_rate() as u32
    }

    fn buffer_size(&self) -> usize {
        self.client.buffer_size() as usize
    }

    fn activate(
        self,
        processor: Box<dyn AudioProcessor>,
        auto_connect: bool,
    ) -> Result<JackActive, AudioError> {
        let input_names = port_names(&self.inputs);
        let output_names = port_names(&self.outputs);

        let handler = JackProcess {
            inputs: self.inputs,
            outputs: self.outputs,
            processor,
        };

        let active = self
            .client
            .activate_async(ShutdownNotifier, handler)
            .map_err(|e| AudioError::Activation(e.to_string()))?;

        // Connections can only be made once the client is running
        if auto_connect {
            connect_physical(active.as_client(), &input_names, &output_names)?;
        }

        Ok(JackActive { _client: active })
    }
}

fn port_names<T: jack::PortSpec>(ports: &[jack::Port<T>]) -> Vec<String> {
    ports.iter().filter_map(|p| p.name().ok()).collect()
}

/// Wire capture ports to our inputs and our outputs to playback ports, in
/// order. Physical capture ports are outputs from the server's point of view.
fn connect_physical(
    client: &jack::Client,
    inputs: &[String],
    outputs: &[String],
) -> Result<(), AudioError> {
    if !inputs.is_empty() {
        let capture = client.ports(
            None,
            None,
            jack::PortFlags::IS_PHYSICAL | jack::PortFlags::IS_OUTPUT,
        );
        if capture.is_empty() {
            return Err(AudioError::NoPhysicalPorts("capture"));
        }
        for (src, dst) in capture.iter().zip(inputs) {
            if let Err(e) = client.connect_ports_by_name(src, dst) {
                tracing::warn!("Cannot connect {} -> {}: {}", src, dst, e);
            }
        }
    }

    if !outputs.is_empty() {
        let playback = client.ports(
            None,
            None,
            jack::PortFlags::IS_PHYSICAL | jack::PortFlags::IS_INPUT,
        );
        if playback.is_empty() {
            return Err(AudioError::NoPhysicalPorts("playback"));
        }
        for (src, dst) in outputs.iter().zip(&playback) {
            if let Err(e) = client.connect_ports_by_name(src, dst) {
                tracing::warn!("Cannot connect {} -> {}: {}", src, dst, e);
            }
        }
    }

    Ok(())
}

/// JACK process handler that forwards each cycle to an [`AudioProcessor`]
pub struct JackProcess {
    inputs: Vec<jack::Port<jack::AudioIn>>,
    outputs: Vec<jack::Port<jack::AudioOut>>,
    processor: Box<dyn AudioProcessor>,
}

impl jack::ProcessHandler for JackProcess {
    fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        let mut cycle = Cycle {
            frames: ps.n_frames() as usize,
            inputs: self.inputs.iter().map(|p| p.as_slice(ps)).collect(),
            outputs: self.outputs.iter_mut().map(|p| p.as_mut_slice(ps)).collect(),
        };

        self.processor.process(&mut cycle);
        jack::Control::Continue
    }

    fn buffer_size(&mut self, _: &jack::Client, size: jack::Frames) -> jack::Control {
        self.processor.buffer_size(size as usize);
        jack::Control::Continue
    }
}

/// Records server shutdown. Runs in signal-handler context, so it only
/// flips a flag.
pub struct ShutdownNotifier;

impl jack::NotificationHandler for ShutdownNotifier {
    unsafe fn shutdown(&mut self, _status: jack::ClientStatus, _reason: &str) {
        SERVER_LOST.store(true, Ordering::SeqCst);
    }
}
