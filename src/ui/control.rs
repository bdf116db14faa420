//! Control surface: websocket commands in, registry operations and display
//! broadcasts out
//!
//! Commands may arrive from several websocket connections at once, so the
//! registry sits behind a lock here. `connect_source` addresses a source by
//! its index in the most recent `refresh` snapshot; if discovery has changed
//! since then, the index still refers to the old snapshot.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::gain::MasterGain;
use crate::bridge::endpoint::{EndpointStatus, StatsSnapshot};
use crate::bridge::presets;
use crate::bridge::registry::{EndpointFactory, StreamRegistry};
use crate::error::{RegistryError, Result};
use crate::network::{Discovery, SourceInfo};
use crate::protocol::{
    Broadcast, Command, ControlMessage, SourceEntry, SourceListMessage, VolumeMessage,
};

/// `/rest` status document
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub active: Vec<ActiveStream>,
    pub active_count: usize,
    pub capacity: usize,
    pub master_volume: f32,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActiveStream {
    pub slot: usize,
    pub name: String,
    pub stats: StatsSnapshot,
}

/// What the web server needs from the control surface
pub trait ControlHandler: Send + Sync + 'static {
    /// Handle one websocket text frame, returning what to broadcast.
    /// Frames that are not a known command are ignored.
    fn dispatch(&self, text: &str) -> Result<Vec<Broadcast>>;

    fn status(&self) -> StatusReport;
}

pub struct ControlSurface<F: EndpointFactory, D: Discovery> {
    registry: Mutex<StreamRegistry<F>>,
    discovery: Arc<D>,
    snapshot: Mutex<Vec<SourceInfo>>,
    master: MasterGain,
    presets_path: PathBuf,
    started_at: DateTime<Utc>,
}

impl<F: EndpointFactory, D: Discovery> ControlSurface<F, D> {
    pub fn new(
        registry: StreamRegistry<F>,
        discovery: Arc<D>,
        master: MasterGain,
        presets_path: PathBuf,
    ) -> Self {
        Self {
            registry: Mutex::new(registry),
            discovery,
            snapshot: Mutex::new(Vec::new()),
            master,
            presets_path,
            started_at: Utc::now(),
        }
    }

    pub fn handle(&self, command: Command) -> Result<Vec<Broadcast>> {
        tracing::debug!(?command, "Control command");

        match command {
            Command::Refresh => Ok(self.refresh()),
            Command::RefreshVolume => Ok(vec![Broadcast::Volume(VolumeMessage::new(
                self.master.get(),
            ))]),
            Command::ConnectSource(index) => {
                let name = self
                    .snapshot
                    .lock()
                    .get(index)
                    .map(|source| source.name.clone())
                    .ok_or(RegistryError::UnknownSource(index))?;
                self.registry.lock().connect_default(&name)?;
                Ok(Vec::new())
            }
            Command::DisconnectSource(slot) => {
                self.registry.lock().disconnect(slot)?;
                Ok(Vec::new())
            }
            Command::SaveStreams => {
                let names = self.registry.lock().persist();
                presets::save(&self.presets_path, &names)?;
                Ok(Vec::new())
            }
            Command::SetMasterGain(gain) => {
                if !self.master.set(gain) {
                    tracing::warn!("Ignoring master gain {}", gain);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Take a fresh discovery snapshot and describe it alongside the active
    /// streams
    fn refresh(&self) -> Vec<Broadcast> {
        let sources = self.discovery.current_sources();
        let registry = self.registry.lock();

        let discovered = SourceListMessage::discovered(
            registry
                .list_discoverable(&sources)
                .into_iter()
                .map(|(index, source)| {
                    (
                        index,
                        SourceEntry {
                            name: source.name.clone(),
                            url: source.url.clone(),
                        },
                    )
                }),
        );
        let playing = SourceListMessage::playing(registry.list_active().into_iter().map(
            |(slot, name)| {
                (
                    slot,
                    SourceEntry {
                        name: name.to_string(),
                        url: None,
                    },
                )
            },
        ));
        drop(registry);

        *self.snapshot.lock() = sources;
        vec![Broadcast::Sources(discovered), Broadcast::Sources(playing)]
    }

    /// Restore saved streams from the preset file. An unreadable file and
    /// streams that cannot be connected are logged and skipped; fatal errors
    /// are returned.
    pub fn restore_presets(&self) -> Result<usize> {
        let names = match presets::load(&self.presets_path) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(
                    "Cannot read presets from {}: {}",
                    self.presets_path.display(),
                    e
                );
                return Ok(0);
            }
        };
        let restored = self.registry.lock().restore(&names)?;
        tracing::info!("Restored {} of {} saved streams", restored, names.len());
        Ok(restored)
    }

    /// Tear down every stream
    pub fn shutdown(&self) {
        self.registry.lock().shutdown_all();
    }

    pub fn master(&self) -> &MasterGain {
        &self.master
    }

    /// Names in slot order
    pub fn active(&self) -> Vec<(usize, String)> {
        self.registry
            .lock()
            .list_active()
            .into_iter()
            .map(|(slot, name)| (slot, name.to_string()))
            .collect()
    }
}

impl<F: EndpointFactory, D: Discovery> ControlHandler for ControlSurface<F, D> {
    fn dispatch(&self, text: &str) -> Result<Vec<Broadcast>> {
        match ControlMessage::from_json(text).and_then(|msg| msg.command()) {
            Some(command) => self.handle(command),
            None => {
                tracing::debug!("Ignoring control message {:?}", text);
                Ok(Vec::new())
            }
        }
    }

    fn status(&self) -> StatusReport {
        let registry = self.registry.lock();
        let active: Vec<ActiveStream> = registry
            .iter()
            .map(|(slot, name, endpoint)| ActiveStream {
                slot,
                name: name.to_string(),
                stats: endpoint.stats(),
            })
            .collect();

        StatusReport {
            active_count: active.len(),
            active,
            capacity: registry.capacity(),
            master_volume: self.master.get(),
            started_at: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        }
    }
}
