//! Fixed-capacity table of bridged streams
//!
//! Slots are handed out lowest-free-first and a stream name can occupy at
//! most one slot. The slot index is the handle the control surface uses.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::endpoint::{Direction, EndpointConfig, EndpointStatus, StreamEndpoint};
use crate::audio::gain::MasterGain;
use crate::audio::host::AudioHost;
use crate::error::{RegistryError, Result};
use crate::network::{MediaNetwork, SourceInfo};

/// Builds the endpoint stored in a slot
pub trait EndpointFactory: Send + 'static {
    type Endpoint: EndpointStatus + Send + 'static;

    fn create(
        &self,
        remote: &str,
        direction: Direction,
        config: &EndpointConfig,
    ) -> Result<Self::Endpoint>;
}

/// Creates real endpoints on an audio host and media network
pub struct BridgeFactory<H, N> {
    host: H,
    network: Arc<N>,
    master: MasterGain,
}

impl<H: AudioHost, N: MediaNetwork> BridgeFactory<H, N> {
    /// `master` is shared by every receive endpoint the factory creates
    pub fn new(host: H, network: Arc<N>, master: MasterGain) -> Self {
        Self {
            host,
            network,
            master,
        }
    }
}

impl<H: AudioHost, N: MediaNetwork> EndpointFactory for BridgeFactory<H, N> {
    type Endpoint = StreamEndpoint;

    fn create(
        &self,
        remote: &str,
        direction: Direction,
        config: &EndpointConfig,
    ) -> Result<StreamEndpoint> {
        match direction {
            Direction::Send => {
                StreamEndpoint::start_send(&self.host, self.network.as_ref(), remote, config)
            }
            Direction::Receive => StreamEndpoint::start_receive(
                &self.host,
                self.network.as_ref(),
                remote,
                config,
                self.master.clone(),
            ),
        }
    }
}

struct Slot<E> {
    remote: String,
    endpoint: E,
}

pub struct StreamRegistry<F: EndpointFactory> {
    factory: F,
    slots: Vec<Option<Slot<F::Endpoint>>>,
    free: BTreeSet<usize>,
    by_remote: HashMap<String, usize>,
    default_direction: Direction,
    default_config: EndpointConfig,
}

impl<F: EndpointFactory> StreamRegistry<F> {
    /// `default_direction` and `default_config` are used by
    /// [`connect_default`](Self::connect_default) and [`restore`](Self::restore)
    pub fn new(
        factory: F,
        capacity: usize,
        default_direction: Direction,
        default_config: EndpointConfig,
    ) -> Self {
        Self {
            factory,
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).collect(),
            by_remote: HashMap::with_capacity(capacity),
            default_direction,
            default_config,
        }
    }

    /// Bridge `remote` in the lowest free slot.
    ///
    /// Registry errors leave the table unchanged. An error creating the
    /// endpoint is passed through; the caller decides whether it is fatal.
    pub fn connect(
        &mut self,
        remote: &str,
        direction: Direction,
        config: &EndpointConfig,
    ) -> Result<usize> {
        if remote.is_empty() {
            return Err(RegistryError::EmptyName.into());
        }
        if self.by_remote.contains_key(remote) {
            return Err(RegistryError::Duplicate(remote.to_string()).into());
        }
        let Some(&index) = self.free.first() else {
            return Err(RegistryError::Capacity(self.capacity()).into());
        };

        let endpoint = self.factory.create(remote, direction, config)?;

        self.free.remove(&index);
        self.by_remote.insert(remote.to_string(), index);
        self.slots[index] = Some(Slot {
            remote: remote.to_string(),
            endpoint,
        });

        tracing::info!(slot = index, remote, %direction, "Stream connected");
        Ok(index)
    }

    /// [`connect`](Self::connect) with the registry's defaults
    pub fn connect_default(&mut self, remote: &str) -> Result<usize> {
        let config = self.default_config.clone();
        self.connect(remote, self.default_direction, &config)
    }

    /// Tear down the endpoint in `index` and free the slot
    pub fn disconnect(&mut self, index: usize) -> std::result::Result<(), RegistryError> {
        let slot = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(RegistryError::NotFound(index))?;

        self.by_remote.remove(&slot.remote);
        self.free.insert(index);
        tracing::info!(slot = index, remote = %slot.remote, "Stream disconnected");

        // endpoint teardown happens here, after the slot is already free
        drop(slot);
        Ok(())
    }

    /// Active streams in slot order
    pub fn list_active(&self) -> Vec<(usize, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (i, s.remote.as_str())))
            .collect()
    }

    /// Candidates that are not already bridged, each with its index in
    /// `candidates`
    pub fn list_discoverable<'a>(
        &self,
        candidates: &'a [SourceInfo],
    ) -> Vec<(usize, &'a SourceInfo)> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, source)| !self.by_remote.contains_key(&source.name))
            .collect()
    }

    /// Active stream names in slot order
    pub fn persist(&self) -> Vec<String> {
        self.list_active()
            .into_iter()
            .map(|(_, remote)| remote.to_string())
            .collect()
    }

    /// Reconnect each name with the defaults, skipping any that fail.
    /// Returns how many were connected. A fatal error stops the restore and
    /// is returned.
    pub fn restore<I, S>(&mut self, remotes: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut restored = 0;
        for remote in remotes {
            let remote = remote.as_ref();
            match self.connect_default(remote) {
                Ok(_) => restored += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!("Skipping saved stream {:?}: {}", remote, e),
            }
        }
        Ok(restored)
    }

    /// Tear down every endpoint, in slot order
    pub fn shutdown_all(&mut self) {
        for index in 0..self.slots.len() {
            if self.slots[index].is_some() {
                let _ = self.disconnect(index);
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&F::Endpoint> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .map(|slot| &slot.endpoint)
    }

    /// Slot holding `remote`, if bridged
    pub fn slot_of(&self, remote: &str) -> Option<usize> {
        self.by_remote.get(remote).copied()
    }

    /// Active endpoints in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str, &F::Endpoint)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|s| (i, s.remote.as_str(), &s.endpoint))
        })
    }

    pub fn len(&self) -> usize {
        self.by_remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_remote.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn default_direction(&self) -> Direction {
        self.default_direction
    }
}

impl<F: EndpointFactory> Drop for StreamRegistry<F> {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
