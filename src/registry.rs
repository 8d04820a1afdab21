//! Instance registry: an arena of engine instances addressed by handles.
//!
//! A handle packs `slot + 1` in its low 32 bits and the slot generation in
//! the high 32 bits, so it is never 0 and a stale handle never matches an
//! instance created later in the same slot.

use std::fmt;

use crate::engine::{self, Engine, NativeInstance};
use crate::error::{BridgeError, Result};
use crate::params::Parameters;

/// Opaque, non-zero identifier of one live engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Reserved value that never names an instance.
    pub const SENTINEL: u64 = 0;

    fn new(slot: usize, generation: u32) -> Self {
        Handle(((generation as u64) << 32) | (slot as u64 + 1))
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != Self::SENTINEL && raw & 0xffff_ffff != 0).then_some(Handle(raw))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    fn slot(self) -> usize {
        ((self.0 & 0xffff_ffff) - 1) as usize
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstanceEntry {
    pub native: NativeInstance,
    pub params: Parameters,
}

struct Slot {
    generation: u32,
    entry: Option<InstanceEntry>,
}

pub struct InstanceRegistry<E: Engine> {
    engine: E,
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl<E: Engine> InstanceRegistry<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Create an engine instance and return its handle.
    pub fn create(&mut self, params: Parameters) -> Result<Handle> {
        if params.sample_rate_inp == 0
            || params.sample_rate_out == 0
            || params.samples_per_frame == 0
        {
            return Err(BridgeError::InvalidParameters {
                sample_rate: params.sample_rate_inp as i64,
                samples_per_frame: params.samples_per_frame as i64,
            });
        }

        let native = engine::guarded("init", || self.engine.init(&params))?;
        if native < 0 {
            log::error!(
                "{} rejected instance parameters (returned {}): rate={}, frame={}",
                self.engine.name(),
                native,
                params.sample_rate_inp,
                params.samples_per_frame
            );
            return Err(BridgeError::CreationFailed { code: native });
        }

        let entry = InstanceEntry { native, params };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].entry = Some(entry);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                self.slots.len() - 1
            }
        };
        let handle = Handle::new(slot, self.slots[slot].generation);

        log::info!(
            "Created {} instance {} (native {}) rate={} frame={} format={}",
            self.engine.name(),
            handle,
            native,
            params.sample_rate_out,
            params.samples_per_frame,
            params.sample_format_out
        );
        Ok(handle)
    }

    /// Release the instance behind `handle`. A second destroy is reported, not fatal.
    pub fn destroy(&mut self, handle: Handle) -> Result<()> {
        if !self.validate(handle) {
            log::warn!("Destroy requested for invalid or already destroyed handle {}", handle);
            return Err(BridgeError::InvalidHandle(handle.raw()));
        }

        let slot = handle.slot();
        let Some(entry) = self.slots[slot].entry.take() else {
            return Err(BridgeError::InvalidHandle(handle.raw()));
        };
        // A slot whose generation cannot advance is retired, never reused.
        match self.slots[slot].generation.checked_add(1) {
            Some(next) => {
                self.slots[slot].generation = next;
                self.free.push(slot);
            }
            None => log::warn!("Retiring slot {} after exhausting its generations", slot),
        }

        engine::guarded("free", || self.engine.free(entry.native))?;
        log::info!("Destroyed instance {} (native {})", handle, entry.native);
        Ok(())
    }

    pub fn validate(&self, handle: Handle) -> bool {
        self.lookup(handle).is_some()
    }

    /// Entry for a live handle; no engine call is made for an invalid one.
    pub fn entry(&self, handle: Handle) -> Result<InstanceEntry> {
        self.lookup(handle)
            .copied()
            .ok_or(BridgeError::InvalidHandle(handle.raw()))
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    fn lookup(&self, handle: Handle) -> Option<&InstanceEntry> {
        if handle.raw() == Handle::SENTINEL {
            return None;
        }
        let slot = self.slots.get(handle.slot())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entry.as_ref()
    }
}

impl<E: Engine> Drop for InstanceRegistry<E> {
    fn drop(&mut self) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                let handle = Handle::new(idx, slot.generation);
                log::warn!("Instance {} was never destroyed, releasing it", handle);
                let engine = &mut self.engine;
                if engine::guarded("free", || engine.free(entry.native)).is_err() {
                    log::error!("Failed to release leaked instance {}", handle);
                }
            }
        }
    }
}
