//! The acoustic-modem engine seam.
//!
//! An engine is an opaque capability with four operations (`init`, `encode`,
//! `decode`, `free`) that signal results with plain integers, the way a C
//! library would. The bridge is the only layer that interprets those signals.

use std::panic::{self, AssertUnwindSafe};

use crate::error::{BridgeError, Result};
use crate::params::Parameters;
use crate::protocol::ProtocolId;

pub mod builtin;
mod modem;
#[cfg(feature = "ggwave-native")]
pub mod native;

pub use builtin::BuiltinEngine;
#[cfg(feature = "ggwave-native")]
pub use native::NativeEngine;

/// Engine-side instance id. Negative values signal failure.
pub type NativeInstance = i32;

pub trait Engine: Send {
    fn name(&self) -> &'static str;

    /// Create an instance. Returns a negative value on failure.
    fn init(&mut self, params: &Parameters) -> NativeInstance;

    /// With `waveform == None` (query mode) returns the required output size
    /// in bytes. Otherwise fills `waveform` and returns the number of samples
    /// written. Values <= 0 signal failure.
    fn encode(
        &mut self,
        instance: NativeInstance,
        payload: &[u8],
        protocol: ProtocolId,
        volume: i32,
        waveform: Option<&mut [u8]>,
    ) -> i32;

    /// Feed captured sample bytes. Returns the payload length written to
    /// `payload` when a message is recognized, otherwise a value <= 0.
    fn decode(&mut self, instance: NativeInstance, waveform: &[u8], payload: &mut [u8]) -> i32;

    fn free(&mut self, instance: NativeInstance);
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn init(&mut self, params: &Parameters) -> NativeInstance {
        (**self).init(params)
    }

    fn encode(
        &mut self,
        instance: NativeInstance,
        payload: &[u8],
        protocol: ProtocolId,
        volume: i32,
        waveform: Option<&mut [u8]>,
    ) -> i32 {
        (**self).encode(instance, payload, protocol, volume, waveform)
    }

    fn decode(&mut self, instance: NativeInstance, waveform: &[u8], payload: &mut [u8]) -> i32 {
        (**self).decode(instance, waveform, payload)
    }

    fn free(&mut self, instance: NativeInstance) {
        (**self).free(instance)
    }
}

/// Run one engine call, turning a panic into [`BridgeError::NativePanic`].
pub(crate) fn guarded<R>(operation: &'static str, call: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|_| {
        log::error!("Engine panicked during {}", operation);
        BridgeError::NativePanic { operation }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_passes_values_through() {
        assert_eq!(guarded("init", || 7), Ok(7));
    }

    #[test]
    fn guarded_converts_panics() {
        let result: Result<i32> = guarded("decode", || panic!("engine exploded"));
        assert_eq!(result, Err(BridgeError::NativePanic { operation: "decode" }));
    }
}
