//! Encode/decode bridge between a host application and an acoustic modem engine.
//!
//! ```no_run
//! use acoustic_bridge::Bridge;
//!
//! let mut bridge = Bridge::new();
//! let handle = bridge.create_instance(48000, 1024)?;
//! let waveform = bridge.encode(handle, b"HELLO", 1, 10)?;
//! assert_eq!(bridge.decode(handle, &waveform)?, Some("HELLO".to_string()));
//! bridge.destroy_instance(handle)?;
//! # Ok::<(), acoustic_bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod config;
mod decode;
mod encode;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod marshal;
pub mod params;
pub mod protocol;
pub mod registry;

pub use bridge::Bridge;
pub use config::Config;
pub use engine::{BuiltinEngine, Engine, NativeInstance};
#[cfg(feature = "ggwave-native")]
pub use engine::NativeEngine;
pub use error::{BridgeError, Result};
pub use marshal::{ReleaseMode, Sample, ViewLedger, Waveform};
pub use params::{Parameters, SampleFormat};
pub use protocol::ProtocolId;
pub use registry::Handle;
