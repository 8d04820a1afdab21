//! Shared fixtures for integration tests.

#![allow(dead_code)]

use acoustic_bridge::{Engine, NativeInstance, Parameters, ProtocolId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Engine whose integer signals are set by the test.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    /// Byte count returned in query mode
    pub query_bytes: i32,
    /// Sample count returned in fill mode
    pub fill_samples: i32,
    /// Value returned by `init`
    pub init_result: NativeInstance,
    pub decode_message: Option<Vec<u8>>,
    /// Overrides the length `decode` reports, regardless of what it wrote
    pub decode_claim: Option<i32>,
    pub panic_in: Option<&'static str>,
    pub encode_calls: usize,
    pub decode_calls: usize,
    pub freed: Vec<NativeInstance>,
}

impl ScriptedEngine {
    pub fn consistent(samples: i32, width: i32) -> Self {
        Self {
            query_bytes: samples * width,
            fill_samples: samples,
            ..Self::default()
        }
    }

    fn maybe_panic(&self, operation: &str) {
        if self.panic_in == Some(operation) {
            panic!("scripted panic in {}", operation);
        }
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn init(&mut self, _params: &Parameters) -> NativeInstance {
        self.maybe_panic("init");
        self.init_result
    }

    fn encode(
        &mut self,
        _instance: NativeInstance,
        _payload: &[u8],
        _protocol: ProtocolId,
        _volume: i32,
        waveform: Option<&mut [u8]>,
    ) -> i32 {
        self.encode_calls += 1;
        self.maybe_panic("encode");
        match waveform {
            None => self.query_bytes,
            Some(out) => {
                out.fill(0x11);
                self.fill_samples
            }
        }
    }

    fn decode(&mut self, _instance: NativeInstance, _waveform: &[u8], payload: &mut [u8]) -> i32 {
        self.decode_calls += 1;
        self.maybe_panic("decode");
        match &self.decode_message {
            Some(message) => {
                payload[..message.len()].copy_from_slice(message);
                self.decode_claim.unwrap_or(message.len() as i32)
            }
            None => self.decode_claim.unwrap_or(0),
        }
    }

    fn free(&mut self, instance: NativeInstance) {
        self.freed.push(instance);
    }
}

/// Deterministic white noise in [-amplitude, amplitude].
pub fn noise(seed: u64, len: usize, amplitude: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-amplitude..=amplitude)).collect()
}
