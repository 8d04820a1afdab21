//! Pure-Rust engine backed by the multi-tone FSK modem.
//!
//! Keeps its own instance table keyed by small integer ids, so the bridge
//! sees the same opaque-id contract a C engine would offer.

use super::modem::Modem;
use super::{Engine, NativeInstance};
use crate::marshal::Waveform;
use crate::params::{Parameters, SampleFormat};
use crate::protocol::ProtocolId;

struct Slot {
    modem: Modem,
    format_inp: SampleFormat,
    format_out: SampleFormat,
}

#[derive(Default)]
pub struct BuiltinEngine {
    instances: Vec<Option<Slot>>,
}

impl BuiltinEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances created and not yet freed.
    pub fn live_instances(&self) -> usize {
        self.instances.iter().filter(|s| s.is_some()).count()
    }

    fn slot_mut(&mut self, instance: NativeInstance) -> Option<&mut Slot> {
        usize::try_from(instance)
            .ok()
            .and_then(|idx| self.instances.get_mut(idx))
            .and_then(Option::as_mut)
    }
}

impl Engine for BuiltinEngine {
    fn name(&self) -> &'static str {
        "builtin-fsk"
    }

    fn init(&mut self, params: &Parameters) -> NativeInstance {
        if params.sample_rate_inp == 0 || params.sample_rate_out == 0 {
            return -1;
        }
        let Some(modem) = Modem::new(params) else {
            return -1;
        };
        let slot = Slot {
            modem,
            format_inp: params.sample_format_inp,
            format_out: params.sample_format_out,
        };

        let idx = match self.instances.iter().position(Option::is_none) {
            Some(idx) => {
                self.instances[idx] = Some(slot);
                idx
            }
            None => {
                self.instances.push(Some(slot));
                self.instances.len() - 1
            }
        };
        NativeInstance::try_from(idx).unwrap_or(-1)
    }

    fn encode(
        &mut self,
        instance: NativeInstance,
        payload: &[u8],
        protocol: ProtocolId,
        volume: i32,
        waveform: Option<&mut [u8]>,
    ) -> i32 {
        let Some(slot) = self.slot_mut(instance) else {
            return -1;
        };
        if !(0..=100).contains(&volume) {
            return -1;
        }
        let width = slot.format_out.width();
        let Some(samples) = slot.modem.waveform_samples(payload.len(), protocol) else {
            return -1;
        };
        let bytes = samples * width;

        let Some(out) = waveform else {
            return i32::try_from(bytes).unwrap_or(-1);
        };
        if out.len() < bytes {
            return -1;
        }
        let Some(unit) = slot.modem.encode(payload, protocol, volume) else {
            return -1;
        };

        let encoded = Waveform::from_unit(slot.format_out, &unit).to_bytes();
        out[..encoded.len()].copy_from_slice(&encoded);
        i32::try_from(unit.len()).unwrap_or(-1)
    }

    fn decode(&mut self, instance: NativeInstance, waveform: &[u8], payload: &mut [u8]) -> i32 {
        let Some(slot) = self.slot_mut(instance) else {
            return -1;
        };
        let Ok(captured) = Waveform::from_bytes(slot.format_inp, waveform) else {
            return -1;
        };

        match slot.modem.decode(&captured.to_unit()) {
            Some(message) if message.len() <= payload.len() => {
                payload[..message.len()].copy_from_slice(&message);
                i32::try_from(message.len()).unwrap_or(-1)
            }
            Some(_) => -1,
            None => 0,
        }
    }

    fn free(&mut self, instance: NativeInstance) {
        if let Some(entry) = usize::try_from(instance)
            .ok()
            .and_then(|idx| self.instances.get_mut(idx))
        {
            *entry = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_reused_after_free() {
        let mut engine = BuiltinEngine::new();
        let params = Parameters::build(48000, 1024).unwrap();
        let a = engine.init(&params);
        let b = engine.init(&params);
        assert_eq!((a, b), (0, 1));
        engine.free(a);
        assert_eq!(engine.live_instances(), 1);
        assert_eq!(engine.init(&params), 0);
    }

    #[test]
    fn init_rejects_frames_too_small_for_markers() {
        let mut engine = BuiltinEngine::new();
        assert!(engine.init(&Parameters::build(48000, 32).unwrap()) < 0);
    }

    #[test]
    fn query_reports_bytes_and_fill_reports_samples() {
        let mut engine = BuiltinEngine::new();
        let params = Parameters::build_with_format(48000, 1024, SampleFormat::F32).unwrap();
        let id = engine.init(&params);

        let bytes = engine.encode(id, b"HELLO", ProtocolId::AudibleFast, 10, None);
        assert!(bytes > 0);
        let mut out = vec![0u8; bytes as usize];
        let samples = engine.encode(id, b"HELLO", ProtocolId::AudibleFast, 10, Some(&mut out));
        assert_eq!(samples * 4, bytes);
    }

    #[test]
    fn out_of_range_volume_fails_the_query() {
        let mut engine = BuiltinEngine::new();
        let id = engine.init(&Parameters::build(48000, 1024).unwrap());
        assert_eq!(engine.encode(id, b"x", ProtocolId::AudibleFast, 101, None), -1);
        assert_eq!(engine.encode(id, b"x", ProtocolId::AudibleFast, -1, None), -1);
    }

    #[test]
    fn unknown_instance_fails() {
        let mut engine = BuiltinEngine::new();
        assert_eq!(engine.encode(3, b"x", ProtocolId::AudibleFast, 10, None), -1);
        assert_eq!(engine.decode(-1, &[0, 0], &mut [0u8; 8]), -1);
    }

    #[test]
    fn odd_byte_counts_are_rejected_for_i16() {
        let mut engine = BuiltinEngine::new();
        let id = engine.init(&Parameters::build(48000, 1024).unwrap());
        assert_eq!(engine.decode(id, &[0, 0, 0], &mut [0u8; 8]), -1);
    }
}
