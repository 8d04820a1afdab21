//! Encode pipeline.
//!
//! The engine cannot report an output size without running most of the
//! encode, so every request is two engine calls: a query for the size in
//! bytes, then a fill into a buffer of exactly that size. The fill must
//! produce exactly the queried number of bytes.

use crate::bridge::Bridge;
use crate::config::truncate_for_log;
use crate::engine::{self, Engine, NativeInstance};
use crate::error::{BridgeError, Result};
use crate::marshal::{ReadView, ReleaseMode, Sample, Waveform, WriteView};
use crate::params::SampleFormat;
use crate::protocol::ProtocolId;
use crate::registry::{Handle, InstanceRegistry};

impl<E: Engine> Bridge<E> {
    /// Encode `payload` into a waveform in the instance's output format.
    pub fn encode(
        &mut self,
        handle: Handle,
        payload: &[u8],
        protocol_id: i32,
        volume: i32,
    ) -> Result<Waveform> {
        let entry = self.registry.entry(handle)?;
        let protocol = ProtocolId::from_id(protocol_id)?;
        let format = entry.params.sample_format_out;

        let payload_view = ReadView::acquire_bytes(&self.ledger, payload);
        let expected_bytes = query_size(
            &mut self.registry,
            entry.native,
            payload_view.bytes(),
            protocol,
            volume,
        )?;

        let mut native_buf = vec![0u8; expected_bytes];
        let registry = &mut self.registry;
        let actual_samples = engine::guarded("encode", || {
            registry.engine_mut().encode(
                entry.native,
                payload_view.bytes(),
                protocol,
                volume,
                Some(&mut native_buf),
            )
        })?;
        check_fill(expected_bytes, actual_samples, format)?;

        let waveform = Waveform::from_bytes(format, &native_buf)?;
        payload_view.release();

        log::info!(
            "Encoded '{}' ({} bytes) with {} into {} samples",
            truncate_for_log(&String::from_utf8_lossy(payload), self.config.log_truncate_length),
            payload.len(),
            protocol.display_name(),
            waveform.len()
        );
        Ok(waveform)
    }

    /// Encode with the configured default protocol and volume.
    pub fn encode_default(&mut self, handle: Handle, payload: &[u8]) -> Result<Waveform> {
        let protocol = self.config.protocol.id();
        let volume = self.config.volume;
        self.encode(handle, payload, protocol, volume)
    }

    /// Encode into a caller-owned buffer and return the number of samples written.
    ///
    /// `out` is only committed on success; on any failure its view is discarded.
    pub fn encode_into<T: Sample>(
        &mut self,
        handle: Handle,
        payload: &[u8],
        protocol_id: i32,
        volume: i32,
        out: &mut [T],
    ) -> Result<usize> {
        let entry = self.registry.entry(handle)?;
        let protocol = ProtocolId::from_id(protocol_id)?;
        let format = entry.params.sample_format_out;

        let payload_view = ReadView::acquire_bytes(&self.ledger, payload);
        let mut out_view = WriteView::acquire(&self.ledger, out);
        if T::FORMAT != format {
            return Err(BridgeError::FormatMismatch {
                expected: format,
                actual: T::FORMAT,
            });
        }

        let expected_bytes = query_size(
            &mut self.registry,
            entry.native,
            payload_view.bytes(),
            protocol,
            volume,
        )?;
        let needed = expected_bytes / format.width();
        if out_view.len_samples() < needed {
            return Err(BridgeError::BufferTooSmall {
                needed,
                actual: out_view.len_samples(),
            });
        }

        let registry = &mut self.registry;
        let actual_samples = engine::guarded("encode", || {
            registry.engine_mut().encode(
                entry.native,
                payload_view.bytes(),
                protocol,
                volume,
                Some(&mut out_view.bytes_mut()[..expected_bytes]),
            )
        })?;
        check_fill(expected_bytes, actual_samples, format)?;

        out_view.release(ReleaseMode::Commit);
        payload_view.release();
        log::debug!("Encoded {} samples into caller buffer", needed);
        Ok(needed)
    }
}

/// Query phase: size in bytes, or `EncodeSize` when the engine refuses.
fn query_size<E: Engine>(
    registry: &mut InstanceRegistry<E>,
    native: NativeInstance,
    payload: &[u8],
    protocol: ProtocolId,
    volume: i32,
) -> Result<usize> {
    let size = engine::guarded("encode", || {
        registry
            .engine_mut()
            .encode(native, payload, protocol, volume, None)
    })?;
    if size <= 0 {
        log::error!(
            "Engine refused to encode {} bytes with {} (size {})",
            payload.len(),
            protocol.display_name(),
            size
        );
        return Err(BridgeError::EncodeSize { size });
    }
    Ok(size as usize)
}

/// Fill phase must produce exactly the queried number of bytes.
fn check_fill(expected_bytes: usize, actual_samples: i32, format: SampleFormat) -> Result<()> {
    let width = format.width();
    let consistent = usize::try_from(actual_samples)
        .map(|samples| samples * width == expected_bytes)
        .unwrap_or(false);
    if !consistent {
        log::error!(
            "Encoding size mismatch: expected {} samples ({} bytes), got {} samples",
            expected_bytes / width,
            expected_bytes,
            actual_samples
        );
        return Err(BridgeError::EncodeConsistency {
            expected_bytes,
            actual_samples,
            width,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_fill_accepts_exact_sizes() {
        assert!(check_fill(2048, 1024, SampleFormat::I16).is_ok());
        assert!(check_fill(4096, 1024, SampleFormat::F32).is_ok());
    }

    #[test]
    fn check_fill_rejects_mismatch_and_negative_counts() {
        assert!(matches!(
            check_fill(2048, 1023, SampleFormat::I16),
            Err(BridgeError::EncodeConsistency { .. })
        ));
        assert!(matches!(
            check_fill(2048, -1, SampleFormat::I16),
            Err(BridgeError::EncodeConsistency { .. })
        ));
    }

    #[test]
    fn encode_produces_samples_in_instance_format() {
        let mut bridge = Bridge::new();
        let i16_handle = bridge.create_instance(48000, 1024).unwrap();
        let f32_handle = bridge
            .create_instance_with_format(48000, 1024, SampleFormat::F32)
            .unwrap();

        let a = bridge.encode(i16_handle, b"HELLO", 1, 10).unwrap();
        let b = bridge.encode(f32_handle, b"HELLO", 1, 10).unwrap();
        assert_eq!(a.format(), SampleFormat::I16);
        assert_eq!(b.format(), SampleFormat::F32);
        assert_eq!(a.len(), b.len());
        assert_eq!(bridge.outstanding_views(), 0);
    }

    #[test]
    fn unknown_protocol_fails_before_the_engine() {
        let mut bridge = Bridge::new();
        let handle = bridge.create_instance(48000, 1024).unwrap();
        let payloads: [&[u8]; 3] = [b"", b"x", b"HELLO"];
        for payload in payloads {
            assert_eq!(
                bridge.encode(handle, payload, 99, 10),
                Err(BridgeError::UnknownProtocol(99))
            );
        }
        assert_eq!(bridge.outstanding_views(), 0);
    }

    #[test]
    fn oversized_payload_is_a_size_failure() {
        let mut bridge = Bridge::new();
        let handle = bridge.create_instance(48000, 1024).unwrap();
        let payload = vec![b'a'; 141];
        assert!(matches!(
            bridge.encode(handle, &payload, 1, 10),
            Err(BridgeError::EncodeSize { .. })
        ));
        assert_eq!(bridge.outstanding_views(), 0);
    }

    #[test]
    fn encode_into_commits_on_success() {
        let mut bridge = Bridge::new();
        let handle = bridge.create_instance(48000, 1024).unwrap();
        let expected = bridge.encode(handle, b"hi", 2, 10).unwrap();

        let mut out = vec![0i16; expected.len() + 100];
        let written = bridge.encode_into(handle, b"hi", 2, 10, &mut out).unwrap();
        assert_eq!(written, expected.len());
        assert_eq!(Some(&out[..written]), expected.as_i16());
        assert_eq!(bridge.ledger().commits(), 1);
        assert_eq!(bridge.outstanding_views(), 0);
    }

    #[test]
    fn encode_into_discards_on_failure() {
        let mut bridge = Bridge::new();
        let handle = bridge.create_instance(48000, 1024).unwrap();

        let mut small = vec![0i16; 16];
        assert!(matches!(
            bridge.encode_into(handle, b"hi", 2, 10, &mut small),
            Err(BridgeError::BufferTooSmall { .. })
        ));
        assert!(small.iter().all(|&s| s == 0));

        let mut wrong = vec![0.0f32; 1 << 16];
        assert!(matches!(
            bridge.encode_into(handle, b"hi", 2, 10, &mut wrong),
            Err(BridgeError::FormatMismatch { .. })
        ));

        assert_eq!(bridge.ledger().commits(), 0);
        assert_eq!(bridge.outstanding_views(), 0);
    }
}
