//! Decode pipeline.
//!
//! Each call hands one captured buffer to the engine. Not recognizing a
//! message yet is the normal outcome and is reported as `Ok(None)`.

use crate::bridge::Bridge;
use crate::config::truncate_for_log;
use crate::engine::{self, Engine};
use crate::error::{BridgeError, Result};
use crate::marshal::{ReadView, Sample, Waveform};
use crate::params::SampleFormat;
use crate::registry::Handle;

impl<E: Engine> Bridge<E> {
    /// Feed captured audio and return a recognized message as text.
    pub fn decode(&mut self, handle: Handle, captured: &Waveform) -> Result<Option<String>> {
        Ok(self.decode_bytes(handle, captured)?.map(|bytes| {
            let text = String::from_utf8_lossy(&bytes);
            text.trim_end_matches('\0').to_string()
        }))
    }

    pub fn decode_bytes(&mut self, handle: Handle, captured: &Waveform) -> Result<Option<Vec<u8>>> {
        match captured {
            Waveform::I16(samples) => self.decode_samples(handle, samples),
            Waveform::F32(samples) => self.decode_samples(handle, samples),
        }
    }

    /// Feed captured samples of type `T`, which must match the instance input format.
    pub fn decode_samples<T: Sample>(
        &mut self,
        handle: Handle,
        captured: &[T],
    ) -> Result<Option<Vec<u8>>> {
        let entry = self.registry.entry(handle)?;
        let format = entry.params.sample_format_inp;
        check_format(format, T::FORMAT)?;

        let view = ReadView::acquire(&self.ledger, captured);
        let mut out = vec![0u8; self.config.decode_buffer_len];
        let registry = &mut self.registry;
        let n = engine::guarded("decode", || {
            registry
                .engine_mut()
                .decode(entry.native, view.bytes(), &mut out)
        })?;
        view.release();

        if n <= 0 {
            return Ok(None);
        }
        let len = n as usize;
        if len > out.len() {
            log::error!(
                "Engine reported {} decoded bytes but the buffer holds {}",
                len,
                out.len()
            );
            return Err(BridgeError::marshal(format!(
                "engine reported {} decoded bytes for a {} byte buffer",
                len,
                out.len()
            )));
        }
        out.truncate(len);
        log::info!(
            "Decoded {} bytes on {}: '{}'",
            len,
            handle,
            truncate_for_log(&String::from_utf8_lossy(&out), self.config.log_truncate_length)
        );
        Ok(Some(out))
    }
}

fn check_format(expected: SampleFormat, actual: SampleFormat) -> Result<()> {
    if expected != actual {
        log::error!(
            "Captured samples are {} but the instance expects {}",
            actual,
            expected
        );
        return Err(BridgeError::FormatMismatch { expected, actual });
    }
    Ok(())
}
