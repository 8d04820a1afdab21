//! C ABI over a process-wide [`Bridge`].
//!
//! Handles cross the boundary as `i64`, with 0 meaning "no instance".
//! Status returns are 0 on success or a negative [`BridgeError::code`].
//! Waveforms are returned in an [`AcbBuffer`] the caller must release with
//! [`acb_buffer_free`]. A decoded message that does not fit the caller's
//! output buffer stays queued for its handle until a later `acb_decode`.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::{LazyLock, Mutex, PoisonError};

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::marshal::Waveform;
use crate::params::SampleFormat;
use crate::registry::Handle;

pub const ACB_OK: i32 = 0;
pub const ACB_FORMAT_I16: i32 = 1;
pub const ACB_FORMAT_F32: i32 = 2;

#[derive(Default)]
struct Shared {
    bridge: Bridge,
    /// Decoded messages not yet copied out, keyed by raw handle
    undelivered: HashMap<u64, VecDeque<Vec<u8>>>,
}

static SHARED: LazyLock<Mutex<Shared>> = LazyLock::new(|| Mutex::new(Shared::default()));

/// Engine-owned waveform bytes handed to the caller.
#[repr(C)]
#[derive(Debug)]
pub struct AcbBuffer {
    pub data: *mut u8,
    /// Length of `data` in bytes
    pub len: usize,
    pub samples: usize,
    /// `ACB_FORMAT_I16` or `ACB_FORMAT_F32`
    pub format: i32,
}

impl AcbBuffer {
    pub const fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            samples: 0,
            format: 0,
        }
    }
}

fn format_code(format: SampleFormat) -> i32 {
    match format {
        SampleFormat::I16 => ACB_FORMAT_I16,
        SampleFormat::F32 => ACB_FORMAT_F32,
    }
}

/// Lock the shared state and run `f`, converting a panic into an error.
/// A poisoned lock is recovered; the registry stays consistent between calls.
fn with_shared<R>(operation: &'static str, f: impl FnOnce(&mut Shared) -> Result<R>) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        let mut shared = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut shared)
    }))
    .unwrap_or_else(|_| {
        log::error!("Panic while handling {} across the C boundary", operation);
        Err(BridgeError::NativePanic { operation })
    })
}

fn handle_from_raw(raw: i64) -> Result<Handle> {
    Handle::from_raw(raw as u64).ok_or(BridgeError::InvalidHandle(raw as u64))
}

/// # Safety
/// `data` must be null with `len == 0`, or valid for reads of `len` bytes.
unsafe fn input_slice<'a>(data: *const u8, len: usize) -> Result<&'a [u8]> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(BridgeError::marshal("null input buffer with non-zero length"));
    }
    Ok(unsafe { slice::from_raw_parts(data, len) })
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => ACB_OK,
        Err(e) => e.code(),
    }
}

/// Create an instance. Returns 0 on any failure.
#[unsafe(no_mangle)]
pub extern "C" fn acb_create_instance(sample_rate: i32, samples_per_frame: i32) -> i64 {
    match with_shared("create", |shared| {
        shared.bridge.create_instance(sample_rate, samples_per_frame)
    }) {
        Ok(handle) => handle.raw() as i64,
        Err(e) => {
            log::error!("acb_create_instance failed: {}", e);
            Handle::SENTINEL as i64
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn acb_destroy_instance(handle: i64) -> i32 {
    status(with_shared("destroy", |shared| {
        let handle = handle_from_raw(handle)?;
        shared.bridge.destroy_instance(handle)?;
        if let Some(dropped) = shared.undelivered.remove(&handle.raw()) {
            if !dropped.is_empty() {
                log::warn!("Dropping {} undelivered message(s) of {}", dropped.len(), handle);
            }
        }
        Ok(())
    }))
}

/// Encode `payload` and store the waveform in `*out`.
///
/// # Safety
/// `payload` must be valid for `payload_len` bytes. `out` must point to a
/// writable `AcbBuffer`, which is left untouched on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acb_encode(
    handle: i64,
    payload: *const u8,
    payload_len: usize,
    protocol_id: i32,
    volume: i32,
    out: *mut AcbBuffer,
) -> i32 {
    if out.is_null() {
        return BridgeError::marshal("null output buffer").code();
    }
    let result = with_shared("encode", |shared| {
        let payload = unsafe { input_slice(payload, payload_len)? };
        let waveform = shared.bridge.encode(handle_from_raw(handle)?, payload, protocol_id, volume)?;

        let samples = waveform.len();
        let format = format_code(waveform.format());
        let bytes = waveform.to_bytes().into_boxed_slice();
        let len = bytes.len();
        let data = Box::into_raw(bytes) as *mut u8;
        unsafe {
            *out = AcbBuffer {
                data,
                len,
                samples,
                format,
            };
        }
        Ok(())
    });
    status(result)
}

/// Release a buffer filled by [`acb_encode`]. Safe to call twice or on an empty buffer.
///
/// # Safety
/// `buffer` must be null or point to an `AcbBuffer` produced by `acb_encode`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acb_buffer_free(buffer: *mut AcbBuffer) {
    let Some(buffer) = (unsafe { buffer.as_mut() }) else {
        return;
    };
    if !buffer.data.is_null() {
        let raw = ptr::slice_from_raw_parts_mut(buffer.data, buffer.len);
        drop(unsafe { Box::from_raw(raw) });
    }
    *buffer = AcbBuffer::empty();
}

/// Feed captured sample bytes in the instance input format.
///
/// On recognition writes the message and a trailing NUL into `out` and
/// returns its length. Returns 0 when nothing was recognized, or a negative
/// error code.
///
/// # Safety
/// `samples` must be valid for `len` bytes and `out` for `cap` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn acb_decode(
    handle: i64,
    samples: *const u8,
    len: usize,
    out: *mut u8,
    cap: usize,
) -> i32 {
    let result = with_shared("decode", |shared| {
        let handle = handle_from_raw(handle)?;
        let bytes = unsafe { input_slice(samples, len)? };
        let format = shared.bridge.parameters(handle)?.sample_format_inp;
        let captured = Waveform::from_bytes(format, bytes)?;

        let fresh = shared.bridge.decode_bytes(handle, &captured)?;
        let queue = shared.undelivered.entry(handle.raw()).or_default();
        queue.extend(fresh);
        let Some(message) = queue.front() else {
            return Ok(0);
        };
        if out.is_null() || cap <= message.len() {
            log::warn!(
                "Holding {} byte message for {} until a larger output buffer is supplied",
                message.len(),
                handle
            );
            return Err(BridgeError::BufferTooSmall {
                needed: message.len() + 1,
                actual: if out.is_null() { 0 } else { cap },
            });
        }
        unsafe {
            ptr::copy_nonoverlapping(message.as_ptr(), out, message.len());
            *out.add(message.len()) = 0;
        }
        let delivered = message.len();
        queue.pop_front();
        Ok(delivered)
    });
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_return_the_sentinel() {
        assert_eq!(acb_create_instance(0, 1024), 0);
        assert_eq!(acb_create_instance(48000, -1), 0);
    }

    #[test]
    fn destroy_twice_reports_invalid_handle() {
        let handle = acb_create_instance(48000, 1024);
        assert_ne!(handle, 0);
        assert_eq!(acb_destroy_instance(handle), ACB_OK);
        assert_eq!(acb_destroy_instance(handle), -1);
        assert_eq!(acb_destroy_instance(0), -1);
    }

    #[test]
    fn encode_and_decode_through_the_c_abi() {
        let handle = acb_create_instance(48000, 1024);
        let payload = b"HELLO";
        let mut buffer = AcbBuffer::empty();
        let rc = unsafe { acb_encode(handle, payload.as_ptr(), payload.len(), 1, 10, &mut buffer) };
        assert_eq!(rc, ACB_OK);
        assert_eq!(buffer.format, ACB_FORMAT_I16);
        assert_eq!(buffer.len, buffer.samples * 2);

        let mut out = [0u8; 64];
        let n = unsafe { acb_decode(handle, buffer.data, buffer.len, out.as_mut_ptr(), out.len()) };
        assert_eq!(n, 5);
        assert_eq!(&out[..6], b"HELLO\0");

        unsafe {
            acb_buffer_free(&mut buffer);
            acb_buffer_free(&mut buffer);
        }
        assert!(buffer.data.is_null());
        assert_eq!(acb_destroy_instance(handle), ACB_OK);
    }

    #[test]
    fn failed_encode_leaves_the_buffer_empty() {
        let handle = acb_create_instance(48000, 1024);
        let mut buffer = AcbBuffer::empty();
        let rc = unsafe { acb_encode(handle, ptr::null(), 0, 99, 10, &mut buffer) };
        assert_eq!(rc, BridgeError::UnknownProtocol(99).code());
        assert!(buffer.data.is_null());
        assert_eq!(acb_destroy_instance(handle), ACB_OK);
    }

    #[test]
    fn decode_rejects_partial_samples_and_small_outputs() {
        let handle = acb_create_instance(48000, 1024);
        let odd = [0u8; 3];
        let rc = unsafe { acb_decode(handle, odd.as_ptr(), odd.len(), ptr::null_mut(), 0) };
        assert_eq!(rc, BridgeError::marshal("").code());

        let mut buffer = AcbBuffer::empty();
        unsafe { acb_encode(handle, b"abc".as_ptr(), 3, 2, 10, &mut buffer) };
        let mut out = [0u8; 3];
        let rc = unsafe { acb_decode(handle, buffer.data, buffer.len, out.as_mut_ptr(), out.len()) };
        assert_eq!(rc, -8);
        unsafe { acb_buffer_free(&mut buffer) };
        assert_eq!(acb_destroy_instance(handle), ACB_OK);
    }

    #[test]
    fn undersized_output_keeps_the_message_for_a_retry() {
        let handle = acb_create_instance(48000, 1024);
        let mut buffer = AcbBuffer::empty();
        let rc = unsafe { acb_encode(handle, b"HELLO".as_ptr(), 5, 1, 10, &mut buffer) };
        assert_eq!(rc, ACB_OK);

        let mut tiny = [0u8; 2];
        let rc = unsafe { acb_decode(handle, buffer.data, buffer.len, tiny.as_mut_ptr(), tiny.len()) };
        assert_eq!(rc, -8);
        assert_eq!(tiny, [0, 0]);

        let mut out = [0u8; 64];
        let rc = unsafe { acb_decode(handle, ptr::null(), 0, out.as_mut_ptr(), out.len()) };
        assert_eq!(rc, 5);
        assert_eq!(&out[..6], b"HELLO\0");

        let rc = unsafe { acb_decode(handle, ptr::null(), 0, out.as_mut_ptr(), out.len()) };
        assert_eq!(rc, 0);

        unsafe { acb_buffer_free(&mut buffer) };
        assert_eq!(acb_destroy_instance(handle), ACB_OK);
    }

    #[test]
    fn silence_decodes_to_zero() {
        let handle = acb_create_instance(48000, 1024);
        let silence = vec![0u8; 1024 * 2 * 8];
        let mut out = [0u8; 16];
        let rc = unsafe { acb_decode(handle, silence.as_ptr(), silence.len(), out.as_mut_ptr(), out.len()) };
        assert_eq!(rc, 0);
        assert_eq!(acb_destroy_instance(handle), ACB_OK);
    }
}
