//! Binding to the system ggwave library (C API).
//!
//! Enabled with the `ggwave-native` feature; `build.rs` locates the library
//! through pkg-config.

use std::ffi::{c_int, c_void};

use super::{Engine, NativeInstance};
use crate::params::{Parameters, SampleFormat};
use crate::protocol::ProtocolId;

// ======================== FFI declarations ========================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct GgwaveParameters {
    payload_length: c_int,
    sample_rate_inp: f32,
    sample_rate_out: f32,
    sample_rate: f32,
    samples_per_frame: c_int,
    sound_marker_threshold: f32,
    sample_format_inp: c_int,
    sample_format_out: c_int,
    operating_mode: c_int,
}

// ggwave_SampleFormat
const GGWAVE_SAMPLE_FORMAT_I16: c_int = 4;
const GGWAVE_SAMPLE_FORMAT_F32: c_int = 5;

/// ggwave_decode writes up to this many bytes without taking a size.
const GGWAVE_MAX_DATA_SIZE: usize = 256;

unsafe extern "C" {
    fn ggwave_getDefaultParameters() -> GgwaveParameters;
    fn ggwave_init(parameters: GgwaveParameters) -> c_int;
    fn ggwave_free(instance: c_int);
    fn ggwave_encode(
        instance: c_int,
        payload_buffer: *const c_void,
        payload_size: c_int,
        protocol_id: c_int,
        volume: c_int,
        waveform_buffer: *mut c_void,
        query: c_int,
    ) -> c_int;
    fn ggwave_decode(
        instance: c_int,
        waveform_buffer: *const c_void,
        waveform_size: c_int,
        payload_buffer: *mut c_void,
    ) -> c_int;
}

fn format_code(format: SampleFormat) -> c_int {
    match format {
        SampleFormat::I16 => GGWAVE_SAMPLE_FORMAT_I16,
        SampleFormat::F32 => GGWAVE_SAMPLE_FORMAT_F32,
    }
}

// ======================== Engine ========================

/// ggwave keeps its own instance table; this type only forwards calls.
#[derive(Debug, Default)]
pub struct NativeEngine {
    _private: (),
}

impl NativeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &'static str {
        "ggwave"
    }

    fn init(&mut self, params: &Parameters) -> NativeInstance {
        let (Ok(samples_per_frame), Ok(payload_length)) = (
            c_int::try_from(params.samples_per_frame),
            c_int::try_from(params.payload_length),
        ) else {
            return -1;
        };

        // Seed from the library defaults so fields this binding does not know stay valid.
        let mut native = unsafe { ggwave_getDefaultParameters() };
        native.payload_length = payload_length;
        native.sample_rate_inp = params.sample_rate_inp as f32;
        native.sample_rate_out = params.sample_rate_out as f32;
        native.samples_per_frame = samples_per_frame;
        native.sound_marker_threshold = params.sound_marker_threshold;
        native.sample_format_inp = format_code(params.sample_format_inp);
        native.sample_format_out = format_code(params.sample_format_out);

        unsafe { ggwave_init(native) }
    }

    fn encode(
        &mut self,
        instance: NativeInstance,
        payload: &[u8],
        protocol: ProtocolId,
        volume: i32,
        waveform: Option<&mut [u8]>,
    ) -> i32 {
        let Ok(payload_size) = c_int::try_from(payload.len()) else {
            return -1;
        };
        let (buffer, query) = match waveform {
            Some(out) => (out.as_mut_ptr() as *mut c_void, 0),
            None => (std::ptr::null_mut(), 1),
        };
        unsafe {
            ggwave_encode(
                instance,
                payload.as_ptr() as *const c_void,
                payload_size,
                protocol.id(),
                volume,
                buffer,
                query,
            )
        }
    }

    fn decode(&mut self, instance: NativeInstance, waveform: &[u8], payload: &mut [u8]) -> i32 {
        if payload.len() < GGWAVE_MAX_DATA_SIZE {
            log::error!(
                "ggwave decode needs a {} byte output buffer, got {}",
                GGWAVE_MAX_DATA_SIZE,
                payload.len()
            );
            return -1;
        }
        let Ok(waveform_size) = c_int::try_from(waveform.len()) else {
            return -1;
        };
        unsafe {
            ggwave_decode(
                instance,
                waveform.as_ptr() as *const c_void,
                waveform_size,
                payload.as_mut_ptr() as *mut c_void,
            )
        }
    }

    fn free(&mut self, instance: NativeInstance) {
        unsafe { ggwave_free(instance) }
    }
}
