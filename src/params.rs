//! Parameter configurator.
//!
//! The engine accepts independent input/output rates and formats, but the
//! bridge only exposes one symmetric knob: the same sample rate and format
//! are applied to both directions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit signed integer samples
    I16,
    /// 32-bit IEEE float samples
    F32,
}

impl SampleFormat {
    /// Bytes per sample.
    pub fn width(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i16" | "s16" | "pcm16" => Ok(SampleFormat::I16),
            "f32" | "float" => Ok(SampleFormat::F32),
            other => Err(format!("unknown sample format '{}'", other)),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::I16 => f.write_str("i16"),
            SampleFormat::F32 => f.write_str("f32"),
        }
    }
}

/// Engine initialization parameters. Immutable once an instance is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    /// -1 selects variable-length payloads
    pub payload_length: i32,
    pub sample_rate_inp: u32,
    pub sample_rate_out: u32,
    pub samples_per_frame: u32,
    /// Minimum on/off energy ratio for a start/end marker bin pair
    pub sound_marker_threshold: f32,
    pub sample_format_inp: SampleFormat,
    pub sample_format_out: SampleFormat,
}

impl Parameters {
    /// Values the engine uses when nothing is overridden.
    pub fn engine_defaults() -> Self {
        Self {
            payload_length: -1,
            sample_rate_inp: crate::config::DEFAULT_SAMPLE_RATE,
            sample_rate_out: crate::config::DEFAULT_SAMPLE_RATE,
            samples_per_frame: crate::config::DEFAULT_SAMPLES_PER_FRAME,
            sound_marker_threshold: 3.0,
            sample_format_inp: SampleFormat::F32,
            sample_format_out: SampleFormat::F32,
        }
    }

    /// Build parameters with the bridge's default sample format (i16).
    pub fn build(sample_rate: i32, samples_per_frame: i32) -> Result<Self> {
        Self::build_with_format(sample_rate, samples_per_frame, SampleFormat::I16)
    }

    /// Seed from engine defaults, then apply the symmetric overrides.
    pub fn build_with_format(
        sample_rate: i32,
        samples_per_frame: i32,
        format: SampleFormat,
    ) -> Result<Self> {
        if sample_rate <= 0 || samples_per_frame <= 0 {
            return Err(BridgeError::InvalidParameters {
                sample_rate: sample_rate as i64,
                samples_per_frame: samples_per_frame as i64,
            });
        }

        let mut params = Self::engine_defaults();
        params.sample_rate_inp = sample_rate as u32;
        params.sample_rate_out = sample_rate as u32;
        params.samples_per_frame = samples_per_frame as u32;
        params.sample_format_inp = format;
        params.sample_format_out = format;
        Ok(params)
    }

    pub fn with_sound_marker_threshold(mut self, threshold: f32) -> Self {
        self.sound_marker_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_applies_rate_symmetrically() {
        let params = Parameters::build(44100, 512).unwrap();
        assert_eq!(params.sample_rate_inp, 44100);
        assert_eq!(params.sample_rate_out, 44100);
        assert_eq!(params.samples_per_frame, 512);
        assert_eq!(params.sample_format_inp, SampleFormat::I16);
        assert_eq!(params.sample_format_out, SampleFormat::I16);
        assert_eq!(params.payload_length, -1);
    }

    #[test]
    fn build_with_format_sets_both_directions() {
        let params = Parameters::build_with_format(48000, 1024, SampleFormat::F32).unwrap();
        assert_eq!(params.sample_format_inp, SampleFormat::F32);
        assert_eq!(params.sample_format_out, SampleFormat::F32);
    }

    #[test]
    fn non_positive_values_are_rejected() {
        for (rate, frame) in [(0, 1024), (-8000, 1024), (48000, 0), (48000, -1)] {
            assert!(matches!(
                Parameters::build(rate, frame),
                Err(BridgeError::InvalidParameters { .. })
            ));
        }
    }

    #[test]
    fn sample_format_parses_and_reports_width() {
        assert_eq!("i16".parse::<SampleFormat>(), Ok(SampleFormat::I16));
        assert_eq!(" F32 ".parse::<SampleFormat>(), Ok(SampleFormat::F32));
        assert!("u8".parse::<SampleFormat>().is_err());
        assert_eq!(SampleFormat::I16.width(), 2);
        assert_eq!(SampleFormat::F32.width(), 4);
    }
}
