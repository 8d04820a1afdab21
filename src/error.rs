//! Error taxonomy for bridge operations.
//!
//! A decode that finds no message is not an error; it is reported as
//! `Ok(None)` by the decode pipeline.

use thiserror::Error;

use crate::params::SampleFormat;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Sentinel, unknown, or already destroyed handle
    #[error("Invalid instance handle: {0:#x}")]
    InvalidHandle(u64),

    #[error("Invalid parameters: sample_rate={sample_rate}, samples_per_frame={samples_per_frame}")]
    InvalidParameters {
        sample_rate: i64,
        samples_per_frame: i64,
    },

    /// Engine refused to create an instance
    #[error("Engine instance creation failed (engine returned {code})")]
    CreationFailed { code: i32 },

    #[error("Unknown protocol id: {0}")]
    UnknownProtocol(i32),

    /// Query phase reported a non-positive waveform size
    #[error("Encode failed: engine reported waveform size {size}")]
    EncodeSize { size: i32 },

    /// Fill phase disagrees with the size reported by the query phase
    #[error(
        "Encode size mismatch: queried {expected_bytes} bytes, engine produced {actual_samples} samples of {width} bytes"
    )]
    EncodeConsistency {
        expected_bytes: usize,
        actual_samples: i32,
        width: usize,
    },

    #[error("Sample format mismatch: instance uses {expected:?}, buffer is {actual:?}")]
    FormatMismatch {
        expected: SampleFormat,
        actual: SampleFormat,
    },

    #[error("Buffer too small: need {needed} samples, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Buffer marshaling failed: {0}")]
    Marshal(String),

    /// The engine panicked inside `operation`
    #[error("Engine panicked during {operation}")]
    NativePanic { operation: &'static str },
}

impl BridgeError {
    /// Stable negative status code used by the C ABI.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidHandle(_) => -1,
            Self::InvalidParameters { .. } => -2,
            Self::CreationFailed { .. } => -3,
            Self::UnknownProtocol(_) => -4,
            Self::EncodeSize { .. } => -5,
            Self::EncodeConsistency { .. } => -6,
            Self::FormatMismatch { .. } => -7,
            Self::BufferTooSmall { .. } => -8,
            Self::Marshal(_) => -9,
            Self::NativePanic { .. } => -10,
        }
    }

    pub fn marshal(details: impl Into<String>) -> Self {
        Self::Marshal(details.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_and_distinct() {
        let errors = [
            BridgeError::InvalidHandle(0),
            BridgeError::InvalidParameters {
                sample_rate: 0,
                samples_per_frame: 0,
            },
            BridgeError::CreationFailed { code: -1 },
            BridgeError::UnknownProtocol(99),
            BridgeError::EncodeSize { size: -1 },
            BridgeError::EncodeConsistency {
                expected_bytes: 4,
                actual_samples: 1,
                width: 2,
            },
            BridgeError::FormatMismatch {
                expected: SampleFormat::I16,
                actual: SampleFormat::F32,
            },
            BridgeError::BufferTooSmall {
                needed: 2,
                actual: 1,
            },
            BridgeError::marshal("odd length"),
            BridgeError::NativePanic { operation: "encode" },
        ];
        let mut codes: Vec<i32> = errors.iter().map(BridgeError::code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            BridgeError::UnknownProtocol(99).to_string(),
            "Unknown protocol id: 99"
        );
        assert!(BridgeError::InvalidHandle(0x10001).to_string().contains("0x10001"));
    }
}
