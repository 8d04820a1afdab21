use serde::{Deserialize, Serialize};

use crate::params::SampleFormat;
use crate::protocol::ProtocolId;

/// Sample rate used when nothing else is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
/// Frame size used when nothing else is configured.
pub const DEFAULT_SAMPLES_PER_FRAME: u32 = 1024;
/// Engine-defined volume scale, passed through unchanged.
pub const DEFAULT_VOLUME: i32 = 10;
/// Largest payload the engine accepts in one transmission.
pub const MAX_PAYLOAD_LENGTH: usize = 140;
/// Size of the output text buffer handed to the engine's decode step.
pub const DECODE_BUFFER_LEN: usize = 256;
/// Payloads are shortened to this many characters in log lines.
pub const LOG_TRUNCATE_LENGTH: usize = 20;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 引擎参数
    pub sample_rate: u32,
    pub samples_per_frame: u32,
    pub sample_format: SampleFormat,
    pub sound_marker_threshold: f32,

    // 发送参数
    pub protocol: ProtocolId,
    pub volume: i32,
    pub max_payload_length: usize,

    pub decode_buffer_len: usize,
    pub log_truncate_length: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        let protocol_id: i32 = env!("TX_PROTOCOL_ID")
            .parse()
            .map_err(|_| "Failed to parse TX_PROTOCOL_ID")?;

        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            sample_rate: env!("ENGINE_SAMPLE_RATE")
                .parse()
                .map_err(|_| "Failed to parse ENGINE_SAMPLE_RATE")?,
            samples_per_frame: env!("ENGINE_SAMPLES_PER_FRAME")
                .parse()
                .map_err(|_| "Failed to parse ENGINE_SAMPLES_PER_FRAME")?,
            sample_format: env!("ENGINE_SAMPLE_FORMAT")
                .parse()
                .map_err(|_| "Failed to parse ENGINE_SAMPLE_FORMAT")?,
            sound_marker_threshold: env!("ENGINE_SOUND_MARKER_THRESHOLD")
                .parse()
                .map_err(|_| "Failed to parse ENGINE_SOUND_MARKER_THRESHOLD")?,

            protocol: ProtocolId::from_id(protocol_id)
                .map_err(|_| "TX_PROTOCOL_ID is not a known protocol")?,
            volume: env!("TX_VOLUME")
                .parse()
                .map_err(|_| "Failed to parse TX_VOLUME")?,
            max_payload_length: env!("TX_MAX_PAYLOAD_LENGTH")
                .parse()
                .map_err(|_| "Failed to parse TX_MAX_PAYLOAD_LENGTH")?,

            decode_buffer_len: env!("RX_DECODE_BUFFER_LEN")
                .parse()
                .map_err(|_| "Failed to parse RX_DECODE_BUFFER_LEN")?,
            log_truncate_length: env!("LOG_TRUNCATE_LENGTH")
                .parse()
                .map_err(|_| "Failed to parse LOG_TRUNCATE_LENGTH")?,
        })
    }

    /// Hard-coded values, used when the build-time config does not parse.
    pub fn builtin() -> Self {
        Self {
            app_name: "acoustic-bridge",
            app_version: env!("CARGO_PKG_VERSION"),
            sample_rate: DEFAULT_SAMPLE_RATE,
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            sample_format: SampleFormat::I16,
            sound_marker_threshold: 3.0,
            protocol: ProtocolId::AudibleFast,
            volume: DEFAULT_VOLUME,
            max_payload_length: MAX_PAYLOAD_LENGTH,
            decode_buffer_len: DECODE_BUFFER_LEN,
            log_truncate_length: LOG_TRUNCATE_LENGTH,
        }
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolId) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_volume(mut self, volume: i32) -> Self {
        self.volume = volume;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            log::warn!("Build-time config unusable ({}), using built-in defaults", e);
            Self::builtin()
        })
    }
}

/// Shorten a payload for log output.
pub fn truncate_for_log(data: &str, limit: usize) -> String {
    match data.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &data[..idx]),
        None => data.to_string(),
    }
}
