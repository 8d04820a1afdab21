//! Protocol selector: maps integer protocol ids to modulation schemes.
//!
//! Frequencies are expressed in spectral bins. At the reference
//! configuration (48 kHz, 1024 samples per frame) one bin is 46.875 Hz.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Width of one spectral bin at the reference configuration.
pub const REFERENCE_HZ_PER_BIN: f32 = 48000.0 / 1024.0;

/// Each tone carries one nibble, so it spans 16 bins.
pub const BINS_PER_TONE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum ProtocolId {
    AudibleNormal = 0,
    AudibleFast = 1,
    AudibleFastest = 2,
    UltrasoundNormal = 3,
    UltrasoundFast = 4,
    UltrasoundFastest = 5,
    DualToneNormal = 6,
    DualToneFast = 7,
    DualToneFastest = 8,
}

impl ProtocolId {
    pub const ALL: [ProtocolId; 9] = [
        ProtocolId::AudibleNormal,
        ProtocolId::AudibleFast,
        ProtocolId::AudibleFastest,
        ProtocolId::UltrasoundNormal,
        ProtocolId::UltrasoundFast,
        ProtocolId::UltrasoundFastest,
        ProtocolId::DualToneNormal,
        ProtocolId::DualToneFast,
        ProtocolId::DualToneFastest,
    ];

    /// Resolve a caller-supplied id. Unknown ids never fall back to a default.
    pub fn from_id(id: i32) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.id() == id)
            .ok_or(BridgeError::UnknownProtocol(id))
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Pick a protocol from the audible/ultrasound and normal/fast switches.
    pub fn select(ultrasound: bool, fast: bool) -> Self {
        match (ultrasound, fast) {
            (false, false) => ProtocolId::AudibleNormal,
            (false, true) => ProtocolId::AudibleFast,
            (true, false) => ProtocolId::UltrasoundNormal,
            (true, true) => ProtocolId::UltrasoundFast,
        }
    }

    /// First spectral bin used by this protocol.
    pub fn freq_start(self) -> usize {
        match self {
            Self::AudibleNormal | Self::AudibleFast | Self::AudibleFastest => 40,
            Self::UltrasoundNormal | Self::UltrasoundFast | Self::UltrasoundFastest => 320,
            Self::DualToneNormal | Self::DualToneFast | Self::DualToneFastest => 24,
        }
    }

    /// Payload bytes carried by one transmission step.
    pub fn bytes_per_tx(self) -> usize {
        match self {
            Self::DualToneNormal | Self::DualToneFast | Self::DualToneFastest => 1,
            _ => 3,
        }
    }

    /// Frames one transmission step is held for. More frames, more robust.
    pub fn frames_per_tx(self) -> usize {
        match self {
            Self::AudibleNormal | Self::UltrasoundNormal | Self::DualToneNormal => 9,
            Self::AudibleFast | Self::UltrasoundFast | Self::DualToneFast => 6,
            Self::AudibleFastest | Self::UltrasoundFastest | Self::DualToneFastest => 3,
        }
    }

    /// Simultaneous tones per frame; one per nibble.
    pub fn tone_count(self) -> usize {
        self.bytes_per_tx() * 2
    }

    /// One past the highest bin this protocol can light.
    pub fn bin_end(self) -> usize {
        self.freq_start() + self.tone_count() * BINS_PER_TONE
    }

    pub fn is_ultrasound(self) -> bool {
        matches!(
            self,
            Self::UltrasoundNormal | Self::UltrasoundFast | Self::UltrasoundFastest
        )
    }

    pub fn base_frequency_hz(self) -> f32 {
        self.freq_start() as f32 * REFERENCE_HZ_PER_BIN
    }

    pub fn max_frequency_hz(self) -> f32 {
        self.bin_end() as f32 * REFERENCE_HZ_PER_BIN
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::AudibleNormal => "Audible Normal",
            Self::AudibleFast => "Audible Fast",
            Self::AudibleFastest => "Audible Fastest",
            Self::UltrasoundNormal => "Ultrasound Normal",
            Self::UltrasoundFast => "Ultrasound Fast",
            Self::UltrasoundFastest => "Ultrasound Fastest",
            Self::DualToneNormal => "Dual-Tone Normal",
            Self::DualToneFast => "Dual-Tone Fast",
            Self::DualToneFastest => "Dual-Tone Fastest",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::AudibleNormal => "Audible range, balanced speed and reliability",
            Self::AudibleFast => "Audible range, faster with moderate reliability",
            Self::AudibleFastest => "Audible range, fastest with lower reliability",
            Self::UltrasoundNormal => "Near-ultrasound, inaudible with good reliability",
            Self::UltrasoundFast => "Near-ultrasound, faster with moderate reliability",
            Self::UltrasoundFastest => "Near-ultrasound, fastest; suited to short discrete exchanges",
            Self::DualToneNormal => "Low-frequency dual tone for small or low-quality speakers",
            Self::DualToneFast => "Low-frequency dual tone, faster",
            Self::DualToneFastest => "Low-frequency dual tone, fastest",
        }
    }

    /// Protocols sharing a start bin share start/end markers.
    pub fn family(freq_start: usize) -> impl Iterator<Item = ProtocolId> {
        Self::ALL
            .into_iter()
            .filter(move |p| p.freq_start() == freq_start)
    }
}

impl TryFrom<i32> for ProtocolId {
    type Error = BridgeError;

    fn try_from(id: i32) -> Result<Self> {
        Self::from_id(id)
    }
}

impl From<ProtocolId> for i32 {
    fn from(protocol: ProtocolId) -> Self {
        protocol.id()
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.0}-{:.0} Hz, {} tones, {})",
            self.display_name(),
            self.base_frequency_hz(),
            self.max_frequency_hz(),
            self.tone_count(),
            if self.is_ultrasound() { "ultrasound" } else { "audible" }
        )
    }
}
