//! Multi-tone FSK modem used by the built-in engine.
//!
//! A transmission is laid out in whole frames:
//!
//! ```text
//! [start marker x MARKER_FRAMES][data: n_tx x frames_per_tx][end marker x MARKER_FRAMES]
//! ```
//!
//! Data bytes are framed as `[len][payload..][crc16 hi][crc16 lo]`, padded
//! with zeros to a multiple of `bytes_per_tx`. Each byte is sent as two
//! nibbles; nibble `j` of a step lights bin `freq_start + 16 * j + nibble`.
//! The start marker lights the even bins `freq_start + 2i` (i in 0..8), the
//! end marker the odd ones.
//!
//! Reception is frame driven. Spectra of whole frames are classified as
//! marker or data frames; the data frames collected between the two markers
//! are decoded against every protocol that shares the marker bins, and the
//! checksum picks the right one.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::MAX_PAYLOAD_LENGTH;
use crate::params::Parameters;
use crate::protocol::{BINS_PER_TONE, ProtocolId};

pub const MARKER_FRAMES: usize = 16;
const MARKER_PAIRS: usize = 8;
/// A marker is accepted after this many consecutive marker frames.
const MIN_MARKER_FRAMES: usize = MARKER_FRAMES / 2;
/// Normalized magnitude below which a bin counts as silent (about -60 dBFS).
const MIN_TONE_MAGNITUDE: f32 = 1e-3;
/// Bytes added around the payload: length prefix plus CRC-16.
const FRAMING_OVERHEAD: usize = 3;
/// Widest protocol: 6 tones of 16 bins each.
const MAX_DATA_BINS: usize = 6 * BINS_PER_TONE;
/// Longest possible data section: one byte per step, nine frames per step.
const MAX_DATA_FRAMES: usize = (MAX_PAYLOAD_LENGTH + FRAMING_OVERHEAD) * 9 + 2;

const MARKER_FAMILIES: [usize; 3] = [40, 320, 24];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Start,
    End,
}

impl Marker {
    fn bins(self, freq_start: usize) -> impl Iterator<Item = usize> {
        let offset = match self {
            Marker::Start => 0,
            Marker::End => 1,
        };
        (0..MARKER_PAIRS).map(move |i| freq_start + 2 * i + offset)
    }
}

enum RxState {
    Idle,
    StartMarker {
        freq_start: usize,
        frames: usize,
    },
    Receiving {
        freq_start: usize,
        frames: Vec<Vec<f32>>,
        end_frames: usize,
    },
}

pub struct Modem {
    samples_per_frame: usize,
    marker_threshold: f32,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    pending: Vec<f32>,
    state: RxState,
    ready: VecDeque<Vec<u8>>,
}

impl Modem {
    /// Returns `None` if the frame is too small to hold any marker.
    pub fn new(params: &Parameters) -> Option<Self> {
        let samples_per_frame = params.samples_per_frame as usize;
        let smallest_marker_end = MARKER_FAMILIES.iter().min().copied()? + 2 * MARKER_PAIRS;
        if samples_per_frame / 2 <= smallest_marker_end || params.sound_marker_threshold <= 0.0 {
            return None;
        }

        let fft = FftPlanner::<f32>::new().plan_fft_forward(samples_per_frame);
        Some(Self {
            samples_per_frame,
            marker_threshold: params.sound_marker_threshold,
            fft,
            scratch: vec![Complex::new(0.0, 0.0); samples_per_frame],
            pending: Vec::with_capacity(samples_per_frame),
            state: RxState::Idle,
            ready: VecDeque::new(),
        })
    }

    fn nyquist_bin(&self) -> usize {
        self.samples_per_frame / 2
    }

    fn supports(&self, protocol: ProtocolId) -> bool {
        protocol.bin_end() < self.nyquist_bin()
    }

    /// Number of samples a transmission of `payload_len` bytes occupies.
    pub fn waveform_samples(&self, payload_len: usize, protocol: ProtocolId) -> Option<usize> {
        if payload_len == 0 || payload_len > MAX_PAYLOAD_LENGTH || !self.supports(protocol) {
            return None;
        }
        let n_tx = (payload_len + FRAMING_OVERHEAD).div_ceil(protocol.bytes_per_tx());
        let frames = 2 * MARKER_FRAMES + n_tx * protocol.frames_per_tx();
        Some(frames * self.samples_per_frame)
    }

    /// Synthesize a transmission as normalized float samples.
    pub fn encode(&self, payload: &[u8], protocol: ProtocolId, volume: i32) -> Option<Vec<f32>> {
        if !(0..=100).contains(&volume) {
            return None;
        }
        let total = self.waveform_samples(payload.len(), protocol)?;
        let amplitude = volume as f32 / 100.0;
        let spf = self.samples_per_frame;
        let freq_start = protocol.freq_start();

        let mut out = vec![0.0f32; total];
        let mut frames = out.chunks_exact_mut(spf);

        let start_bins: Vec<usize> = Marker::Start.bins(freq_start).collect();
        for frame in frames.by_ref().take(MARKER_FRAMES) {
            add_tones(frame, &start_bins, amplitude);
        }

        let framed = frame_payload(payload, protocol.bytes_per_tx());
        for step in framed.chunks(protocol.bytes_per_tx()) {
            let bins = step_bins(step, freq_start);
            for frame in frames.by_ref().take(protocol.frames_per_tx()) {
                add_tones(frame, &bins, amplitude);
            }
        }

        let end_bins: Vec<usize> = Marker::End.bins(freq_start).collect();
        for frame in frames.take(MARKER_FRAMES) {
            add_tones(frame, &end_bins, amplitude);
        }

        Some(out)
    }

    /// Feed captured samples. Returns the oldest message recognized so far.
    pub fn decode(&mut self, samples: &[f32]) -> Option<Vec<u8>> {
        self.pending.extend_from_slice(samples);

        let spf = self.samples_per_frame;
        let whole = self.pending.len() / spf * spf;
        if whole > 0 {
            let captured: Vec<f32> = self.pending.drain(..whole).collect();
            for frame in captured.chunks_exact(spf) {
                self.process_frame(frame);
            }
        }

        self.ready.pop_front()
    }

    fn process_frame(&mut self, frame: &[f32]) {
        let mags = self.spectrum(frame);

        let state = std::mem::replace(&mut self.state, RxState::Idle);
        self.state = match state {
            RxState::Idle => self.detect_start(&mags),
            RxState::StartMarker { freq_start, frames } => {
                if self.is_marker(&mags, freq_start, Marker::Start) {
                    RxState::StartMarker {
                        freq_start,
                        frames: frames + 1,
                    }
                } else if frames >= MIN_MARKER_FRAMES {
                    RxState::Receiving {
                        freq_start,
                        frames: vec![data_bins(&mags, freq_start)],
                        end_frames: 0,
                    }
                } else {
                    self.detect_start(&mags)
                }
            }
            RxState::Receiving {
                freq_start,
                mut frames,
                end_frames,
            } => {
                if self.is_marker(&mags, freq_start, Marker::End) {
                    if end_frames + 1 >= MIN_MARKER_FRAMES {
                        match decode_frames(freq_start, &frames) {
                            Some((protocol, payload)) => {
                                log::debug!(
                                    "Recognized {} byte message ({})",
                                    payload.len(),
                                    protocol.display_name()
                                );
                                self.ready.push_back(payload);
                            }
                            None => log::debug!(
                                "Discarding {} data frames that matched no protocol",
                                frames.len()
                            ),
                        }
                        RxState::Idle
                    } else {
                        RxState::Receiving {
                            freq_start,
                            frames,
                            end_frames: end_frames + 1,
                        }
                    }
                } else if frames.len() >= MAX_DATA_FRAMES {
                    log::debug!("Transmission exceeded {} data frames, resetting", MAX_DATA_FRAMES);
                    RxState::Idle
                } else {
                    frames.push(data_bins(&mags, freq_start));
                    RxState::Receiving {
                        freq_start,
                        frames,
                        end_frames: 0,
                    }
                }
            }
        };
    }

    fn detect_start(&self, mags: &[f32]) -> RxState {
        MARKER_FAMILIES
            .iter()
            .copied()
            .find(|&fs| self.is_marker(mags, fs, Marker::Start))
            .map(|freq_start| RxState::StartMarker {
                freq_start,
                frames: 1,
            })
            .unwrap_or(RxState::Idle)
    }

    fn is_marker(&self, mags: &[f32], freq_start: usize, marker: Marker) -> bool {
        if freq_start + 2 * MARKER_PAIRS >= mags.len() {
            return false;
        }
        let other = match marker {
            Marker::Start => Marker::End,
            Marker::End => Marker::Start,
        };
        let hits = marker
            .bins(freq_start)
            .zip(other.bins(freq_start))
            .filter(|&(on, off)| {
                mags[on] > MIN_TONE_MAGNITUDE && mags[on] > self.marker_threshold * mags[off]
            })
            .count();
        hits + 1 >= MARKER_PAIRS
    }

    /// Normalized magnitudes of bins 0..=N/2; a full-scale sine reads 1.0.
    fn spectrum(&mut self, frame: &[f32]) -> Vec<f32> {
        for (slot, &s) in self.scratch.iter_mut().zip(frame) {
            *slot = Complex::new(s, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 2.0 / self.samples_per_frame as f32;
        self.scratch[..=self.nyquist_bin()]
            .iter()
            .map(|c| c.norm() * scale)
            .collect()
    }
}

fn add_tones(frame: &mut [f32], bins: &[usize], amplitude: f32) {
    if bins.is_empty() {
        return;
    }
    let per_tone = amplitude / bins.len() as f32;
    let n = frame.len();
    for &bin in bins {
        for (i, sample) in frame.iter_mut().enumerate() {
            // Reduce the phase first; large f32 arguments lose precision.
            let phase = ((bin * i) % n) as f32 / n as f32;
            *sample += per_tone * (2.0 * PI * phase).sin();
        }
    }
}

fn step_bins(step: &[u8], freq_start: usize) -> Vec<usize> {
    step.iter()
        .enumerate()
        .flat_map(|(j, &byte)| {
            let lo = freq_start + (2 * j) * BINS_PER_TONE + (byte & 0x0f) as usize;
            let hi = freq_start + (2 * j + 1) * BINS_PER_TONE + (byte >> 4) as usize;
            [lo, hi]
        })
        .collect()
}

fn data_bins(mags: &[f32], freq_start: usize) -> Vec<f32> {
    let end = (freq_start + MAX_DATA_BINS).min(mags.len());
    mags.get(freq_start..end).map(<[f32]>::to_vec).unwrap_or_default()
}

fn frame_payload(payload: &[u8], bytes_per_tx: usize) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + FRAMING_OVERHEAD + bytes_per_tx);
    framed.push(payload.len() as u8);
    framed.extend_from_slice(payload);
    let crc = crc16(&framed);
    framed.extend_from_slice(&crc.to_be_bytes());
    let padded = framed.len().div_ceil(bytes_per_tx) * bytes_per_tx;
    framed.resize(padded, 0);
    framed
}

fn unframe_payload(bytes: &[u8], bytes_per_tx: usize) -> Option<Vec<u8>> {
    let len = *bytes.first()? as usize;
    if len == 0 || len > MAX_PAYLOAD_LENGTH {
        return None;
    }
    let framed_len = 1 + len + 2;
    if framed_len.div_ceil(bytes_per_tx) * bytes_per_tx != bytes.len() {
        return None;
    }
    let expected = u16::from_be_bytes([bytes[1 + len], bytes[2 + len]]);
    if crc16(&bytes[..1 + len]) != expected {
        return None;
    }
    Some(bytes[1..1 + len].to_vec())
}

/// Try every protocol of the marker family against the collected frames.
fn decode_frames(freq_start: usize, frames: &[Vec<f32>]) -> Option<(ProtocolId, Vec<u8>)> {
    ProtocolId::family(freq_start).find_map(|protocol| {
        let fpt = protocol.frames_per_tx();
        let n_tx = (frames.len() + fpt / 2) / fpt;
        // One frame of slip covers a capture that is not frame aligned.
        if n_tx == 0 || frames.len().abs_diff(n_tx * fpt) > 1 {
            return None;
        }

        let width = protocol.tone_count() * BINS_PER_TONE;
        let mut bytes = Vec::with_capacity(n_tx * protocol.bytes_per_tx());
        for step in 0..n_tx {
            let start = step * fpt;
            let end = ((step + 1) * fpt).min(frames.len());
            let mut sums = vec![0.0f32; width];
            for frame in frames.get(start..end)? {
                if frame.len() < width {
                    return None;
                }
                for (acc, &m) in sums.iter_mut().zip(frame) {
                    *acc += m;
                }
            }

            let nibbles: Vec<u8> = sums.chunks_exact(BINS_PER_TONE).map(strongest_bin).collect();
            bytes.extend(nibbles.chunks_exact(2).map(|pair| pair[0] | (pair[1] << 4)));
        }

        unframe_payload(&bytes, protocol.bytes_per_tx()).map(|payload| (protocol, payload))
    })
}

fn strongest_bin(bins: &[f32]) -> u8 {
    bins.iter()
        .enumerate()
        .fold((0usize, f32::MIN), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
        .0 as u8
}

/// CRC-16/CCITT-FALSE
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
