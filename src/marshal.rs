//! Buffer marshaling between caller sample arrays and the engine's byte view.
//!
//! The engine consumes and produces little-endian sample bytes. On
//! little-endian targets a view is a zero-copy reinterpretation of the
//! caller's slice; elsewhere it is a staged copy.
//!
//! Every view is a scoped guard registered with a [`ViewLedger`]. A view is
//! released exactly once: explicitly through `release`, or by `Drop`, which
//! discards.

use std::borrow::Cow;
use std::cell::Cell;

use crate::error::{BridgeError, Result};
use crate::params::SampleFormat;

/// A fixed-width sample type the engine understands.
pub trait Sample: bytemuck::Pod + Send + 'static {
    const FORMAT: SampleFormat;

    fn write_le(self, out: &mut Vec<u8>);

    /// `chunk` is exactly `FORMAT.width()` bytes.
    fn read_le(chunk: &[u8]) -> Self;

    /// Normalized value in [-1.0, 1.0].
    fn to_unit(self) -> f32;

    fn from_unit(value: f32) -> Self;
}

impl Sample for i16 {
    const FORMAT: SampleFormat = SampleFormat::I16;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(chunk: &[u8]) -> Self {
        i16::from_le_bytes([chunk[0], chunk[1]])
    }

    fn to_unit(self) -> f32 {
        self as f32 / 32768.0
    }

    fn from_unit(value: f32) -> Self {
        (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
    }
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(chunk: &[u8]) -> Self {
        f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }

    fn to_unit(self) -> f32 {
        self
    }

    fn from_unit(value: f32) -> Self {
        value
    }
}

/// Reinterpret samples as little-endian bytes. Length is `len * width`.
pub fn to_bytes<T: Sample>(samples: &[T]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        return bytemuck::cast_slice::<T, u8>(samples).to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() * T::FORMAT.width());
    for &s in samples {
        s.write_le(&mut out);
    }
    out
}

/// Inverse of [`to_bytes`]. Fails if `bytes` is not a whole number of samples.
pub fn from_bytes<T: Sample>(bytes: &[u8]) -> Result<Vec<T>> {
    let width = T::FORMAT.width();
    if bytes.len() % width != 0 {
        return Err(BridgeError::marshal(format!(
            "{} bytes is not a multiple of the {}-byte {} sample width",
            bytes.len(),
            width,
            T::FORMAT
        )));
    }
    Ok(bytes.chunks_exact(width).map(T::read_le).collect())
}

/// Audio samples in one of the supported formats.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl Waveform {
    pub fn format(&self) -> SampleFormat {
        match self {
            Waveform::I16(_) => SampleFormat::I16,
            Waveform::F32(_) => SampleFormat::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Waveform::I16(s) => s.len(),
            Waveform::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Waveform::I16(s) => to_bytes(s),
            Waveform::F32(s) => to_bytes(s),
        }
    }

    pub fn from_bytes(format: SampleFormat, bytes: &[u8]) -> Result<Self> {
        Ok(match format {
            SampleFormat::I16 => Waveform::I16(from_bytes(bytes)?),
            SampleFormat::F32 => Waveform::F32(from_bytes(bytes)?),
        })
    }

    /// Normalized float copy, e.g. for writing WAV files.
    pub fn to_unit(&self) -> Vec<f32> {
        match self {
            Waveform::I16(s) => s.iter().map(|v| v.to_unit()).collect(),
            Waveform::F32(s) => s.clone(),
        }
    }

    /// Build a waveform of `format` from normalized float samples.
    pub fn from_unit(format: SampleFormat, samples: &[f32]) -> Self {
        match format {
            SampleFormat::I16 => Waveform::I16(samples.iter().map(|&v| i16::from_unit(v)).collect()),
            SampleFormat::F32 => Waveform::F32(samples.to_vec()),
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            Waveform::I16(s) => Some(s),
            Waveform::F32(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Waveform::F32(s) => Some(s),
            Waveform::I16(_) => None,
        }
    }

    /// Split into chunks of `frame` samples, as a capture device would deliver them.
    pub fn frames(&self, frame: usize) -> Vec<Waveform> {
        let frame = frame.max(1);
        match self {
            Waveform::I16(s) => s.chunks(frame).map(|c| Waveform::I16(c.to_vec())).collect(),
            Waveform::F32(s) => s.chunks(frame).map(|c| Waveform::F32(c.to_vec())).collect(),
        }
    }
}

impl From<Vec<i16>> for Waveform {
    fn from(samples: Vec<i16>) -> Self {
        Waveform::I16(samples)
    }
}

impl From<Vec<f32>> for Waveform {
    fn from(samples: Vec<f32>) -> Self {
        Waveform::F32(samples)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Make engine writes visible in the caller's buffer
    Commit,
    /// Drop the view without publishing staged writes
    Discard,
}

/// Tracks view acquisitions so that a leaked view is observable.
#[derive(Debug, Default)]
pub struct ViewLedger {
    outstanding: Cell<usize>,
    commits: Cell<u64>,
    discards: Cell<u64>,
}

impl ViewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Views acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    pub fn commits(&self) -> u64 {
        self.commits.get()
    }

    pub fn discards(&self) -> u64 {
        self.discards.get()
    }

    fn acquire(&self) {
        self.outstanding.set(self.outstanding.get() + 1);
    }

    fn release(&self, mode: ReleaseMode) {
        let outstanding = self.outstanding.get();
        if outstanding == 0 {
            log::error!("View released with no outstanding acquisitions");
        }
        self.outstanding.set(outstanding.saturating_sub(1));
        match mode {
            ReleaseMode::Commit => self.commits.set(self.commits.get() + 1),
            ReleaseMode::Discard => self.discards.set(self.discards.get() + 1),
        }
    }
}

/// Read-only byte view over caller samples. Always released with `Discard`.
pub struct ReadView<'a> {
    bytes: Cow<'a, [u8]>,
    ledger: &'a ViewLedger,
    released: bool,
}

impl<'a> ReadView<'a> {
    pub fn acquire<T: Sample>(ledger: &'a ViewLedger, samples: &'a [T]) -> Self {
        let bytes = if cfg!(target_endian = "little") {
            Cow::Borrowed(bytemuck::cast_slice::<T, u8>(samples))
        } else {
            Cow::Owned(to_bytes(samples))
        };
        ledger.acquire();
        Self {
            bytes,
            ledger,
            released: false,
        }
    }

    /// View over raw bytes such as a payload. Never copies.
    pub fn acquire_bytes(ledger: &'a ViewLedger, bytes: &'a [u8]) -> Self {
        ledger.acquire();
        Self {
            bytes: Cow::Borrowed(bytes),
            ledger,
            released: false,
        }
    }

    pub fn acquire_waveform(ledger: &'a ViewLedger, waveform: &'a Waveform) -> Self {
        match waveform {
            Waveform::I16(s) => Self::acquire(ledger, s),
            Waveform::F32(s) => Self::acquire(ledger, s),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True when the platform forced a staged copy.
    pub fn is_copy(&self) -> bool {
        matches!(self.bytes, Cow::Owned(_))
    }

    pub fn release(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.released {
            self.released = true;
            self.ledger.release(ReleaseMode::Discard);
        }
    }
}

impl Drop for ReadView<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

enum Backing<'a, T> {
    Direct(&'a mut [T]),
    Staged { target: &'a mut [T], staging: Vec<u8> },
}

/// Writable byte view over a caller buffer.
///
/// Staged writes reach the caller only on `release(ReleaseMode::Commit)`.
/// A direct view aliases the caller's memory, so writes are visible as they
/// happen regardless of mode.
pub struct WriteView<'a, T: Sample> {
    backing: Backing<'a, T>,
    ledger: &'a ViewLedger,
    released: bool,
}

impl<'a, T: Sample> WriteView<'a, T> {
    pub fn acquire(ledger: &'a ViewLedger, target: &'a mut [T]) -> Self {
        let backing = if cfg!(target_endian = "little") {
            Backing::Direct(target)
        } else {
            let staging = to_bytes(target);
            Backing::Staged { target, staging }
        };
        ledger.acquire();
        Self {
            backing,
            ledger,
            released: false,
        }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Direct(target) => bytemuck::cast_slice_mut::<T, u8>(target),
            Backing::Staged { staging, .. } => staging.as_mut_slice(),
        }
    }

    pub fn len_samples(&self) -> usize {
        match &self.backing {
            Backing::Direct(target) => target.len(),
            Backing::Staged { target, .. } => target.len(),
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self.backing, Backing::Staged { .. })
    }

    pub fn release(mut self, mode: ReleaseMode) {
        self.finish(mode);
    }

    fn finish(&mut self, mode: ReleaseMode) {
        if self.released {
            return;
        }
        self.released = true;
        if mode == ReleaseMode::Commit {
            if let Backing::Staged { target, staging } = &mut self.backing {
                let width = T::FORMAT.width();
                for (dst, chunk) in target.iter_mut().zip(staging.chunks_exact(width)) {
                    *dst = T::read_le(chunk);
                }
            }
        }
        self.ledger.release(mode);
    }
}

impl<T: Sample> Drop for WriteView<'_, T> {
    fn drop(&mut self) {
        self.finish(ReleaseMode::Discard);
    }
}
