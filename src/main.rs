mod cli;

use std::path::Path;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;

use acoustic_bridge::{Bridge, BuiltinEngine, Config, ProtocolId, SampleFormat, Waveform};
use cli::{Args, Command};

#[derive(Serialize)]
struct ProtocolRow {
    id: i32,
    name: &'static str,
    base_frequency_hz: f32,
    max_frequency_hz: f32,
    tones: usize,
    frames_per_tx: usize,
    bytes_per_tx: usize,
    ultrasound: bool,
    description: &'static str,
}

impl From<ProtocolId> for ProtocolRow {
    fn from(p: ProtocolId) -> Self {
        Self {
            id: p.id(),
            name: p.display_name(),
            base_frequency_hz: p.base_frequency_hz(),
            max_frequency_hz: p.max_frequency_hz(),
            tones: p.tone_count(),
            frames_per_tx: p.frames_per_tx(),
            bytes_per_tx: p.bytes_per_tx(),
            ultrasound: p.is_ultrasound(),
            description: p.description(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_logging(&args);

    let config = Config::default();
    log::info!("{} v{}", config.app_name, config.app_version);

    match args.command {
        Command::Encode {
            text,
            output,
            protocol,
            volume,
            sample_rate,
            frame,
            format,
        } => {
            let format = format.unwrap_or(config.sample_format);
            let sample_rate = sample_rate.unwrap_or(config.sample_rate as i32);
            let frame = frame.unwrap_or(config.samples_per_frame as i32);
            let protocol = protocol.unwrap_or(config.protocol.id());
            let volume = volume.unwrap_or(config.volume);
            if text.len() > config.max_payload_length {
                bail!(
                    "message is {} bytes, the limit is {}",
                    text.len(),
                    config.max_payload_length
                );
            }

            let mut bridge = Bridge::with_engine(BuiltinEngine::new(), config.with_sample_format(format));
            let handle = bridge
                .create_instance(sample_rate, frame)
                .context("Failed to create encoder instance")?;
            let waveform = bridge
                .encode(handle, text.as_bytes(), protocol, volume)
                .with_context(|| format!("Failed to encode with protocol {}", protocol));
            bridge.destroy_instance(handle)?;
            let waveform = waveform?;

            write_wav(&output, &waveform, sample_rate as u32)?;
            println!(
                "Wrote {} samples ({:.2}s) to {}",
                waveform.len(),
                waveform.len() as f32 / sample_rate as f32,
                output.display()
            );
        }
        Command::Decode { input, frame } => {
            let (waveform, sample_rate) = read_wav(&input)?;
            let frame = frame.unwrap_or(config.samples_per_frame as i32);

            let mut bridge = Bridge::with_engine(BuiltinEngine::new(), config);
            let handle = bridge
                .create_instance_with_format(sample_rate as i32, frame, waveform.format())
                .context("Failed to create decoder instance")?;

            let mut found = 0;
            let chunks = waveform.frames(frame.max(1) as usize);
            let drain = std::iter::repeat_with(|| Waveform::from_unit(waveform.format(), &[]));
            for chunk in chunks.iter().cloned().chain(drain) {
                match bridge.decode(handle, &chunk)? {
                    Some(message) => {
                        found += 1;
                        println!("{}", message);
                    }
                    // Past the end of the file and nothing left queued
                    None if chunk.is_empty() => break,
                    None => {}
                }
            }
            bridge.destroy_instance(handle)?;

            if found == 0 {
                log::warn!("No message recognized in {}", input.display());
                bail!("no message found");
            }
        }
        Command::Protocols { json } => {
            let rows: Vec<ProtocolRow> = ProtocolId::ALL.into_iter().map(ProtocolRow::from).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in rows {
                    println!(
                        "{:>2}  {:<20} {:>7.0}-{:<7.0} Hz  {}",
                        row.id, row.name, row.base_frequency_hz, row.max_frequency_hz, row.description
                    );
                }
            }
        }
    }

    Ok(())
}

fn write_wav(path: &Path, waveform: &Waveform, sample_rate: u32) -> anyhow::Result<()> {
    let (bits_per_sample, sample_format) = match waveform.format() {
        SampleFormat::I16 => (16, hound::SampleFormat::Int),
        SampleFormat::F32 => (32, hound::SampleFormat::Float),
    };
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample,
        sample_format,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    match waveform {
        Waveform::I16(samples) => {
            for &s in samples {
                writer.write_sample(s)?;
            }
        }
        Waveform::F32(samples) => {
            for &s in samples {
                writer.write_sample(s)?;
            }
        }
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

fn read_wav(path: &Path) -> anyhow::Result<(Waveform, u32)> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        log::warn!("{} has {} channels, using the interleaved stream as-is", path.display(), spec.channels);
    }

    let waveform = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => Waveform::I16(
            reader
                .into_samples::<i16>()
                .collect::<Result<_, _>>()
                .context("Failed to read samples")?,
        ),
        (hound::SampleFormat::Float, 32) => Waveform::F32(
            reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .context("Failed to read samples")?,
        ),
        (format, bits) => bail!("unsupported WAV sample format {:?} with {} bits", format, bits),
    };
    log::debug!(
        "Loaded {} samples at {} Hz from {}",
        waveform.len(),
        spec.sample_rate,
        path.display()
    );
    Ok((waveform, spec.sample_rate))
}
