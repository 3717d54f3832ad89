//! CPAL output stream
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control Thread  │───send()───────────►│   Command Queue     │
//! │     (Mixer)      │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ Relaxed atomics                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  SourceAtomics   │◄────────────────────│  CPAL Audio Thread  │
//! │   EngineStats    │   written per block │  (owns MixEngine)   │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The engine is moved into the stream callback, so the callback never
//! locks. Any sample format cpal can convert 16-bit samples into works; the
//! mix goes to the first two device channels and the rest are silent.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::backend::{AudioHandle, AudioSystemResult};
use super::config::{AudioConfig, DEFAULT_SAMPLE_RATE};
use super::device::{find_device_by_id, get_default_device};
use super::error::{AudioError, AudioResult};
use crate::engine::{clamp_i16, create_mixer, EngineConfig, MixEngine};

/// Sample formats the callback can write, in order of preference
const PREFERRED_FORMATS: [SampleFormat; 3] =
    [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

pub(super) fn start_audio_system(
    config: &AudioConfig,
    mut engine_config: EngineConfig,
) -> AudioResult<AudioSystemResult> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_default_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = get_output_config(&device, config)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = config.buffer_size.frames();

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };
    let latency_ms = config.buffer_size.latency_ms(sample_rate);

    log::info!(
        "Audio config: {} channels, {}Hz, {:?}, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        supported.sample_format(),
        buffer_size,
        latency_ms
    );

    engine_config.sample_rate = sample_rate;
    let (mixer, engine) = create_mixer(engine_config)?;

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_output_stream::<f32>(&device, &stream_config, engine)?,
        SampleFormat::I16 => build_output_stream::<i16>(&device, &stream_config, engine)?,
        SampleFormat::U16 => build_output_stream::<u16>(&device, &stream_config, engine)?,
        other => return Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
    };
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _stream: stream,
            device_name,
            channels: stream_config.channels,
        },
        mixer,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Pick the best output configuration for a device
///
/// Prefers a writable sample format with at least two channels at the
/// requested rate, then any writable format, falling back to the closest
/// supported rate.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| PREFERRED_FORMATS.contains(&c.sample_format()))
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No output configuration with a supported sample format".to_string(),
        ));
    }

    let target = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0
    };
    let format_rank = |c: &&cpal::SupportedStreamConfigRange| {
        PREFERRED_FORMATS
            .iter()
            .position(|f| *f == c.sample_format())
            .unwrap_or(PREFERRED_FORMATS.len())
    };

    let best = supported_configs
        .iter()
        .filter(|c| c.channels() >= 2)
        .filter(in_range)
        .min_by_key(format_rank)
        .or_else(|| supported_configs.iter().filter(in_range).min_by_key(format_rank))
        .or_else(|| supported_configs.iter().min_by_key(format_rank))
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if in_range(&best) {
        cpal::SampleRate(target)
    } else {
        let fallback = cpal::SampleRate(
            target.clamp(best.min_sample_rate().0, best.max_sample_rate().0),
        );
        log::warn!("Audio device doesn't support {}Hz, using {}Hz", target, fallback.0);
        fallback
    };

    Ok(best.clone().with_sample_rate(sample_rate))
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: MixEngine,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                fill_output(&mut engine, data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Render the mix into an interleaved device buffer of `channels` channels
///
/// Drains the command queue once, then renders in engine-sized blocks.
fn fill_output<T>(engine: &mut MixEngine, data: &mut [T], channels: usize)
where
    T: Sample + FromSample<i16>,
{
    if channels == 0 {
        return;
    }
    engine.begin_callback();

    for block in data.chunks_mut(engine.max_frames() * channels) {
        let frames = engine.process(block.len() / channels);
        let master = engine.master_output();

        for (frame, stereo) in block.chunks_mut(channels).zip(master.chunks_exact(2)) {
            frame[0] = T::from_sample(clamp_i16(stereo[0]));
            if channels > 1 {
                frame[1] = T::from_sample(clamp_i16(stereo[1]));
            }
            for ch in frame.iter_mut().skip(2) {
                *ch = T::EQUILIBRIUM;
            }
        }
        // Partial trailing frame
        for ch in block.iter_mut().skip(frames * channels) {
            *ch = T::EQUILIBRIUM;
        }
    }
}
