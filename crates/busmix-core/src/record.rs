//! Offline rendering to a 16-bit stereo WAV file
//!
//! Drives the engine without an audio device, block by block, exactly as a
//! callback would. Useful for exporting a mix and for listening tests.

use anyhow::{Context, Result};
use std::io::{Seek, Write};
use std::path::Path;

use crate::engine::{MixEngine, Mixer};

/// How long to render
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Upper bound on the rendered length
    pub max_seconds: f64,
    /// Stop early once no source is playing
    pub until_stopped: bool,
    /// Frames rendered per simulated callback
    pub block_frames: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_seconds: 60.0,
            until_stopped: true,
            block_frames: 1024,
        }
    }
}

/// Render the mix into a WAV file at the mixer's sample rate
///
/// Returns the number of frames written.
pub fn render_to_wav(
    mixer: &mut Mixer,
    engine: &mut MixEngine,
    path: &Path,
    options: &RenderOptions,
) -> Result<u64> {
    let file = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
    );
    let frames = render_to_writer(mixer, engine, file, options)
        .with_context(|| format!("Failed to render into {:?}", path))?;

    log::info!(
        "Rendered {} frames ({:.2}s) to {:?}",
        frames,
        frames as f64 / mixer.sample_rate() as f64,
        path
    );
    Ok(frames)
}

/// Render the mix as WAV into any seekable writer
pub fn render_to_writer<W>(
    mixer: &mut Mixer,
    engine: &mut MixEngine,
    writer: W,
    options: &RenderOptions,
) -> Result<u64>
where
    W: Write + Seek,
{
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: mixer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec).context("Failed to write WAV header")?;

    let max_frames = (options.max_seconds.max(0.0) * mixer.sample_rate() as f64) as u64;
    let block_frames = options.block_frames.max(1);
    let mut block = vec![0i16; block_frames * 2];
    let mut written = 0u64;

    while written < max_frames {
        mixer.flush();
        let frames = (max_frames - written).min(block_frames as u64) as usize;
        let out = &mut block[..frames * 2];
        engine.render(out);

        for &sample in out.iter() {
            wav.write_sample(sample).context("Failed to write samples")?;
        }
        written += frames as u64;

        if options.until_stopped && mixer.pending_commands() == 0 && !mixer.any_playing() {
            break;
        }
    }

    wav.finalize().context("Failed to finalize WAV file")?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::test_util::wav_bytes;
    use crate::decoder::SampleData;
    use crate::engine::{create_mixer, EngineConfig};

    fn setup() -> (Mixer, MixEngine) {
        create_mixer(EngineConfig {
            sample_rate: 8000,
            max_sources: 8,
            command_queue_capacity: 32,
            max_frames: 128,
        })
        .unwrap()
    }

    #[test]
    fn test_render_until_stopped() {
        let (mut mixer, mut engine) = setup();
        let id = mixer
            .create_source(&SampleData::new(wav_bytes(1, 8000, &[1234; 1000])))
            .unwrap();
        mixer.set_pan(id, -1.0);
        mixer.play(id, true);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.wav");
        let options = RenderOptions {
            block_frames: 256,
            ..Default::default()
        };
        let frames = render_to_wav(&mut mixer, &mut engine, &path, &options).unwrap();
        // Stops in the block where the source ends
        assert_eq!(frames, 1024);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 2048);
        assert!(samples[..2000].chunks(2).all(|f| f == [1234i16, 0]));
        assert!(samples[2000..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_render_respects_max_length() {
        let (mut mixer, mut engine) = setup();
        let id = mixer
            .create_source(&SampleData::new(wav_bytes(2, 8000, &[10, 20, 30, 40])))
            .unwrap();
        mixer.set_loop(id, true);
        mixer.play(id, true);

        let options = RenderOptions {
            max_seconds: 0.1,
            until_stopped: true,
            block_frames: 300,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let frames = render_to_writer(&mut mixer, &mut engine, &mut cursor, &options).unwrap();
        assert_eq!(frames, 800);

        cursor.set_position(0);
        let reader = hound::WavReader::new(cursor).unwrap();
        assert_eq!(reader.duration(), 800);
    }
}
