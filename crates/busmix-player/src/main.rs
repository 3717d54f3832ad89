//! Busmix Player - play or export a mix of audio files
//!
//! Every file becomes a source mixed into the master bus. The mix either
//! plays on an output device until all sources finish, or is rendered
//! offline into a WAV file with `--export`.
//!
//! ## Examples
//!
//! ```text
//! busmix-player drums.wav bass.ogg --loop --seconds 30
//! busmix-player voice.wav --pan -0.5 --rate 0.5 --export slow.wav
//! busmix-player --list-devices
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use busmix_core::audio::{get_output_devices, start_audio_system, AudioError, DeviceId};
use busmix_core::record::{render_to_wav, RenderOptions};
use busmix_core::{create_mixer, Mixer, SampleData, SourceId};

use config::PlayerConfig;

/// How often the control loop flushes commands and checks for completion
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Parser)]
#[command(name = "busmix-player", version, about = "Play or export a mix of audio files")]
struct Args {
    /// WAV (16-bit PCM) or Ogg Vorbis files to mix
    files: Vec<PathBuf>,

    /// Gain for every file (defaults to the configured gain)
    #[arg(long)]
    gain: Option<f64>,

    /// Pan for every file, from -1 (left) to 1 (right)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pan: f64,

    /// Playback rate multiplier
    #[arg(long, default_value_t = 1.0)]
    rate: f64,

    /// Loop every file
    #[arg(long = "loop")]
    looping: bool,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Output device name (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    /// Render into this WAV file instead of playing
    #[arg(long, value_name = "WAV")]
    export: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.list_devices {
        return list_devices();
    }
    if args.files.is_empty() {
        bail!("No input files given (see --help)");
    }

    let config: PlayerConfig = match &args.config {
        Some(path) => busmix_core::config::read_config(path)?,
        None => busmix_core::config::load_config(&config::default_config_path()),
    };

    match &args.export {
        Some(path) => export(&args, &config, path),
        None => play(&args, config),
    }
}

fn list_devices() -> Result<()> {
    match get_output_devices() {
        Ok(devices) => {
            for device in devices {
                println!("{}", device);
            }
            Ok(())
        }
        Err(AudioError::NoDevices) => {
            println!("No audio output devices found");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to enumerate audio devices"),
    }
}

/// Load every file into the mixer and start it playing
fn load_sources(mixer: &mut Mixer, args: &Args, config: &PlayerConfig) -> Result<Vec<SourceId>> {
    let gain = args.gain.unwrap_or(config.default_gain);
    let mut ids = Vec::with_capacity(args.files.len());

    for path in &args.files {
        let data = SampleData::from_file(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        let id = mixer
            .create_source(&data)
            .with_context(|| format!("Failed to open {:?}", path))?;
        mixer.set_gain(id, gain);
        mixer.set_pan(id, args.pan);
        mixer.set_rate(id, args.rate);
        mixer.set_loop(id, args.looping);
        log::info!("Loaded {:?} as {}", path, id);
        ids.push(id);
    }

    // Start together once every file has decoded its header
    for &id in &ids {
        mixer.play(id, true);
    }
    Ok(ids)
}

fn play(args: &Args, mut config: PlayerConfig) -> Result<()> {
    if let Some(name) = &args.device {
        config.audio.device = Some(DeviceId::new(name.clone()));
    }

    let mut system = start_audio_system(&config.audio, config.engine.clone())
        .context("Failed to start audio output")?;
    println!(
        "Playing on {} ({} channels, {} Hz, {} frames, ~{:.1}ms latency)",
        system.handle.device_name(),
        system.handle.channels(),
        system.sample_rate,
        system.buffer_size,
        system.latency_ms
    );

    let ids = load_sources(&mut system.mixer, args, &config)?;
    let limit = args.seconds.map(Duration::from_secs_f64);
    if args.looping && limit.is_none() {
        println!("Looping; press Ctrl+C to stop");
    }

    let started = Instant::now();
    // Playback state is only meaningful once a whole callback has run after
    // the last command reached the queue
    let mut settled_after: Option<u64> = None;
    loop {
        std::thread::sleep(POLL_INTERVAL);
        let mixer = &mut system.mixer;
        if mixer.flush() > 0 {
            settled_after = None;
        } else if settled_after.is_none() {
            settled_after = Some(mixer.stats().callbacks + 2);
        }

        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        let settled = settled_after.is_some_and(|n| mixer.stats().callbacks >= n);
        if settled && !mixer.any_playing() {
            break;
        }
    }

    let mixer = &mut system.mixer;
    for id in ids {
        mixer.destroy(id)?;
    }
    mixer.flush();
    // Let the callback pick up the last commands before the stream stops
    std::thread::sleep(POLL_INTERVAL);

    let stats = mixer.stats();
    log::info!(
        "Done after {:.1}s ({} callbacks, {} commands)",
        started.elapsed().as_secs_f64(),
        stats.callbacks,
        stats.commands_applied
    );
    Ok(())
}

fn export(args: &Args, config: &PlayerConfig, path: &Path) -> Result<()> {
    let (mut mixer, mut engine) =
        create_mixer(config.engine.clone()).context("Invalid engine configuration")?;
    load_sources(&mut mixer, args, config)?;

    let options = match args.seconds {
        Some(seconds) => RenderOptions {
            max_seconds: seconds,
            ..Default::default()
        },
        None if args.looping => bail!("--loop with --export needs --seconds"),
        None => RenderOptions {
            max_seconds: f64::from(u32::MAX),
            ..Default::default()
        },
    };

    let frames = render_to_wav(&mut mixer, &mut engine, path, &options)?;
    println!(
        "Wrote {:.2}s to {}",
        frames as f64 / mixer.sample_rate() as f64,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "busmix-player",
            "a.wav",
            "b.ogg",
            "--pan",
            "-0.5",
            "--loop",
            "--seconds",
            "2.5",
        ]);
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.pan, -0.5);
        assert!(args.looping);
        assert_eq!(args.seconds, Some(2.5));
        assert_eq!(args.rate, 1.0);
        assert!(args.export.is_none());
    }

    #[test]
    fn test_args_are_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
