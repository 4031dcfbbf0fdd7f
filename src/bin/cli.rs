//! tickwork CLI: headless drum playback and WAV export.
//!
//! Usage:
//!   tw-cli [--config file.toml] [--single-thread] [--bpm 128] [--seconds 4] [--wav out.wav]

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tw_engine::Direction;
use tw_master::{demo, Config, Controller};

const DEFAULT_SECONDS: f64 = 4.0;

struct Args {
    config: Option<PathBuf>,
    single_thread: bool,
    seconds: Option<f64>,
    wav: Option<PathBuf>,
    bpm: Option<f64>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        single_thread: false,
        seconds: None,
        wav: None,
        bpm: None,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(value(&mut it, "--config")?.into()),
            "--single-thread" => args.single_thread = true,
            "--seconds" => {
                let v = value(&mut it, "--seconds")?;
                args.seconds = Some(v.parse().with_context(|| format!("--seconds: bad number {v:?}"))?);
            }
            "--wav" => args.wav = Some(value(&mut it, "--wav")?.into()),
            "--bpm" => {
                let v = value(&mut it, "--bpm")?;
                args.bpm = Some(v.parse().with_context(|| format!("--bpm: bad number {v:?}"))?);
            }
            "-h" | "--help" => {
                println!("Usage: tw-cli [--config file.toml] [--single-thread] [--bpm N] [--seconds N] [--wav out.wav]");
                std::process::exit(0);
            }
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    it.next().with_context(|| format!("{flag} needs a value"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args()?;

    let mut config = Config::load(args.config.as_deref())?;
    if args.single_thread {
        config.set_single_threaded(true);
    }
    if let Some(bpm) = args.bpm {
        config.set_bpm(bpm);
    }

    let controller = Controller::init(config)?;
    let presets = controller
        .engine()
        .soundcard()
        .map(|card| card.lock().presets())
        .context("engine has no soundcard")?;

    let drum = demo::drum(&presets, true)?;
    println!(
        "Drum:     {} outputs, {} inputs",
        drum.channel_count(Direction::Output),
        drum.channel_count(Direction::Input)
    );
    println!(
        "Presets:  {} channels, {} Hz, {} frames, {:?}",
        presets.pcm_channels, presets.samplerate, presets.buffer_size, presets.format
    );
    println!("Tempo:    {} BPM", controller.engine().config().bpm);

    let seconds = args.seconds.unwrap_or(DEFAULT_SECONDS);
    let export = match &args.wav {
        Some(path) => Some(controller.export_wav(path, Some(seconds))?),
        None => None,
    };

    let _ = controller.add_audio(drum.clone());
    let played = controller.play(&drum);
    controller.start()?;

    match played.recv_timeout(Duration::from_secs(1)) {
        Ok(Ok(voices)) => info!("playing {} voices", voices.len()),
        Ok(Err(e)) => warn!("play failed: {e}"),
        Err(_) => warn!("play task did not run within a second"),
    }

    // Exports end on their own budget; leave slack for the start handshake.
    let limit = Duration::from_secs_f64(seconds.max(0.0) + if export.is_some() { 5.0 } else { 0.0 });
    let finished = controller.wait(limit);
    controller.stop(&drum);
    controller.teardown();

    if let (Some(handle), Some(path)) = (export, &args.wav) {
        if let Some(e) = handle.error() {
            bail!("export to {} failed: {e}", path.display());
        }
        if !finished {
            warn!("export stopped early after {} buffers", handle.buffers_written());
        }
        println!("Wrote {} buffers to {}", handle.buffers_written(), path.display());
    }
    Ok(())
}
