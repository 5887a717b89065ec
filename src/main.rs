use anyhow::Result;
use clap::Parser;
use ecoute::app::{Session, spawn_source_pump};
use ecoute::audio::wav::WavFrameSource;
use ecoute::cli::{Cli, Commands};
use ecoute::config::Config;
use ecoute::notify::Notification;
use ecoute::store::{TranscriptRecord, TranscriptStore};
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        None => run_listen(config, None, false, false, false, false, cli.quiet)?,
        Some(Commands::Listen {
            input,
            no_vad,
            no_noise,
            no_punctuation,
            no_emergency,
        }) => run_listen(
            config,
            input,
            no_vad,
            no_noise,
            no_punctuation,
            no_emergency,
            cli.quiet,
        )?,
        Some(Commands::History { limit }) => {
            let store = open_store(&config)?;
            print_records(&store.recent(limit)?);
        }
        Some(Commands::Emergencies { limit }) => {
            let store = open_store(&config)?;
            let records = store.emergency(limit)?;
            if records.is_empty() {
                println!("Aucune urgence enregistrée.");
            } else {
                print_records(&records);
            }
        }
        Some(Commands::Search { query, limit }) => {
            let store = open_store(&config)?;
            print_records(&store.search(&query, limit)?);
        }
        Some(Commands::Export { output, date }) => {
            let store = open_store(&config)?;
            let written = store.export(&output, date.as_deref())?;
            println!("{} transcription(s) exportée(s) vers {}", written, output.display());
        }
        Some(Commands::Purge { days }) => {
            let store = open_store(&config)?;
            let deleted = store.purge_older_than(days)?;
            println!("{} transcription(s) supprimée(s) (plus de {} jours)", deleted, days);
        }
        Some(Commands::Stats { days }) => {
            print_stats(&config, days)?;
        }
        #[cfg(feature = "cpal-audio")]
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order: --config path, then the default path, then built-in
/// defaults; environment variables and CLI flags override file values.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(path) = cli.config.as_deref() {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    }
    .with_env_overrides();

    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(model) = &cli.model {
        config.stt.model_path = model.clone();
    }
    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }

    Ok(config)
}

fn open_store(config: &Config) -> Result<TranscriptStore> {
    Ok(TranscriptStore::open(&config.store.path)?)
}

#[allow(clippy::too_many_arguments)]
fn run_listen(
    mut config: Config,
    input: Option<PathBuf>,
    no_vad: bool,
    no_noise: bool,
    no_punctuation: bool,
    no_emergency: bool,
    quiet: bool,
) -> Result<()> {
    config.vad.enabled &= !no_vad;
    config.noise.enabled &= !no_noise;
    config.text.punctuation &= !no_punctuation;
    config.text.emergency_detection &= !no_emergency;

    let mut session = Session::build(&config)?;
    let notifications = session.notifications();
    let stats = session.stats.clone();
    let worker = session.take_worker();
    let producer = session.frame_producer();

    // Keep the session's own producer out of scope so the worker observes a
    // disconnect once the capture side finishes.
    drop(session);

    let finite_input = input.is_some();
    let mut pump = None;
    #[cfg(feature = "cpal-audio")]
    let mut capture = None;

    if let Some(wav_path) = input {
        let source =
            WavFrameSource::open(&wav_path, config.audio.sample_rate, config.audio.block_size)?;
        let block_ms =
            config.audio.block_size as u64 * 1000 / u64::from(config.audio.sample_rate.max(1));
        pump = Some(spawn_source_pump(
            Box::new(source),
            producer,
            Duration::from_millis(block_ms),
        ));
    } else {
        #[cfg(feature = "cpal-audio")]
        {
            let mut mic = ecoute::audio::capture::MicCapture::new(
                config.audio.device.as_deref(),
                config.audio.sample_rate,
                config.audio.block_size,
            )?;
            mic.start(producer)?;
            capture = Some(mic);
        }
        #[cfg(not(feature = "cpal-audio"))]
        {
            drop(producer);
            anyhow::bail!(
                "this build has no microphone support; rebuild with --features cpal-audio \
                 or pass --input <wav>"
            );
        }
    }

    if !quiet {
        println!("Écoute en cours... (Ctrl+C pour arrêter)");
    }

    let handle = worker.spawn();

    // Drain notifications until the pipeline winds down (finite input) or
    // the process is terminated (microphone).
    for notification in notifications.iter() {
        match notification {
            Notification::Partial { text, .. } => {
                if !quiet {
                    eprint!("\r\x1b[2K… {text}");
                    std::io::stderr().flush().ok();
                }
            }
            Notification::Final { transcript } => {
                if !quiet {
                    eprint!("\r\x1b[2K");
                }
                let time = transcript
                    .timestamp
                    .with_timezone(&chrono::Local)
                    .format("%H:%M");
                if transcript.is_emergency {
                    println!(
                        "[{}] {} {}",
                        time,
                        "⚠ URGENCE".red().bold(),
                        transcript.text
                    );
                } else {
                    println!("[{}] {}", time, transcript.text);
                }
            }
            Notification::AudioLevel { .. } => {}
        }
    }

    if let Some(pump) = pump
        && pump.join().is_err()
    {
        eprintln!("ecoute: capture pump panicked");
    }
    handle.stop();
    #[cfg(feature = "cpal-audio")]
    if let Some(mut mic) = capture {
        mic.stop().ok();
    }

    if !quiet && finite_input {
        let running = stats.running();
        println!(
            "\n{} transcription(s), {} mot(s), {} erreur(s)",
            running.transcriptions, running.words, running.errors
        );
    }

    Ok(())
}

fn print_records(records: &[TranscriptRecord]) {
    if records.is_empty() {
        println!("Aucune transcription.");
        return;
    }

    for record in records {
        if record.is_emergency {
            println!(
                "[{}] {} {} ({})",
                record.timestamp,
                "⚠ URGENCE".red().bold(),
                record.text,
                record.emergency_words.join(", ")
            );
        } else {
            println!("[{}] {}", record.timestamp, record.text);
        }
    }
}

fn print_stats(config: &Config, days: u32) -> Result<()> {
    let store = open_store(config)?;
    let store_stats = store.statistics(days)?;

    println!("Transcriptions ({} derniers jours)", days);
    println!("  total        : {}", store_stats.transcriptions);
    println!("  mots         : {}", store_stats.total_words);
    println!("  niveau moyen : {:.1}", store_stats.avg_audio_level);
    println!(
        "  urgences     : {}",
        if store_stats.emergency_count > 0 {
            store_stats.emergency_count.to_string().red().to_string()
        } else {
            store_stats.emergency_count.to_string()
        }
    );
    println!("  en base      : {}", store.total_count()?);

    let system = ecoute::stats::StatsAggregator::new().system_snapshot();
    println!("Système");
    println!("  cpu          : {:.1}% ({} coeurs)", system.cpu_percent, system.cpu_count);
    println!(
        "  mémoire      : {:.1}% ({}/{} Mo)",
        system.memory_percent, system.memory_used_mb, system.memory_total_mb
    );
    println!(
        "  disque       : {:.1}% utilisé, {:.1} Go libres",
        system.disk_percent, system.disk_free_gb
    );
    if let Some(temp) = system.temperature_c {
        println!("  température  : {:.1}°C", temp);
    }

    Ok(())
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = ecoute::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}
