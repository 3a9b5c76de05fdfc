use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use rand::Rng;
use sysinfo::System;

use sound_pool::{
    AppResult, AudioBackend, Config, ConfigOrigin, MockBackend, PcmData, RodioBackend, SoundEvent, SoundSystem,
    SoundType, Vec3,
};

const LOG_TARGET_STARTUP: &str = "sound_pool::startup";

/// How long the demo runs before shutting down
const DEFAULT_RUN_SECONDS: u64 = 5;

/// Chance per tick that the demo fires a random one-shot
const TRIGGER_CHANCE: f64 = 0.15;

struct Options {
    config_path: Option<PathBuf>,
    dry_run: bool,
    seconds: u64,
}

impl Options {
    fn from_args() -> AppResult<Self> {
        let mut options = Options {
            config_path: None,
            dry_run: false,
            seconds: DEFAULT_RUN_SECONDS,
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    options.config_path = Some(PathBuf::from(path));
                }
                "--seconds" => {
                    let value = args.next().context("--seconds needs a value")?;
                    options.seconds = value
                        .parse()
                        .with_context(|| format!("Invalid --seconds value '{}'", value))?;
                }
                "--dry-run" => options.dry_run = true,
                other => anyhow::bail!("Unknown argument '{}'", other),
            }
        }

        Ok(options)
    }
}

/// Initialize tracing with file rotation
///
/// Logs are written to `<config dir>/SoundPool/logs/`, one file per day.
/// Debug builds also log to the console.
fn initialize_tracing(default_filter: &str) {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = Config::log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "sound-pool.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let mut system = System::new_all();
    system.refresh_all();

    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting sound-pool v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
    tracing::info!(target: LOG_TARGET_STARTUP, "CPU cores: {}", system.cpus().len());
}

/// Short decaying sine so dry runs work without asset files
fn synth_tone(frequency: f32, millis: u32) -> PcmData {
    const SAMPLE_RATE: u32 = 22_050;
    let frames = SAMPLE_RATE * millis / 1000;
    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let envelope = 1.0 - i as f32 / frames as f32;
            let value = (t * frequency * std::f32::consts::TAU).sin() * envelope;
            (value * i16::MAX as f32 * 0.5) as i16
        })
        .collect();
    PcmData::new(1, SAMPLE_RATE, samples)
}

fn build_dry_run(config: &Config) -> AppResult<(SoundSystem<MockBackend>, sound_pool::MockProbe)> {
    let backend = MockBackend::new();
    let probe = backend.probe();
    let mut system = SoundSystem::new(backend, config.pool_size).context("Failed to open mock backend")?;

    for (sound, frequency) in SoundType::ALL.iter().zip([60.0, 8000.0, 300.0]) {
        system
            .load_sound_from_pcm(*sound, &synth_tone(frequency, 200))
            .with_context(|| format!("Failed to load synthetic {}", sound))?;
    }
    for name in &config.named_sources {
        system.create_source(name)?;
    }

    Ok((system, probe))
}

/// Drive the scheduler: random one-shots each tick, one loop started
/// and stopped halfway through.
fn run_demo<B: AudioBackend>(
    system: &mut SoundSystem<B>,
    config: &Config,
    seconds: u64,
    mut after_tick: impl FnMut(),
) -> AppResult<()> {
    let (events, subscriber) = system.diagnostics().subscribe();
    let mut rng = rand::thread_rng();
    let tick = Duration::from_millis(config.tick_ms);
    let started = Instant::now();
    let run_for = Duration::from_secs(seconds);

    let mut ambience = system
        .queue_looping_sound(SoundType::MidConga, Vec3::new(0.0, 0.0, -2.0), 0.3)
        .context("Failed to start ambience loop")?;

    if let Some(source) = config.named_sources.first() {
        system.play_by_name(source, SoundType::BassDrum)?;
    }

    let mut totals = sound_pool::DrainReport::default();
    while started.elapsed() < run_for {
        if rng.gen_bool(TRIGGER_CHANCE) {
            let sound = SoundType::ALL[rng.gen_range(0..SoundType::ALL.len())];
            let position = Vec3::new(rng.gen_range(-5.0..5.0), 0.0, rng.gen_range(-5.0..5.0));
            system.queue_sound(sound, position, rng.gen_range(0.4..1.0))?;
        }

        let report = system.play_all_sounds();
        totals.started += report.started;
        totals.dropped += report.dropped;
        totals.failed += report.failed;

        if started.elapsed() >= run_for / 2 {
            if let Some(handle) = ambience.take() {
                system.stop_looping_sound(handle)?;
            }
        }

        while let Ok(event) = events.try_recv() {
            if event.is_problem() {
                tracing::warn!("{}", event.description());
            } else if !matches!(event, SoundEvent::OneShotStarted { .. }) {
                tracing::debug!("{}", event.description());
            }
        }

        after_tick();
        thread::sleep(tick);
    }

    system.diagnostics().unsubscribe(subscriber);
    tracing::info!(
        "Demo finished: {} sounds started, {} dropped, {} failed",
        totals.started,
        totals.dropped,
        totals.failed
    );
    Ok(())
}

fn main() -> AppResult<()> {
    let options = Options::from_args()?;

    let (config, origin) = match &options.config_path {
        Some(path) => {
            let config = Config::load_from(path).with_context(|| format!("Failed to load {}", path.display()))?;
            (config, ConfigOrigin::Loaded(path.clone()))
        }
        None => Config::load().context("Failed to load configuration")?,
    };

    initialize_tracing(&config.log_filter);
    log_runtime_environment();
    tracing::info!("{}", origin);

    if options.dry_run {
        tracing::info!("Dry run: using in-memory backend");
        let (mut system, probe) = build_dry_run(&config)?;
        // Mock one-shots never end on their own
        run_demo(&mut system, &config, options.seconds, || {
            probe.finish_all();
        })?;
        system.shutdown();
    } else {
        let mut system =
            SoundSystem::from_config(RodioBackend::new(), &config).context("Failed to initialize sound system")?;
        if let Some(device) = system.backend().and_then(|backend| backend.device_name()) {
            tracing::info!(target: LOG_TARGET_STARTUP, "Output device: {}", device);
        }
        run_demo(&mut system, &config, options.seconds, || {})?;
        system.shutdown();
    }

    Ok(())
}
