//! Posture Guardian CLI
//!
//! Privacy-first sitting posture monitor.

use clap::{Parser, Subcommand};
use posture_guardian::{
    actuator::{Actuator, ConsoleActuator},
    capture::{load_recording, replay, CaptureSource, LandmarkDetector, LandmarkFrame},
    config::{Config, UsageMode},
    core::{analyze, GateDecision, PostureStatus, SampleGate},
    monitor::Monitor,
    PRIVACY_DECLARATION, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "server")]
use posture_guardian::{
    actuator::QueueActuator,
    capture::{RemoteCapture, RemoteDetector, RemoteInbox},
    server::{self, ServerConfig, ServerState},
};

/// How long a single poll waits for a detector event.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "posture-guardian")]
#[command(version = VERSION)]
#[command(about = "Privacy-first sitting posture monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor posture from a recorded landmark session (JSON lines)
    Replay {
        /// Recording to replay
        file: PathBuf,

        /// Pace frames with their recorded timing
        #[arg(long)]
        realtime: bool,

        /// Usage mode for this run (overrides the saved setting)
        #[arg(long)]
        mode: Option<String>,

        /// Print every accepted sample
        #[arg(long, short)]
        verbose: bool,
    },

    /// Classify every frame of a recording without reminders
    Analyze {
        /// Recording to analyze
        file: PathBuf,
    },

    /// Pause monitoring
    Pause,

    /// Resume monitoring
    Resume,

    /// Set the usage mode (computer_work, study_reading, silent, custom)
    Mode {
        mode: String,
    },

    /// Show current settings
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,

    /// Accept landmarks from a local client over HTTP
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (0 for random)
        #[arg(long, default_value = "8787")]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            file,
            realtime,
            mode,
            verbose,
        } => {
            cmd_replay(file, realtime, mode.as_deref(), verbose);
        }
        Commands::Analyze { file } => {
            cmd_analyze(&file);
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Mode { mode } => {
            cmd_mode(&mode);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
        Commands::Config => {
            cmd_config();
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config, using defaults: {e}");
            Config::default()
        }
    }
}

fn parse_mode_or_exit(mode: &str) -> UsageMode {
    match mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_replay(file: PathBuf, realtime: bool, mode: Option<&str>, verbose: bool) {
    println!("Posture Guardian v{VERSION}");
    println!();

    let mut config = load_config();
    let mode_override = mode.map(parse_mode_or_exit);
    if let Some(mode) = mode_override {
        config.reminder.usage_mode = mode;
    }

    println!("Replaying {file:?}");
    println!("  Usage mode: {}", config.reminder.usage_mode);
    println!("  Pacing: {}", if realtime { "recorded timing" } else { "as fast as possible" });
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let (source, detector) = replay(file, realtime);
    let actuator = ConsoleActuator::new().verbose(verbose);
    let mut monitor = Monitor::new(source, detector, actuator, &config);

    let shutdown = Shutdown::install();
    run_agent(&mut monitor, &shutdown, config, mode_override, |monitor| {
        monitor.detector().is_exhausted() && monitor.pending_events() == 0
    });
}

/// Drive `monitor` until Ctrl+C, a fatal error, or `finished` returns true.
///
/// The config file is re-read once a second so `pause`, `resume` and `mode`
/// from another process control the running agent.
fn run_agent<C, D, A>(
    monitor: &mut Monitor<C, D, A>,
    shutdown: &Shutdown,
    config: Config,
    mode_override: Option<UsageMode>,
    mut finished: impl FnMut(&mut Monitor<C, D, A>) -> bool,
) where
    C: CaptureSource,
    D: LandmarkDetector,
    A: Actuator,
{
    if let Err(e) = monitor.initialize(&shutdown.cancel) {
        eprintln!("Error initializing monitor: {e}");
        std::process::exit(1);
    }
    if let Err(e) = monitor.start() {
        eprintln!("Error starting monitor: {e}");
        std::process::exit(1);
    }

    let mut paused = config.paused;
    if paused {
        println!("Monitoring is currently paused.");
        println!("Run `posture-guardian resume` to continue.");
        println!();
        let _ = monitor.pause();
    }
    let mut last_config_check = Instant::now();
    let mut failed = false;

    while shutdown.running.load(Ordering::SeqCst) {
        // Periodically reload config so `posture-guardian pause/resume/mode` can control a running agent.
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(mut cfg) = Config::load() {
                if let Some(mode) = mode_override {
                    cfg.reminder.usage_mode = mode;
                }
                monitor.update_settings(cfg.reminder, cfg.thresholds);

                if cfg.paused != paused {
                    paused = cfg.paused;
                    let result = if paused {
                        println!();
                        println!("Pausing monitoring...");
                        monitor.pause()
                    } else {
                        println!();
                        println!("Resuming monitoring...");
                        monitor.resume()
                    };
                    if result.is_err() {
                        failed = true;
                        break;
                    }
                }
            }
            last_config_check = Instant::now();
        }

        if let Err(e) = monitor.poll(POLL_TIMEOUT) {
            eprintln!("Monitoring stopped: {e}");
            failed = true;
            break;
        }

        if finished(monitor) {
            println!();
            println!("Recording finished.");
            break;
        }
    }

    println!();
    println!("Stopping monitoring...");
    let log = monitor.log();
    monitor.stop();

    // Final stats
    println!();
    println!("{}", log.summary());

    if failed {
        std::process::exit(1);
    }
}

fn cmd_analyze(file: &Path) {
    let recording = match load_recording(file) {
        Ok(recording) => recording,
        Err(e) => {
            eprintln!("Error reading recording: {e}");
            std::process::exit(1);
        }
    };
    let config = load_config();

    let mut gate = SampleGate::new();
    let mut no_subject = 0usize;
    let mut counts = [0usize; 3];
    let mut dropped = 0usize;

    for record in &recording {
        let Some(landmarks) = record.landmarks.clone() else {
            no_subject += 1;
            println!("[{}] no subject", record.timestamp.format("%H:%M:%S%.3f"));
            continue;
        };

        let sample = analyze(&LandmarkFrame::at(record.timestamp, landmarks), &config.thresholds);
        let decision = gate.admit(&sample);
        if decision != GateDecision::Accepted {
            dropped += 1;
        }
        counts[match sample.status {
            PostureStatus::Good => 0,
            PostureStatus::Warning => 1,
            PostureStatus::Danger => 2,
        }] += 1;

        println!(
            "[{}] {:<7} head {:>5.1}° shoulders {:>5.1}° confidence {:.2}{}",
            sample.timestamp.format("%H:%M:%S%.3f"),
            sample.status.as_str(),
            sample.head_tilt_angle,
            sample.shoulder_tilt_angle,
            sample.confidence,
            match decision {
                GateDecision::Accepted => "",
                GateDecision::LowConfidence => "  (dropped: low confidence)",
                GateDecision::TooSoon => "  (dropped: rate limit)",
            }
        );
    }

    println!();
    println!("Frames: {}", recording.len());
    println!("  Good: {}", counts[0]);
    println!("  Warning: {}", counts[1]);
    println!("  Danger: {}", counts[2]);
    println!("  No subject: {no_subject}");
    println!("  Dropped by gate: {dropped}");
}

fn cmd_pause() {
    let mut config = load_config();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring paused. Use 'posture-guardian resume' to continue.");
}

fn cmd_resume() {
    let mut config = load_config();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring resumed.");
}

fn cmd_mode(mode: &str) {
    let mode = parse_mode_or_exit(mode);
    let mut config = load_config();
    config.reminder.usage_mode = mode;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Usage mode set to {mode}.");
}

fn cmd_status() {
    let config = load_config();

    println!("Posture Guardian Status");
    println!("=======================");
    println!();
    println!("Configuration:");
    println!("  Usage mode: {}", config.reminder.usage_mode);
    println!("  Paused: {}", config.paused);
    println!(
        "  First reminder delay: {}s",
        config.reminder.timing.first_warning_delay_secs
    );
    println!(
        "  Cooldown: {} min",
        config.reminder.timing.cooldown_period_mins
    );
    println!(
        "  Sound: {} ({:.0}%)",
        config.reminder.sound,
        config.reminder.volume * 100.0
    );
    println!();

    println!("Reminder policy:");
    println!("  0s: icon");
    let policy = config.reminder.policy();
    for step in policy.steps() {
        println!("  {}s: {}", step.delay_secs, step.level);
    }
    println!("  Cooldown after: {}", policy.terminal_level());
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) {
    println!("Posture Guardian v{VERSION}");
    println!();

    let config = load_config();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    let inbox = RemoteInbox::new();
    let reminders = QueueActuator::new();
    let state = ServerState::new(inbox.clone(), reminders.clone());

    let (addr, shutdown_tx) =
        match runtime.block_on(server::run(ServerConfig::new(port), state.clone())) {
            Ok(bound) => bound,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };

    println!("Listening on http://{addr}");
    println!("  POST /frames     landmark frames");
    println!("  GET  /status     monitor status");
    println!("  GET  /reminders  queued reminders");
    println!("  Usage mode: {}", config.reminder.usage_mode);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut monitor = Monitor::new(
        RemoteCapture::new(),
        RemoteDetector::new(inbox),
        reminders,
        &config,
    );

    let shutdown = Shutdown::install();
    run_agent(&mut monitor, &shutdown, config, None, |monitor| {
        state.publish_status(monitor.status());
        false
    });

    let _ = shutdown_tx.send(());
}

/// Flags flipped by Ctrl+C.
struct Shutdown {
    running: Arc<AtomicBool>,
    /// Also aborts the detector readiness wait
    cancel: Arc<AtomicBool>,
}

impl Shutdown {
    /// Set up Ctrl+C handler.
    fn install() -> Self {
        let shutdown = Self {
            running: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let running = shutdown.running.clone();
        let cancel = shutdown.cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            cancel.store(true, Ordering::SeqCst);
        }) {
            eprintln!("Warning: Could not set Ctrl+C handler: {e}");
        }
        shutdown
    }
}
