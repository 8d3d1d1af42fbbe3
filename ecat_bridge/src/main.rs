//! # EtherCAT Bridge Binary
//!
//! Runs one bridge instance against a native backend and prints every
//! notification it receives as JSON. With the `simulation` backend a demo
//! event stream is generated.
//!
//! # Usage
//!
//! ```bash
//! # Simulated local master with built-in defaults
//! ecat_bridge
//!
//! # Explicit configuration, 50 demo events, verbose logging
//! ecat_bridge --config config/bridge.toml --events 50 -v
//!
//! # JSON logs
//! ecat_bridge --json
//! ```

use clap::Parser;
use ecat_bridge::decode::encode_words;
use ecat_bridge::{BackendRegistry, BridgeOptions, EcBridge, InstanceRegistry, SimulatedMaster};
use ecat_common::config::{BridgeConfig, ConfigError, LogLevel, SharedConfig};
use ecat_common::consts::BRIDGE_SERVICE_NAME;
use ecat_common::error::{EcCode, ErrorReporting};
use ecat_common::notify::{Channel, LogSeverity, LogType, NotifyCode};
use ecat_common::params::{InitParams, MasterParams};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// EtherCAT Bridge - native master notifications to application handlers
#[derive(Parser, Debug)]
#[command(name = "ecat_bridge")]
#[command(version)]
#[command(about = "EtherCAT master notification bridge")]
#[command(long_about = None)]
struct Args {
    /// Path to the bridge configuration file (bridge.toml).
    /// Without it a local master with default settings is used.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Native backend to load
    #[arg(short, long, default_value = "simulation")]
    backend: String,

    /// Number of demo events to generate (simulation backend only)
    #[arg(short, long, default_value_t = 20)]
    events: u32,

    /// Interval between demo events in milliseconds
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Bridge failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("EtherCAT bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = config?;
    if let Some(path) = &args.config {
        info!("Loaded config from {:?}", path);
    }
    info!(
        "Service '{}' in {} mode",
        config.shared.service_name,
        config.init.run_mode()
    );

    let backend = BackendRegistry::with_builtin().create(&args.backend)?;
    let registry = Arc::new(InstanceRegistry::new());
    let bridge = EcBridge::with_options(
        backend.master.clone(),
        registry,
        BridgeOptions::from_config(&config),
    );

    for entry in &config.throttle {
        bridge.set_throttle(entry.code, entry.timeout_ms);
    }
    for channel in Channel::ALL {
        bridge.add_channel_handler(channel, move |n| {
            println!("{}", serde_json::to_string(n)?);
            Ok(())
        });
    }
    // Demo application notifications echo their input reversed.
    bridge.add_channel_handler(Channel::App, |n| {
        if let ecat_bridge::Notification::App { input, output, .. } = n {
            *output = Some(input.iter().rev().copied().collect());
        }
        Ok(())
    });

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    bridge.init_instance(&config.init)?;

    match bridge.register_client() {
        Ok(client_id) => debug!("Notification client {}", client_id),
        Err(e) => warn!("No notification client: {}", e),
    }
    bridge.enable_performance_measuring(true);
    bridge.enable_translation(true);

    match backend.simulator {
        Some(sim) => run_demo(&bridge, &sim, &args, &running),
        None => {
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(args.interval_ms));
            }
        }
    }

    if bridge.client_id().is_some() {
        if let Err(e) = bridge.unregister_client() {
            warn!("Unregister failed: {}", e);
        }
    }
    bridge.deinit_instance()?;

    info!("EtherCAT bridge shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> Result<BridgeConfig, ConfigError> {
    match &args.config {
        Some(path) => BridgeConfig::load_validated(path),
        None => Ok(BridgeConfig {
            shared: SharedConfig {
                log_level: Default::default(),
                service_name: BRIDGE_SERVICE_NAME.to_string(),
            },
            error_reporting: ErrorReporting::Detailed,
            throttle: Vec::new(),
            init: InitParams::Master {
                instance_id: 0,
                master: MasterParams {
                    bus_cycle_time_us: 1000,
                    link_layer: "simulated".to_string(),
                    log_level: LogSeverity::Info,
                },
                use_aux_clock: true,
            },
        }),
    }
}

/// Drive the simulated library with a repeating event sequence.
fn run_demo(bridge: &EcBridge, sim: &SimulatedMaster, args: &Args, running: &AtomicBool) {
    let instance = bridge.master_instance_id();

    for step in 0..args.events {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match step % 6 {
            0 => {
                sim.raise_master_event(
                    instance,
                    NotifyCode::SbStatus.raw(),
                    &encode_words(&[EcCode::NO_ERROR.0, 3]),
                );
            }
            1 => {
                sim.raise_master_event(
                    instance,
                    NotifyCode::StateChanged.raw(),
                    &encode_words(&[2, 8]),
                );
            }
            2 => {
                sim.raise_master_event_with_msgs(
                    instance,
                    NotifyCode::CyccmdWkcError.raw(),
                    &encode_words(&[7, 0x1000, 1, 3]),
                    vec!["Cyclic command: working counter error".to_string()],
                );
            }
            3 => match bridge.notify_app(step, &[1, 2, 3], 16) {
                Ok(output) => debug!("Application notification returned {:?}", output),
                Err(e) => warn!("Application notification failed: {}", e),
            },
            4 => {
                sim.measure(instance, "ecatExecJob", 42 + step);
                sim.translate(step, "Bus scan complete");
            }
            _ => {
                sim.emit_log(LogType::Master, LogSeverity::Info, "cycle heartbeat");
            }
        }

        thread::sleep(Duration::from_millis(args.interval_ms));
    }
}

/// Filter directive of the subscriber.
///
/// `RUST_LOG` wins over `-v`, which wins over `shared.log_level`.
fn filter_directive(configured: LogLevel, verbose: bool, env: Option<&str>) -> String {
    match env.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directive) => directive.to_string(),
        None if verbose && configured != LogLevel::Trace => {
            LogLevel::Debug.as_directive().to_string()
        }
        None => configured.as_directive().to_string(),
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::new(filter_directive(configured, args.verbose, env.as_deref()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
