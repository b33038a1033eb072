//! Lumi Bridge - lighting and note routing for ROLI LUMI keyboards
//!
//! Opens every MIDI port, keeps the session in sync with hot-plugged devices
//! and drives it from the interactive console.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lumi_bridge::cli::{self, ReplCommand};
use lumi_bridge::config::{AppConfig, ConfigWatcher, DevicesConfig, LoggingConfig};
use lumi_bridge::device::{Classifier, Direction, Endpoint};
use lumi_bridge::lumi::wrap_payload_hex;
use lumi_bridge::monitor;
use lumi_bridge::router::{RouterSettings, SessionRouter};
use lumi_bridge::transport::midir::MidirTransport;
use lumi_bridge::transport::NoteEvent;

/// Lumi Bridge - ROLI LUMI lighting and MIDI routing for ear training
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// List available MIDI ports with their classification
    #[arg(long)]
    list_ports: bool,

    /// Print incoming MIDI, optionally only from ports matching a pattern
    #[arg(long, value_name = "PATTERN", num_args = 0..=1, default_missing_value = "")]
    monitor: Option<String>,

    /// Send one raw 8-byte LUMI payload (hex) to the lighting outputs and exit
    #[arg(long, value_name = "HEX")]
    send: Option<String>,

    /// Run without the interactive console
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config).await?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let _log_guard = init_logging(&level, &config.logging)?;

    info!("Starting Lumi Bridge v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let classifier = Classifier::with_patterns(&config.devices.patterns);
    let transport = Arc::new(MidirTransport::new(&config.midi.client_name, classifier));

    if args.list_ports {
        return monitor::list_ports(&transport);
    }

    if let Some(pattern) = &args.monitor {
        let pattern = Some(pattern.as_str()).filter(|p| !p.is_empty());
        return monitor::run_monitor(&config.midi.client_name, pattern).await;
    }

    let router = SessionRouter::new(RouterSettings::from_config(&config)?);
    let known = connect_all(&transport, &router)?;
    select_devices(&router, &config.devices, &known);

    if let Some(payload) = &args.send {
        let frame = wrap_payload_hex(payload, router.settings().device_id)?;
        let delivery = router.send_frame(&frame);
        if delivery.is_empty() {
            anyhow::bail!("No lighting-capable output connected");
        }
        info!("Sent {} to {:?}", frame, delivery.delivered);
        return Ok(());
    }

    apply_startup_lighting(&router, &config)?;

    run_app(
        router,
        transport,
        known,
        config,
        args.config.clone(),
        args.headless,
        shutdown_signal(),
    )
    .await?;

    info!("Lumi Bridge shutdown complete");
    Ok(())
}

/// Open every port currently present; returns the endpoints that opened
fn connect_all(transport: &MidirTransport, router: &SessionRouter) -> Result<Vec<Endpoint>> {
    let endpoints = transport.enumerate()?;
    let mut known = Vec::with_capacity(endpoints.len());

    for port in transport.open_all(&endpoints) {
        known.push(port.endpoint().clone());
        router.attach(port);
    }

    info!(
        "Connected {} of {} MIDI port(s)",
        known.len(),
        endpoints.len()
    );
    Ok(known)
}

/// Apply the configured device lists; an empty list selects everything connected
fn select_devices(router: &SessionRouter, devices: &DevicesConfig, connected: &[Endpoint]) {
    let all_ids = |direction: Direction| -> Vec<String> {
        connected
            .iter()
            .filter(|ep| ep.direction == direction)
            .map(|ep| ep.id.clone())
            .collect()
    };

    let inputs = if devices.inputs.is_empty() {
        all_ids(Direction::Input)
    } else {
        devices.inputs.clone()
    };
    let outputs = if devices.outputs.is_empty() {
        all_ids(Direction::Output)
    } else {
        devices.outputs.clone()
    };

    router.set_active_inputs(inputs);
    let session = router.set_active_outputs(outputs);

    info!(
        "🎹 Session: {} input(s), {} output(s)",
        session.active_inputs.len(),
        session.active_outputs.len()
    );
    match session.primary_lighting_output() {
        Some(ep) => info!("💡 Lighting on {}", ep.name),
        None => info!("No lighting-capable keyboard in the session"),
    }
}

fn apply_startup_lighting(router: &SessionRouter, config: &AppConfig) -> Result<()> {
    let settings = router.settings();
    router.set_brightness(settings.brightness);
    let resting = settings.resting_color;
    router.set_primary_color(resting.r as i32, resting.g as i32, resting.b as i32);

    if let Some((root, scale)) = config.startup_key()? {
        info!("Showing {} {}", root, scale);
        router.configure_key_scale(root, scale);
    }
    Ok(())
}

/// Next reloaded config, or never when the file is not watched
async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

fn on_input_note(router: &SessionRouter, event: NoteEvent, echo: bool) {
    debug!(
        "🎵 {} note {} {}",
        event.endpoint_id,
        event.note,
        if event.on { "on" } else { "off" }
    );
    if !echo {
        return;
    }
    if event.on {
        router.start_sustain(event.note);
    } else {
        router.stop_sustain(event.note);
    }
}

async fn run_app(
    router: SessionRouter,
    transport: Arc<MidirTransport>,
    known: Vec<Endpoint>,
    mut config: AppConfig,
    config_path: String,
    headless: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    let mut note_rx = router
        .take_note_receiver()
        .ok_or_else(|| anyhow::anyhow!("Note receiver already taken"))?;

    let poll = Duration::from_millis(config.midi.hotplug_poll_ms);
    let (mut hotplug_rx, hotplug_task) = transport.watch(poll, known);

    let mut config_watcher = if std::path::Path::new(&config_path).exists() {
        match ConfigWatcher::new(&config_path) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("⚠️ Config hot-reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let (repl_tx, mut repl_rx) = mpsc::channel::<ReplCommand>(32);
    if headless {
        drop(repl_tx);
    } else {
        cli::spawn_repl(repl_tx);
    }

    let mut highlight_range = config.highlight_range()?;
    info!("Ready! Type 'help' for commands");

    // Main event loop
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = hotplug_rx.recv() => {
                router.handle_hotplug(event);
            }

            Some(event) = note_rx.recv() => {
                on_input_note(&router, event, config.midi.echo_input);
            }

            Some(cmd) = repl_rx.recv() => {
                let device_id = router.settings().device_id;
                match cli::execute(&router, cmd, highlight_range, device_id) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("error: {:#}", e),
                }
            }

            Some(new_config) = next_reload(&mut config_watcher) => {
                info!("📝 Configuration file changed, reloading...");
                match RouterSettings::from_config(&new_config) {
                    Ok(settings) => {
                        router.reconfigure(settings);
                        if new_config.devices != config.devices {
                            select_devices(&router, &new_config.devices, &router.connected());
                        }
                        highlight_range = new_config.highlight_range().unwrap_or(highlight_range);
                        config = new_config;
                        info!("✅ Configuration reloaded");
                    }
                    Err(e) => warn!("⚠️ Failed to apply config (keeping old config): {:#}", e),
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    let released = router.stop_all_sustain();
    if !released.is_empty() {
        debug!("Released held notes on {:?}", released.attempted());
    }
    hotplug_task.abort();

    Ok(())
}

fn init_logging(level: &str, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match logging.file_dir.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lumi-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });
    let json = logging.json.then(|| tracing_subscriber::fmt::layer().json());

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(json)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C ({}); use 'quit' to exit", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
