//! serialvis - Main Entry Point
//!
//! Reads HDR/DAT telemetry from a serial port (or a recorded capture),
//! optionally logs it to CSV, and reports the live windowed view.

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver};
use serialvis::{
    backend::{list_ports, LineSource, ScriptedLineSource, SerialLineSource, StreamBackend},
    config::{parse_range_pair, resolve_save_path, AppConfig},
    presenter::{Frame, Presenter, ViewInput},
    ReaderState,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often the live summary is logged
const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);

/// Replay ends after this long without new records
const REPLAY_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "serialvis", version, about = "Live viewer and CSV logger for HDR/DAT serial streams")]
struct Cli {
    /// Serial port, e.g. /dev/ttyUSB0 or COM7
    #[arg(short, long, env = "SERIALVIS_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// CSV log path: file, stem, directory or strftime pattern
    #[arg(long)]
    save: Option<String>,

    /// Comma-separated fields to plot
    #[arg(long, value_delimiter = ',')]
    plot: Vec<String>,

    /// Time window in seconds
    #[arg(long)]
    window: Option<f64>,

    /// Points kept per field
    #[arg(long)]
    max_points: Option<usize>,

    /// Refresh rate in Hz
    #[arg(long)]
    refresh_hz: Option<f64>,

    /// Exit on the first transport failure instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,

    /// Fixed Y range as min,max (e.g. -20,20)
    #[arg(long, allow_hyphen_values = true)]
    ylim: Option<String>,

    /// Relative margin of the auto Y range
    #[arg(long)]
    ylim_margin: Option<f64>,

    /// Smoothing factor of the auto Y range, 0..1
    #[arg(long)]
    ylim_smooth: Option<f64>,

    /// Keep zero inside the auto Y range
    #[arg(long)]
    include_zero: bool,

    /// Config file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Replay a recorded text capture instead of opening a port
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Delay between replayed lines in milliseconds
    #[arg(long, default_value_t = 10)]
    replay_interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_ref())?;

    if cli.list_ports {
        let ports = list_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let config = build_config(&cli)?;
    let source: Box<dyn LineSource> = match &cli.replay {
        Some(path) => Box::new(
            ScriptedLineSource::from_file(path)
                .with_context(|| format!("Failed to read capture {}", path.display()))?
                .with_line_interval(Duration::from_millis(cli.replay_interval_ms)),
        ),
        None => Box::new(SerialLineSource::from_config(&config.serial)),
    };

    tracing::info!("Starting serialvis on {}", source.describe());

    let (backend, frontend) = StreamBackend::new(config.clone(), source);
    install_ctrl_c_handler(backend.stop_handle())?;
    let handle = backend.spawn().context("Failed to start reader thread")?;

    let mut presenter = Presenter::new(
        frontend.receiver.clone(),
        &config.view,
        config.collection.max_points,
    );
    let keys = spawn_key_reader()?;
    tracing::info!("Keys (then Enter): {}", ViewInput::KEY_HELP);

    let refresh = config.view.refresh_interval();
    let mut last_summary = Instant::now();
    let mut last_data = Instant::now();

    while frontend.is_running() && !handle.is_finished() {
        for state in frontend.states() {
            tracing::debug!("Reader state: {}", state);
            if state == ReaderState::Disconnected {
                tracing::info!("Waiting for {}", config.serial.port);
            }
        }

        for input in keys.try_iter() {
            presenter.handle_input(input);
        }

        let frame = presenter.update();
        if frame.ingested > 0 {
            last_data = Instant::now();
        }

        if last_summary.elapsed() >= SUMMARY_INTERVAL {
            log_summary(&frame);
            last_summary = Instant::now();
        }

        if cli.replay.is_some()
            && frontend.stats().lines_read > 0
            && last_data.elapsed() >= REPLAY_IDLE_TIMEOUT
        {
            tracing::info!("Replay finished");
            break;
        }

        std::thread::sleep(refresh);
    }

    tracing::info!("Shutting down...");
    handle.stop();
    let result = handle.join();

    let stats = frontend.stats();
    tracing::info!(
        "Read {} lines: {} samples, {} headers, {} dropped, {} rows logged",
        stats.lines_read,
        stats.samples,
        stats.headers,
        stats.decode_errors,
        stats.rows_persisted
    );

    result.context("Stream reader failed")
}

/// Initialise tracing: stderr always, plus a file layer with `--log-file`
fn init_logging(
    log_file: Option<&PathBuf>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,serialvis=debug"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Merge the config file and command line overrides
fn build_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load_or_default(),
    };

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if cli.no_reconnect {
        config.serial.auto_reconnect = false;
    }
    if let Some(max_points) = cli.max_points {
        config.collection.max_points = max_points;
    }
    if !cli.plot.is_empty() {
        config.view.plot_fields = cli
            .plot
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
    }
    if let Some(window) = cli.window {
        config.view.window_seconds = window;
    }
    if let Some(hz) = cli.refresh_hz {
        config.view.refresh_hz = hz;
    }
    if let Some(ylim) = &cli.ylim {
        config.view.fixed_range = Some(parse_range_pair(ylim)?);
    }
    if let Some(margin) = cli.ylim_margin {
        config.view.margin_ratio = margin;
    }
    if let Some(alpha) = cli.ylim_smooth {
        config.view.smoothing_alpha = alpha;
    }
    if cli.include_zero {
        config.view.include_zero = true;
    }

    if let Some(save) = &cli.save {
        let path = resolve_save_path(save)?;
        config.collection.save_path = Some(path);
    }

    config.validate()?;

    if cli.replay.is_none() && config.serial.port.is_empty() {
        bail!("No serial port given; use --port or set serial.port in the config file (see --list-ports)");
    }

    Ok(config)
}

/// Stop the reader on Ctrl+C
fn install_ctrl_c_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create signal runtime")?;

    std::thread::Builder::new()
        .name("serialvis-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("Ctrl+C received, stopping");
                        running.store(false, Ordering::SeqCst);
                    }
                    Err(e) => tracing::warn!("Ctrl+C handler failed: {}", e),
                }
            })
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}

/// Forward key presses typed on stdin as view inputs
fn spawn_key_reader() -> anyhow::Result<Receiver<ViewInput>> {
    let (tx, rx) = unbounded();

    std::thread::Builder::new()
        .name("serialvis-keys".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                for key in line.trim().chars() {
                    match ViewInput::from_key(key) {
                        Some(input) => {
                            if tx.send(input).is_err() {
                                return;
                            }
                        }
                        None => tracing::debug!("Unbound key {:?}", key),
                    }
                }
            }
        })
        .context("Failed to spawn key reader thread")?;

    Ok(rx)
}

fn log_summary(frame: &Frame) {
    if frame.fields.is_empty() {
        tracing::info!("Waiting for data...");
        return;
    }

    let values: Vec<String> = frame
        .fields
        .iter()
        .map(|name| match frame.latest(name) {
            Some(v) => format!("{}={:.3}", name, v),
            None => format!("{}=-", name),
        })
        .collect();

    tracing::info!(
        "t=[{:.1}, {:.1}]s y=[{:.3}, {:.3}] {}",
        frame.x_limits.0,
        frame.x_limits.1,
        frame.y_range.min,
        frame.y_range.max,
        values.join(" ")
    );
}
