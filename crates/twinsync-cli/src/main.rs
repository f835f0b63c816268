//! Command-line interface for the twinsync cloud adapter.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use twinsync_cloud::{
    dispatch, CloudAdapter, CloudConfig, CloudError, CloudHandlers, DesiredVersion,
    LoopbackTransport, Telemetry, TwinReconciler,
};

/// Twinsync - keep a thermometer's device twin in sync with the cloud.
#[derive(Parser, Debug)]
#[command(name = "twinsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the adapter over the in-process loopback transport.
    Run {
        /// Configuration file (TOML).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Serial number reported when the connection is established.
        #[arg(long)]
        serial: Option<String>,
        /// Start with the network down.
        #[arg(long)]
        offline: bool,
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Reconcile one desired-property document and print the outcome.
    Reconcile {
        /// Desired-property document (JSON).
        #[arg(required = true)]
        document: String,
        /// Stored version before the document is applied.
        #[arg(long, default_value_t = twinsync_cloud::twin::INITIAL_VERSION)]
        version: u32,
    },
    /// Dispatch one device method and print the response.
    Dispatch {
        /// Method name.
        #[arg(required = true)]
        method: String,
        /// Method payload.
        #[arg(required = true)]
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Run {
            config,
            serial,
            offline,
            duration,
        } => run_adapter(config, serial, offline, duration.map(Duration::from_secs)).await,
        Command::Reconcile { document, version } => reconcile(&document, version),
        Command::Dispatch { method, payload } => {
            dispatch_method(&method, &payload);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var("TWINSYNC_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "twinsync={level},twinsync_cloud={level}",
            level = default_level
        ))
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Log a startup failure and exit with the adapter's exit code.
fn exit_on_startup_failure(err: CloudError) -> ! {
    let code = err.exit_code();
    error!("Cloud adapter failed to start: {} (exit {})", err, code);
    std::process::exit(code.code());
}

fn load_config(path: Option<PathBuf>, serial: Option<String>) -> Result<CloudConfig, CloudError> {
    let config = match path {
        Some(path) => CloudConfig::load(path)?,
        None => CloudConfig::default(),
    };
    let mut config = config.apply_env_overrides()?;
    if let Some(serial) = serial {
        config = config.with_serial_number(serial);
    }
    config.validate()?;
    Ok(config)
}

fn domain_handlers() -> CloudHandlers {
    CloudHandlers::new()
        .with_upload_enabled_changed(|enabled| info!("Telemetry upload enabled: {}", enabled))
        .with_display_alert(|message| info!("ALERT: {}", message.to_string_lossy()))
        .with_connection_changed(|connected| info!("Connected to cloud: {}", connected))
}

async fn run_adapter(
    config_path: Option<PathBuf>,
    serial: Option<String>,
    offline: bool,
    duration: Option<Duration>,
) -> Result<()> {
    let config = load_config(config_path, serial).unwrap_or_else(|e| exit_on_startup_failure(e));
    let period = config.event_check_interval();

    let (transport, inbound) = LoopbackTransport::channel("loopback", config.channel_capacity);
    transport.set_online(!offline);

    let adapter = CloudAdapter::new(config, transport.clone(), domain_handlers())
        .unwrap_or_else(|e| exit_on_startup_failure(e));
    let handle = adapter
        .start(inbound)
        .await
        .unwrap_or_else(|e| exit_on_startup_failure(e));

    if !offline {
        transport.push_connection_changed(true).await?;
    }
    handle.signal_no_update_available().await?;

    let stop = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(stop);

    let start = tokio::time::Instant::now() + period;
    let mut readings = tokio::time::interval_at(start, period);
    let mut sample: u32 = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = readings.tick() => {
                let temperature = 20.0 + f64::from(sample % 10) * 0.5;
                sample = sample.wrapping_add(1);
                if let Err(e) = handle.send_telemetry(Telemetry::new(temperature)).await {
                    warn!("Telemetry reading not sent: {}", e);
                }
            }
        }
    }

    let status = handle.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    handle.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}

fn reconcile(document: &str, version: u32) -> Result<()> {
    let config = CloudConfig::default();
    let reconciler = TwinReconciler::new(config.upload_enabled_property);
    let mut stored = DesiredVersion::starting_at(version);

    let Some(outcome) = reconciler.reconcile(document, &mut stored) else {
        bail!("desired properties are not valid JSON");
    };

    let report = serde_json::json!({
        "upload_enabled": outcome.upload_enabled,
        "requested_version": outcome.requested_version,
        "version_advanced": outcome.version_advanced,
        "desired_version": stored.current(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn dispatch_method(method: &str, payload: &str) {
    let handlers = CloudHandlers::new().with_display_alert(|message| {
        println!("ALERT: {}", message.to_string_lossy())
    });
    let response = dispatch(method, payload.as_bytes(), &handlers);

    println!("Status: {}", response.status);
    println!("Body:   {}", response.body_str());
}
