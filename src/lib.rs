// Module declarations for the application's core components
pub mod channels;       // Inter-component communication channels
pub mod config;         // Configuration management
pub mod error;          // Decode error taxonomy
pub mod home_assistant; // Home Assistant discovery documents
pub mod mqtt;           // MQTT client and messaging
pub mod options;        // Command line options parsing
pub mod poller;         // Fetch/decode/publish state machine
pub mod prelude;        // Common imports and types
pub mod scheduler;      // Sleeping between poll cycles
pub mod sensor;         // Sensor definitions and value derivation
pub mod solax;          // SolaX local API client and payload decoding

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;
use crate::poller::{Intervals, Poller};
use crate::scheduler::TokioSleeper;
use std::sync::Arc;
use std::time::Duration;

const MQTT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Sets up env_logger; `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) {
    if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

/// Main application entry point
///
/// Loads configuration, connects to the broker (fatal on failure), publishes
/// discovery and then polls the inverter until `shutdown_tx` fires.
pub async fn app(options: Options, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let shutdown_rx = shutdown_tx.subscribe();

    let config = ConfigWrapper::new(&options.config_file)?;

    init_logging(config.loglevel());
    info!("solax-bridge {} starting", CARGO_PKG_VERSION);
    config.log_summary();

    let registry = Arc::new(Registry::x1_mini_g3()?);
    let ha = home_assistant::Config::new(config.homeassistant());
    let channels = Channels::new();

    info!("  Creating inverter client...");
    let fetcher = solax::Client::new(config.inverter())?;
    info!("    polling {}", fetcher.url());

    info!("  Creating MQTT client...");
    let mqtt = mqtt::Mqtt::new(config.clone(), channels.clone());
    let (client, eventloop) = mqtt.connect().await?;

    // subscribe before anything can be sent so nothing is missed
    let to_mqtt = channels.to_mqtt.subscribe();
    let discovery_client = client.clone();
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start(client, eventloop, to_mqtt).await {
            error!("MQTT task failed: {}", e);
        }
    });

    mqtt.publish_discovery(&discovery_client, ha.all(&registry)?).await;
    info!("Published discovery for {} sensors", registry.len());

    if let Some(runtime) = options.runtime {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(runtime)).await;
            info!("runtime limit of {}s reached", runtime);
            let _ = shutdown_tx.send(());
        });
    }

    let mut poller = Poller::new(
        fetcher,
        TokioSleeper,
        registry,
        ha,
        channels,
        Intervals::from_config(config.inverter()),
    );
    poller.run(shutdown_rx).await?;

    info!("Shutdown signal received, stopping components...");
    mqtt.stop();
    match tokio::time::timeout(MQTT_SHUTDOWN_GRACE, mqtt_handle).await {
        Ok(Err(e)) => error!("Error waiting for mqtt task: {}", e),
        Err(_) => warn!("mqtt task did not stop within {}s", MQTT_SHUTDOWN_GRACE.as_secs()),
        Ok(Ok(())) => {}
    }

    info!("Application shutdown complete");
    Ok(())
}
