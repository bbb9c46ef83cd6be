use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lightfixd::format_diagnostics;
use lightfixd::integrations::mqtt::MqttBridge;
use lightfixd::integrations::mqtt::MqttClient;
use lightfixd::integrations::mqtt::MqttCommandSink;
use lightfixd::integrations::mqtt::RumqttcClient;
use lightfixd::Config;
use lightfixd::Engine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keeps Zigbee lights from getting stuck dim or with a fixed power-on level.
#[derive(Debug, Parser)]
#[command(name = "lightfixd", version)]
struct Args {
    /// Config files, merged in order. Later files may not override earlier ones.
    #[arg(short, long = "config", value_name = "FILE", num_args = 1..)]
    config: Vec<PathBuf>,

    /// MQTT broker host, overrides the config file
    #[arg(long, env = "MQTT_HOST")]
    mqtt_host: Option<String>,

    /// MQTT broker port, overrides the config file
    #[arg(long, env = "MQTT_PORT")]
    mqtt_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if args.config.is_empty() {
        Config::default()
    } else {
        let (config, diagnostics) =
            Config::from_files(&args.config).context("Failed to load configuration")?;
        if !diagnostics.is_empty() {
            eprint!("{}", format_diagnostics(&diagnostics));
        }
        config
    };

    if let Some(host) = args.mqtt_host {
        config.mqtt.broker = host;
    }
    if let Some(port) = args.mqtt_port {
        anyhow::ensure!(port != 0, "MQTT port must not be 0");
        config.mqtt.port = port;
    }

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.filter())
        .init();

    tracing::info!("lightfixd starting");
    tracing::info!(
        "Connecting to MQTT broker at {}:{}",
        config.mqtt.broker,
        config.mqtt.port
    );

    let mut client = RumqttcClient::new(&config.mqtt);
    client
        .connect()
        .await
        .context("Failed to connect to MQTT broker")?;

    let publisher = client.publisher()?;
    let sink = MqttCommandSink::new(Arc::new(publisher), config.mqtt.base_topic.clone());
    let engine = Engine::new(&config, Arc::new(sink));

    let mut bridge = MqttBridge::new(client, &config.mqtt, engine);
    bridge
        .subscribe()
        .await
        .context("Failed to subscribe to device topics")?;

    tracing::info!("Press Ctrl+C to exit");

    let result = tokio::select! {
        result = bridge.run() => result.context("MQTT event stream ended"),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
            Ok(())
        }
    };

    bridge.shutdown();

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    tracing::info!("lightfixd shutdown complete");

    result
}
