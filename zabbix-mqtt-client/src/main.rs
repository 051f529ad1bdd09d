//! MQTT client for Zabbix.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use zabbix_mqtt_client::{ClientArgs, ClientConfig, Relay, TopicSubscriber};
use zabbix_mqtt_common::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();

    // Load configuration
    let config = ClientConfig::load_from_file(&args.config)
        .with_context(|| format!("Can't load {}", args.config.display()))?;

    // Initialize logging
    let mut logging = config.logging.clone();
    if let Some(level) = args.log_level_override() {
        logging.level = level;
    }
    init_tracing(&logging)?;

    info!("Starting zabbix-mqtt-client");
    info!(
        config = %args.config.display(),
        topics = config.topics.len(),
        zabbix = config.zabbix.is_some(),
        mqtt = config.mqtt.is_some(),
        "Configuration loaded"
    );

    // Zabbix sender
    let (sender, host) = match &config.zabbix {
        Some(zabbix) => {
            let sender = zabbix.build_sender()?;
            match &sender {
                Some(sender) => {
                    let servers: Vec<String> =
                        sender.servers().iter().map(|s| s.to_string()).collect();
                    info!(servers = ?servers, host = %zabbix.host(), "Reporting to Zabbix");
                }
                None => warn!(
                    "Neither zabbix.server nor zabbix.agent_config is set, metrics will not be reported"
                ),
            }
            if zabbix.host.is_none() {
                warn!("zabbix.host is not set, metrics will carry an empty host name");
            }
            (sender, zabbix.host().to_string())
        }
        None => {
            warn!("No zabbix section configured, metrics will not be reported");
            (None, String::new())
        }
    };

    let relay = Arc::new(Relay::new(config.topics.clone(), host, sender));

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start MQTT subscriber
    let subscriber_task = match config.mqtt.clone() {
        Some(mqtt) => {
            let subscriber = TopicSubscriber::new(relay.clone(), mqtt);
            Some(tokio::spawn(async move {
                if let Err(e) = subscriber.run(shutdown_rx).await {
                    error!("Subscriber error: {}", e);
                }
            }))
        }
        None => {
            warn!("No mqtt section configured, not subscribing to any topic");
            None
        }
    };

    wait_for_shutdown().await;

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for subscriber to finish
    if let Some(task) = subscriber_task {
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }

    let stats = relay.stats();
    info!(
        messages_received = stats.messages_received,
        messages_dropped = stats.messages_dropped,
        metrics_produced = stats.metrics_produced,
        metrics_sent = stats.metrics_sent,
        submit_failures = stats.submit_failures,
        "Final statistics"
    );

    info!("zabbix-mqtt-client stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        }
        _ = sigterm() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
