//! MQTT subscriber feeding messages to the relay.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::mapping::TopicMapping;
use crate::relay::{MetricsSender, Relay};

/// Spare request slots beyond one per subscription.
const REQUEST_CHANNEL_HEADROOM: usize = 10;

/// How long to keep polling after shutdown so the DISCONNECT goes out.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Build client options from the configuration.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id(), config.server.clone(), config.port());
    options.set_keep_alive(config.keepalive());
    options.set_max_packet_size(config.max_packet_size, config.max_packet_size);

    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }

    if config.tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    options
}

/// Subscribe to every mapped topic.
///
/// A rejected filter is logged and skipped; the remaining topics are
/// still subscribed.
pub async fn subscribe_all(client: &AsyncClient, mapping: &TopicMapping) -> usize {
    let mut subscribed = 0;

    for (topic, spec) in mapping.iter() {
        info!(topic = %topic, keys = %spec, "Subscribing");
        match client.subscribe(topic, QoS::AtMostOnce).await {
            Ok(()) => subscribed += 1,
            Err(e) => warn!(topic = %topic, error = %e, "Failed to subscribe"),
        }
    }

    subscribed
}

/// MQTT subscriber that hands each message to the relay.
pub struct TopicSubscriber<S> {
    relay: Arc<Relay<S>>,
    mqtt_config: MqttConfig,
}

impl<S> TopicSubscriber<S>
where
    S: MetricsSender + Send + Sync + 'static,
{
    /// Create a new subscriber.
    pub fn new(relay: Arc<Relay<S>>, mqtt_config: MqttConfig) -> Self {
        Self { relay, mqtt_config }
    }

    /// Run the subscriber until the shutdown signal is received.
    ///
    /// Connection errors never end the loop: they are logged and polling
    /// resumes after the configured delay, which lets the client reconnect.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let options = mqtt_options(&self.mqtt_config);
        let capacity = self.relay.mapping().len() + REQUEST_CHANNEL_HEADROOM;
        let (client, mut eventloop) = AsyncClient::new(options, capacity);

        info!(
            server = %self.mqtt_config.server,
            port = self.mqtt_config.port(),
            tls = self.mqtt_config.tls,
            topics = self.relay.mapping().len(),
            "Connecting to MQTT broker..."
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping subscriber");
                        break;
                    }
                }

                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            debug!(code = ?ack.code, "Connected to MQTT broker");
                            // Clean sessions drop subscriptions, so renew them on every connect.
                            let subscribed = subscribe_all(&client, self.relay.mapping()).await;
                            debug!(subscribed, "Subscriptions requested");
                        }
                        Ok(Event::Incoming(Packet::SubAck(ack))) => {
                            debug!(pkid = ack.pkid, return_codes = ?ack.return_codes, "Subscription acknowledged");
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.relay.handle_message(&publish.topic, &publish.payload).await;
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            debug!("Disconnected by broker");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "MQTT connection error");
                            debug!(delay = ?self.mqtt_config.reconnect_delay(), "Waiting before reconnecting");
                            tokio::time::sleep(self.mqtt_config.reconnect_delay()).await;
                        }
                    }
                }
            }
        }

        disconnect(&client, &mut eventloop).await;

        info!("Subscriber stopped");
        Ok(())
    }
}

/// Send DISCONNECT and drive the event loop until it has gone out.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "Could not queue disconnect");
        return;
    }

    let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    if flushed.is_err() {
        debug!("Disconnect not flushed before timeout");
    } else {
        debug!("Disconnected from MQTT broker");
    }
}
