//! MQTT Worker
//!
//! Owns the broker connection and hands each publish to the pipeline on its
//! own task.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::pipeline::{InboundMessage, Pipeline, Routes};

const REQUEST_CAPACITY: usize = 64;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub struct MqttWorker {
    settings: MqttSettings,
    pipeline: Arc<Pipeline>,
}

impl MqttWorker {
    pub fn new(settings: MqttSettings, pipeline: Arc<Pipeline>) -> Self {
        Self { settings, pipeline }
    }

    fn options(&self) -> MqttOptions {
        let s = &self.settings;
        let mut options = MqttOptions::new(s.client_id.clone(), s.host.clone(), s.port);
        options.set_keep_alive(s.keep_alive);
        if let Some(username) = &s.username {
            options.set_credentials(username.clone(), s.password.clone().unwrap_or_default());
        }
        options
    }

    /// Distinct topic filters to subscribe to
    pub fn filters(&self) -> Vec<String> {
        let mut filters = vec![self.settings.realtime_topic.clone()];
        if self.settings.pipeline_topic != self.settings.realtime_topic {
            filters.push(self.settings.pipeline_topic.clone());
        }
        filters
    }

    pub fn routes_for(&self, topic: &str) -> Routes {
        Routes {
            raw: topic_matches(&self.settings.realtime_topic, topic),
            sample: topic_matches(&self.settings.pipeline_topic, topic),
        }
    }

    /// Poll the broker until the task is aborted. Connection errors are
    /// retried after a fixed back-off; rumqttc reconnects on the next poll.
    pub async fn run(self) {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        info!(
            host = %self.settings.host,
            port = self.settings.port,
            filters = ?self.filters(),
            "Starting MQTT worker"
        );

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    self.subscribe(&client);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let routes = self.routes_for(&publish.topic);
                    if !routes.any() {
                        debug!(topic = %publish.topic, "Publish matches no route");
                        continue;
                    }

                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload,
                        retained: publish.retain,
                    };
                    let pipeline = self.pipeline.clone();
                    tokio::spawn(async move {
                        pipeline.handle(message, routes).await;
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, backoff_secs = RECONNECT_BACKOFF.as_secs(), "MQTT connection error");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    // runs on every ConnAck so a reconnect restores the subscriptions
    fn subscribe(&self, client: &AsyncClient) {
        for filter in self.filters() {
            match client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                Ok(()) => info!(topic = %filter, "Subscribed"),
                Err(e) => error!(topic = %filter, error = %e, "Subscribe failed"),
            }
        }
    }
}

/// MQTT topic filter matching with `+` (one level) and `#` (remaining levels)
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    // wildcards never match system topics at the first level
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
