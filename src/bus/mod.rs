//! MQTT bus client and publication bridge.
//!
//! Wraps a single rumqttc [`AsyncClient`] behind [`BusClient`], injected into
//! the API state and the reconciler at construction. Decisions are published
//! retained on `greenhouse/{id}/readings`, so a subscriber connecting after
//! the fact still receives each greenhouse's last decision.

use std::sync::Arc;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::control::CommandSet;

/// Subscription filter matching every greenhouse's decision topic.
pub const DECISION_TOPIC_FILTER: &str = "greenhouse/+/readings";

/// Topic carrying the retained decision for one greenhouse.
pub fn decision_topic(greenhouse_id: i64) -> String {
    format!("greenhouse/{greenhouse_id}/readings")
}

/// Extract the greenhouse id from a decision topic, if the topic matches
/// `greenhouse/{id}/readings`.
pub fn parse_decision_topic(topic: &str) -> Option<i64> {
    let rest = topic.strip_prefix("greenhouse/")?;
    let (id, tail) = rest.split_once('/')?;
    if tail != "readings" {
        return None;
    }
    id.parse().ok()
}

/// Wire form of one decision: the command set plus the greenhouse id, with
/// each actuator encoded as the string `"ON"` or `"OFF"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub greenhouse_id: i64,
    #[serde(with = "onoff")]
    pub vents_on: bool,
    #[serde(with = "onoff")]
    pub fan_on: bool,
    #[serde(with = "onoff")]
    pub lights_on: bool,
    #[serde(with = "onoff")]
    pub curtains_on: bool,
    #[serde(with = "onoff")]
    pub irrigation_pump_on: bool,
    #[serde(with = "onoff")]
    pub humidifier_pump_on: bool,
    #[serde(with = "onoff")]
    pub heater_on: bool,
}

impl DecisionMessage {
    pub fn new(greenhouse_id: i64, commands: &CommandSet) -> Self {
        Self {
            greenhouse_id,
            vents_on: commands.vents_on,
            fan_on: commands.fan_on,
            lights_on: commands.lights_on,
            curtains_on: commands.curtains_on,
            irrigation_pump_on: commands.irrigation_pump_on,
            humidifier_pump_on: commands.humidifier_pump_on,
            heater_on: commands.heater_on,
        }
    }

    pub fn command_set(&self) -> CommandSet {
        CommandSet {
            vents_on: self.vents_on,
            fan_on: self.fan_on,
            lights_on: self.lights_on,
            curtains_on: self.curtains_on,
            irrigation_pump_on: self.irrigation_pump_on,
            humidifier_pump_on: self.humidifier_pump_on,
            heater_on: self.heater_on,
        }
    }
}

/// Serde adapter for the `"ON"`/`"OFF"` string encoding used on the wire.
mod onoff {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "ON" } else { "OFF" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "ON" => Ok(true),
            "OFF" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected \"ON\" or \"OFF\", got {other:?}"
            ))),
        }
    }
}

/// Cheaply cloneable handle to the process's MQTT connection.
#[derive(Debug, Clone)]
pub struct BusClient {
    inner: Arc<AsyncClient>,
}

impl BusClient {
    /// Build the client and its event loop. The caller owns the event loop:
    /// the connection only makes progress while someone polls it, so hand it
    /// to the reconciler task (or poll it in a dedicated task).
    pub fn connect(config: &Config) -> (Self, EventLoop) {
        let mut options =
            MqttOptions::new(&config.mqtt_client_id, &config.mqtt_host, config.mqtt_port);
        options.set_keep_alive(std::time::Duration::from_secs(60));

        let (client, event_loop) = AsyncClient::new(options, 16);
        info!(
            host = %config.mqtt_host,
            port = config.mqtt_port,
            client_id = %config.mqtt_client_id,
            "MQTT client created"
        );

        (
            Self {
                inner: Arc::new(client),
            },
            event_loop,
        )
    }

    /// Publish one decision, retained, on the greenhouse's topic. Returns
    /// once the message is enqueued — delivery is not awaited. Errors are the
    /// caller's to log and drop; there is no retry or local queue.
    pub async fn publish_decision(
        &self,
        greenhouse_id: i64,
        commands: &CommandSet,
    ) -> Result<()> {
        let message = DecisionMessage::new(greenhouse_id, commands);
        let payload =
            serde_json::to_vec(&message).context("failed to serialize decision message")?;
        let topic = decision_topic(greenhouse_id);

        debug!(greenhouse_id, topic = %topic, "Publishing decision");
        self.inner
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
            .context("failed to enqueue decision publish")?;
        Ok(())
    }

    /// Subscribe to every greenhouse's decision topic. Called on each
    /// ConnAck so the subscription survives reconnects.
    pub async fn subscribe_decisions(&self) -> Result<()> {
        self.inner
            .subscribe(DECISION_TOPIC_FILTER, QoS::AtLeastOnce)
            .await
            .context("failed to subscribe to decision topics")?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.inner
            .disconnect()
            .await
            .context("failed to disconnect MQTT client")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commands() -> CommandSet {
        CommandSet {
            vents_on: true,
            fan_on: true,
            lights_on: false,
            curtains_on: false,
            irrigation_pump_on: false,
            humidifier_pump_on: true,
            heater_on: false,
        }
    }

    #[test]
    fn decision_topic_matches_convention() {
        assert_eq!(decision_topic(7), "greenhouse/7/readings");
    }

    #[test]
    fn parse_decision_topic_extracts_id() {
        assert_eq!(parse_decision_topic("greenhouse/7/readings"), Some(7));
        assert_eq!(parse_decision_topic("greenhouse/123/readings"), Some(123));
    }

    #[test]
    fn parse_decision_topic_rejects_other_topics() {
        assert_eq!(parse_decision_topic("greenhouse/7/heater"), None);
        assert_eq!(parse_decision_topic("valve/7/readings"), None);
        assert_eq!(parse_decision_topic("greenhouse/abc/readings"), None);
        assert_eq!(parse_decision_topic("greenhouse/7"), None);
    }

    #[test]
    fn message_serializes_with_on_off_strings() {
        let message = DecisionMessage::new(1, &sample_commands());
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["greenhouse_id"], 1);
        assert_eq!(json["vents_on"], "ON");
        assert_eq!(json["fan_on"], "ON");
        assert_eq!(json["lights_on"], "OFF");
        assert_eq!(json["curtains_on"], "OFF");
        assert_eq!(json["irrigation_pump_on"], "OFF");
        assert_eq!(json["humidifier_pump_on"], "ON");
        assert_eq!(json["heater_on"], "OFF");
    }

    #[test]
    fn message_deserializes_back_to_the_same_commands() {
        let message = DecisionMessage::new(3, &sample_commands());
        let bytes = serde_json::to_vec(&message).unwrap();
        let parsed: DecisionMessage = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.greenhouse_id, 3);
        assert_eq!(parsed.command_set(), sample_commands());
    }

    #[test]
    fn message_rejects_unknown_state_strings() {
        let raw = r#"{
            "greenhouse_id": 1,
            "vents_on": "MAYBE",
            "fan_on": "OFF",
            "lights_on": "OFF",
            "curtains_on": "OFF",
            "irrigation_pump_on": "OFF",
            "humidifier_pump_on": "OFF",
            "heater_on": "OFF"
        }"#;
        assert!(serde_json::from_str::<DecisionMessage>(raw).is_err());
    }
}
