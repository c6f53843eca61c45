//! Consumer side of the decision pipeline.
//!
//! Subscribes to every greenhouse's retained decision topic, and on each
//! message diffs the incoming command set against the latest persisted
//! actuator status (id and timestamp excluded). Only a real change appends a
//! new status row; identical state is a no-op. The reconciler keeps no cache
//! between messages — the store is the single source of truth — and a failed
//! or timed-out attempt is logged and dropped, never retried, so the whole
//! path stays at-most-once.
//!
//! The fetch-then-append sequence is not guarded against a concurrent
//! reconciliation for the same greenhouse; two racing attempts can append
//! duplicate identical rows, which the append-only model tolerates.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{Event, EventLoop, Packet};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::bus::{parse_decision_topic, BusClient, DecisionMessage};
use crate::control::CommandSet;
use crate::db::models::ActuatorStatus;

/// Read/write interface to the durable actuator-status store. Status rows
/// are append-only; `append` creates a new history row and never mutates.
pub trait StatusStore: Send + Sync {
    fn latest(
        &self,
        greenhouse_id: i64,
    ) -> impl Future<Output = Result<Option<ActuatorStatus>>> + Send;

    fn append(
        &self,
        greenhouse_id: i64,
        commands: CommandSet,
    ) -> impl Future<Output = Result<ActuatorStatus>> + Send;
}

/// Postgres-backed status store.
#[derive(Debug, Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl StatusStore for PgStatusStore {
    async fn latest(&self, greenhouse_id: i64) -> Result<Option<ActuatorStatus>> {
        let row = sqlx::query_as::<_, ActuatorStatus>(
            "SELECT id, greenhouse_id, recorded_at, vents_on, fan_on, lights_on, \
                    curtains_on, irrigation_pump_on, humidifier_pump_on, heater_on \
             FROM actuator_status \
             WHERE greenhouse_id = $1 \
             ORDER BY recorded_at DESC \
             LIMIT 1",
        )
        .bind(greenhouse_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch latest actuator status")?;
        Ok(row)
    }

    async fn append(&self, greenhouse_id: i64, commands: CommandSet) -> Result<ActuatorStatus> {
        let row = sqlx::query_as::<_, ActuatorStatus>(
            "INSERT INTO actuator_status \
                 (greenhouse_id, vents_on, fan_on, lights_on, curtains_on, \
                  irrigation_pump_on, humidifier_pump_on, heater_on) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, greenhouse_id, recorded_at, vents_on, fan_on, lights_on, \
                       curtains_on, irrigation_pump_on, humidifier_pump_on, heater_on",
        )
        .bind(greenhouse_id)
        .bind(commands.vents_on)
        .bind(commands.fan_on)
        .bind(commands.lights_on)
        .bind(commands.curtains_on)
        .bind(commands.irrigation_pump_on)
        .bind(commands.humidifier_pump_on)
        .bind(commands.heater_on)
        .fetch_one(&self.pool)
        .await
        .context("failed to append actuator status")?;
        Ok(row)
    }
}

pub struct Reconciler<S: StatusStore> {
    bus: BusClient,
    store: S,
    store_timeout: Duration,
}

impl<S: StatusStore> Reconciler<S> {
    pub fn new(bus: BusClient, store: S, store_timeout: Duration) -> Self {
        Self {
            bus,
            store,
            store_timeout,
        }
    }

    /// Drive the MQTT event loop indefinitely. Intended to be
    /// `tokio::spawn`-ed from main; the connection only makes progress while
    /// this loop polls.
    pub async fn run(self, mut event_loop: EventLoop) {
        info!("Reconciler loop started");
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    // Subscribe on every ConnAck so reconnects pick the
                    // decision topics back up (retained messages replay).
                    if let Err(e) = self.bus.subscribe_decisions().await {
                        error!(error = %e, "Failed to subscribe to decision topics");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.handle_publish(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "MQTT event loop error — reconnecting");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle_publish(&self, topic: &str, payload: &[u8]) {
        let Some(greenhouse_id) = parse_decision_topic(topic) else {
            debug!(topic = %topic, "Ignoring message on non-decision topic");
            return;
        };

        let message: DecisionMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(greenhouse_id, error = %e, "Malformed decision payload — dropping");
                return;
            }
        };

        if let Err(e) = self.reconcile(greenhouse_id, message.command_set()).await {
            warn!(greenhouse_id, error = %e, "Reconciliation attempt dropped");
        }
    }

    /// Fetch-then-conditionally-append for one decision. A missing prior
    /// record always writes; a fetch or append failure/timeout fails this
    /// attempt only.
    pub async fn reconcile(&self, greenhouse_id: i64, incoming: CommandSet) -> Result<()> {
        let prior = tokio::time::timeout(self.store_timeout, self.store.latest(greenhouse_id))
            .await
            .context("status fetch timed out")??;

        if let Some(ref prior) = prior {
            if prior.command_set() == incoming {
                debug!(greenhouse_id, "Actuator state unchanged — no write");
                return Ok(());
            }
        }

        let appended = tokio::time::timeout(
            self.store_timeout,
            self.store.append(greenhouse_id, incoming),
        )
        .await
        .context("status append timed out")??;

        info!(
            greenhouse_id,
            status_id = appended.id,
            had_prior = prior.is_some(),
            "Actuator state change persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::bus::DecisionMessage;
    use crate::config::Config;

    /// In-memory append-only status store.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<i64, Vec<ActuatorStatus>>>,
        next_id: AtomicI64,
    }

    impl MemoryStore {
        fn row_count(&self, greenhouse_id: i64) -> usize {
            self.rows
                .lock()
                .unwrap()
                .get(&greenhouse_id)
                .map_or(0, Vec::len)
        }
    }

    impl StatusStore for &MemoryStore {
        async fn latest(&self, greenhouse_id: i64) -> Result<Option<ActuatorStatus>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&greenhouse_id)
                .and_then(|v| v.last().cloned()))
        }

        async fn append(&self, greenhouse_id: i64, commands: CommandSet) -> Result<ActuatorStatus> {
            let status = ActuatorStatus {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                greenhouse_id,
                recorded_at: Utc::now(),
                vents_on: commands.vents_on,
                fan_on: commands.fan_on,
                lights_on: commands.lights_on,
                curtains_on: commands.curtains_on,
                irrigation_pump_on: commands.irrigation_pump_on,
                humidifier_pump_on: commands.humidifier_pump_on,
                heater_on: commands.heater_on,
            };
            self.rows
                .lock()
                .unwrap()
                .entry(greenhouse_id)
                .or_default()
                .push(status.clone());
            Ok(status)
        }
    }

    /// Store whose fetch always fails, for the drop-on-error path.
    struct BrokenStore;

    impl StatusStore for BrokenStore {
        async fn latest(&self, _greenhouse_id: i64) -> Result<Option<ActuatorStatus>> {
            anyhow::bail!("store unreachable")
        }

        async fn append(&self, _greenhouse_id: i64, _commands: CommandSet) -> Result<ActuatorStatus> {
            anyhow::bail!("store unreachable")
        }
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgres://unused".into(),
            mqtt_host: "127.0.0.1".into(),
            mqtt_port: 1883,
            mqtt_client_id: "test-reconciler".into(),
            server_host: "127.0.0.1".into(),
            server_port: 0,
            store_timeout_secs: 5,
        }
    }

    /// MQTT client without a broker: the event loop is never polled, so
    /// publishes and subscribes just accumulate in the internal channel. It
    /// must stay alive for the test or client calls error out.
    fn test_bus() -> (BusClient, EventLoop) {
        BusClient::connect(&test_config())
    }

    fn reconciler<S: StatusStore>(store: S) -> (Reconciler<S>, EventLoop) {
        let (bus, event_loop) = test_bus();
        (
            Reconciler::new(bus, store, Duration::from_secs(5)),
            event_loop,
        )
    }

    fn sample_commands() -> CommandSet {
        CommandSet {
            vents_on: true,
            fan_on: true,
            humidifier_pump_on: true,
            ..CommandSet::default()
        }
    }

    #[tokio::test]
    async fn empty_store_always_writes() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        rec.reconcile(1, sample_commands()).await.unwrap();
        assert_eq!(store.row_count(1), 1);
    }

    #[tokio::test]
    async fn identical_state_is_not_rewritten() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        rec.reconcile(1, sample_commands()).await.unwrap();
        rec.reconcile(1, sample_commands()).await.unwrap();

        // Second reconciliation sees identical booleans and suppresses the
        // redundant write.
        assert_eq!(store.row_count(1), 1);
    }

    #[tokio::test]
    async fn changed_state_appends_a_new_row() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        rec.reconcile(1, sample_commands()).await.unwrap();

        let mut changed = sample_commands();
        changed.heater_on = true;
        rec.reconcile(1, changed).await.unwrap();

        assert_eq!(store.row_count(1), 2);
        let latest = (&store).latest(1).await.unwrap().unwrap();
        assert!(latest.heater_on);
    }

    #[tokio::test]
    async fn greenhouses_reconcile_independently() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        rec.reconcile(1, sample_commands()).await.unwrap();
        rec.reconcile(2, sample_commands()).await.unwrap();

        assert_eq!(store.row_count(1), 1);
        assert_eq!(store.row_count(2), 1);
    }

    #[tokio::test]
    async fn round_trip_preserves_the_command_set() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        let commands = sample_commands();
        rec.reconcile(9, commands).await.unwrap();

        let fetched = (&store).latest(9).await.unwrap().unwrap();
        assert_eq!(fetched.command_set(), commands);
    }

    #[tokio::test]
    async fn store_failure_is_an_error_not_a_panic() {
        let (rec, _el) = reconciler(BrokenStore);
        let err = rec.reconcile(1, sample_commands()).await.unwrap_err();
        assert!(err.to_string().contains("store unreachable"));
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_without_write() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        rec.handle_publish("greenhouse/1/readings", b"not json").await;
        assert_eq!(store.row_count(1), 0);
    }

    #[tokio::test]
    async fn non_decision_topics_are_ignored() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        let payload = serde_json::to_vec(&DecisionMessage::new(1, &sample_commands())).unwrap();
        rec.handle_publish("greenhouse/1/heater", &payload).await;
        assert_eq!(store.row_count(1), 0);
    }

    #[tokio::test]
    async fn published_decision_payload_reconciles() {
        let store = MemoryStore::default();
        let (rec, _el) = reconciler(&store);

        let payload = serde_json::to_vec(&DecisionMessage::new(4, &sample_commands())).unwrap();
        rec.handle_publish("greenhouse/4/readings", &payload).await;

        assert_eq!(store.row_count(4), 1);
        let latest = (&store).latest(4).await.unwrap().unwrap();
        assert_eq!(latest.command_set(), sample_commands());
    }
}
