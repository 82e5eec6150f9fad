//! The long-lived delivery loop.
//!
//! A [`DeliveryConsumer`] reads a stream through one consumer group, hands
//! each notification to a [`NotificationSink`], and acknowledges it. A
//! periodic pending scan re-delivers entries another consumer claimed but
//! never acknowledged. Entries delivered too often, or that cannot be parsed,
//! are copied to `<stream>:dead` and acknowledged.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use tollgate_core::EntryId;
use tollgate_store::{ClaimedEntry, GroupStart, StreamStore};

use crate::broker::NotificationBroker;
use crate::error::Result;
use crate::notification::{Notification, NotificationSink, Target};

/// Field recording why an entry was dead-lettered.
pub const DEAD_REASON_FIELD: &str = "dead_reason";
/// Field recording the id an entry had on its original stream.
pub const ORIGINAL_ID_FIELD: &str = "original_id";

/// Configuration for a delivery consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Stream to consume.
    #[serde(default = "ConsumerConfig::default_stream")]
    pub stream: String,
    /// Consumer group name.
    #[serde(default = "ConsumerConfig::default_group")]
    pub group: String,
    /// This consumer's name within the group.
    #[serde(default = "ConsumerConfig::default_consumer")]
    pub consumer: String,
    /// Where the group starts if it has to be created.
    #[serde(default)]
    pub start: GroupStart,
    /// Maximum entries per read.
    #[serde(default = "ConsumerConfig::default_batch_size")]
    pub batch_size: usize,
    /// How long a read waits for new entries (milliseconds).
    #[serde(default = "ConsumerConfig::default_block_ms")]
    pub block_ms: u64,
    /// Minimum idle time before a pending entry is reclaimed (seconds).
    #[serde(default = "ConsumerConfig::default_reclaim_idle")]
    pub reclaim_idle_seconds: u64,
    /// Interval between pending scans (seconds).
    #[serde(default = "ConsumerConfig::default_reclaim_interval")]
    pub reclaim_interval_seconds: u64,
    /// Deliveries after which an entry is dead-lettered.
    #[serde(default = "ConsumerConfig::default_max_deliveries")]
    pub max_deliveries: u32,
}

impl ConsumerConfig {
    fn default_stream() -> String {
        "notifications".to_string()
    }

    fn default_group() -> String {
        "notif-group".to_string()
    }

    fn default_consumer() -> String {
        "gateway-1".to_string()
    }

    const fn default_batch_size() -> usize {
        64
    }

    const fn default_block_ms() -> u64 {
        5_000
    }

    const fn default_reclaim_idle() -> u64 {
        30
    }

    const fn default_reclaim_interval() -> u64 {
        10
    }

    const fn default_max_deliveries() -> u32 {
        5
    }

    /// The dead-letter stream for this consumer's stream.
    #[must_use]
    pub fn dead_letter_stream(&self) -> String {
        format!("{}:dead", self.stream)
    }

    /// Read block duration.
    #[must_use]
    pub const fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    /// Minimum idle time before reclaim.
    #[must_use]
    pub const fn reclaim_idle(&self) -> Duration {
        Duration::from_secs(self.reclaim_idle_seconds)
    }

    /// Interval between pending scans, never zero.
    #[must_use]
    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_seconds.max(1))
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream: Self::default_stream(),
            group: Self::default_group(),
            consumer: Self::default_consumer(),
            start: GroupStart::default(),
            batch_size: Self::default_batch_size(),
            block_ms: Self::default_block_ms(),
            reclaim_idle_seconds: Self::default_reclaim_idle(),
            reclaim_interval_seconds: Self::default_reclaim_interval(),
            max_deliveries: Self::default_max_deliveries(),
        }
    }
}

/// Consumes one stream through one group and feeds a sink.
pub struct DeliveryConsumer<S: StreamStore, K: NotificationSink + ?Sized> {
    broker: Arc<NotificationBroker<S>>,
    sink: Arc<K>,
    config: ConsumerConfig,
}

impl<S: StreamStore, K: NotificationSink + ?Sized> DeliveryConsumer<S, K> {
    /// Create a consumer.
    #[must_use]
    pub fn new(broker: Arc<NotificationBroker<S>>, sink: Arc<K>, config: ConsumerConfig) -> Self {
        Self {
            broker,
            sink,
            config,
        }
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    ///
    /// A batch already in hand is delivered and acknowledged before the loop
    /// exits.
    ///
    /// # Errors
    ///
    /// Returns an error only if the consumer group cannot be created.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let cfg = &self.config;
        self.broker.ensure_group(&cfg.stream, &cfg.group, cfg.start)?;

        let mut reclaim = tokio::time::interval(cfg.reclaim_interval());
        reclaim.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            stream = %cfg.stream,
            group = %cfg.group,
            consumer = %cfg.consumer,
            "Delivery consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = reclaim.tick() => {
                    match self.broker.reclaim_idle(
                        &cfg.stream,
                        &cfg.group,
                        &cfg.consumer,
                        cfg.reclaim_idle(),
                        cfg.batch_size,
                    ) {
                        Ok(batch) => self.deliver(batch).await,
                        Err(e) => tracing::warn!(error = %e, "Pending scan failed"),
                    }
                }

                result = self.broker.read(
                    &cfg.stream,
                    &cfg.group,
                    &cfg.consumer,
                    cfg.batch_size,
                    cfg.block(),
                ) => {
                    match result {
                        Ok(batch) => self.deliver(batch).await,
                        Err(e) => {
                            metrics::counter!("tollgate_consumer_errors_total").increment(1);
                            tracing::warn!(error = %e, "Stream read failed");
                            tokio::select! {
                                _ = shutdown.changed() => {}
                                () = tokio::time::sleep(Duration::from_secs(1)) => {}
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(consumer = %cfg.consumer, "Delivery consumer stopped");
        Ok(())
    }

    /// Deliver a batch and acknowledge what was handled.
    ///
    /// An entry whose dead-letter copy fails to append stays pending.
    pub async fn deliver(&self, batch: Vec<ClaimedEntry>) {
        if batch.is_empty() {
            return;
        }
        let cfg = &self.config;
        let mut handled: Vec<EntryId> = Vec::with_capacity(batch.len());

        for claimed in batch {
            let id = claimed.entry.id;

            if claimed.delivery_count > cfg.max_deliveries {
                let reason = format!("exceeded {} deliveries", cfg.max_deliveries);
                if self.dead_letter(&claimed, &reason) {
                    handled.push(id);
                }
                continue;
            }

            match Notification::from_entry(&claimed.entry) {
                Ok(notification) => {
                    let payload: Arc<str> = Arc::from(notification.to_json());
                    let delivered = match &notification.target {
                        Target::User(user) => self.sink.send_to_user(user, payload).await,
                        Target::Broadcast => self.sink.broadcast(payload).await,
                    };
                    metrics::counter!("tollgate_notifications_delivered_total")
                        .increment(delivered as u64);
                    tracing::debug!(
                        %id,
                        kind = %notification.kind,
                        target = ?notification.target,
                        delivered,
                        "Notification delivered"
                    );
                    handled.push(id);
                }
                Err(e) => {
                    if self.dead_letter(&claimed, &e.to_string()) {
                        handled.push(id);
                    }
                }
            }
        }

        if let Err(e) = self.broker.ack(&cfg.stream, &cfg.group, &handled) {
            tracing::warn!(error = %e, count = handled.len(), "Acknowledgement failed");
        }
    }

    fn dead_letter(&self, claimed: &ClaimedEntry, reason: &str) -> bool {
        let mut fields = claimed.entry.fields.clone();
        fields.insert(DEAD_REASON_FIELD.to_string(), reason.to_string());
        fields.insert(ORIGINAL_ID_FIELD.to_string(), claimed.entry.id.to_string());

        let stream = self.config.dead_letter_stream();
        match self.broker.publish(&stream, &fields) {
            Ok(dead_id) => {
                metrics::counter!("tollgate_notifications_dead_lettered_total").increment(1);
                tracing::warn!(
                    id = %claimed.entry.id,
                    %dead_id,
                    reason,
                    "Entry moved to dead-letter stream"
                );
                true
            }
            Err(e) => {
                tracing::error!(id = %claimed.entry.id, error = %e, "Dead-letter append failed");
                false
            }
        }
    }
}
