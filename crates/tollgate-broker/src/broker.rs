//! Publish and consume over a durable stream store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use tollgate_core::EntryId;
use tollgate_store::{ClaimedEntry, Fields, GroupStart, PendingEntry, StreamStore};

use crate::error::Result;
use crate::notification::{Notification, Target};

/// The notification broker.
///
/// Wraps a [`StreamStore`] and adds blocking reads: a reader with nothing to
/// claim parks on a [`Notify`] that every successful publish wakes.
pub struct NotificationBroker<S: StreamStore> {
    store: Arc<S>,
    appended: Notify,
}

impl<S: StreamStore> NotificationBroker<S> {
    /// Create a broker over a store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            appended: Notify::new(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Append an entry and wake blocked readers.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the append fails, or `InvalidRequest` for an
    /// empty entry or bad stream name.
    pub fn publish(&self, stream: &str, fields: &Fields) -> Result<EntryId> {
        let id = self.store.append(stream, fields).inspect_err(|e| {
            tracing::warn!(stream, error = %e, "Publish failed");
        })?;
        self.appended.notify_waiters();

        metrics::counter!("tollgate_broker_published_total", "stream" => stream.to_string())
            .increment(1);
        tracing::debug!(stream, %id, "Published entry");
        Ok(id)
    }

    /// Append a notification for `target`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedNotification` if `data` sets the reserved `id`
    /// field; otherwise see [`NotificationBroker::publish`].
    pub fn publish_notification(
        &self,
        stream: &str,
        target: &Target,
        kind: &str,
        data: Fields,
    ) -> Result<EntryId> {
        self.publish(stream, &Notification::fields(target, kind, data)?)
    }

    /// Create a consumer group if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store fails.
    pub fn ensure_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<()> {
        if self.store.create_group(stream, group, start)? {
            tracing::info!(stream, group, "Consumer group created");
        }
        Ok(())
    }

    /// Claim up to `count` new entries for `consumer`, waiting up to `block`
    /// for one to arrive.
    ///
    /// Returns an empty batch on timeout. Dropping the future while it waits
    /// claims nothing.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` for a missing group, or `Unavailable`.
    pub async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<ClaimedEntry>> {
        let deadline = Instant::now() + block;
        loop {
            // Register interest before checking, so a publish between the
            // check and the await still wakes us.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.store.read_group(stream, group, consumer, count)?;
            if !batch.is_empty() || block.is_zero() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    /// Acknowledge entries.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` for a missing group, or `Unavailable`.
    pub fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.store.ack(stream, group, ids)?)
    }

    /// The last entry id the group has read.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` for a missing group, or `Unavailable`.
    pub fn last_delivered(&self, stream: &str, group: &str) -> Result<EntryId> {
        Ok(self.store.last_delivered(stream, group)?)
    }

    /// The group's pending entries.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` for a missing group, or `Unavailable`.
    pub fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>> {
        Ok(self.store.pending(stream, group)?)
    }

    /// Transfer entries pending longer than `min_idle` to `consumer`.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` for a missing group, or `Unavailable`.
    pub fn reclaim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<ClaimedEntry>> {
        let claimed = self
            .store
            .auto_claim(stream, group, consumer, min_idle, count)?;
        if !claimed.is_empty() {
            metrics::counter!("tollgate_broker_reclaimed_total", "stream" => stream.to_string())
                .increment(claimed.len() as u64);
            tracing::info!(stream, group, consumer, count = claimed.len(), "Reclaimed idle entries");
        }
        Ok(claimed)
    }

    /// Bound the stream to `max_len` entries.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store fails.
    pub fn trim(&self, stream: &str, max_len: u64) -> Result<u64> {
        Ok(self.store.trim(stream, max_len)?)
    }
}
