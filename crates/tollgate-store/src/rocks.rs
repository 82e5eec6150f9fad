//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStreamStore` implementation of the
//! `StreamStore` trait.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use tollgate_core::EntryId;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{
    ClaimedEntry, Fields, GroupRecord, GroupStart, PendingEntry, StreamEntry, StreamMeta,
};
use crate::StreamStore;

/// RocksDB-backed stream store.
pub struct RocksStreamStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-modify-write sequences across column families.
    write_lock: Mutex<()>,
}

impl RocksStreamStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!("Opened stream store");
        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn meta(&self, stream: &str) -> Result<StreamMeta> {
        Ok(self
            .get(cf::STREAMS, &keys::stream_key(stream))?
            .unwrap_or_default())
    }

    fn group(&self, stream: &str, group: &str) -> Result<GroupRecord> {
        keys::validate_name(stream)?;
        keys::validate_name(group)?;
        self.get(cf::GROUPS, &keys::group_key(stream, group))?
            .ok_or_else(|| StoreError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })
    }

    fn entry(&self, stream: &str, id: EntryId) -> Result<Option<StreamEntry>> {
        Ok(self
            .get::<Fields>(cf::ENTRIES, &keys::entry_key(stream, id))?
            .map(|fields| StreamEntry { id, fields }))
    }

    fn scan_pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>> {
        let cf_pending = self.cf(cf::PENDING)?;
        let prefix = keys::group_key(stream, group);

        let mut entries = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_pending,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            entries.push(Self::deserialize(&value)?);
        }

        Ok(entries)
    }

    /// Reassign idle pending entries to `consumer`.
    ///
    /// Pending records whose entry has been trimmed are removed.
    fn transfer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        candidates: Vec<PendingEntry>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedEntry>> {
        let cf_pending = self.cf(cf::PENDING)?;
        let mut batch = WriteBatch::default();
        let mut claimed = Vec::with_capacity(candidates.len());

        for mut pending in candidates {
            let key = keys::pending_key(stream, group, pending.id);
            let Some(entry) = self.entry(stream, pending.id)? else {
                tracing::debug!(stream, group, id = %pending.id, "Dropping pending entry for trimmed entry");
                batch.delete_cf(&cf_pending, &key);
                continue;
            };

            pending.consumer = consumer.to_string();
            pending.delivery_count = pending.delivery_count.saturating_add(1);
            pending.last_delivered = now;
            batch.put_cf(&cf_pending, &key, Self::serialize(&pending)?);

            claimed.push(ClaimedEntry {
                entry,
                delivery_count: pending.delivery_count,
            });
        }

        self.write(batch)?;
        Ok(claimed)
    }
}

fn unix_millis(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp_millis()).unwrap_or(0)
}

impl StreamStore for RocksStreamStore {
    fn append(&self, stream: &str, fields: &Fields) -> Result<EntryId> {
        keys::validate_name(stream)?;
        if fields.is_empty() {
            return Err(StoreError::EmptyEntry);
        }

        let cf_streams = self.cf(cf::STREAMS)?;
        let cf_entries = self.cf(cf::ENTRIES)?;

        let _guard = self.write_lock.lock();
        let mut meta = self.meta(stream)?;
        let id = meta.last_id.successor_at(unix_millis(Utc::now()));
        meta.last_id = id;
        meta.length += 1;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_entries, keys::entry_key(stream, id), Self::serialize(fields)?);
        batch.put_cf(&cf_streams, keys::stream_key(stream), Self::serialize(&meta)?);
        self.write(batch)?;

        Ok(id)
    }

    fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<bool> {
        keys::validate_name(stream)?;
        keys::validate_name(group)?;
        let cf_groups = self.cf(cf::GROUPS)?;
        let key = keys::group_key(stream, group);

        let _guard = self.write_lock.lock();
        if self.get::<GroupRecord>(cf::GROUPS, &key)?.is_some() {
            return Ok(false);
        }

        let last_delivered = match start {
            GroupStart::Beginning => EntryId::MIN,
            GroupStart::Latest => self.meta(stream)?.last_id,
        };
        let record = GroupRecord { last_delivered };
        self.db
            .put_cf(&cf_groups, &key, Self::serialize(&record)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(stream, group, ?start, "Created consumer group");
        Ok(true)
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<ClaimedEntry>> {
        keys::validate_name(consumer)?;
        let cf_entries = self.cf(cf::ENTRIES)?;
        let cf_groups = self.cf(cf::GROUPS)?;
        let cf_pending = self.cf(cf::PENDING)?;

        let _guard = self.write_lock.lock();
        let mut record = self.group(stream, group)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let prefix = keys::stream_key(stream);
        let start = keys::entry_key(stream, record.last_delivered.next());
        let iter = self.db.iterator_cf(
            &cf_entries,
            IteratorMode::From(&start, rocksdb::Direction::Forward),
        );

        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut claimed = Vec::new();

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) || claimed.len() >= count {
                break;
            }

            let id = keys::extract_entry_id(&key)?;
            let pending = PendingEntry {
                id,
                consumer: consumer.to_string(),
                delivery_count: 1,
                last_delivered: now,
            };
            batch.put_cf(
                &cf_pending,
                keys::pending_key(stream, group, id),
                Self::serialize(&pending)?,
            );
            record.last_delivered = id;
            claimed.push(ClaimedEntry {
                entry: StreamEntry {
                    id,
                    fields: Self::deserialize(&value)?,
                },
                delivery_count: 1,
            });
        }

        if !claimed.is_empty() {
            batch.put_cf(
                &cf_groups,
                keys::group_key(stream, group),
                Self::serialize(&record)?,
            );
            self.write(batch)?;
        }

        Ok(claimed)
    }

    fn last_delivered(&self, stream: &str, group: &str) -> Result<EntryId> {
        Ok(self.group(stream, group)?.last_delivered)
    }

    fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<usize> {
        let cf_pending = self.cf(cf::PENDING)?;

        let _guard = self.write_lock.lock();
        self.group(stream, group)?;

        let mut batch = WriteBatch::default();
        let mut acked = 0;
        for id in ids {
            let key = keys::pending_key(stream, group, *id);
            let exists = self
                .db
                .get_pinned_cf(&cf_pending, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if exists {
                batch.delete_cf(&cf_pending, &key);
                acked += 1;
            }
        }

        if acked > 0 {
            self.write(batch)?;
        }
        Ok(acked)
    }

    fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>> {
        self.group(stream, group)?;
        self.scan_pending(stream, group)
    }

    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<ClaimedEntry>> {
        keys::validate_name(consumer)?;

        let _guard = self.write_lock.lock();
        self.group(stream, group)?;

        let now = Utc::now();
        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            let pending: Option<PendingEntry> =
                self.get(cf::PENDING, &keys::pending_key(stream, group, *id))?;
            if let Some(pending) = pending.filter(|p| p.idle_at(now) >= min_idle) {
                candidates.push(pending);
            }
        }

        self.transfer(stream, group, consumer, candidates, now)
    }

    fn auto_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<ClaimedEntry>> {
        keys::validate_name(consumer)?;

        let _guard = self.write_lock.lock();
        self.group(stream, group)?;

        let now = Utc::now();
        let candidates: Vec<_> = self
            .scan_pending(stream, group)?
            .into_iter()
            .filter(|p| p.idle_at(now) >= min_idle)
            .take(count)
            .collect();

        self.transfer(stream, group, consumer, candidates, now)
    }

    fn len(&self, stream: &str) -> Result<u64> {
        keys::validate_name(stream)?;
        Ok(self.meta(stream)?.length)
    }

    fn trim(&self, stream: &str, max_len: u64) -> Result<u64> {
        keys::validate_name(stream)?;
        let cf_streams = self.cf(cf::STREAMS)?;
        let cf_entries = self.cf(cf::ENTRIES)?;

        let _guard = self.write_lock.lock();
        let mut meta = self.meta(stream)?;
        if meta.length <= max_len {
            return Ok(0);
        }

        let excess = meta.length - max_len;
        let prefix = keys::stream_key(stream);
        let iter = self.db.iterator_cf(
            &cf_entries,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut batch = WriteBatch::default();
        let mut removed = 0u64;
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) || removed >= excess {
                break;
            }

            batch.delete_cf(&cf_entries, &key);
            removed += 1;
        }

        meta.length -= removed;
        batch.put_cf(&cf_streams, &prefix, Self::serialize(&meta)?);
        self.write(batch)?;

        tracing::debug!(stream, removed, remaining = meta.length, "Trimmed stream");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STREAM: &str = "notifications";
    const GROUP: &str = "notif-group";

    fn create_test_store() -> (RocksStreamStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStreamStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let (store, _dir) = create_test_store();

        let a = store.append(STREAM, &fields(&[("type", "a")])).unwrap();
        let b = store.append(STREAM, &fields(&[("type", "b")])).unwrap();
        let c = store.append(STREAM, &fields(&[("type", "c")])).unwrap();

        assert!(a < b && b < c);
        assert_eq!(store.len(STREAM).unwrap(), 3);
        assert_eq!(store.len("other").unwrap(), 0);
        assert!(store.is_empty("other").unwrap());
    }

    #[test]
    fn append_rejects_empty_entry() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.append(STREAM, &Fields::new()),
            Err(StoreError::EmptyEntry)
        ));
        assert!(matches!(
            store.append("", &fields(&[("type", "a")])),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn create_group_is_idempotent() {
        let (store, _dir) = create_test_store();
        assert!(store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap());
        assert!(!store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap());
    }

    #[test]
    fn read_from_missing_group_fails() {
        let (store, _dir) = create_test_store();
        let result = store.read_group(STREAM, "nope", "c1", 10);
        assert!(matches!(result, Err(StoreError::GroupNotFound { .. })));
    }

    #[test]
    fn read_ack_lifecycle() {
        let (store, _dir) = create_test_store();
        let id = store
            .append(STREAM, &fields(&[("type", "task_assigned"), ("task_id", "T1")]))
            .unwrap();
        store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap();

        assert_eq!(store.last_delivered(STREAM, GROUP).unwrap(), EntryId::MIN);
        let batch = store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].entry.id, id);
        assert_eq!(batch[0].entry.fields["task_id"], "T1");
        assert_eq!(store.last_delivered(STREAM, GROUP).unwrap(), id);
        assert_eq!(batch[0].delivery_count, 1);

        // Delivered exactly once.
        assert!(store.read_group(STREAM, GROUP, "c1", 10).unwrap().is_empty());

        let pending = store.pending(STREAM, GROUP).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].consumer, "c1");

        assert_eq!(store.ack(STREAM, GROUP, &[id]).unwrap(), 1);
        assert!(store.pending(STREAM, GROUP).unwrap().is_empty());
        assert_eq!(store.ack(STREAM, GROUP, &[id]).unwrap(), 0);
    }

    #[test]
    fn read_respects_count() {
        let (store, _dir) = create_test_store();
        for i in 0..5 {
            store
                .append(STREAM, &fields(&[("n", &i.to_string())]))
                .unwrap();
        }
        store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap();

        let first = store.read_group(STREAM, GROUP, "c1", 2).unwrap();
        let rest = store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(rest.len(), 3);
        assert!(first[1].entry.id < rest[0].entry.id);
    }

    #[test]
    fn latest_group_skips_existing_entries() {
        let (store, _dir) = create_test_store();
        store.append(STREAM, &fields(&[("type", "old")])).unwrap();
        store
            .create_group(STREAM, GROUP, GroupStart::Latest)
            .unwrap();
        assert!(store.read_group(STREAM, GROUP, "c1", 10).unwrap().is_empty());

        let id = store.append(STREAM, &fields(&[("type", "new")])).unwrap();
        let batch = store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].entry.id, id);
    }

    #[test]
    fn groups_are_independent() {
        let (store, _dir) = create_test_store();
        store.append(STREAM, &fields(&[("type", "a")])).unwrap();
        store
            .create_group(STREAM, "g1", GroupStart::Beginning)
            .unwrap();
        store
            .create_group(STREAM, "g2", GroupStart::Beginning)
            .unwrap();

        assert_eq!(store.read_group(STREAM, "g1", "c1", 10).unwrap().len(), 1);
        assert_eq!(store.read_group(STREAM, "g2", "c1", 10).unwrap().len(), 1);
    }

    #[test]
    fn idle_entry_is_reclaimed_by_another_consumer() {
        let (store, _dir) = create_test_store();
        let id = store.append(STREAM, &fields(&[("type", "a")])).unwrap();
        store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap();
        store.read_group(STREAM, GROUP, "c1", 10).unwrap();

        // Not idle long enough yet.
        let none = store
            .auto_claim(STREAM, GROUP, "c2", Duration::from_secs(3600), 10)
            .unwrap();
        assert!(none.is_empty());

        let reclaimed = store
            .auto_claim(STREAM, GROUP, "c2", Duration::ZERO, 10)
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].entry.id, id);
        assert_eq!(reclaimed[0].delivery_count, 2);

        let pending = store.pending(STREAM, GROUP).unwrap();
        assert_eq!(pending[0].consumer, "c2");
        assert_eq!(pending[0].delivery_count, 2);
    }

    #[test]
    fn claim_specific_ids() {
        let (store, _dir) = create_test_store();
        let a = store.append(STREAM, &fields(&[("type", "a")])).unwrap();
        let b = store.append(STREAM, &fields(&[("type", "b")])).unwrap();
        store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap();
        store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        store.ack(STREAM, GROUP, &[a]).unwrap();

        let claimed = store
            .claim(STREAM, GROUP, "c2", Duration::ZERO, &[a, b])
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].entry.id, b);
    }

    #[test]
    fn trim_drops_oldest_entries() {
        let (store, _dir) = create_test_store();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                store
                    .append(STREAM, &fields(&[("n", &i.to_string())]))
                    .unwrap(),
            );
        }

        assert_eq!(store.trim(STREAM, 2).unwrap(), 3);
        assert_eq!(store.len(STREAM).unwrap(), 2);
        assert_eq!(store.trim(STREAM, 2).unwrap(), 0);

        store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap();
        let batch = store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        let read: Vec<_> = batch.iter().map(|c| c.entry.id).collect();
        assert_eq!(read, ids[3..].to_vec());

        // Ids keep increasing after a trim.
        let next = store.append(STREAM, &fields(&[("n", "5")])).unwrap();
        assert!(next > ids[4]);
    }

    #[test]
    fn claim_drops_pending_for_trimmed_entries() {
        let (store, _dir) = create_test_store();
        store.append(STREAM, &fields(&[("type", "a")])).unwrap();
        store
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .unwrap();
        store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        store.trim(STREAM, 0).unwrap();

        let claimed = store
            .auto_claim(STREAM, GROUP, "c2", Duration::ZERO, 10)
            .unwrap();
        assert!(claimed.is_empty());
        assert!(store.pending(STREAM, GROUP).unwrap().is_empty());
    }

    #[test]
    fn streams_with_shared_prefix_are_isolated() {
        let (store, _dir) = create_test_store();
        store.append("a", &fields(&[("type", "a")])).unwrap();
        store.append("ab", &fields(&[("type", "ab")])).unwrap();
        store
            .create_group("a", GROUP, GroupStart::Beginning)
            .unwrap();

        let batch = store.read_group("a", GROUP, "c1", 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].entry.fields["type"], "a");
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = RocksStreamStore::open(dir.path()).unwrap();
            store
                .create_group(STREAM, GROUP, GroupStart::Beginning)
                .unwrap();
            store.append(STREAM, &fields(&[("type", "a")])).unwrap()
        };

        let store = RocksStreamStore::open(dir.path()).unwrap();
        assert_eq!(store.len(STREAM).unwrap(), 1);
        let batch = store.read_group(STREAM, GROUP, "c1", 10).unwrap();
        assert_eq!(batch[0].entry.id, id);
    }
}
