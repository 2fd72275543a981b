// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Storage layer: record families, the storage contract, and the in-memory
//! single-version store.
//!
//! Keys map to one of four record shapes (scalar counters, short captions,
//! longer posts, and fixed-size thumbnails), each living in its own sub-map.
//! Every successful write also stamps the key with the store clock's current
//! reading; optimistic schedulers validate against those last-write
//! timestamps.
//!
//! The [`Storage`] trait additionally carries the per-key `lock`/`unlock`/
//! `check_write` hooks a multi-version store would need. They are no-ops in
//! the single-version [`MemoryStore`]; the parallel-OCC install path calls
//! them anyway so an MVCC store can slot in behind the same schedulers.

mod memory;
mod record;

pub use memory::{MemoryStore, StoreConfig};
pub use record::{Key, Record, RecordFamily, CAPTION_LEN, POST_LEN, THUMBNAIL_LEN};

use crate::time::Timestamp;
use crate::txn::TxnId;

/// Storage contract as consumed by the schedulers.
///
/// Implementations must be safe to call from the scheduler thread and from
/// worker threads; the schedulers guarantee that no two transactions touch
/// the same key with a concurrent writer.
pub trait Storage: Send + Sync {
    /// Returns the record stored for `key` in the given family's sub-map,
    /// or `None` if the key has never been written there.
    fn read(&self, family: RecordFamily, key: Key) -> Option<Record>;

    /// Inserts `record` under `key`, replacing any previous record of the
    /// same family, and stamps the key's last-write timestamp.
    fn write(&self, key: Key, record: Record, txn_id: TxnId);

    /// The timestamp of the last write to `key`, or [`Timestamp::ZERO`] if
    /// the key has never been written.
    fn timestamp(&self, key: Key) -> Timestamp;

    /// Pins `key` for a final version install. No-op in single-version
    /// stores.
    fn lock(&self, _key: Key) {}

    /// Releases a pin taken by [`Storage::lock`]. No-op in single-version
    /// stores.
    fn unlock(&self, _key: Key) {}

    /// Whether `txn_id` may install a version at `key`. Always true in
    /// single-version stores.
    fn check_write(&self, _key: Key, _txn_id: TxnId) -> bool {
        true
    }
}
