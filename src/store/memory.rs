// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Single-version in-memory store.

use std::sync::Arc;

use dashmap::DashMap;

use crate::time::{Clock, Timestamp};
use crate::txn::TxnId;

use super::record::{Key, Record, RecordFamily, CAPTION_LEN, POST_LEN, THUMBNAIL_LEN};
use super::Storage;

/// How many keys to pre-populate per family.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub counts: usize,
    pub captions: usize,
    pub posts: usize,
    pub thumbnails: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            counts: 1000,
            captions: 1000,
            posts: 1000,
            thumbnails: 1000,
        }
    }
}

/// Single-version store: one sub-map per record family plus a family-shared
/// last-write timestamp map.
///
/// The sub-maps are sharded concurrent maps so that disjoint-key accesses
/// from the scheduler and worker threads are safe; the schedulers guarantee
/// no key sees a reader alongside a concurrent writer.
pub struct MemoryStore {
    counts: DashMap<Key, Record>,
    captions: DashMap<Key, Record>,
    posts: DashMap<Key, Record>,
    thumbnails: DashMap<Key, Record>,
    timestamps: DashMap<Key, Timestamp>,
    clock: Arc<Clock>,
}

impl MemoryStore {
    /// Creates an empty store reading the given clock.
    pub fn new(clock: Arc<Clock>) -> Self {
        Self {
            counts: DashMap::new(),
            captions: DashMap::new(),
            posts: DashMap::new(),
            thumbnails: DashMap::new(),
            timestamps: DashMap::new(),
            clock,
        }
    }

    /// Creates a store pre-populated per `config`.
    pub fn seeded(config: &StoreConfig, clock: Arc<Clock>) -> Self {
        let store = Self::new(clock);
        store.seed(config);
        store
    }

    /// Pre-populates each family: counters zeroed, byte records `'a'`-filled.
    pub fn seed(&self, config: &StoreConfig) {
        for key in 0..config.counts as Key {
            self.write(key, Record::Count(0), TxnId(0));
        }
        for key in 0..config.captions as Key {
            self.write(key, Record::Caption([b'a'; CAPTION_LEN]), TxnId(0));
        }
        for key in 0..config.posts as Key {
            self.write(key, Record::Post([b'a'; POST_LEN]), TxnId(0));
        }
        for key in 0..config.thumbnails as Key {
            self.write(key, Record::Thumbnail([b'a'; THUMBNAIL_LEN]), TxnId(0));
        }
    }

    #[inline]
    fn sub_map(&self, family: RecordFamily) -> &DashMap<Key, Record> {
        match family {
            RecordFamily::Count => &self.counts,
            RecordFamily::Caption => &self.captions,
            RecordFamily::Post => &self.posts,
            RecordFamily::Thumbnail => &self.thumbnails,
        }
    }
}

impl Storage for MemoryStore {
    fn read(&self, family: RecordFamily, key: Key) -> Option<Record> {
        self.sub_map(family).get(&key).map(|entry| *entry.value())
    }

    fn write(&self, key: Key, record: Record, _txn_id: TxnId) {
        self.sub_map(record.family()).insert(key, record);
        self.timestamps.insert(key, self.clock.now());
    }

    fn timestamp(&self, key: Key) -> Timestamp {
        self.timestamps
            .get(&key)
            .map(|entry| *entry.value())
            .unwrap_or(Timestamp::ZERO)
    }
}
