// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock manager contract and types.

use crate::store::Key;

use super::TxnId;

/// Lock modes for read/write access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared lock for reads (multiple readers allowed).
    Shared,
    /// Exclusive lock for writes (single writer, no readers).
    Exclusive,
}

/// Lock manager interface shared by the four table variants.
///
/// Each key owns a FIFO queue of requests whose *granted prefix* is either a
/// single exclusive request at the head or a maximal run of shared requests
/// from the head. All variants are internally synchronized and may be called
/// from worker threads.
pub trait LockManager: Send + Sync {
    /// Requests a shared lock on `key`.
    ///
    /// Returns true iff the request is in the granted prefix as of this call
    /// (the priority variant additionally grants ahead of strictly
    /// lower-priority waiters). When false, the transaction's wait counter is
    /// incremented; the release path wakes it once the lock is truly held.
    fn read_lock(&self, txn: TxnId, key: Key) -> bool;

    /// Requests an exclusive lock on `key`. Semantics as [`read_lock`].
    ///
    /// [`read_lock`]: LockManager::read_lock
    fn write_lock(&self, txn: TxnId, key: Key) -> bool;

    /// Removes `txn`'s request for `key`, promoting successors into the
    /// granted prefix. Each promoted owner's wait counter is decremented;
    /// owners reaching zero are pushed onto the shared ready queue.
    fn release(&self, txn: TxnId, key: Key);

    /// The granted prefix's mode and owners, or `None` when unlocked.
    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)>;

    /// True iff `txn` is not waiting on any key. Removes a zeroed wait
    /// counter entry.
    fn ready_execute(&self, txn: TxnId) -> bool;

    /// Parks the caller briefly until a release may have changed grant
    /// state. Retry loops use this instead of spinning.
    fn wait_for_release(&self) {
        std::thread::yield_now();
    }
}
