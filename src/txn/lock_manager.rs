// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The four lock-table variants.
//!
//! All variants share the per-key FIFO queue and wait-counter data model and
//! differ only in their grant policies:
//!
//! - [`ExclusiveLockManager`]: exclusive-only; reads alias writes.
//! - [`SharedExclusiveLockManager`]: arrival-order shared/exclusive.
//! - [`PriorityLockManager`]: shared/exclusive grants plus deterministic
//!   grant-ahead over strictly lower-priority waiters.
//! - [`NoWaitLockManager`]: grants only on an empty queue, refusing without
//!   enqueueing otherwise; contention aborts instead of waiting.
//!
//! Every variant is guarded by a single mutex over the table so that worker
//! threads may call it directly. Newly promoted transactions whose wait
//! counter reaches zero are pushed onto the ready queue shared with the
//! scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use crate::store::Key;

use super::lock::{LockManager, LockMode};
use super::TxnId;

struct LockRequest {
    mode: LockMode,
    owner: TxnId,
    granted: bool,
}

/// Queue and wait-counter state common to all variants.
#[derive(Default)]
struct LockQueues {
    table: HashMap<Key, VecDeque<LockRequest>>,
    waits: HashMap<TxnId, usize>,
}

impl LockQueues {
    /// Appends a request, granting it iff compatible with the whole queue:
    /// an exclusive request needs an empty queue, a shared request a queue
    /// holding only shared requests. Refused requests bump the owner's wait
    /// counter.
    fn append(&mut self, key: Key, mode: LockMode, owner: TxnId) -> bool {
        let queue = self.table.entry(key).or_default();
        let granted = match mode {
            LockMode::Exclusive => queue.is_empty(),
            LockMode::Shared => queue.iter().all(|request| request.mode == LockMode::Shared),
        };
        queue.push_back(LockRequest {
            mode,
            owner,
            granted,
        });
        if !granted {
            *self.waits.entry(owner).or_insert(0) += 1;
        }
        granted
    }

    /// [`append`] plus the deterministic grant-ahead rule: also report
    /// success when every already-queued request belongs to a strictly
    /// lower-priority (greater-id) owner. The wait counter is still bumped on
    /// a refused grant; the promotion path clears it once the lock is truly
    /// held.
    ///
    /// [`append`]: LockQueues::append
    fn append_with_priority(&mut self, key: Key, mode: LockMode, owner: TxnId) -> bool {
        let ahead_of_waiters = self
            .table
            .get(&key)
            .map_or(true, |queue| queue.iter().all(|request| request.owner > owner));
        let granted = self.append(key, mode, owner);
        granted || ahead_of_waiters
    }

    /// Removes `owner`'s request for `key` and promotes successors into the
    /// granted prefix: a single exclusive head, or the maximal contiguous
    /// shared run. Returns owners whose wait counter reached zero.
    fn remove(&mut self, key: Key, owner: TxnId) -> Vec<TxnId> {
        let Some(queue) = self.table.get_mut(&key) else {
            return Vec::new();
        };
        let Some(position) = queue.iter().position(|request| request.owner == owner) else {
            return Vec::new();
        };
        let mut abandoned_waiter = None;
        if let Some(removed) = queue.remove(position) {
            if !removed.granted {
                // The owner abandoned a waiting request; settle its counter
                // without waking it.
                abandoned_waiter = Some(removed.owner);
            }
        }

        let mut promoted = Vec::new();
        if let Some(head_mode) = queue.front().map(|request| request.mode) {
            let prefix_len = match head_mode {
                LockMode::Exclusive => 1,
                LockMode::Shared => queue
                    .iter()
                    .take_while(|request| request.mode == LockMode::Shared)
                    .count(),
            };
            for request in queue.iter_mut().take(prefix_len) {
                if !request.granted {
                    request.granted = true;
                    promoted.push(request.owner);
                }
            }
        }
        if queue.is_empty() {
            self.table.remove(&key);
        }

        if let Some(owner) = abandoned_waiter {
            self.decrement_wait(owner);
        }

        let mut ready = Vec::new();
        for owner in promoted {
            if self.decrement_wait(owner) {
                ready.push(owner);
            }
        }
        ready
    }

    /// Decrements `owner`'s wait counter; true when it reaches zero.
    fn decrement_wait(&mut self, owner: TxnId) -> bool {
        if let Some(count) = self.waits.get_mut(&owner) {
            *count -= 1;
            if *count == 0 {
                self.waits.remove(&owner);
                return true;
            }
        }
        false
    }

    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)> {
        let queue = self.table.get(&key)?;
        let head_mode = queue.front().map(|request| request.mode)?;
        let owners: Vec<TxnId> = queue
            .iter()
            .take_while(|request| request.granted)
            .map(|request| request.owner)
            .collect();
        if owners.is_empty() {
            return None;
        }
        Some((head_mode, owners))
    }

    fn ready_execute(&mut self, owner: TxnId) -> bool {
        match self.waits.get(&owner) {
            Some(count) if *count > 0 => false,
            Some(_) => {
                self.waits.remove(&owner);
                true
            }
            None => true,
        }
    }

    /// Checks the granted-prefix invariant on every queue: granted flags
    /// form a prefix that is either one exclusive request or a contiguous
    /// shared run.
    #[cfg(test)]
    fn assert_queue_invariants(&self) {
        for (key, queue) in &self.table {
            let prefix_len = queue.iter().take_while(|request| request.granted).count();
            assert!(
                queue.iter().skip(prefix_len).all(|request| !request.granted),
                "granted requests must form a prefix on key {key}"
            );
            assert!(
                prefix_len >= 1 || queue.is_empty(),
                "non-empty queue must have a granted head on key {key}"
            );
            if prefix_len > 1 {
                assert!(
                    queue
                        .iter()
                        .take(prefix_len)
                        .all(|request| request.mode == LockMode::Shared),
                    "multi-request granted prefix must be all shared on key {key}"
                );
            }
        }
    }
}

/// Mutex-guarded queue state plus the ready queue shared with the scheduler.
struct LockTable {
    state: Mutex<LockQueues>,
    ready: Arc<SegQueue<TxnId>>,
}

impl LockTable {
    fn new(ready: Arc<SegQueue<TxnId>>) -> Self {
        Self {
            state: Mutex::new(LockQueues::default()),
            ready,
        }
    }

    fn acquire(&self, txn: TxnId, key: Key, mode: LockMode) -> bool {
        self.state.lock().append(key, mode, txn)
    }

    fn acquire_with_priority(&self, txn: TxnId, key: Key, mode: LockMode) -> bool {
        self.state.lock().append_with_priority(key, mode, txn)
    }

    fn release(&self, txn: TxnId, key: Key) {
        let ready = self.state.lock().remove(key, txn);
        for owner in ready {
            self.ready.push(owner);
        }
    }

    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)> {
        self.state.lock().status(key)
    }

    fn ready_execute(&self, txn: TxnId) -> bool {
        self.state.lock().ready_execute(txn)
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        self.state.lock().assert_queue_invariants();
    }
}

/// Variant A: exclusive-only locking. Read locks alias write locks, used
/// when the workload model collapses to a single mode.
pub struct ExclusiveLockManager {
    table: LockTable,
}

impl ExclusiveLockManager {
    pub fn new(ready: Arc<SegQueue<TxnId>>) -> Self {
        Self {
            table: LockTable::new(ready),
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.table.check_invariants();
    }
}

impl LockManager for ExclusiveLockManager {
    fn read_lock(&self, txn: TxnId, key: Key) -> bool {
        self.write_lock(txn, key)
    }

    fn write_lock(&self, txn: TxnId, key: Key) -> bool {
        self.table.acquire(txn, key, LockMode::Exclusive)
    }

    fn release(&self, txn: TxnId, key: Key) {
        self.table.release(txn, key);
    }

    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)> {
        self.table.status(key)
    }

    fn ready_execute(&self, txn: TxnId) -> bool {
        self.table.ready_execute(txn)
    }
}

/// Variant B: shared/exclusive locking in strict arrival order.
pub struct SharedExclusiveLockManager {
    table: LockTable,
}

impl SharedExclusiveLockManager {
    pub fn new(ready: Arc<SegQueue<TxnId>>) -> Self {
        Self {
            table: LockTable::new(ready),
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.table.check_invariants();
    }
}

impl LockManager for SharedExclusiveLockManager {
    fn read_lock(&self, txn: TxnId, key: Key) -> bool {
        self.table.acquire(txn, key, LockMode::Shared)
    }

    fn write_lock(&self, txn: TxnId, key: Key) -> bool {
        self.table.acquire(txn, key, LockMode::Exclusive)
    }

    fn release(&self, txn: TxnId, key: Key) {
        self.table.release(txn, key);
    }

    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)> {
        self.table.status(key)
    }

    fn ready_execute(&self, txn: TxnId) -> bool {
        self.table.ready_execute(txn)
    }
}

/// Variant C: deterministic priority locking.
///
/// Grants like the shared/exclusive table, but `*_lock` also reports success
/// when every earlier queued request belongs to a strictly lower-priority
/// transaction. Dispatch still gates on [`LockManager::ready_execute`], so a
/// grant-ahead transaction runs only once the promotion path has cleared its
/// wait counter.
pub struct PriorityLockManager {
    table: LockTable,
}

impl PriorityLockManager {
    pub fn new(ready: Arc<SegQueue<TxnId>>) -> Self {
        Self {
            table: LockTable::new(ready),
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.table.check_invariants();
    }
}

impl LockManager for PriorityLockManager {
    fn read_lock(&self, txn: TxnId, key: Key) -> bool {
        self.table.acquire_with_priority(txn, key, LockMode::Shared)
    }

    fn write_lock(&self, txn: TxnId, key: Key) -> bool {
        self.table
            .acquire_with_priority(txn, key, LockMode::Exclusive)
    }

    fn release(&self, txn: TxnId, key: Key) {
        self.table.release(txn, key);
    }

    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)> {
        self.table.status(key)
    }

    fn ready_execute(&self, txn: TxnId) -> bool {
        self.table.ready_execute(txn)
    }
}

/// Variant D: no-wait locking.
///
/// A lock is granted only when the key's queue is empty; otherwise the
/// request is refused without being enqueued and without touching wait
/// counters. Retry loops park on [`LockManager::wait_for_release`], which is
/// signalled by every release.
pub struct NoWaitLockManager {
    state: Mutex<LockQueues>,
    ready: Arc<SegQueue<TxnId>>,
    released: Condvar,
}

impl NoWaitLockManager {
    pub fn new(ready: Arc<SegQueue<TxnId>>) -> Self {
        Self {
            state: Mutex::new(LockQueues::default()),
            ready,
            released: Condvar::new(),
        }
    }

    fn try_acquire(&self, txn: TxnId, key: Key, mode: LockMode) -> bool {
        let mut state = self.state.lock();
        if state.table.get(&key).is_some_and(|queue| !queue.is_empty()) {
            return false;
        }
        state.append(key, mode, txn)
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.state.lock().assert_queue_invariants();
    }
}

impl LockManager for NoWaitLockManager {
    fn read_lock(&self, txn: TxnId, key: Key) -> bool {
        self.try_acquire(txn, key, LockMode::Shared)
    }

    fn write_lock(&self, txn: TxnId, key: Key) -> bool {
        self.try_acquire(txn, key, LockMode::Exclusive)
    }

    fn release(&self, txn: TxnId, key: Key) {
        let ready = self.state.lock().remove(key, txn);
        for owner in ready {
            self.ready.push(owner);
        }
        self.released.notify_all();
    }

    fn status(&self, key: Key) -> Option<(LockMode, Vec<TxnId>)> {
        self.state.lock().status(key)
    }

    fn ready_execute(&self, _txn: TxnId) -> bool {
        true
    }

    fn wait_for_release(&self) {
        let mut state = self.state.lock();
        self.released
            .wait_for(&mut state, Duration::from_micros(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_queue() -> Arc<SegQueue<TxnId>> {
        Arc::new(SegQueue::new())
    }

    fn drain(ready: &SegQueue<TxnId>) -> Vec<TxnId> {
        let mut out = Vec::new();
        while let Some(id) = ready.pop() {
            out.push(id);
        }
        out
    }

    #[test]
    fn test_exclusive_grant_and_queue() {
        let ready = ready_queue();
        let lm = ExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        assert!(!lm.write_lock(TxnId(2), 0));
        assert!(!lm.read_lock(TxnId(3), 0)); // reads alias writes

        let (mode, owners) = lm.status(0).unwrap();
        assert_eq!(mode, LockMode::Exclusive);
        assert_eq!(owners, vec![TxnId(1)]);
        lm.check_invariants();
    }

    #[test]
    fn test_exclusive_release_promotes_next_waiter() {
        let ready = ready_queue();
        let lm = ExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        assert!(!lm.write_lock(TxnId(2), 0));
        assert!(!lm.ready_execute(TxnId(2)));

        lm.release(TxnId(1), 0);
        assert_eq!(drain(&ready), vec![TxnId(2)]);
        assert!(lm.ready_execute(TxnId(2)));

        let (mode, owners) = lm.status(0).unwrap();
        assert_eq!(mode, LockMode::Exclusive);
        assert_eq!(owners, vec![TxnId(2)]);
        lm.check_invariants();
    }

    #[test]
    fn test_shared_run_grants_together() {
        let ready = ready_queue();
        let lm = SharedExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.read_lock(TxnId(1), 0));
        assert!(lm.read_lock(TxnId(2), 0));
        let (mode, owners) = lm.status(0).unwrap();
        assert_eq!(mode, LockMode::Shared);
        assert_eq!(owners, vec![TxnId(1), TxnId(2)]);
        lm.check_invariants();
    }

    #[test]
    fn test_exclusive_waits_behind_shared_run() {
        let ready = ready_queue();
        let lm = SharedExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.read_lock(TxnId(1), 0));
        assert!(lm.read_lock(TxnId(2), 0));
        assert!(!lm.write_lock(TxnId(3), 0));
        // a later shared request must not jump the queued exclusive
        assert!(!lm.read_lock(TxnId(4), 0));

        lm.release(TxnId(1), 0);
        assert!(drain(&ready).is_empty());
        lm.release(TxnId(2), 0);
        assert_eq!(drain(&ready), vec![TxnId(3)]);

        let (mode, owners) = lm.status(0).unwrap();
        assert_eq!(mode, LockMode::Exclusive);
        assert_eq!(owners, vec![TxnId(3)]);
        lm.check_invariants();
    }

    #[test]
    fn test_release_of_exclusive_wakes_shared_run() {
        let ready = ready_queue();
        let lm = SharedExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        assert!(!lm.read_lock(TxnId(2), 0));
        assert!(!lm.read_lock(TxnId(3), 0));
        assert!(!lm.write_lock(TxnId(4), 0));

        lm.release(TxnId(1), 0);
        // the contiguous shared run wakes together; the exclusive stays queued
        assert_eq!(drain(&ready), vec![TxnId(2), TxnId(3)]);
        let (mode, owners) = lm.status(0).unwrap();
        assert_eq!(mode, LockMode::Shared);
        assert_eq!(owners, vec![TxnId(2), TxnId(3)]);
        lm.check_invariants();
    }

    #[test]
    fn test_release_of_waiting_request_settles_counter() {
        let ready = ready_queue();
        let lm = SharedExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        assert!(!lm.write_lock(TxnId(2), 0));
        // abandoning the waiting request must not wake anyone, and must not
        // leave a stale wait count behind
        lm.release(TxnId(2), 0);
        assert!(drain(&ready).is_empty());
        assert!(lm.ready_execute(TxnId(2)));
        lm.check_invariants();
    }

    #[test]
    fn test_wait_counter_tracks_multiple_keys() {
        let ready = ready_queue();
        let lm = SharedExclusiveLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        assert!(lm.write_lock(TxnId(1), 1));
        assert!(!lm.write_lock(TxnId(2), 0));
        assert!(!lm.write_lock(TxnId(2), 1));
        assert!(!lm.ready_execute(TxnId(2)));

        lm.release(TxnId(1), 0);
        // still waiting on key 1: no wake yet
        assert!(drain(&ready).is_empty());
        assert!(!lm.ready_execute(TxnId(2)));

        lm.release(TxnId(1), 1);
        assert_eq!(drain(&ready), vec![TxnId(2)]);
        assert!(lm.ready_execute(TxnId(2)));
    }

    #[test]
    fn test_priority_grant_ahead_of_lower_priority_waiters() {
        let ready = ready_queue();
        let lm = PriorityLockManager::new(Arc::clone(&ready));

        // low-priority holder, then an even lower-priority waiter
        assert!(lm.write_lock(TxnId(10), 0));
        assert!(!lm.write_lock(TxnId(20), 0));

        // the high-priority request reports success: everyone ahead of it
        // has a strictly greater id
        assert!(lm.write_lock(TxnId(1), 0));
        // but the lock is not actually held yet
        assert!(!lm.ready_execute(TxnId(1)));
        let (_, owners) = lm.status(0).unwrap();
        assert_eq!(owners, vec![TxnId(10)]);

        lm.release(TxnId(10), 0);
        // promotion grants arrival order: TxnId(20) truly acquires first
        assert_eq!(drain(&ready), vec![TxnId(20)]);
        lm.check_invariants();
    }

    #[test]
    fn test_priority_refused_behind_equal_or_higher_priority() {
        let ready = ready_queue();
        let lm = PriorityLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        // a lower-priority arrival is refused outright
        assert!(!lm.write_lock(TxnId(5), 0));
        lm.check_invariants();
    }

    #[test]
    fn test_priority_promotion_clears_grant_ahead_counter() {
        let ready = ready_queue();
        let lm = PriorityLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(10), 0));
        assert!(lm.write_lock(TxnId(1), 0)); // grant-ahead
        assert!(!lm.ready_execute(TxnId(1)));

        lm.release(TxnId(10), 0);
        assert_eq!(drain(&ready), vec![TxnId(1)]);
        assert!(lm.ready_execute(TxnId(1)));
        let (mode, owners) = lm.status(0).unwrap();
        assert_eq!(mode, LockMode::Exclusive);
        assert_eq!(owners, vec![TxnId(1)]);
    }

    #[test]
    fn test_no_wait_refuses_without_enqueueing() {
        let ready = ready_queue();
        let lm = NoWaitLockManager::new(Arc::clone(&ready));

        assert!(lm.write_lock(TxnId(1), 0));
        assert!(!lm.write_lock(TxnId(2), 0));
        assert!(!lm.read_lock(TxnId(3), 0));
        // refused requests never wait, so everyone stays ready
        assert!(lm.ready_execute(TxnId(2)));

        lm.release(TxnId(1), 0);
        assert!(drain(&ready).is_empty());
        assert!(lm.status(0).is_none());
        // the key is free again
        assert!(lm.write_lock(TxnId(2), 0));
        lm.check_invariants();
    }

    #[test]
    fn test_no_wait_shared_also_requires_empty_queue() {
        let ready = ready_queue();
        let lm = NoWaitLockManager::new(Arc::clone(&ready));

        assert!(lm.read_lock(TxnId(1), 0));
        assert!(!lm.read_lock(TxnId(2), 0));
        lm.check_invariants();
    }

    #[test]
    fn test_release_unknown_request_is_harmless() {
        let ready = ready_queue();
        let lm = SharedExclusiveLockManager::new(Arc::clone(&ready));
        lm.release(TxnId(9), 42);
        assert!(lm.status(42).is_none());
    }
}
