// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The transaction processor: ingress, scheduling, execution, and commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::store::{Key, MemoryStore, Storage, StoreConfig};
use crate::time::Clock;

use super::active_set::{ActivePeer, ActiveSet};
use super::error::TxnError;
use super::lock::{LockManager, LockMode};
use super::lock_manager::{
    ExclusiveLockManager, NoWaitLockManager, PriorityLockManager, SharedExclusiveLockManager,
};
use super::pool::ThreadPool;
use super::transaction::{Transaction, TxnId, TxnStatus};

/// Concurrency-control discipline driving the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One transaction at a time on the scheduler thread; the correctness
    /// oracle.
    Serial,
    /// Static 2PL over the exclusive-only table; reads alias writes.
    LockingExclusive,
    /// Static 2PL over the shared/exclusive table with all-or-nothing
    /// acquisition; contention retries take a fresh id.
    Locking,
    /// Deterministic priority 2PL over the priority table; contention
    /// retries keep their id so conflicting transactions commit in id order.
    TwoPhaseLocking,
    /// Growing-phase 2PL: each transaction runs whole on a worker, acquiring
    /// its locks in ascending key order. Deadlock-free by total key order.
    OrderedTwoPhase,
    /// Optimistic execution with serial backward validation against
    /// last-write timestamps.
    Occ,
    /// Optimistic execution with parallel validation: no-wait write locks
    /// plus an active-set snapshot check, run entirely on workers.
    OccParallel,
    /// Alias of [`Mode::OccParallel`] (same no-wait commit protocol).
    Silo,
    /// Multi-version mode. The MVCC scheduler is not implemented; runs the
    /// serial loop against the same storage contract.
    Mvcc,
}

/// Processor tuning knobs.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Worker threads in the execution pool.
    pub worker_threads: usize,
    /// Sleep applied by queue consumers when they find nothing to do.
    pub poll_interval: Duration,
    /// Store seeding.
    pub store: StoreConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 8,
            poll_interval: Duration::from_micros(10),
            store: StoreConfig::default(),
        }
    }
}

/// State shared between the client API, the scheduler thread, and workers.
struct Inner {
    mode: Mode,
    poll_interval: Duration,
    clock: Arc<Clock>,
    storage: Arc<dyn Storage>,
    requests: SegQueue<Transaction>,
    completed: SegQueue<Transaction>,
    results: SegQueue<Transaction>,
    ready: Arc<SegQueue<TxnId>>,
    /// Guards id assignment together with the request push so that request
    /// order matches id order.
    ingress: Mutex<u64>,
    locks: Arc<dyn LockManager>,
    active: ActiveSet,
    pool: ThreadPool,
    shutdown: AtomicBool,
    /// Submitted transactions not yet published to the results queue.
    in_flight: AtomicUsize,
}

impl Inner {
    fn should_stop(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) && self.in_flight.load(Ordering::SeqCst) == 0
    }

    fn idle(&self) {
        thread::sleep(self.poll_interval);
    }

    /// Assigns the next id under the ingress mutex and enqueues the request.
    fn enqueue_fresh(&self, mut txn: Transaction) {
        let mut next_id = self.ingress.lock();
        txn.id = TxnId(*next_id);
        *next_id += 1;
        self.requests.push(txn);
    }

    fn publish(&self, txn: Transaction) {
        self.results.push(txn);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Read phase plus program logic: stamps the snapshot timestamp, stages
    /// every read/write-set key present in the store, and runs the program.
    fn execute(&self, txn: &mut Transaction) {
        txn.occ_start = self.clock.now();
        let keys: Vec<Key> = txn
            .readset()
            .iter()
            .chain(txn.writeset())
            .copied()
            .collect();
        for key in keys {
            if let Some(record) = self.storage.read(txn.family(), key) {
                txn.reads.insert(key, record);
            }
        }
        txn.run();
    }

    fn apply_writes(&self, txn: &Transaction) {
        for (&key, &record) in &txn.writes {
            self.storage.write(key, record, txn.id);
        }
    }

    /// Turns a completed status into its terminal state, applying buffered
    /// writes on commit. Any other status at this decision point is an
    /// invariant violation and fatal.
    fn finalize_completed(&self, txn: &mut Transaction) {
        match txn.status {
            TxnStatus::CompletedCommit => {
                self.apply_writes(txn);
                txn.status = TxnStatus::Committed;
            }
            TxnStatus::CompletedAbort => txn.status = TxnStatus::Aborted,
            status => panic!(
                "completed transaction {} has invalid status {status:?}",
                txn.id
            ),
        }
    }

    /// Full worker-side commit protocol for parallel OCC: read phase, active
    /// set entry, no-wait write locks, validation, install.
    fn commit_parallel(&self, mut txn: Transaction) {
        self.execute(&mut txn);
        match txn.status {
            TxnStatus::CompletedCommit => {}
            TxnStatus::CompletedAbort => {
                txn.status = TxnStatus::Aborted;
                self.publish(txn);
                return;
            }
            status => panic!(
                "completed transaction {} has invalid status {status:?}",
                txn.id
            ),
        }

        let peers = self.active.enter(
            txn.id,
            ActivePeer {
                family: txn.family(),
                writeset: txn.writeset().clone(),
            },
        );

        let multi_key = txn.writeset().len() > 1;
        let mut held: Vec<Key> = Vec::with_capacity(txn.writeset().len());
        let mut refused = false;
        for &key in txn.writeset() {
            if self.locks.write_lock(txn.id, key) {
                held.push(key);
            } else if multi_key {
                refused = true;
                break;
            } else {
                // A single-key committer cannot deadlock; retry until the
                // holder releases.
                while !self.locks.write_lock(txn.id, key) {
                    self.locks.wait_for_release();
                }
                held.push(key);
            }
        }

        if refused {
            for &key in &held {
                self.locks.release(txn.id, key);
            }
            self.active.remove(txn.id);
            trace!(id = %txn.id, "write lock refused, re-enqueueing");
            txn.reset_for_retry();
            self.enqueue_fresh(txn);
            return;
        }

        // Write-set keys are pre-read by the execute phase, so a stale
        // write-set key invalidates the snapshot exactly like a stale read.
        let mut valid = txn
            .readset()
            .iter()
            .chain(txn.writeset())
            .all(|&key| self.storage.timestamp(key) <= txn.occ_start);
        if valid {
            valid = !peers.iter().any(|(_, peer)| {
                peer.family == txn.family()
                    && peer.writeset.iter().any(|key| txn.readset().contains(key))
            });
        }

        if valid {
            for (&key, &record) in &txn.writes {
                self.storage.lock(key);
                self.storage.write(key, record, txn.id);
                self.storage.unlock(key);
            }
            self.active.remove(txn.id);
            for &key in &held {
                self.locks.release(txn.id, key);
            }
            txn.status = TxnStatus::Committed;
            self.publish(txn);
        } else {
            trace!(id = %txn.id, "parallel validation failed, re-enqueueing");
            txn.reset_for_retry();
            self.active.remove(txn.id);
            for &key in &held {
                self.locks.release(txn.id, key);
            }
            self.enqueue_fresh(txn);
        }
    }

    /// Worker-side sorted-acquisition 2PL: grow in ascending key order,
    /// stage reads, run, apply while still holding everything, shrink.
    fn execute_ordered(&self, mut txn: Transaction) {
        // Disjoint sets make the merged plan a plain sorted interleave.
        let mut plan: Vec<(Key, LockMode)> = txn
            .readset()
            .iter()
            .map(|&key| (key, LockMode::Shared))
            .chain(
                txn.writeset()
                    .iter()
                    .map(|&key| (key, LockMode::Exclusive)),
            )
            .collect();
        plan.sort_unstable_by_key(|&(key, _)| key);

        for &(key, mode) in &plan {
            match mode {
                LockMode::Shared => {
                    while !self.locks.read_lock(txn.id, key) {
                        self.locks.wait_for_release();
                    }
                    if let Some(record) = self.storage.read(txn.family(), key) {
                        txn.reads.insert(key, record);
                    }
                }
                LockMode::Exclusive => {
                    while !self.locks.write_lock(txn.id, key) {
                        self.locks.wait_for_release();
                    }
                    // Pre-read, and rewrite in place to stamp the exclusive
                    // hold before program logic runs.
                    if let Some(record) = self.storage.read(txn.family(), key) {
                        txn.reads.insert(key, record);
                        self.storage.write(key, record, txn.id);
                    }
                }
            }
        }

        txn.run();
        self.finalize_completed(&mut txn);

        for &(key, _) in &plan {
            self.locks.release(txn.id, key);
        }
        self.publish(txn);
    }
}

/// Outcome of an all-or-nothing lock acquisition pass.
enum Acquisition {
    /// Every lock granted immediately.
    Granted,
    /// A single-key transaction was refused; its request waits in the queue.
    Waiting,
    /// A multi-key transaction was refused; everything acquired so far has
    /// been released.
    Refused,
}

/// The dedicated scheduler thread's state.
struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    fn run(&self) {
        debug!(mode = ?self.inner.mode, "scheduler started");
        match self.inner.mode {
            Mode::Serial | Mode::Mvcc => self.run_serial(),
            Mode::LockingExclusive | Mode::Locking | Mode::TwoPhaseLocking => self.run_locking(),
            Mode::OrderedTwoPhase => self.run_ordered(),
            Mode::Occ => self.run_occ(),
            Mode::OccParallel | Mode::Silo => self.run_occ_parallel(),
        }
        debug!(mode = ?self.inner.mode, "scheduler stopped");
    }

    fn run_serial(&self) {
        let inner = &self.inner;
        while !inner.should_stop() {
            match inner.requests.pop() {
                Some(mut txn) => {
                    inner.execute(&mut txn);
                    inner.finalize_completed(&mut txn);
                    inner.publish(txn);
                }
                None => inner.idle(),
            }
        }
    }

    /// Shared loop for the static and deterministic locking modes.
    fn run_locking(&self) {
        let inner = &self.inner;
        let deterministic = inner.mode == Mode::TwoPhaseLocking;
        // Records whose requests sit in lock queues, keyed by id until the
        // ready queue hands them back.
        let mut parked: HashMap<TxnId, Transaction> = HashMap::new();

        while !inner.should_stop() {
            let mut progress = false;

            if let Some(txn) = inner.requests.pop() {
                progress = true;
                match self.acquire_all(&txn) {
                    Acquisition::Granted => {
                        if inner.locks.ready_execute(txn.id()) {
                            inner.ready.push(txn.id());
                        }
                        parked.insert(txn.id(), txn);
                    }
                    Acquisition::Waiting => {
                        parked.insert(txn.id(), txn);
                    }
                    Acquisition::Refused => {
                        trace!(id = %txn.id(), "acquisition refused, restarting");
                        if deterministic {
                            // Priority is sticky: the retry keeps its id.
                            inner.requests.push(txn);
                        } else {
                            inner.enqueue_fresh(txn);
                        }
                    }
                }
            }

            while let Some(mut txn) = inner.completed.pop() {
                progress = true;
                inner.finalize_completed(&mut txn);
                for &key in txn.readset() {
                    inner.locks.release(txn.id(), key);
                }
                for &key in txn.writeset() {
                    inner.locks.release(txn.id(), key);
                }
                inner.publish(txn);
            }

            while let Some(id) = inner.ready.pop() {
                progress = true;
                if let Some(txn) = parked.remove(&id) {
                    self.dispatch_execute(txn);
                }
            }

            if !progress {
                inner.idle();
            }
        }
    }

    /// Attempts every read lock then every write lock in set order. On a
    /// refusal, a multi-key transaction releases everything acquired so far
    /// (including the refused request) and reports [`Acquisition::Refused`].
    fn acquire_all(&self, txn: &Transaction) -> Acquisition {
        let locks = &self.inner.locks;
        let multi_key = txn.readset().len() + txn.writeset().len() > 1;

        for (index, &key) in txn.readset().iter().enumerate() {
            if !locks.read_lock(txn.id(), key) {
                if !multi_key {
                    return Acquisition::Waiting;
                }
                for &held in txn.readset().iter().take(index + 1) {
                    locks.release(txn.id(), held);
                }
                return Acquisition::Refused;
            }
        }
        for (index, &key) in txn.writeset().iter().enumerate() {
            if !locks.write_lock(txn.id(), key) {
                if !multi_key {
                    return Acquisition::Waiting;
                }
                for &held in txn.readset() {
                    locks.release(txn.id(), held);
                }
                for &held in txn.writeset().iter().take(index + 1) {
                    locks.release(txn.id(), held);
                }
                return Acquisition::Refused;
            }
        }
        Acquisition::Granted
    }

    fn run_occ(&self) {
        let inner = &self.inner;
        while !inner.should_stop() {
            let mut progress = false;

            if let Some(txn) = inner.requests.pop() {
                progress = true;
                self.dispatch_execute(txn);
            }

            while let Some(mut txn) = inner.completed.pop() {
                progress = true;
                match txn.status() {
                    TxnStatus::CompletedAbort => {
                        txn.status = TxnStatus::Aborted;
                        inner.publish(txn);
                    }
                    TxnStatus::CompletedCommit => {
                        let valid = txn
                            .readset()
                            .iter()
                            .chain(txn.writeset())
                            .all(|&key| inner.storage.timestamp(key) <= txn.occ_start);
                        if valid {
                            inner.apply_writes(&txn);
                            txn.status = TxnStatus::Committed;
                            inner.publish(txn);
                        } else {
                            trace!(id = %txn.id(), "validation failed, re-enqueueing");
                            txn.reset_for_retry();
                            inner.enqueue_fresh(txn);
                        }
                    }
                    status => panic!(
                        "completed transaction {} has invalid status {status:?}",
                        txn.id()
                    ),
                }
            }

            if !progress {
                inner.idle();
            }
        }
    }

    fn run_occ_parallel(&self) {
        let inner = &self.inner;
        while !inner.should_stop() {
            match inner.requests.pop() {
                Some(txn) => {
                    let worker = Arc::clone(inner);
                    inner.pool.execute(move || worker.commit_parallel(txn));
                }
                None => inner.idle(),
            }
        }
    }

    fn run_ordered(&self) {
        let inner = &self.inner;
        while !inner.should_stop() {
            match inner.requests.pop() {
                Some(txn) => {
                    let worker = Arc::clone(inner);
                    inner.pool.execute(move || worker.execute_ordered(txn));
                }
                None => inner.idle(),
            }
        }
    }

    /// Hands a transaction to a worker for its read/execute phase; the
    /// worker pushes the record onto the completed queue.
    fn dispatch_execute(&self, mut txn: Transaction) {
        let worker = Arc::clone(&self.inner);
        self.inner.pool.execute(move || {
            worker.execute(&mut txn);
            worker.completed.push(txn);
        });
    }
}

fn lock_manager_for(mode: Mode, ready: Arc<SegQueue<TxnId>>) -> Arc<dyn LockManager> {
    match mode {
        Mode::LockingExclusive => Arc::new(ExclusiveLockManager::new(ready)),
        Mode::TwoPhaseLocking => Arc::new(PriorityLockManager::new(ready)),
        Mode::OrderedTwoPhase | Mode::OccParallel | Mode::Silo => {
            Arc::new(NoWaitLockManager::new(ready))
        }
        // Serial, Occ, and Mvcc never take locks; Locking gets the
        // shared/exclusive table.
        Mode::Locking | Mode::Serial | Mode::Occ | Mode::Mvcc => {
            Arc::new(SharedExclusiveLockManager::new(ready))
        }
    }
}

/// The transaction processor.
///
/// Construction seeds the store, spins up the worker pool, and starts the
/// dedicated scheduler thread for the chosen [`Mode`]. Dropping the
/// processor drains every submitted transaction, then stops the scheduler
/// and joins the pool.
pub struct TxnProcessor {
    inner: Arc<Inner>,
    scheduler: Option<JoinHandle<()>>,
}

impl TxnProcessor {
    pub fn new(mode: Mode) -> Self {
        Self::with_config(mode, ProcessorConfig::default())
    }

    pub fn with_config(mode: Mode, config: ProcessorConfig) -> Self {
        let clock = Arc::new(Clock::new());
        let storage: Arc<dyn Storage> =
            Arc::new(MemoryStore::seeded(&config.store, Arc::clone(&clock)));
        let ready = Arc::new(SegQueue::new());
        let locks = lock_manager_for(mode, Arc::clone(&ready));

        let inner = Arc::new(Inner {
            mode,
            poll_interval: config.poll_interval,
            clock,
            storage,
            requests: SegQueue::new(),
            completed: SegQueue::new(),
            results: SegQueue::new(),
            ready,
            ingress: Mutex::new(1),
            locks,
            active: ActiveSet::new(),
            pool: ThreadPool::new(config.worker_threads),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        });

        let scheduler = Scheduler {
            inner: Arc::clone(&inner),
        };
        let handle = thread::spawn(move || scheduler.run());

        Self {
            inner,
            scheduler: Some(handle),
        }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// The storage the schedulers run against. Useful for seeding extra
    /// state and for verifying committed effects.
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.inner.storage)
    }

    /// Assigns the transaction its id and enqueues it.
    pub fn submit(&self, txn: Transaction) -> Result<(), TxnError> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(TxnError::Shutdown);
        }
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueue_fresh(txn);
        Ok(())
    }

    /// Blocks until a transaction result is available.
    pub fn next_result(&self) -> Transaction {
        loop {
            if let Some(txn) = self.inner.results.pop() {
                return txn;
            }
            thread::sleep(self.inner.poll_interval);
        }
    }

    /// Non-blocking result poll.
    pub fn try_result(&self) -> Option<Transaction> {
        self.inner.results.pop()
    }
}

impl Drop for TxnProcessor {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}
