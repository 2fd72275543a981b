// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction processing under selectable concurrency control.
//!
//! The [`TxnProcessor`] ingests [`Transaction`] records, schedules them under
//! one of the [`Mode`] disciplines, executes their program logic on a worker
//! pool, and publishes committed or aborted results.
//!
//! # Pipeline
//!
//! Clients submit a transaction; ingress atomically assigns a monotonic
//! [`TxnId`] (lower id = higher priority in the deterministic modes) and
//! enqueues it. A dedicated scheduler thread drives the mode's dispatch loop:
//!
//! - lock-based modes acquire locks through one of the four [`LockManager`]
//!   variants, park blocked transactions, and dispatch ready ones to the
//!   [`ThreadPool`];
//! - optimistic modes dispatch speculatively and validate completed
//!   transactions against last-write timestamps, re-enqueueing losers with a
//!   fresh id.
//!
//! Contention aborts are recovered internally and never surface to the
//! client; program aborts surface verbatim as [`TxnStatus::Aborted`].
//!
//! # Example
//!
//! ```no_run
//! use lithiumdb::store::{Record, RecordFamily};
//! use lithiumdb::txn::{Decision, Mode, Transaction, TxnContext, TxnProcessor};
//!
//! let processor = TxnProcessor::new(Mode::Occ);
//! // write-set keys are pre-read into `ctx.reads` by the executor
//! let deposit = Transaction::new(
//!     RecordFamily::Count,
//!     std::collections::BTreeSet::new(),
//!     [0].into(),
//!     |ctx: &mut TxnContext<'_>| {
//!         let balance = match ctx.reads.get(&0) {
//!             Some(Record::Count(n)) => *n,
//!             _ => 0,
//!         };
//!         ctx.writes.insert(0, Record::Count(balance + 100));
//!         Decision::Commit
//!     },
//! );
//! processor.submit(deposit).unwrap();
//! assert!(processor.next_result().is_committed());
//! ```

mod active_set;
mod error;
mod lock;
mod lock_manager;
mod pool;
mod processor;
mod program;
mod transaction;

pub use active_set::{ActivePeer, ActiveSet};
pub use error::TxnError;
pub use lock::{LockManager, LockMode};
pub use lock_manager::{
    ExclusiveLockManager, NoWaitLockManager, PriorityLockManager, SharedExclusiveLockManager,
};
pub use pool::ThreadPool;
pub use processor::{Mode, ProcessorConfig, TxnProcessor};
pub use program::{Decision, Program, Put, Rmw, TxnContext};
pub use transaction::{Transaction, TxnId, TxnStatus};
