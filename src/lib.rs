// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! LithiumDB: an in-memory, single-node transactional key-value store built to
//! compare concurrency-control strategies under identical workloads.
//!
//! The heart of the crate is the [`txn::TxnProcessor`]: a pipeline that ingests
//! transaction requests, schedules them under a selectable concurrency-control
//! discipline, executes their program logic against the store, and returns
//! committed or aborted results.
//!
//! # Strategies
//!
//! - **Serial**: one transaction at a time; the correctness oracle.
//! - **Locking** (exclusive-only or shared/exclusive): static two-phase
//!   locking with all-or-nothing acquisition and retry on contention.
//! - **TwoPhaseLocking**: deterministic 2PL where lower transaction ids win
//!   priority over later waiters.
//! - **OrderedTwoPhase**: growing-phase 2PL with key-sorted acquisition from
//!   worker threads; deadlock-free by total key order.
//! - **Occ / OccParallel / Silo**: optimistic execution with serial or
//!   parallel backward validation against last-write timestamps.
//!
//! # Example
//!
//! ```no_run
//! use lithiumdb::store::{Record, RecordFamily};
//! use lithiumdb::txn::{Decision, Mode, Transaction, TxnContext, TxnProcessor};
//!
//! let processor = TxnProcessor::new(Mode::Locking);
//!
//! let txn = Transaction::new(
//!     RecordFamily::Count,
//!     [0].into(),
//!     [1].into(),
//!     |ctx: &mut TxnContext<'_>| {
//!         ctx.writes.insert(1, Record::Count(42));
//!         Decision::Commit
//!     },
//! );
//!
//! processor.submit(txn).unwrap();
//! let done = processor.next_result();
//! assert!(done.is_committed());
//! ```

pub mod store;
pub mod time;
pub mod txn;

pub use store::{Key, MemoryStore, Record, RecordFamily, Storage, StoreConfig};
pub use time::{Clock, Timestamp};
pub use txn::{
    ActiveSet, Decision, LockManager, LockMode, Mode, ProcessorConfig, Program, Put, Rmw,
    ThreadPool, Transaction, TxnContext, TxnError, TxnId, TxnProcessor, TxnStatus,
};
