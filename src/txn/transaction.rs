// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction record and state management.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::store::{Key, Record, RecordFamily};
use crate::time::Timestamp;

use super::program::{Decision, Program, TxnContext};

/// Unique transaction identifier, assigned at ingress.
///
/// Assignment is monotonic, so the id doubles as a priority: lower id means
/// higher priority in the deterministic locking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Transaction lifecycle state.
///
/// ```text
/// Incomplete → (exec) → CompletedCommit | CompletedAbort
/// CompletedCommit → (commit ok)    → Committed   [terminal]
/// CompletedCommit → (validate nok) → Incomplete  [OCC modes; fresh id]
/// CompletedAbort  → (abort)        → Aborted     [terminal]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Not yet executed, or reset for a retry.
    Incomplete,
    /// Program logic finished and chose to commit; awaiting the scheduler.
    CompletedCommit,
    /// Program logic finished and chose to abort; awaiting the scheduler.
    CompletedAbort,
    /// Writes applied; terminal.
    Committed,
    /// Program abort published; terminal.
    Aborted,
}

/// A transaction request: declared read/write sets, buffered reads and
/// writes, and the program logic that turns one into the other.
///
/// The record moves by value through the processor's queues, so the buffers
/// are written only by whichever thread currently owns it: the executing
/// worker between dispatch and completion, the scheduler afterwards.
pub struct Transaction {
    pub(crate) id: TxnId,
    family: RecordFamily,
    readset: BTreeSet<Key>,
    writeset: BTreeSet<Key>,
    pub(crate) reads: BTreeMap<Key, Record>,
    pub(crate) writes: BTreeMap<Key, Record>,
    pub(crate) occ_start: Timestamp,
    pub(crate) status: TxnStatus,
    program: Box<dyn Program>,
}

impl Transaction {
    /// Creates a transaction over the given key sets.
    ///
    /// `readset` and `writeset` must be disjoint; write keys are pre-read
    /// into the read buffer by the executor, so a key never needs to appear
    /// in both.
    pub fn new(
        family: RecordFamily,
        readset: BTreeSet<Key>,
        writeset: BTreeSet<Key>,
        program: impl Program + 'static,
    ) -> Self {
        debug_assert!(
            readset.is_disjoint(&writeset),
            "readset and writeset must be disjoint"
        );
        Self {
            id: TxnId(0),
            family,
            readset,
            writeset,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            occ_start: Timestamp::ZERO,
            status: TxnStatus::Incomplete,
            program: Box::new(program),
        }
    }

    /// The id assigned at ingress (or reassigned on an optimistic retry).
    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// The record family all keys of this transaction address.
    #[inline]
    pub fn family(&self) -> RecordFamily {
        self.family
    }

    /// Keys this transaction reads.
    #[inline]
    pub fn readset(&self) -> &BTreeSet<Key> {
        &self.readset
    }

    /// Keys this transaction writes.
    #[inline]
    pub fn writeset(&self) -> &BTreeSet<Key> {
        &self.writeset
    }

    /// Values observed during the (latest) execution.
    #[inline]
    pub fn reads(&self) -> &BTreeMap<Key, Record> {
        &self.reads
    }

    /// Values buffered for commit during the (latest) execution.
    #[inline]
    pub fn writes(&self) -> &BTreeMap<Key, Record> {
        &self.writes
    }

    /// Current lifecycle state.
    #[inline]
    pub fn status(&self) -> TxnStatus {
        self.status
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.status == TxnStatus::Committed
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.status == TxnStatus::Aborted
    }

    /// Runs the program logic over the staged reads, buffering writes and
    /// recording the program's commit/abort decision.
    pub(crate) fn run(&mut self) {
        let mut ctx = TxnContext {
            reads: &self.reads,
            writeset: &self.writeset,
            writes: &mut self.writes,
        };
        self.status = match self.program.run(&mut ctx) {
            Decision::Commit => TxnStatus::CompletedCommit,
            Decision::Abort => TxnStatus::CompletedAbort,
        };
    }

    /// Clears buffered state ahead of an optimistic retry.
    pub(crate) fn reset_for_retry(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.status = TxnStatus::Incomplete;
    }
}

// Box<dyn Program> has no useful Debug; format the rest of the record.
impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("readset", &self.readset)
            .field("writeset", &self.writeset)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;

    fn increment_program(ctx: &mut TxnContext<'_>) -> Decision {
        for &key in ctx.writeset {
            let next = match ctx.reads.get(&key) {
                Some(Record::Count(n)) => n + 1,
                _ => 1,
            };
            ctx.writes.insert(key, Record::Count(next));
        }
        Decision::Commit
    }

    #[test]
    fn test_new_transaction_is_incomplete() {
        let txn = Transaction::new(
            RecordFamily::Count,
            [0].into(),
            [1].into(),
            increment_program,
        );
        assert_eq!(txn.status(), TxnStatus::Incomplete);
        assert_eq!(txn.id(), TxnId(0));
        assert!(txn.reads().is_empty());
        assert!(txn.writes().is_empty());
    }

    #[test]
    fn test_run_buffers_writes_and_completes() {
        let mut txn = Transaction::new(
            RecordFamily::Count,
            BTreeSet::new(),
            [5].into(),
            increment_program,
        );
        txn.reads.insert(5, Record::Count(9));
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedCommit);
        assert_eq!(txn.writes().get(&5), Some(&Record::Count(10)));
    }

    #[test]
    fn test_program_abort_is_recorded() {
        let mut txn = Transaction::new(
            RecordFamily::Count,
            BTreeSet::new(),
            BTreeSet::new(),
            |_: &mut TxnContext<'_>| Decision::Abort,
        );
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedAbort);
    }

    #[test]
    fn test_reset_for_retry_clears_buffers() {
        let mut txn = Transaction::new(
            RecordFamily::Count,
            BTreeSet::new(),
            [1].into(),
            increment_program,
        );
        txn.run();
        assert!(!txn.writes().is_empty());
        txn.reset_for_retry();
        assert!(txn.writes().is_empty());
        assert!(txn.reads().is_empty());
        assert_eq!(txn.status(), TxnStatus::Incomplete);
    }

    #[test]
    fn test_txn_id_orders_by_priority() {
        assert!(TxnId(1) < TxnId(2));
        assert_eq!(format!("{}", TxnId(7)), "txn-7");
    }
}
