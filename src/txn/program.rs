// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction program logic.
//!
//! A [`Program`] is the payload of a transaction: it sees the values staged
//! by the executor and buffers the writes the scheduler will apply on commit.
//! Plain closures implement the trait, which is what most tests use; [`Rmw`]
//! and [`Put`] are the stock programs the benchmark workloads are built from.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use crate::store::{Key, Record};

/// Commit/abort decision returned by program logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Abort,
}

/// Execution view handed to a program.
pub struct TxnContext<'a> {
    /// Values read for the transaction's read and write sets. A key missing
    /// here was absent from the store; the program decides whether that is a
    /// logical error.
    pub reads: &'a BTreeMap<Key, Record>,
    /// Keys the transaction declared it will write.
    pub writeset: &'a BTreeSet<Key>,
    /// Write buffer; the scheduler applies these on commit.
    pub writes: &'a mut BTreeMap<Key, Record>,
}

/// Transaction payload logic.
pub trait Program: Send {
    fn run(&self, ctx: &mut TxnContext<'_>) -> Decision;
}

impl<F> Program for F
where
    F: Fn(&mut TxnContext<'_>) -> Decision + Send,
{
    fn run(&self, ctx: &mut TxnContext<'_>) -> Decision {
        self(ctx)
    }
}

/// Read-modify-write workload program.
///
/// Bumps every write-set key that was present in the store, optionally
/// sleeping first to simulate transaction duration. Keys absent from the
/// store are skipped.
#[derive(Debug, Clone, Default)]
pub struct Rmw {
    pub wait: Duration,
}

impl Rmw {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

impl Program for Rmw {
    fn run(&self, ctx: &mut TxnContext<'_>) -> Decision {
        if !self.wait.is_zero() {
            thread::sleep(self.wait);
        }
        for &key in ctx.writeset {
            if let Some(record) = ctx.reads.get(&key) {
                ctx.writes.insert(key, bump(record));
            }
        }
        Decision::Commit
    }
}

/// Blind-write program: installs fixed values.
#[derive(Debug, Clone)]
pub struct Put {
    values: BTreeMap<Key, Record>,
}

impl Put {
    /// The transaction using this program must declare exactly these keys as
    /// its write set.
    pub fn new(values: BTreeMap<Key, Record>) -> Self {
        Self { values }
    }
}

impl Program for Put {
    fn run(&self, ctx: &mut TxnContext<'_>) -> Decision {
        for (&key, &record) in &self.values {
            ctx.writes.insert(key, record);
        }
        Decision::Commit
    }
}

fn bump(record: &Record) -> Record {
    match record {
        Record::Count(n) => Record::Count(n.wrapping_add(1)),
        Record::Caption(bytes) => Record::Caption(bytes.map(|b| b.wrapping_add(1))),
        Record::Post(bytes) => Record::Post(bytes.map(|b| b.wrapping_add(1))),
        Record::Thumbnail(bytes) => Record::Thumbnail(bytes.map(|b| b.wrapping_add(1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmw_bumps_present_keys() {
        let reads = BTreeMap::from([(1, Record::Count(5))]);
        let writeset = BTreeSet::from([1, 2]);
        let mut writes = BTreeMap::new();
        let decision = Rmw::default().run(&mut TxnContext {
            reads: &reads,
            writeset: &writeset,
            writes: &mut writes,
        });
        assert_eq!(decision, Decision::Commit);
        assert_eq!(writes.get(&1), Some(&Record::Count(6)));
        // key 2 was absent from the store, so it is skipped
        assert!(!writes.contains_key(&2));
    }

    #[test]
    fn test_rmw_bumps_byte_families() {
        let reads = BTreeMap::from([(0, Record::Caption([b'a'; 10]))]);
        let writeset = BTreeSet::from([0]);
        let mut writes = BTreeMap::new();
        Rmw::default().run(&mut TxnContext {
            reads: &reads,
            writeset: &writeset,
            writes: &mut writes,
        });
        assert_eq!(writes.get(&0), Some(&Record::Caption([b'b'; 10])));
    }

    #[test]
    fn test_put_installs_fixed_values() {
        let values = BTreeMap::from([(3, Record::Count(30))]);
        let writeset = BTreeSet::from([3]);
        let mut writes = BTreeMap::new();
        let decision = Put::new(values).run(&mut TxnContext {
            reads: &BTreeMap::new(),
            writeset: &writeset,
            writes: &mut writes,
        });
        assert_eq!(decision, Decision::Commit);
        assert_eq!(writes.get(&3), Some(&Record::Count(30)));
    }

    #[test]
    fn test_closures_are_programs() {
        let program = |ctx: &mut TxnContext<'_>| {
            ctx.writes.insert(0, Record::Count(1));
            Decision::Abort
        };
        let mut writes = BTreeMap::new();
        let decision = program.run(&mut TxnContext {
            reads: &BTreeMap::new(),
            writeset: &BTreeSet::new(),
            writes: &mut writes,
        });
        assert_eq!(decision, Decision::Abort);
    }
}
