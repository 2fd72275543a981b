// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Registry of transactions inside the parallel-OCC validation window.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

use crate::store::{Key, RecordFamily};

use super::TxnId;

/// What validation needs to know about an active peer.
#[derive(Debug, Clone)]
pub struct ActivePeer {
    pub family: RecordFamily,
    pub writeset: BTreeSet<Key>,
}

/// Mutable set of transactions currently between execute-phase completion
/// and commit/abort publication.
///
/// A transaction joins on entering local validation and leaves on
/// commit/abort. [`ActiveSet::enter`] snapshots the peers present at the
/// critical-section instant before inserting the caller, under one guard, so
/// the snapshot is a stable witness that never contains the caller itself.
#[derive(Default)]
pub struct ActiveSet {
    members: Mutex<HashMap<TxnId, ActivePeer>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically snapshots the current members and inserts `txn`.
    pub fn enter(&self, txn: TxnId, peer: ActivePeer) -> Vec<(TxnId, ActivePeer)> {
        let mut members = self.members.lock();
        let snapshot = members
            .iter()
            .map(|(id, peer)| (*id, peer.clone()))
            .collect();
        members.insert(txn, peer);
        snapshot
    }

    /// Inserts `txn` without snapshotting.
    pub fn insert(&self, txn: TxnId, peer: ActivePeer) {
        self.members.lock().insert(txn, peer);
    }

    /// Removes `txn` on commit or abort.
    pub fn remove(&self, txn: TxnId) {
        self.members.lock().remove(&txn);
    }

    /// A value copy of the current members.
    pub fn snapshot(&self) -> Vec<(TxnId, ActivePeer)> {
        self.members
            .lock()
            .iter()
            .map(|(id, peer)| (*id, peer.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(keys: &[Key]) -> ActivePeer {
        ActivePeer {
            family: RecordFamily::Count,
            writeset: keys.iter().copied().collect(),
        }
    }

    #[test]
    fn test_enter_excludes_self_from_snapshot() {
        let set = ActiveSet::new();
        let snapshot = set.enter(TxnId(1), peer(&[0]));
        assert!(snapshot.is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_enter_sees_existing_members() {
        let set = ActiveSet::new();
        set.insert(TxnId(1), peer(&[0]));
        let snapshot = set.enter(TxnId(2), peer(&[1]));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, TxnId(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_snapshot_is_stable_copy() {
        let set = ActiveSet::new();
        set.insert(TxnId(1), peer(&[0, 2]));
        let snapshot = set.snapshot();
        set.remove(TxnId(1));
        assert!(set.is_empty());
        // the copy is unaffected by later mutation
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].1.writeset.contains(&2));
    }

    #[test]
    fn test_remove_on_commit_or_abort() {
        let set = ActiveSet::new();
        set.insert(TxnId(1), peer(&[0]));
        set.insert(TxnId(2), peer(&[1]));
        set.remove(TxnId(1));
        let snapshot = set.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, TxnId(2));
    }
}
