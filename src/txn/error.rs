// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction processor error types.

/// Errors surfaced by the processor's public API.
///
/// Contention-induced aborts are recovered internally and never appear here;
/// program-induced aborts surface through [`super::TxnStatus::Aborted`] on
/// the returned record.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("transaction processor is shutting down")]
    Shutdown,
}
