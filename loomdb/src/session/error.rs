// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Session checkout error types

use thiserror::Error;

/// Why a blocked operation was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The operation's deadline expired while it was waiting
    DeadlineExceeded,
    /// The operation was explicitly killed (client kill, shutdown)
    Killed,
}

impl std::fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptReason::DeadlineExceeded => write!(f, "deadline exceeded"),
            InterruptReason::Killed => write!(f, "operation killed"),
        }
    }
}

/// Session checkout errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Checkout interrupted: {reason}")]
    CheckoutInterrupted { reason: InterruptReason },

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("Invalid session descriptor: {0}")]
    InvalidSessionDescriptor(String),

    #[error("A session is already checked out for this operation")]
    SessionAlreadyAttached,

    #[error("Transaction {requested} is older than the session's active transaction {active}")]
    TransactionTooOld { active: i64, requested: i64 },

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl SessionError {
    /// Returns true if this error came from a cancelled/timed-out wait
    pub fn is_interruption(&self) -> bool {
        matches!(self, SessionError::CheckoutInterrupted { .. })
    }
}
