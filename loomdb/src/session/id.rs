// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Logical session identifiers and the client-supplied session descriptor

use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// Unique identifier for a logical session
///
/// A logical session is a caller-identified context that may span many
/// operations and transactions; the database tracks it to support retryable
/// writes and multi-statement transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalSessionId(uuid::Uuid);

impl LogicalSessionId {
    /// Generate a fresh session identifier
    pub fn new() -> Self {
        LogicalSessionId(uuid::Uuid::new_v4())
    }

    /// Create a session identifier from an existing UUID
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        LogicalSessionId(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for LogicalSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LogicalSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lsid_{}", self.0)
    }
}

/// Session information supplied by the client for one operation
///
/// Carries the logical session the operation targets and, for transactional
/// or retryable operations, the transaction sequence marker. The descriptor
/// is immutable for the duration of guard construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// The logical session this operation targets, if any
    pub session_id: Option<LogicalSessionId>,
    /// Transaction sequence number within the session
    pub txn_number: Option<i64>,
    /// Client-requested autocommit setting (false inside multi-statement
    /// transactions)
    pub autocommit: Option<bool>,
    /// Whether this operation starts a new multi-statement transaction
    pub start_transaction: Option<bool>,
}

impl SessionDescriptor {
    /// Create a descriptor naming just a session
    pub fn for_session(session_id: LogicalSessionId) -> Self {
        SessionDescriptor {
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    /// Create a descriptor naming a session and a transaction number
    pub fn for_transaction(session_id: LogicalSessionId, txn_number: i64) -> Self {
        SessionDescriptor {
            session_id: Some(session_id),
            txn_number: Some(txn_number),
            autocommit: Some(false),
            start_transaction: None,
        }
    }

    /// Validate internal consistency of the descriptor
    ///
    /// # Returns
    /// * `Ok(())` - The descriptor is well formed
    /// * `Err(SessionError::InvalidSessionDescriptor)` - A field combination
    ///   the server must reject (e.g. a transaction number without a session)
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.txn_number.is_some() && self.session_id.is_none() {
            return Err(SessionError::InvalidSessionDescriptor(
                "transaction number requires a session id".to_string(),
            ));
        }
        if let Some(txn_number) = self.txn_number {
            if txn_number < 0 {
                return Err(SessionError::InvalidSessionDescriptor(format!(
                    "transaction number must be non-negative, got {}",
                    txn_number
                )));
            }
        }
        if self.start_transaction.is_some() && self.txn_number.is_none() {
            return Err(SessionError::InvalidSessionDescriptor(
                "startTransaction requires a transaction number".to_string(),
            ));
        }
        Ok(())
    }
}
