// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Persisted session transaction records and the record store boundary
//!
//! Refreshing a checked-out session reconciles its in-memory bookkeeping
//! with the durable record written by the last transactional operation.
//! The store itself is a collaborator behind the `SessionRecordStore`
//! trait; this module also provides the in-memory implementation used by
//! embedded deployments and tests.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::SessionError;
use super::id::LogicalSessionId;

/// Durable state of a session's most recent transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnState {
    /// Transaction is open and accepting statements
    InProgress,
    /// Transaction has been prepared (two-phase commit first phase)
    Prepared,
    /// Transaction committed
    Committed,
    /// Transaction aborted
    Aborted,
}

/// Persisted transaction record for one logical session
///
/// One record exists per session; it is overwritten as the session's
/// transaction history advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTxnRecord {
    /// The session this record belongs to
    pub session_id: LogicalSessionId,
    /// Highest transaction number seen for the session
    pub txn_num: i64,
    /// State of that transaction
    pub state: TxnState,
    /// When the record was last written
    pub last_write_at: DateTime<Utc>,
}

impl SessionTxnRecord {
    /// Create a record for a transaction in the given state
    pub fn new(session_id: LogicalSessionId, txn_num: i64, state: TxnState) -> Self {
        SessionTxnRecord {
            session_id,
            txn_num,
            state,
            last_write_at: Utc::now(),
        }
    }
}

/// Storage boundary for persisted session transaction records
///
/// Implementations own durability; callers only see load/save. A corrupt or
/// undecodable record surfaces as `SessionError::InvalidSessionState` so the
/// enclosing operation aborts rather than running against garbage state.
pub trait SessionRecordStore: Send + Sync {
    /// Load the record for a session
    ///
    /// # Returns
    /// * `Ok(Some(record))` - The session has durable transaction history
    /// * `Ok(None)` - The session has never run a transaction
    /// * `Err(..)` - The record exists but could not be read back
    fn load(&self, session_id: &LogicalSessionId) -> Result<Option<SessionTxnRecord>, SessionError>;

    /// Save (overwrite) the record for a session
    fn save(&self, record: &SessionTxnRecord) -> Result<(), SessionError>;
}

/// In-memory record store
///
/// Records are held bincode-encoded, matching the on-disk representation, so
/// decode failures behave the same as they would against real storage.
#[derive(Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<LogicalSessionId, Vec<u8>>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Insert raw bytes for a session, bypassing encoding
    ///
    /// Exists so tests can plant undecodable records and exercise the
    /// corrupt-state path.
    pub fn insert_raw(&self, session_id: LogicalSessionId, bytes: Vec<u8>) {
        self.records.write().insert(session_id, bytes);
    }
}

impl SessionRecordStore for InMemorySessionStore {
    fn load(&self, session_id: &LogicalSessionId) -> Result<Option<SessionTxnRecord>, SessionError> {
        let records = self.records.read();
        let Some(bytes) = records.get(session_id) else {
            return Ok(None);
        };
        let record: SessionTxnRecord = bincode::deserialize(bytes).map_err(|e| {
            SessionError::InvalidSessionState(format!(
                "failed to decode transaction record for {}: {}",
                session_id, e
            ))
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &SessionTxnRecord) -> Result<(), SessionError> {
        let bytes = bincode::serialize(record)
            .map_err(|e| SessionError::StorageError(format!("failed to encode record: {}", e)))?;
        self.records.write().insert(record.session_id, bytes);
        Ok(())
    }
}
