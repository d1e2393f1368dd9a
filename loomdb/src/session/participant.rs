// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory transaction bookkeeping for a checked-out session
//!
//! The participant tracks what the session's current transaction looks like
//! to the operation holding the checkout. It is only ever touched through a
//! live checkout handle, so no synchronization happens at this level; the
//! catalog's single-holder guarantee is the mutual exclusion.

use chrono::{DateTime, Utc};

use super::error::SessionError;
use super::id::LogicalSessionId;
use super::record::{SessionRecordStore, TxnState};

/// Per-session transaction participant state
///
/// A participant starts out invalid. The standard checkout path validates it
/// by refreshing from the record store; the replay path marks it valid
/// without any store read because durable state is being rebuilt from the
/// operation log.
#[derive(Debug)]
pub struct TransactionParticipant {
    /// Whether in-memory state is known to agree with durable state
    valid: bool,
    /// Highest transaction number active on this session
    active_txn_number: Option<i64>,
    /// State of the active transaction, if one exists
    txn_state: Option<TxnState>,
    /// When the participant was last refreshed from the store
    last_refresh_at: Option<DateTime<Utc>>,
}

impl TransactionParticipant {
    pub(crate) fn new() -> Self {
        TransactionParticipant {
            valid: false,
            active_txn_number: None,
            txn_state: None,
            last_refresh_at: None,
        }
    }

    /// Whether the participant has been validated (refresh or replay mark)
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The active transaction number, if any
    pub fn active_txn_number(&self) -> Option<i64> {
        self.active_txn_number
    }

    /// State of the active transaction, if any
    pub fn txn_state(&self) -> Option<TxnState> {
        self.txn_state
    }

    /// When the participant was last refreshed from durable state
    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.last_refresh_at
    }

    /// Reconcile in-memory state with the session's durable record
    ///
    /// Loads the persisted transaction record (if any) and adopts it. A
    /// record that cannot be decoded or is internally inconsistent surfaces
    /// `SessionError::InvalidSessionState` and leaves the participant
    /// invalid.
    pub fn refresh_from_store(
        &mut self,
        session_id: &LogicalSessionId,
        store: &dyn SessionRecordStore,
    ) -> Result<(), SessionError> {
        let record = store.load(session_id)?;

        if let Some(record) = record {
            if record.txn_num < 0 {
                return Err(SessionError::InvalidSessionState(format!(
                    "record for {} has negative transaction number {}",
                    session_id, record.txn_num
                )));
            }
            self.active_txn_number = Some(record.txn_num);
            self.txn_state = Some(record.state);
            log::debug!(
                "Refreshed session {}: txn {} in state {:?}",
                session_id,
                record.txn_num,
                record.state
            );
        } else {
            log::debug!("Refreshed session {}: no durable record", session_id);
        }

        self.valid = true;
        self.last_refresh_at = Some(Utc::now());
        Ok(())
    }

    /// Advance or continue the session's active transaction
    ///
    /// # Arguments
    /// * `txn_number` - The transaction number the operation carries
    ///
    /// # Returns
    /// * `Ok(())` - The number matches the active transaction (continue) or
    ///   is newer (a fresh transaction context was started)
    /// * `Err(SessionError::TransactionTooOld)` - The number is older than
    ///   the active transaction
    /// * `Err(SessionError::InvalidSessionState)` - The participant was
    ///   never validated
    pub fn begin_or_continue(&mut self, txn_number: i64) -> Result<(), SessionError> {
        if !self.valid {
            return Err(SessionError::InvalidSessionState(
                "transaction participant has not been validated".to_string(),
            ));
        }

        match self.active_txn_number {
            Some(active) if txn_number < active => Err(SessionError::TransactionTooOld {
                active,
                requested: txn_number,
            }),
            Some(active) if txn_number == active => {
                log::debug!("Continuing transaction {}", txn_number);
                Ok(())
            }
            _ => {
                self.active_txn_number = Some(txn_number);
                self.txn_state = Some(TxnState::InProgress);
                log::debug!("Started transaction {}", txn_number);
                Ok(())
            }
        }
    }

    /// Mark the participant valid and start a fresh transaction, ignoring
    /// any durable or in-memory state
    ///
    /// Used only while replaying prepared transactions from the operation
    /// log, where durable state is being reconstructed rather than read
    /// back. Never fails.
    ///
    /// # Arguments
    /// * `txn_number` - Transaction number to start; when absent, the next
    ///   number after the current active one (or 0) is used
    ///
    /// # Returns
    /// The transaction number that was started
    pub fn mark_valid_and_start_new_txn(&mut self, txn_number: Option<i64>) -> i64 {
        let started = txn_number
            .or_else(|| self.active_txn_number.map(|n| n + 1))
            .unwrap_or(0);

        self.valid = true;
        self.active_txn_number = Some(started);
        self.txn_state = Some(TxnState::InProgress);

        log::info!("Unconditionally started transaction {} for replay", started);
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::record::{InMemorySessionStore, SessionTxnRecord};

    #[test]
    fn test_new_participant_is_invalid() {
        let participant = TransactionParticipant::new();
        assert!(!participant.is_valid());
        assert_eq!(participant.active_txn_number(), None);
    }

    #[test]
    fn test_refresh_without_record_validates() {
        let store = InMemorySessionStore::new();
        let mut participant = TransactionParticipant::new();

        participant
            .refresh_from_store(&LogicalSessionId::new(), &store)
            .expect("refresh failed");

        assert!(participant.is_valid());
        assert_eq!(participant.active_txn_number(), None);
        assert!(participant.last_refresh_at().is_some());
    }

    #[test]
    fn test_refresh_adopts_durable_record() {
        let store = InMemorySessionStore::new();
        let session_id = LogicalSessionId::new();
        store
            .save(&SessionTxnRecord::new(session_id, 5, TxnState::Committed))
            .expect("save failed");

        let mut participant = TransactionParticipant::new();
        participant
            .refresh_from_store(&session_id, &store)
            .expect("refresh failed");

        assert!(participant.is_valid());
        assert_eq!(participant.active_txn_number(), Some(5));
        assert_eq!(participant.txn_state(), Some(TxnState::Committed));
    }

    #[test]
    fn test_begin_or_continue_requires_validation() {
        let mut participant = TransactionParticipant::new();
        assert!(matches!(
            participant.begin_or_continue(1),
            Err(SessionError::InvalidSessionState(_))
        ));
    }

    #[test]
    fn test_begin_or_continue_rejects_older_txn() {
        let mut participant = TransactionParticipant::new();
        participant.mark_valid_and_start_new_txn(Some(10));

        let err = participant.begin_or_continue(9).unwrap_err();
        assert!(matches!(
            err,
            SessionError::TransactionTooOld {
                active: 10,
                requested: 9
            }
        ));
    }

    #[test]
    fn test_begin_or_continue_same_txn_continues() {
        let mut participant = TransactionParticipant::new();
        participant.mark_valid_and_start_new_txn(Some(4));

        participant.begin_or_continue(4).expect("continue failed");
        assert_eq!(participant.active_txn_number(), Some(4));
    }

    #[test]
    fn test_begin_or_continue_newer_txn_starts_fresh() {
        let mut participant = TransactionParticipant::new();
        participant.mark_valid_and_start_new_txn(Some(4));

        participant.begin_or_continue(6).expect("begin failed");
        assert_eq!(participant.active_txn_number(), Some(6));
        assert_eq!(participant.txn_state(), Some(TxnState::InProgress));
    }

    #[test]
    fn test_mark_valid_overrides_prior_state() {
        let mut participant = TransactionParticipant::new();
        participant.mark_valid_and_start_new_txn(Some(3));
        participant.begin_or_continue(3).expect("continue failed");

        // Replay bypass tramples whatever was there
        let started = participant.mark_valid_and_start_new_txn(None);
        assert_eq!(started, 4);
        assert_eq!(participant.txn_state(), Some(TxnState::InProgress));
        assert!(participant.is_valid());
    }

    #[test]
    fn test_mark_valid_on_fresh_participant_starts_at_zero() {
        let mut participant = TransactionParticipant::new();
        assert_eq!(participant.mark_valid_and_start_new_txn(None), 0);
    }
}
