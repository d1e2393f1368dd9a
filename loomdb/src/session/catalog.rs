// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Session catalog: the registry sessions are checked out from
//!
//! The catalog maps logical session ids to in-memory session entries and
//! enforces the single-holder rule: at most one live `CheckedOutSession`
//! exists per session id across the process. Contended checkouts queue on
//! the entry's condvar; waiting is interruptible through the operation
//! context. Entries are created on first checkout and reaped by idle
//! cleanup.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ops::context::OperationContext;
use crate::session::error::SessionError;
use crate::session::id::LogicalSessionId;
use crate::session::participant::TransactionParticipant;
use crate::session::record::SessionRecordStore;

/// Catalog tuning knobs
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// How long a session may sit unused before idle cleanup reaps it
    pub max_idle: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            max_idle: Duration::from_secs(60 * 60),
        }
    }
}

struct EntryState {
    /// Whether a `CheckedOutSession` for this entry is live
    checked_out: bool,
    /// Operations currently blocked waiting for this entry
    waiters: u32,
    /// In-memory transaction bookkeeping for the session
    participant: TransactionParticipant,
    /// Last time the entry was handed out
    last_checkout_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// One session's slot in the catalog
pub(crate) struct SessionEntry {
    state: Mutex<EntryState>,
    /// Signalled on release and on kill of a waiting operation
    available: Arc<Condvar>,
}

impl SessionEntry {
    fn new() -> Self {
        SessionEntry {
            state: Mutex::new(EntryState {
                checked_out: false,
                waiters: 0,
                participant: TransactionParticipant::new(),
                last_checkout_at: None,
                created_at: Utc::now(),
            }),
            available: Arc::new(Condvar::new()),
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.checked_out = false;
        drop(state);
        self.available.notify_all();
    }
}

/// Registry of logical sessions keyed by session id
pub struct SessionCatalog {
    sessions: Mutex<HashMap<LogicalSessionId, Arc<SessionEntry>>>,
    /// Durable record store the standard refresh path reads from
    store: Arc<dyn SessionRecordStore>,
    config: CatalogConfig,
}

impl SessionCatalog {
    /// Create a catalog over the given record store with default config
    pub fn new(store: Arc<dyn SessionRecordStore>) -> Self {
        Self::with_config(store, CatalogConfig::default())
    }

    /// Create a catalog with explicit tuning knobs
    pub fn with_config(store: Arc<dyn SessionRecordStore>, config: CatalogConfig) -> Self {
        SessionCatalog {
            sessions: Mutex::new(HashMap::new()),
            store,
            config,
        }
    }

    /// Check out exclusive access to a session
    ///
    /// Blocks until the session is available or the operation is
    /// interrupted. Checkouts for the same session id are totally ordered:
    /// the next holder cannot be granted until the previous handle is
    /// released. No partial registration survives an interrupted wait.
    ///
    /// # Arguments
    /// * `op_ctx` - The operation requesting the checkout; supplies
    ///   interruption
    /// * `session_id` - The session to check out
    ///
    /// # Returns
    /// * `Ok(handle)` - Exclusive access token; releasing it (explicitly or
    ///   by drop) returns the session to the catalog
    /// * `Err(SessionError::CheckoutInterrupted)` - Killed or timed out
    ///   while waiting
    pub fn checkout(
        &self,
        op_ctx: &OperationContext,
        session_id: LogicalSessionId,
    ) -> Result<CheckedOutSession, SessionError> {
        op_ctx.check_for_interrupt()?;

        // Register as a waiter while the map lock is held; idle cleanup
        // takes the same map-then-entry lock order and never reaps an
        // entry with waiters, so the entry cannot be replaced under us
        // between lookup and wait
        let entry = {
            let mut sessions = self.sessions.lock();
            let entry = sessions
                .entry(session_id)
                .or_insert_with(|| Arc::new(SessionEntry::new()))
                .clone();
            entry.state.lock().waiters += 1;
            entry
        };

        let mut state = entry.state.lock();
        let waited =
            op_ctx.wait_for_condition_or_interrupt(&entry.available, &mut state, |s| {
                !s.checked_out
            });
        state.waiters -= 1;
        waited?;

        state.checked_out = true;
        state.last_checkout_at = Some(Utc::now());
        drop(state);

        log::debug!(
            "Operation {} checked out session {}",
            op_ctx.op_id(),
            session_id
        );

        Ok(CheckedOutSession {
            session_id,
            entry,
            store: self.store.clone(),
            released: false,
        })
    }

    /// Whether a live handle currently exists for the session
    pub fn is_checked_out(&self, session_id: &LogicalSessionId) -> bool {
        let sessions = self.sessions.lock();
        sessions
            .get(session_id)
            .map(|entry| entry.state.lock().checked_out)
            .unwrap_or(false)
    }

    /// Number of sessions known to the catalog
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Number of sessions currently checked out
    pub fn checked_out_count(&self) -> usize {
        let sessions = self.sessions.lock();
        sessions
            .values()
            .filter(|entry| entry.state.lock().checked_out)
            .count()
    }

    /// Visit every session's participant state
    ///
    /// Intended for diagnostics (e.g. listing in-progress transactions);
    /// entries stay locked only for the duration of each visit.
    pub fn scan_sessions(&self, mut visitor: impl FnMut(&LogicalSessionId, &TransactionParticipant)) {
        let sessions = self.sessions.lock();
        for (session_id, entry) in sessions.iter() {
            let state = entry.state.lock();
            visitor(session_id, &state.participant);
        }
    }

    /// Reap sessions that have been idle longer than `max_idle`
    ///
    /// Never touches a session that is checked out or has waiters queued.
    ///
    /// # Returns
    /// Number of sessions removed
    pub fn cleanup_idle(&self) -> usize {
        let now = Utc::now();
        let max_idle = chrono::Duration::from_std(self.config.max_idle)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|session_id, entry| {
            let state = entry.state.lock();
            if state.checked_out || state.waiters > 0 {
                return true;
            }
            let idle_since = state.last_checkout_at.unwrap_or(state.created_at);
            let keep = now - idle_since <= max_idle;
            if !keep {
                log::info!("Reaping idle session {}", session_id);
            }
            keep
        });

        before - sessions.len()
    }
}

/// Exclusive access token for one checked-out session
///
/// Exactly one handle per session id exists at any instant; the holder may
/// freely read and mutate the session's transaction participant through it.
/// Dropping the handle releases the session back to the catalog exactly
/// once.
pub struct CheckedOutSession {
    session_id: LogicalSessionId,
    entry: Arc<SessionEntry>,
    store: Arc<dyn SessionRecordStore>,
    released: bool,
}

impl std::fmt::Debug for CheckedOutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckedOutSession")
            .field("session_id", &self.session_id)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl CheckedOutSession {
    /// The session this handle grants access to
    pub fn session_id(&self) -> LogicalSessionId {
        self.session_id
    }

    /// Run `f` against the session's transaction participant
    pub fn with_participant<R>(&self, f: impl FnOnce(&mut TransactionParticipant) -> R) -> R {
        let mut state = self.entry.state.lock();
        f(&mut state.participant)
    }

    /// Reconcile the participant with the session's durable record
    ///
    /// Standard checkout path only; the replay path never reads the store.
    pub fn refresh(&self) -> Result<(), SessionError> {
        self.with_participant(|participant| {
            participant.refresh_from_store(&self.session_id, self.store.as_ref())
        })
    }

    /// Mark the participant valid and start a fresh transaction without
    /// consulting the record store
    ///
    /// Replay path only; see
    /// [`TransactionParticipant::mark_valid_and_start_new_txn`].
    pub fn mark_valid_and_start_new_txn(&self, txn_number: Option<i64>) -> i64 {
        self.with_participant(|participant| participant.mark_valid_and_start_new_txn(txn_number))
    }

    /// Release the session back to the catalog
    ///
    /// Dropping the handle does the same; an explicit release simply makes
    /// the point of handoff visible in the caller.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.entry.release();
        log::debug!("Released session {}", self.session_id);
    }
}

impl Drop for CheckedOutSession {
    fn drop(&mut self) {
        self.release_once();
    }
}
