// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Scoped session checkout guards
//!
//! Command processing constructs one of these guards when it starts handling
//! an operation that touches a logical session, and lets it fall out of
//! scope when handling ends. The guard owns the whole acquire/release
//! protocol: it checks the session out of the catalog, installs it on the
//! operation context, and on drop detaches and releases it no matter how
//! the enclosing scope exited. Callers never call checkout or release
//! directly.

use crate::ops::context::OperationContext;
use crate::session::error::SessionError;
use crate::session::id::{LogicalSessionId, SessionDescriptor};

/// Internal checkout primitive shared by both guards
///
/// Construction checks the session out (blocking, interruptible) and
/// attaches the handle to the operation context; drop detaches and releases
/// it. All post-checkout policy (refresh vs. replay bypass) lives in the
/// public guards.
struct SessionCheckout<'a> {
    op_ctx: &'a OperationContext,
}

impl<'a> SessionCheckout<'a> {
    fn new(
        op_ctx: &'a OperationContext,
        session_id: LogicalSessionId,
    ) -> Result<Self, SessionError> {
        // Reject re-entrant checkout before touching the catalog; waiting
        // on a session this operation already holds could never complete
        if op_ctx.has_attached_session() {
            return Err(SessionError::SessionAlreadyAttached);
        }
        let catalog = op_ctx.catalog();
        let handle = catalog.checkout(op_ctx, session_id)?;
        // On a double attach the handle is released before the error leaves
        op_ctx.attach_session(handle)?;
        Ok(SessionCheckout { op_ctx })
    }
}

impl Drop for SessionCheckout<'_> {
    fn drop(&mut self) {
        // Dropping the detached handle releases the session to the catalog
        let _ = self.op_ctx.detach_session();
    }
}

/// Scoped session checkout for normal client operations
///
/// When checkout is requested, construction checks the session named by the
/// descriptor out of the catalog, refreshes its transaction participant
/// from the durable record, and passes the descriptor's transaction number
/// (if any) through to the participant. When checkout is not requested the
/// guard is a pure no-op: nothing touches the catalog or the operation
/// context, and destruction does nothing.
///
/// The session is released when the guard goes out of scope, on every exit
/// path. A construction failure after checkout releases the session before
/// the error propagates; no partial state stays observable.
pub struct OperationSessionGuard<'a> {
    checkout: Option<SessionCheckout<'a>>,
}

impl<'a> OperationSessionGuard<'a> {
    /// Construct the guard for one operation
    ///
    /// # Arguments
    /// * `op_ctx` - The operation this checkout is scoped to
    /// * `should_check_out` - False for operations that never touch
    ///   session/transaction machinery; the guard then does nothing
    /// * `descriptor` - Client-supplied session information
    ///
    /// # Returns
    /// * `Ok(guard)` - Session checked out (or no-op) and ready
    /// * `Err(SessionError::InvalidSessionDescriptor)` - Malformed
    ///   descriptor, nothing acquired
    /// * `Err(SessionError::CheckoutInterrupted)` - Killed or timed out
    ///   while waiting for the session
    /// * `Err(SessionError::InvalidSessionState)` - Refresh found a
    ///   corrupt or incompatible durable record; the session was released
    ///   again before the error surfaced
    pub fn new(
        op_ctx: &'a OperationContext,
        should_check_out: bool,
        descriptor: &SessionDescriptor,
    ) -> Result<Self, SessionError> {
        if !should_check_out {
            return Ok(OperationSessionGuard { checkout: None });
        }

        descriptor.validate()?;
        let session_id = descriptor.session_id.ok_or_else(|| {
            SessionError::InvalidSessionDescriptor(
                "checkout requested without a session id".to_string(),
            )
        })?;

        let checkout = SessionCheckout::new(op_ctx, session_id)?;

        let ready = op_ctx
            .with_attached_session(|handle| {
                handle.refresh()?;
                if let Some(txn_number) = descriptor.txn_number {
                    handle.with_participant(|participant| {
                        participant.begin_or_continue(txn_number)
                    })?;
                }
                Ok(())
            })
            .unwrap_or_else(|| {
                Err(SessionError::InvalidSessionState(
                    "session slot empty after checkout".to_string(),
                ))
            });
        // Dropping `checkout` on the error path detaches and releases
        ready?;

        log::debug!(
            "Operation {} ready on session {}",
            op_ctx.op_id(),
            session_id
        );
        Ok(OperationSessionGuard {
            checkout: Some(checkout),
        })
    }

    /// Whether this guard actually holds a checked-out session
    pub fn checked_out(&self) -> bool {
        self.checkout.is_some()
    }
}

/// Scoped session checkout for replaying prepared transactions
///
/// Used exclusively by operation-log application on a secondary while it
/// replays prepared transactions. Checkout behaves exactly like the
/// standard guard, but the refresh step is skipped: durable transaction
/// state is being rebuilt from the log, not read back from storage. The
/// participant is instead marked valid and a fresh transaction is started
/// unconditionally, overriding whatever in-memory state the session had.
///
/// This bypass is only safe because log application replays operations in
/// order on a single applier, never concurrently with client traffic
/// against the same session. Do not construct this guard from normal
/// command handling.
pub struct ReplaySessionGuard<'a> {
    _checkout: SessionCheckout<'a>,
}

impl<'a> ReplaySessionGuard<'a> {
    /// Construct the guard for a replay operation
    ///
    /// Session identity comes from the descriptor the operation context
    /// already carries; replay knows which prepared transaction it is
    /// applying before the guard exists.
    ///
    /// # Returns
    /// * `Ok(guard)` - Session checked out, participant valid, fresh
    ///   transaction started
    /// * `Err(SessionError::InvalidSessionDescriptor)` - The context
    ///   carries no session, or its descriptor is malformed
    /// * `Err(SessionError::CheckoutInterrupted)` - Interrupted while
    ///   waiting; no handle is held
    pub fn new(op_ctx: &'a OperationContext) -> Result<Self, SessionError> {
        let descriptor = op_ctx.session_descriptor().ok_or_else(|| {
            SessionError::InvalidSessionDescriptor(
                "replay operation carries no session descriptor".to_string(),
            )
        })?;
        descriptor.validate()?;
        let session_id = descriptor.session_id.ok_or_else(|| {
            SessionError::InvalidSessionDescriptor(
                "replay operation carries no session id".to_string(),
            )
        })?;

        let checkout = SessionCheckout::new(op_ctx, session_id)?;

        let started = op_ctx
            .with_attached_session(|handle| handle.mark_valid_and_start_new_txn(descriptor.txn_number));
        let Some(txn_number) = started else {
            // Dropping `checkout` releases the session
            return Err(SessionError::InvalidSessionState(
                "session slot empty after checkout".to_string(),
            ));
        };

        log::info!(
            "Operation {} replaying transaction {} on session {}",
            op_ctx.op_id(),
            txn_number,
            session_id
        );
        Ok(ReplaySessionGuard {
            _checkout: checkout,
        })
    }
}
