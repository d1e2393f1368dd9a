// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Operation context: one in-flight database operation
//!
//! The operation context carries the client's session descriptor, the
//! operation's interruption state (deadline and kill flag), and the slot a
//! checked-out session is installed into while a guard is live. Blocking
//! waits inside the session layer go through
//! `wait_for_condition_or_interrupt` so a kill or deadline expiry wakes the
//! waiter instead of leaving it parked.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::session::catalog::{CheckedOutSession, SessionCatalog};
use crate::session::error::{InterruptReason, SessionError};
use crate::session::id::SessionDescriptor;

/// How long a waiter sleeps before re-checking its interrupt state
///
/// Wakeups are normally delivered by notify (release or kill); the bounded
/// re-check only covers a kill that lands between the flag check and the
/// park.
const INTERRUPT_RECHECK_INTERVAL: Duration = Duration::from_millis(50);

struct InterruptInner {
    /// Kill reason, set at most once
    killed: Option<String>,
    /// Absolute deadline for the whole operation
    deadline: Option<Instant>,
    /// Condvar the operation is currently parked on, if any
    waiter: Option<Arc<Condvar>>,
}

/// Interruption state shared between the operation and whoever kills it
struct InterruptState {
    inner: Mutex<InterruptInner>,
}

impl InterruptState {
    fn new() -> Self {
        InterruptState {
            inner: Mutex::new(InterruptInner {
                killed: None,
                deadline: None,
                waiter: None,
            }),
        }
    }

    fn kill(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.killed.is_none() {
            inner.killed = Some(reason.to_string());
        }
        if let Some(waiter) = &inner.waiter {
            waiter.notify_all();
        }
    }

    fn set_deadline(&self, deadline: Instant) {
        self.inner.lock().deadline = Some(deadline);
    }

    fn deadline(&self) -> Option<Instant> {
        self.inner.lock().deadline
    }

    fn check(&self) -> Result<(), SessionError> {
        let inner = self.inner.lock();
        if inner.killed.is_some() {
            return Err(SessionError::CheckoutInterrupted {
                reason: InterruptReason::Killed,
            });
        }
        if let Some(deadline) = inner.deadline {
            if Instant::now() >= deadline {
                return Err(SessionError::CheckoutInterrupted {
                    reason: InterruptReason::DeadlineExceeded,
                });
            }
        }
        Ok(())
    }

    fn register_waiter(&self, waiter: Arc<Condvar>) {
        self.inner.lock().waiter = Some(waiter);
    }

    fn clear_waiter(&self) {
        self.inner.lock().waiter = None;
    }
}

/// Context for one in-flight operation
///
/// Exactly one checked-out session may be attached at a time; the guards in
/// `session::checkout` own attach/detach. The context is shared by reference
/// with the session layer, so all mutable state is interior.
pub struct OperationContext {
    /// Operation identifier, for diagnostics
    op_id: u64,
    /// The session catalog this operation resolves sessions against
    catalog: Arc<SessionCatalog>,
    /// Session information the client sent with the operation
    descriptor: Mutex<Option<SessionDescriptor>>,
    /// Deadline/kill state
    interrupt: InterruptState,
    /// The checked-out session installed for this operation, if any
    attached: Mutex<Option<CheckedOutSession>>,
}

impl OperationContext {
    /// Create a context for a new operation
    ///
    /// # Arguments
    /// * `op_id` - Unique operation identifier (diagnostics only)
    /// * `catalog` - The catalog sessions are checked out from
    pub fn new(op_id: u64, catalog: Arc<SessionCatalog>) -> Self {
        OperationContext {
            op_id,
            catalog,
            descriptor: Mutex::new(None),
            interrupt: InterruptState::new(),
            attached: Mutex::new(None),
        }
    }

    /// The operation identifier
    pub fn op_id(&self) -> u64 {
        self.op_id
    }

    /// The catalog this operation resolves sessions against
    pub fn catalog(&self) -> Arc<SessionCatalog> {
        self.catalog.clone()
    }

    /// Record the session descriptor the client sent with this operation
    pub fn set_session_descriptor(&self, descriptor: SessionDescriptor) {
        *self.descriptor.lock() = Some(descriptor);
    }

    /// The session descriptor carried by this operation, if any
    pub fn session_descriptor(&self) -> Option<SessionDescriptor> {
        self.descriptor.lock().clone()
    }

    /// Set an absolute deadline for the operation
    pub fn set_deadline(&self, deadline: Instant) {
        self.interrupt.set_deadline(deadline);
    }

    /// Kill the operation, waking it if it is blocked
    ///
    /// Idempotent; the first reason wins.
    pub fn kill(&self, reason: &str) {
        log::info!("Killing operation {}: {}", self.op_id, reason);
        self.interrupt.kill(reason);
    }

    /// Fail fast if the operation has been killed or its deadline passed
    pub fn check_for_interrupt(&self) -> Result<(), SessionError> {
        self.interrupt.check()
    }

    /// Block on `condvar` until `ready` holds or the operation is
    /// interrupted
    ///
    /// The condvar is registered with the interrupt state so `kill()` can
    /// wake the waiter; deadlines are honored through timed waits.
    ///
    /// # Returns
    /// * `Ok(())` - The predicate became true
    /// * `Err(SessionError::CheckoutInterrupted)` - Killed or deadline
    ///   expired while waiting
    pub(crate) fn wait_for_condition_or_interrupt<T, F>(
        &self,
        condvar: &Arc<Condvar>,
        guard: &mut MutexGuard<'_, T>,
        mut ready: F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(&T) -> bool,
    {
        self.interrupt.register_waiter(condvar.clone());

        let result = loop {
            if ready(&**guard) {
                break Ok(());
            }
            if let Err(e) = self.check_for_interrupt() {
                break Err(e);
            }

            let mut wake_at = Instant::now() + INTERRUPT_RECHECK_INTERVAL;
            if let Some(deadline) = self.interrupt.deadline() {
                wake_at = wake_at.min(deadline);
            }
            condvar.wait_until(guard, wake_at);
        };

        self.interrupt.clear_waiter();
        result
    }

    /// Install a checked-out session into this operation
    ///
    /// # Returns
    /// * `Err(SessionError::SessionAlreadyAttached)` - A session is already
    ///   installed. This is a caller bug; the handle passed in is released
    ///   before the error propagates.
    pub(crate) fn attach_session(&self, handle: CheckedOutSession) -> Result<(), SessionError> {
        let mut attached = self.attached.lock();
        if attached.is_some() {
            // Dropping `handle` on this path returns it to the catalog
            return Err(SessionError::SessionAlreadyAttached);
        }
        log::debug!(
            "Operation {} attached session {}",
            self.op_id,
            handle.session_id()
        );
        *attached = Some(handle);
        Ok(())
    }

    /// Remove and return the attached session, if any
    pub(crate) fn detach_session(&self) -> Option<CheckedOutSession> {
        let handle = self.attached.lock().take();
        if let Some(handle) = &handle {
            log::debug!(
                "Operation {} detached session {}",
                self.op_id,
                handle.session_id()
            );
        }
        handle
    }

    /// Whether a session is currently attached to this operation
    pub fn has_attached_session(&self) -> bool {
        self.attached.lock().is_some()
    }

    /// Run `f` against the attached session, if one is installed
    pub fn with_attached_session<R>(&self, f: impl FnOnce(&CheckedOutSession) -> R) -> Option<R> {
        self.attached.lock().as_ref().map(f)
    }
}
