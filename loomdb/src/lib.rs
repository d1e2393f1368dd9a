// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! LoomDB session core - scoped exclusive checkout of logical sessions
//!
//! LoomDB is an embedded document database; this crate is its session
//! layer. Operations that support retryable writes or multi-statement
//! transactions reference a logical session, and every such operation must
//! hold exclusive access to that session's transaction bookkeeping while it
//! runs.
//!
//! # Features
//!
//! - **Scoped checkout**: guards acquire on construction and release on
//!   drop, on every exit path
//! - **Single holder**: at most one live checkout per session id across
//!   the process; contended checkouts queue in order
//! - **Interruptible waiting**: a kill or deadline expiry wakes a blocked
//!   checkout promptly
//! - **Replay bypass**: a dedicated guard for prepared-transaction replay
//!   that skips the durable-record refresh
//!
//! # Usage
//!
//! ```rust,no_run
//! use loomdb::{
//!     InMemorySessionStore, LogicalSessionId, OperationContext, OperationSessionGuard,
//!     SessionCatalog, SessionDescriptor,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemorySessionStore::new());
//! let catalog = Arc::new(SessionCatalog::new(store));
//!
//! let op_ctx = OperationContext::new(1, catalog.clone());
//! let descriptor = SessionDescriptor::for_transaction(LogicalSessionId::new(), 0);
//!
//! let guard = OperationSessionGuard::new(&op_ctx, true, &descriptor)?;
//! // ... run the operation against the checked-out session ...
//! drop(guard); // session released back to the catalog
//! # Ok::<(), loomdb::SessionError>(())
//! ```

// Public modules - the session layer is the crate's API surface
pub mod ops;
pub mod session;

// Re-export the public API
pub use ops::OperationContext;
pub use session::{
    CatalogConfig, CheckedOutSession, InMemorySessionStore, InterruptReason, LogicalSessionId,
    OperationSessionGuard, ReplaySessionGuard, SessionCatalog, SessionDescriptor, SessionError,
    SessionRecordStore, SessionTxnRecord, TransactionParticipant, TxnState,
};

/// LoomDB version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// LoomDB crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
