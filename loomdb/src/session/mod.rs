// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Logical session management for transactional operations
//!
//! This module provides session checkout functionality for:
//! - Exclusive, scoped access to per-session transaction bookkeeping
//! - Blocking, interruptible checkout with single-holder semantics
//! - Refresh of in-memory state from durable transaction records
//! - The replay bypass used while applying prepared transactions from
//!   the operation log on a secondary
//!
//! Entry points are the two guards in [`checkout`]; everything else backs
//! them.

pub mod catalog;
pub mod checkout;
pub mod error;
pub mod id;
pub mod participant;
pub mod record;

pub use catalog::{CatalogConfig, CheckedOutSession, SessionCatalog};
pub use checkout::{OperationSessionGuard, ReplaySessionGuard};
pub use error::{InterruptReason, SessionError};
pub use id::{LogicalSessionId, SessionDescriptor};
pub use participant::TransactionParticipant;
pub use record::{InMemorySessionStore, SessionRecordStore, SessionTxnRecord, TxnState};
