//! End-to-end tests for the standard session checkout guard

use loomdb::{
    InMemorySessionStore, LogicalSessionId, OperationContext, OperationSessionGuard,
    SessionCatalog, SessionDescriptor, SessionError, SessionRecordStore, SessionTxnRecord,
    TxnState,
};
use std::sync::Arc;

struct Fixture {
    store: Arc<InMemorySessionStore>,
    catalog: Arc<SessionCatalog>,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(InMemorySessionStore::new());
        let catalog = Arc::new(SessionCatalog::new(store.clone()));
        Fixture { store, catalog }
    }

    fn op(&self, id: u64) -> OperationContext {
        OperationContext::new(id, self.catalog.clone())
    }
}

#[test]
fn test_checkout_refresh_release_cycle() {
    let fixture = Fixture::new();
    let session_id = LogicalSessionId::new();
    fixture
        .store
        .save(&SessionTxnRecord::new(session_id, 5, TxnState::Committed))
        .expect("failed to seed record");

    let op_ctx = fixture.op(1);
    let descriptor = SessionDescriptor::for_session(session_id);

    {
        let guard = OperationSessionGuard::new(&op_ctx, true, &descriptor)
            .expect("guard construction failed");
        assert!(guard.checked_out());
        assert!(op_ctx.has_attached_session(), "session should be attached");
        assert!(
            fixture.catalog.is_checked_out(&session_id),
            "exactly one handle should exist"
        );

        // Refresh must have run and adopted the durable record
        let refreshed = op_ctx
            .with_attached_session(|handle| {
                handle.with_participant(|p| {
                    (p.is_valid(), p.active_txn_number(), p.last_refresh_at())
                })
            })
            .expect("no attached session");
        assert!(refreshed.0, "participant should be valid after refresh");
        assert_eq!(refreshed.1, Some(5));
        assert!(refreshed.2.is_some(), "refresh timestamp should be set");
    }

    // Guard gone: handle released, slot empty
    assert!(!op_ctx.has_attached_session());
    assert!(!fixture.catalog.is_checked_out(&session_id));
}

#[test]
fn test_skipped_checkout_is_a_complete_noop() {
    let fixture = Fixture::new();
    let op_ctx = fixture.op(1);
    let descriptor = SessionDescriptor::for_session(LogicalSessionId::new());
    assert!(!op_ctx.has_attached_session());

    {
        let guard = OperationSessionGuard::new(&op_ctx, false, &descriptor)
            .expect("no-op guard construction failed");
        assert!(!guard.checked_out());
        assert!(!op_ctx.has_attached_session());
        assert_eq!(
            fixture.catalog.session_count(),
            0,
            "no registry interaction may occur"
        );
    }

    assert!(!op_ctx.has_attached_session());
    assert_eq!(fixture.catalog.session_count(), 0);
}

#[test]
fn test_txn_number_passes_through_to_participant() {
    let fixture = Fixture::new();
    let session_id = LogicalSessionId::new();
    fixture
        .store
        .save(&SessionTxnRecord::new(session_id, 5, TxnState::Committed))
        .expect("failed to seed record");

    let op_ctx = fixture.op(1);
    let descriptor = SessionDescriptor::for_transaction(session_id, 7);
    let _guard =
        OperationSessionGuard::new(&op_ctx, true, &descriptor).expect("guard construction failed");

    let state = op_ctx
        .with_attached_session(|handle| {
            handle.with_participant(|p| (p.active_txn_number(), p.txn_state()))
        })
        .expect("no attached session");
    assert_eq!(state.0, Some(7), "newer txn number should advance");
    assert_eq!(state.1, Some(TxnState::InProgress));
}

#[test]
fn test_stale_txn_number_fails_and_releases() {
    let fixture = Fixture::new();
    let session_id = LogicalSessionId::new();
    fixture
        .store
        .save(&SessionTxnRecord::new(session_id, 5, TxnState::Committed))
        .expect("failed to seed record");

    let op_ctx = fixture.op(1);
    let descriptor = SessionDescriptor::for_transaction(session_id, 3);

    let err = OperationSessionGuard::new(&op_ctx, true, &descriptor)
        .err()
        .expect("stale transaction must be rejected");
    assert!(matches!(
        err,
        SessionError::TransactionTooOld {
            active: 5,
            requested: 3
        }
    ));

    // The failed construction must leave nothing behind
    assert!(!op_ctx.has_attached_session());
    assert!(!fixture.catalog.is_checked_out(&session_id));
}

#[test]
fn test_corrupt_record_fails_construction_and_releases() {
    let fixture = Fixture::new();
    let session_id = LogicalSessionId::new();
    fixture.store.insert_raw(session_id, vec![0xff, 0x00, 0x13]);

    let op_ctx = fixture.op(1);
    let descriptor = SessionDescriptor::for_session(session_id);

    let err = OperationSessionGuard::new(&op_ctx, true, &descriptor)
        .err()
        .expect("corrupt record must fail construction");
    assert!(matches!(err, SessionError::InvalidSessionState(_)));

    assert!(!op_ctx.has_attached_session(), "no partial attach may remain");
    assert!(
        !fixture.catalog.is_checked_out(&session_id),
        "the handle must be released before the error propagates"
    );
}

#[test]
fn test_second_attach_on_same_operation_is_rejected() {
    let fixture = Fixture::new();
    let op_ctx = fixture.op(1);
    let first_id = LogicalSessionId::new();
    let second_id = LogicalSessionId::new();

    let _first =
        OperationSessionGuard::new(&op_ctx, true, &SessionDescriptor::for_session(first_id))
            .expect("first guard failed");

    let err =
        OperationSessionGuard::new(&op_ctx, true, &SessionDescriptor::for_session(second_id))
            .err()
            .expect("second attach must be rejected");
    assert!(matches!(err, SessionError::SessionAlreadyAttached));

    // The rejected checkout must not leak its handle
    assert!(!fixture.catalog.is_checked_out(&second_id));
    // The original attachment is untouched
    assert!(op_ctx.has_attached_session());
    assert!(fixture.catalog.is_checked_out(&first_id));
}

#[test]
fn test_guard_rejects_malformed_descriptor_before_checkout() {
    let fixture = Fixture::new();
    let op_ctx = fixture.op(1);
    let descriptor = SessionDescriptor {
        txn_number: Some(2),
        ..Default::default()
    };

    let err = OperationSessionGuard::new(&op_ctx, true, &descriptor)
        .err()
        .expect("malformed descriptor must fail");
    assert!(matches!(err, SessionError::InvalidSessionDescriptor(_)));
    assert_eq!(
        fixture.catalog.session_count(),
        0,
        "validation happens before any registry interaction"
    );
}
