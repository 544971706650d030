//! Integration tests for the interactive booking actions.
//!
//! Covers the optimistic version guard, idempotent repeats, rejected
//! transitions, no-show reports and dispute escalation, and the side
//! effects each committed transition dispatches.

mod common;

use crate::common::{
    create_active_booking, create_package_booking, create_requested_booking,
    create_scheduled_booking, reload, TestHarness,
};
use booking_core::domains::bookings::actions::{accept_booking, cancel_booking, report_no_show};
use booking_core::domains::bookings::models::{
    DisputeState, PartyRole, SessionOutcome, SessionState,
};
use booking_core::domains::bookings::{BookingCommand, BookingError, BookingMachine, Transition};
use booking_core::kernel::test_dependencies::{CollaboratorCall, RecordingCollaborators};
use booking_core::kernel::{clock, PaymentTrigger};
use chrono::Duration;
use test_context::test_context;

// =============================================================================
// Accept
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn accept_schedules_requested_booking(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_requested_booking(&ctx.db_pool, Duration::days(1))
        .await
        .unwrap();
    assert_eq!(booking.session_state, SessionState::Requested);
    assert_eq!(booking.version, 1);

    let response = accept_booking(booking.id, 1, &deps).await.unwrap();

    assert!(response.success);
    assert!(!response.already_in_target_state);
    assert_eq!(response.version, 2);
    assert_eq!(response.booking.session_state, SessionState::Scheduled);
    assert!(response.booking.confirmed_at.is_some());

    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored, response.booking);
    assert!(ctx
        .collaborators
        .was_called(&CollaboratorCall::BookingConfirmed(booking.id)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn repeated_accept_is_idempotent(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_requested_booking(&ctx.db_pool, Duration::days(1))
        .await
        .unwrap();

    let first = accept_booking(booking.id, 1, &deps).await.unwrap();
    let second = accept_booking(booking.id, first.version, &deps)
        .await
        .unwrap();

    assert!(second.success);
    assert!(second.already_in_target_state);
    assert_eq!(second.version, first.version);
    assert_eq!(second.booking.confirmed_at, first.booking.confirmed_at);

    // Only the first accept dispatched effects
    let confirmations = ctx
        .collaborators
        .calls_for(booking.id)
        .into_iter()
        .filter(|c| matches!(c, CollaboratorCall::BookingConfirmed(_)))
        .count();
    assert_eq!(confirmations, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn accept_with_package_consumes_credit(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_package_booking(&ctx.db_pool).await.unwrap();
    let package_id = booking.package_id.unwrap();

    accept_booking(booking.id, booking.version, &deps)
        .await
        .unwrap();

    assert!(ctx.collaborators.was_called(&CollaboratorCall::CreditConsumed {
        student_id: booking.student_id,
        package_id,
    }));
}

// =============================================================================
// Version guard
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn stale_version_is_rejected_with_current_version(ctx: &TestHarness) {
    let deps = ctx.deps();
    // requested (v1) -> scheduled (v2) -> active (v3)
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();
    assert_eq!(booking.version, 3);

    // Two clients both loaded version 3; the student's report lands first
    let first = report_no_show(booking.id, 3, PartyRole::Tutor, PartyRole::Student, &deps)
        .await
        .unwrap();
    assert_eq!(first.version, 4);

    let err = report_no_show(booking.id, 3, PartyRole::Student, PartyRole::Tutor, &deps)
        .await
        .unwrap_err();

    match &err {
        BookingError::VersionConflict {
            expected, actual, ..
        } => {
            assert_eq!(*expected, 3);
            assert_eq!(*actual, 4);
        }
        other => panic!("expected version conflict, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(err.current_version(), Some(4));

    // The losing write changed nothing
    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(stored.session_outcome, Some(SessionOutcome::NoShowTutor));
    assert_eq!(stored.dispute_state, DisputeState::None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn accept_with_version_read_before_cancel_is_rejected(ctx: &TestHarness) {
    let deps = ctx.deps();
    // requested (v1) -> scheduled (v2)
    let booking = create_scheduled_booking(&deps, Duration::days(1))
        .await
        .unwrap();
    assert_eq!(booking.version, 2);

    // Tutor's screen loaded version 2; the student cancels first
    let seen_by_tutor = booking.version;
    let cancelled = cancel_booking(
        booking.id,
        booking.version,
        "booked the wrong week".to_string(),
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap();
    assert_eq!(cancelled.version, 3);

    let err = accept_booking(booking.id, seen_by_tutor, &deps)
        .await
        .unwrap_err();

    match err {
        BookingError::VersionConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, 2);
            assert_eq!(actual, 3);
        }
        other => panic!("expected version conflict, got {other:?}"),
    }
    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored.session_state, SessionState::Cancelled);
    assert_eq!(stored.version, 3);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn accept_does_not_wait_on_locked_row(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_requested_booking(&ctx.db_pool, Duration::days(1))
        .await
        .unwrap();

    // A sweep (or any other writer) is holding the row
    let mut other = ctx.db_pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(booking.id)
        .execute(&mut *other)
        .await
        .unwrap();

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        accept_booking(booking.id, booking.version, &deps),
    )
    .await
    .expect("accept waited on another transaction's lock");

    let err = result.unwrap_err();
    assert!(matches!(err, BookingError::Busy(id) if id == booking.id));
    assert!(err.is_retryable());

    other.rollback().await.unwrap();

    // Once released, the same request goes through
    let response = accept_booking(booking.id, booking.version, &deps)
        .await
        .unwrap();
    assert_eq!(response.booking.session_state, SessionState::Scheduled);
    assert_eq!(response.version, booking.version + 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn conditional_write_lets_only_one_racer_commit(ctx: &TestHarness) {
    let booking = create_requested_booking(&ctx.db_pool, Duration::days(1))
        .await
        .unwrap();
    let now = clock::db_now(&ctx.db_pool).await.unwrap();

    // Both writers decided against the same snapshot
    let Transition::Applied(accepted) = BookingMachine::decide(&booking, &BookingCommand::Accept, now)
    else {
        panic!("accept should apply");
    };
    let cancel = BookingCommand::Cancel {
        reason: "found another tutor".to_string(),
        cancelled_by: PartyRole::Student,
    };
    let Transition::Applied(cancelled) = BookingMachine::decide(&booking, &cancel, now) else {
        panic!("cancel should apply");
    };

    let mut conn = ctx.db_pool.acquire().await.unwrap();
    let winner = accepted
        .commit_transition(booking.version, &mut *conn)
        .await
        .unwrap();
    let loser = cancelled
        .commit_transition(booking.version, &mut *conn)
        .await
        .unwrap();

    assert_eq!(winner.unwrap().version, booking.version + 1);
    assert!(loser.is_none());

    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored.session_state, SessionState::Scheduled);
    assert!(stored.cancellation_reason.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn version_increases_by_one_per_transition(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();
    assert_eq!(booking.version, 3);

    let ended = report_no_show(booking.id, 3, PartyRole::Student, PartyRole::Tutor, &deps)
        .await
        .unwrap();
    assert_eq!(ended.version, 4);

    let disputed = report_no_show(booking.id, 4, PartyRole::Tutor, PartyRole::Student, &deps)
        .await
        .unwrap();
    assert_eq!(disputed.version, 5);

    // Idempotent repeats and rejections leave it alone
    let repeat = report_no_show(booking.id, 5, PartyRole::Tutor, PartyRole::Student, &deps)
        .await
        .unwrap();
    assert_eq!(repeat.version, 5);
    let rejected = cancel_booking(booking.id, 5, "late".to_string(), PartyRole::Student, &deps).await;
    assert!(rejected.is_err());

    assert_eq!(reload(&ctx.db_pool, &booking).await.unwrap().version, 5);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_booking_is_not_found(ctx: &TestHarness) {
    let deps = ctx.deps();
    let missing = booking_core::common::BookingId::new();

    let err = accept_booking(missing, 1, &deps).await.unwrap_err();

    assert!(matches!(err, BookingError::NotFound(id) if id == missing));
}

// =============================================================================
// Cancel
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_scheduled_booking_runs_all_effects(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_package_booking(&ctx.db_pool).await.unwrap();
    let scheduled = accept_booking(booking.id, booking.version, &deps)
        .await
        .unwrap();

    let response = cancel_booking(
        booking.id,
        scheduled.version,
        "  schedule conflict  ".to_string(),
        PartyRole::Tutor,
        &deps,
    )
    .await
    .unwrap();

    let cancelled = response.booking;
    assert_eq!(cancelled.session_state, SessionState::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("schedule conflict"));
    assert_eq!(cancelled.cancelled_by, Some(PartyRole::Tutor));
    assert!(cancelled.cancelled_at.is_some());

    let calls = ctx.collaborators.calls_for(booking.id);
    assert!(calls.contains(&CollaboratorCall::BookingCancelled {
        booking_id: booking.id,
        reason: "schedule conflict".to_string(),
    }));
    assert!(calls.contains(&CollaboratorCall::MeetingTornDown(booking.id)));
    assert!(calls.contains(&CollaboratorCall::CreditReleased(booking.id)));
    assert!(calls.contains(&CollaboratorCall::PaymentReconciled {
        booking_id: booking.id,
        trigger: PaymentTrigger::Cancelled,
    }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_requested_booking_keeps_credit(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_package_booking(&ctx.db_pool).await.unwrap();

    cancel_booking(
        booking.id,
        booking.version,
        "changed my mind".to_string(),
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap();

    assert!(!ctx
        .collaborators
        .was_called(&CollaboratorCall::CreditReleased(booking.id)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_requires_a_reason(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_requested_booking(&ctx.db_pool, Duration::days(1))
        .await
        .unwrap();

    let err = cancel_booking(booking.id, 1, "   ".to_string(), PartyRole::Student, &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored.session_state, SessionState::Requested);
    assert_eq!(stored.version, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_twice_is_idempotent(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_scheduled_booking(&deps, Duration::days(1))
        .await
        .unwrap();

    let first = cancel_booking(
        booking.id,
        booking.version,
        "sick".to_string(),
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap();
    let second = cancel_booking(
        booking.id,
        first.version,
        "sick again".to_string(),
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap();

    assert!(second.already_in_target_state);
    assert_eq!(second.version, first.version);
    // The original reason stands
    assert_eq!(second.booking.cancellation_reason.as_deref(), Some("sick"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_active_session_is_rejected(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();

    let err = cancel_booking(
        booking.id,
        booking.version,
        "too late".to_string(),
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap_err();

    match err {
        BookingError::InvalidTransition { state, version, .. } => {
            assert_eq!(state, SessionState::Active);
            assert_eq!(version, booking.version);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn accept_after_cancel_is_rejected(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_requested_booking(&ctx.db_pool, Duration::days(1))
        .await
        .unwrap();
    let cancelled = cancel_booking(booking.id, 1, "no longer needed".to_string(), PartyRole::Student, &deps)
        .await
        .unwrap();

    let err = accept_booking(booking.id, cancelled.version, &deps)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    assert!(!err.is_retryable());
}

// =============================================================================
// No-show and disputes
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn no_show_ends_active_session(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();

    let response = report_no_show(
        booking.id,
        booking.version,
        PartyRole::Tutor,
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap();

    let ended = response.booking;
    assert_eq!(ended.session_state, SessionState::Ended);
    assert_eq!(ended.session_outcome, Some(SessionOutcome::NoShowTutor));
    assert_eq!(ended.no_show_reported_by, Some(PartyRole::Student));
    assert!(ended.ended_at.is_some());
    assert!(!response.escalated_to_dispute);

    assert!(ctx
        .collaborators
        .was_called(&CollaboratorCall::SessionEnded(booking.id)));
    assert!(ctx.collaborators.was_called(&CollaboratorCall::PaymentReconciled {
        booking_id: booking.id,
        trigger: PaymentTrigger::NoShow,
    }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn conflicting_no_show_reports_open_dispute(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();

    let ended = report_no_show(
        booking.id,
        booking.version,
        PartyRole::Tutor,
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap();

    let disputed = report_no_show(
        booking.id,
        ended.version,
        PartyRole::Student,
        PartyRole::Tutor,
        &deps,
    )
    .await
    .unwrap();

    assert!(disputed.success);
    assert!(disputed.escalated_to_dispute);
    assert_eq!(disputed.version, ended.version + 1);
    // The first report's outcome stands; the dispute is recorded beside it
    assert_eq!(disputed.booking.session_state, SessionState::Ended);
    assert_eq!(disputed.booking.session_outcome, Some(SessionOutcome::NoShowTutor));
    assert_eq!(disputed.booking.dispute_state, DisputeState::Open);
    assert!(disputed.booking.disputed_at.is_some());

    assert!(ctx
        .collaborators
        .was_called(&CollaboratorCall::DisputeOpened(booking.id)));
    assert!(ctx.collaborators.was_called(&CollaboratorCall::PaymentReconciled {
        booking_id: booking.id,
        trigger: PaymentTrigger::Disputed,
    }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn confirming_no_show_report_is_idempotent(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();

    let ended = report_no_show(
        booking.id,
        booking.version,
        PartyRole::Student,
        PartyRole::Tutor,
        &deps,
    )
    .await
    .unwrap();
    let again = report_no_show(
        booking.id,
        ended.version,
        PartyRole::Student,
        PartyRole::Tutor,
        &deps,
    )
    .await
    .unwrap();

    assert!(again.already_in_target_state);
    assert!(!again.escalated_to_dispute);
    assert_eq!(again.version, ended.version);
    assert_eq!(again.booking.dispute_state, DisputeState::None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn reporting_yourself_absent_is_rejected(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_active_booking(&deps, Duration::minutes(-30))
        .await
        .unwrap();

    let err = report_no_show(
        booking.id,
        booking.version,
        PartyRole::Student,
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored.session_state, SessionState::Active);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn no_show_before_session_starts_is_rejected(ctx: &TestHarness) {
    let deps = ctx.deps();
    let booking = create_scheduled_booking(&deps, Duration::days(1))
        .await
        .unwrap();

    let err = report_no_show(
        booking.id,
        booking.version,
        PartyRole::Tutor,
        PartyRole::Student,
        &deps,
    )
    .await
    .unwrap_err();

    match err {
        BookingError::InvalidTransition { state, .. } => {
            assert_eq!(state, SessionState::Scheduled)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

// =============================================================================
// Effect failures
// =============================================================================

#[tokio::test]
async fn failed_notification_does_not_undo_transition() {
    let ctx = TestHarness::with_collaborators(RecordingCollaborators::with_failing_notifications())
        .await
        .unwrap();
    let deps = ctx.deps();
    let booking = create_package_booking(&ctx.db_pool).await.unwrap();

    let response = accept_booking(booking.id, booking.version, &deps)
        .await
        .unwrap();

    assert_eq!(response.booking.session_state, SessionState::Scheduled);
    let stored = reload(&ctx.db_pool, &booking).await.unwrap();
    assert_eq!(stored.session_state, SessionState::Scheduled);
    // The notifier failed but the credit call still went out
    assert!(ctx
        .collaborators
        .was_called(&CollaboratorCall::BookingConfirmed(booking.id)));
    assert!(ctx.collaborators.was_called(&CollaboratorCall::CreditConsumed {
        student_id: booking.student_id,
        package_id: booking.package_id.unwrap(),
    }));
}
