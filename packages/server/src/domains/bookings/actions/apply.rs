use serde::Serialize;
use tracing::debug;

use crate::common::BookingId;
use crate::domains::bookings::effects;
use crate::domains::bookings::errors::BookingError;
use crate::domains::bookings::events::BookingEvent;
use crate::domains::bookings::machines::{BookingCommand, BookingMachine, Transition};
use crate::domains::bookings::models::{Booking, LockOutcome};
use crate::kernel::{clock, ServerDeps};

/// What an interactive caller gets back on success
#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    pub success: bool,
    /// Version to present on the caller's next mutation
    pub version: i32,
    pub already_in_target_state: bool,
    pub escalated_to_dispute: bool,
    /// Always `None` here; rejections come back as [`BookingError`]
    pub error_message: Option<String>,
    pub booking: Booking,
}

/// Optimistic version guard around one state machine command.
///
/// 1. Lock the row without waiting (a held lock is [`BookingError::Busy`])
///    and compare its version with `expected_version`.
/// 2. Ask the state machine for a decision.
/// 3. Write with `UPDATE ... WHERE version = expected_version`; zero rows
///    means another writer committed in between.
/// 4. Commit, then dispatch side effects.
///
/// Conflicts are never merged; the caller reloads and retries.
pub async fn apply_interactive(
    booking_id: BookingId,
    expected_version: i32,
    command: BookingCommand,
    deps: &ServerDeps,
) -> Result<BookingResponse, BookingError> {
    let mut tx = deps.db_pool.begin().await?;
    let now = clock::db_now(&mut *tx).await?;

    let booking = match Booking::find_with_lock(booking_id, &mut *tx).await? {
        LockOutcome::Locked(booking) => booking,
        LockOutcome::Busy => {
            debug!(booking_id = %booking_id, operation = command.operation(), "booking locked elsewhere");
            tx.rollback().await?;
            return Err(BookingError::Busy(booking_id));
        }
        LockOutcome::NotFound => return Err(BookingError::NotFound(booking_id)),
    };

    if !BookingMachine::verify_version(&booking, expected_version) {
        return Err(BookingError::VersionConflict {
            booking_id,
            expected: expected_version,
            actual: booking.version,
        });
    }

    let transition = BookingMachine::decide(&booking, &command, now);
    let result = transition.result();

    let next = match transition {
        Transition::Rejected(err) => return Err(err.into_booking_error(&booking)),
        Transition::AlreadyInTargetState => {
            debug!(
                booking_id = %booking_id,
                operation = command.operation(),
                state = %booking.session_state,
                "booking already in target state"
            );
            tx.rollback().await?;
            return Ok(BookingResponse {
                success: true,
                version: booking.version,
                already_in_target_state: true,
                escalated_to_dispute: false,
                error_message: None,
                booking,
            });
        }
        Transition::Applied(next) | Transition::EscalatedToDispute(next) => next,
    };

    let Some(committed) = next.commit_transition(expected_version, &mut *tx).await? else {
        tx.rollback().await?;
        let actual = Booking::find_by_id(booking_id, &deps.db_pool)
            .await?
            .map(|b| b.version)
            .unwrap_or(expected_version);
        return Err(BookingError::VersionConflict {
            booking_id,
            expected: expected_version,
            actual,
        });
    };
    tx.commit().await?;

    let event = BookingEvent::from_commit(&command, booking.session_state, committed.clone());
    effects::dispatch(&event, deps).await;

    Ok(BookingResponse {
        success: true,
        version: committed.version,
        already_in_target_state: false,
        escalated_to_dispute: result.escalated_to_dispute,
        error_message: result.error_message,
        booking: committed,
    })
}
