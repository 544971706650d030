use thiserror::Error;

use crate::common::BookingId;
use crate::domains::bookings::models::SessionState;

/// Errors raised while driving a booking through its lifecycle
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Cannot {operation} booking {booking_id} in state {state}: {message}")]
    InvalidTransition {
        booking_id: BookingId,
        operation: &'static str,
        state: SessionState,
        version: i32,
        message: String,
    },

    #[error("Booking {booking_id} was modified (expected version {expected}, found {actual}); reload and retry")]
    VersionConflict {
        booking_id: BookingId,
        expected: i32,
        actual: i32,
    },

    /// Another transaction holds the row lock
    #[error("Booking {0} is being updated elsewhere; retry")]
    Busy(BookingId),

    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BookingError {
    /// Conflicts the caller resolves by reloading the booking and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::VersionConflict { .. } | BookingError::Busy(_)
        )
    }

    /// Infrastructure failures that abort a whole sweep run so the
    /// scheduler's retry applies, instead of being counted against one booking.
    pub fn is_transient(&self) -> bool {
        match self {
            BookingError::Database(e) => is_transient_db_error(e),
            _ => false,
        }
    }

    /// The version a caller should present on its next attempt, when known.
    pub fn current_version(&self) -> Option<i32> {
        match self {
            BookingError::VersionConflict { actual, .. } => Some(*actual),
            BookingError::InvalidTransition { version, .. } => Some(*version),
            _ => None,
        }
    }
}

fn is_transient_db_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
