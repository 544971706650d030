use serde::{Deserialize, Serialize};

use crate::domains::bookings::machines::BookingCommand;
use crate::domains::bookings::models::{Booking, SessionState};

/// Booking domain events - FACT EVENTS ONLY
///
/// Emitted after a transition has committed. Each carries the committed
/// record so effects never re-read the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookingEvent {
    BookingConfirmed { booking: Booking },

    BookingCancelled {
        booking: Booking,
        /// State the booking was cancelled from
        previous_state: SessionState,
    },

    BookingExpired { booking: Booking },

    SessionStarted { booking: Booking },

    SessionEnded { booking: Booking },

    DisputeOpened { booking: Booking },
}

impl BookingEvent {
    /// The fact produced by committing `command`, given the state before and
    /// the record after.
    pub fn from_commit(
        command: &BookingCommand,
        previous_state: SessionState,
        committed: Booking,
    ) -> Self {
        match command {
            BookingCommand::Accept => BookingEvent::BookingConfirmed { booking: committed },
            BookingCommand::Expire => BookingEvent::BookingExpired { booking: committed },
            BookingCommand::StartSession => BookingEvent::SessionStarted { booking: committed },
            BookingCommand::EndSession { .. } => BookingEvent::SessionEnded { booking: committed },
            BookingCommand::Cancel { .. } => BookingEvent::BookingCancelled {
                booking: committed,
                previous_state,
            },
            BookingCommand::MarkNoShow { .. } if previous_state == SessionState::Ended => {
                BookingEvent::DisputeOpened { booking: committed }
            }
            BookingCommand::MarkNoShow { .. } => BookingEvent::SessionEnded { booking: committed },
        }
    }

    pub fn booking(&self) -> &Booking {
        match self {
            BookingEvent::BookingConfirmed { booking }
            | BookingEvent::BookingCancelled { booking, .. }
            | BookingEvent::BookingExpired { booking }
            | BookingEvent::SessionStarted { booking }
            | BookingEvent::SessionEnded { booking }
            | BookingEvent::DisputeOpened { booking } => booking,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::BookingConfirmed { .. } => "booking_confirmed",
            BookingEvent::BookingCancelled { .. } => "booking_cancelled",
            BookingEvent::BookingExpired { .. } => "booking_expired",
            BookingEvent::SessionStarted { .. } => "session_started",
            BookingEvent::SessionEnded { .. } => "session_ended",
            BookingEvent::DisputeOpened { .. } => "dispute_opened",
        }
    }
}
