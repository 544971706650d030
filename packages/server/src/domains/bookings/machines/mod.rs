use chrono::{DateTime, Utc};

use crate::domains::bookings::errors::BookingError;
use crate::domains::bookings::models::{
    Booking, DisputeState, PartyRole, SessionOutcome, SessionState,
};

/// A requested change to a booking
#[derive(Debug, Clone, PartialEq)]
pub enum BookingCommand {
    Accept,
    Expire,
    StartSession,
    EndSession {
        outcome: SessionOutcome,
    },
    Cancel {
        reason: String,
        cancelled_by: PartyRole,
    },
    MarkNoShow {
        absent: PartyRole,
        reporter: PartyRole,
    },
}

impl BookingCommand {
    pub fn operation(&self) -> &'static str {
        match self {
            BookingCommand::Accept => "accept",
            BookingCommand::Expire => "expire",
            BookingCommand::StartSession => "start",
            BookingCommand::EndSession { .. } => "end",
            BookingCommand::Cancel { .. } => "cancel",
            BookingCommand::MarkNoShow { .. } => "mark_no_show",
        }
    }
}

/// Decision returned by the state machine.
///
/// `Applied` and `EscalatedToDispute` carry the next record with the version
/// already advanced by one; the caller persists it. The other two variants
/// leave the booking untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied(Booking),
    AlreadyInTargetState,
    EscalatedToDispute(Booking),
    Rejected(TransitionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionError {
    pub operation: &'static str,
    pub state: SessionState,
    pub message: String,
}

impl TransitionError {
    pub fn into_booking_error(self, booking: &Booking) -> BookingError {
        BookingError::InvalidTransition {
            booking_id: booking.id,
            operation: self.operation,
            state: self.state,
            version: booking.version,
            message: self.message,
        }
    }
}

/// Flat view of a transition for callers that report flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub success: bool,
    pub already_in_target_state: bool,
    pub escalated_to_dispute: bool,
    pub error_message: Option<String>,
}

impl Transition {
    pub fn result(&self) -> TransitionResult {
        match self {
            Transition::Applied(_) => TransitionResult {
                success: true,
                already_in_target_state: false,
                escalated_to_dispute: false,
                error_message: None,
            },
            Transition::AlreadyInTargetState => TransitionResult {
                success: true,
                already_in_target_state: true,
                escalated_to_dispute: false,
                error_message: None,
            },
            Transition::EscalatedToDispute(_) => TransitionResult {
                success: true,
                already_in_target_state: false,
                escalated_to_dispute: true,
                error_message: None,
            },
            Transition::Rejected(err) => TransitionResult {
                success: false,
                already_in_target_state: false,
                escalated_to_dispute: false,
                error_message: Some(err.message.clone()),
            },
        }
    }

    /// The record to persist, if this transition mutates the booking.
    pub fn next_booking(&self) -> Option<&Booking> {
        match self {
            Transition::Applied(next) | Transition::EscalatedToDispute(next) => Some(next),
            Transition::AlreadyInTargetState | Transition::Rejected(_) => None,
        }
    }
}

/// Booking state machine - pure decision logic
///
/// ```text
/// REQUESTED ──accept──► SCHEDULED ──start──► ACTIVE ──end / no-show──► ENDED
///     │                     │
///     ├──expire──► EXPIRED  │
///     └──cancel──► CANCELLED ◄──cancel
/// ```
///
/// Holds no state of its own; every decision is a function of the record it
/// is given and the supplied `now`.
pub struct BookingMachine;

impl BookingMachine {
    pub fn decide(booking: &Booking, command: &BookingCommand, now: DateTime<Utc>) -> Transition {
        match command {
            BookingCommand::Accept => Self::accept(booking, now),
            BookingCommand::Expire => Self::expire(booking, now),
            BookingCommand::StartSession => Self::start_session(booking, now),
            BookingCommand::EndSession { outcome } => Self::end_session(booking, *outcome, now),
            BookingCommand::Cancel {
                reason,
                cancelled_by,
            } => Self::cancel(booking, reason, *cancelled_by, now),
            BookingCommand::MarkNoShow { absent, reporter } => {
                Self::mark_no_show(booking, *absent, *reporter, now)
            }
        }
    }

    /// REQUESTED → SCHEDULED
    pub fn accept(booking: &Booking, now: DateTime<Utc>) -> Transition {
        match booking.session_state {
            SessionState::Requested => {
                let mut next = advance(booking, now);
                next.session_state = SessionState::Scheduled;
                next.confirmed_at.get_or_insert(now);
                Transition::Applied(next)
            }
            SessionState::Scheduled => Transition::AlreadyInTargetState,
            state => reject("accept", state, "only requested bookings can be accepted"),
        }
    }

    /// REQUESTED → EXPIRED
    pub fn expire(booking: &Booking, now: DateTime<Utc>) -> Transition {
        match booking.session_state {
            SessionState::Requested => {
                let mut next = advance(booking, now);
                next.session_state = SessionState::Expired;
                next.expired_at.get_or_insert(now);
                Transition::Applied(next)
            }
            SessionState::Expired => Transition::AlreadyInTargetState,
            state => reject("expire", state, "only requested bookings can expire"),
        }
    }

    /// SCHEDULED → ACTIVE
    pub fn start_session(booking: &Booking, now: DateTime<Utc>) -> Transition {
        match booking.session_state {
            SessionState::Scheduled => {
                let mut next = advance(booking, now);
                next.session_state = SessionState::Active;
                next.started_at.get_or_insert(now);
                Transition::Applied(next)
            }
            SessionState::Active => Transition::AlreadyInTargetState,
            state => reject("start", state, "only scheduled sessions can start"),
        }
    }

    /// ACTIVE → ENDED; a repeat call never overwrites the recorded outcome
    pub fn end_session(
        booking: &Booking,
        outcome: SessionOutcome,
        now: DateTime<Utc>,
    ) -> Transition {
        match booking.session_state {
            SessionState::Active => {
                let mut next = advance(booking, now);
                next.session_state = SessionState::Ended;
                next.session_outcome = Some(outcome);
                next.ended_at.get_or_insert(now);
                Transition::Applied(next)
            }
            SessionState::Ended => Transition::AlreadyInTargetState,
            state => reject("end", state, "only active sessions can end"),
        }
    }

    /// REQUESTED | SCHEDULED → CANCELLED
    pub fn cancel(
        booking: &Booking,
        reason: &str,
        cancelled_by: PartyRole,
        now: DateTime<Utc>,
    ) -> Transition {
        match booking.session_state {
            SessionState::Requested | SessionState::Scheduled => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return reject(
                        "cancel",
                        booking.session_state,
                        "a cancellation reason is required",
                    );
                }

                let mut next = advance(booking, now);
                next.session_state = SessionState::Cancelled;
                next.cancellation_reason = Some(reason.to_string());
                next.cancelled_by = Some(cancelled_by);
                next.cancelled_at.get_or_insert(now);
                Transition::Applied(next)
            }
            SessionState::Cancelled => Transition::AlreadyInTargetState,
            state => reject(
                "cancel",
                state,
                "sessions that have started or finished cannot be cancelled",
            ),
        }
    }

    /// ACTIVE → ENDED with a no-show outcome.
    ///
    /// A later report against the ended booking that names the other party
    /// as absent leaves the outcome alone and opens a dispute instead.
    pub fn mark_no_show(
        booking: &Booking,
        absent: PartyRole,
        reporter: PartyRole,
        now: DateTime<Utc>,
    ) -> Transition {
        if absent == reporter {
            return reject(
                "mark_no_show",
                booking.session_state,
                "a party cannot report itself absent",
            );
        }

        match booking.session_state {
            SessionState::Active => {
                let mut next = advance(booking, now);
                next.session_state = SessionState::Ended;
                next.session_outcome = Some(SessionOutcome::no_show(absent));
                next.no_show_reported_by = Some(reporter);
                next.ended_at.get_or_insert(now);
                Transition::Applied(next)
            }
            SessionState::Ended => {
                let recorded_absent = booking.session_outcome.and_then(|o| o.absent_party());
                match recorded_absent {
                    Some(previous) if previous == absent => Transition::AlreadyInTargetState,
                    Some(_) if booking.dispute_state != DisputeState::None => {
                        Transition::AlreadyInTargetState
                    }
                    Some(_) => {
                        let mut next = advance(booking, now);
                        next.dispute_state = DisputeState::Open;
                        next.disputed_at.get_or_insert(now);
                        Transition::EscalatedToDispute(next)
                    }
                    None => reject(
                        "mark_no_show",
                        SessionState::Ended,
                        "session already ended as completed",
                    ),
                }
            }
            state => reject(
                "mark_no_show",
                state,
                "no-shows can only be reported for active or no-show sessions",
            ),
        }
    }

    /// Optimistic guard for interactive writers
    pub fn verify_version(booking: &Booking, expected_version: i32) -> bool {
        booking.version == expected_version
    }
}

fn advance(booking: &Booking, now: DateTime<Utc>) -> Booking {
    let mut next = booking.clone();
    next.version += 1;
    next.updated_at = now;
    next
}

fn reject(operation: &'static str, state: SessionState, message: &str) -> Transition {
    Transition::Rejected(TransitionError {
        operation,
        state,
        message: format!("{} (current state: {})", message, state),
    })
}
