use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, PgConnection, Postgres};
use typed_builder::TypedBuilder;

use crate::common::{BookingId, PackageId, UserId};

/// SQLSTATE raised by `FOR UPDATE NOWAIT` when another transaction holds the row.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Booking - one scheduled session between a student and a tutor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: BookingId,
    pub student_id: UserId,
    pub tutor_id: UserId,
    pub package_id: Option<PackageId>,

    // Scheduled window (absolute); timezone is the student's, for display
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,

    // State
    pub session_state: SessionState,
    pub session_outcome: Option<SessionOutcome>,
    pub payment_state: PaymentState,
    pub dispute_state: DisputeState,
    pub version: i32,

    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<PartyRole>,
    pub no_show_reported_by: Option<PartyRole>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Audit stamps, each written once
    pub confirmed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Requested,
    Scheduled,
    Active,
    Ended,
    Cancelled,
    Expired,
}

impl SessionState {
    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Ended | SessionState::Cancelled | SessionState::Expired
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Requested => write!(f, "requested"),
            SessionState::Scheduled => write!(f, "scheduled"),
            SessionState::Active => write!(f, "active"),
            SessionState::Ended => write!(f, "ended"),
            SessionState::Cancelled => write!(f, "cancelled"),
            SessionState::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    NoShowStudent,
    NoShowTutor,
}

impl SessionOutcome {
    pub fn no_show(absent: PartyRole) -> Self {
        match absent {
            PartyRole::Student => SessionOutcome::NoShowStudent,
            PartyRole::Tutor => SessionOutcome::NoShowTutor,
        }
    }

    /// The party recorded as absent, if this is a no-show outcome.
    pub fn absent_party(&self) -> Option<PartyRole> {
        match self {
            SessionOutcome::Completed => None,
            SessionOutcome::NoShowStudent => Some(PartyRole::Student),
            SessionOutcome::NoShowTutor => Some(PartyRole::Tutor),
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::NoShowStudent => write!(f, "no_show_student"),
            SessionOutcome::NoShowTutor => write!(f, "no_show_tutor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Authorized,
    Captured,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dispute_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeState {
    None,
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "party_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Student,
    Tutor,
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartyRole::Student => write!(f, "student"),
            PartyRole::Tutor => write!(f, "tutor"),
        }
    }
}

/// Result of a non-blocking row lock attempt
#[derive(Debug)]
pub enum LockOutcome {
    Locked(Booking),
    /// Another transaction holds the row; skip it until the next run
    Busy,
    NotFound,
}

/// Fields supplied by the booking creation flow
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewBooking {
    #[builder(default)]
    pub id: BookingId,
    pub student_id: UserId,
    pub tutor_id: UserId,
    #[builder(default, setter(strip_option))]
    pub package_id: Option<PackageId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[builder(default = "UTC".to_string(), setter(into))]
    pub timezone: String,
    #[builder(default = PaymentState::Pending)]
    pub payment_state: PaymentState,
    /// Defaults to the database clock
    #[builder(default, setter(strip_option))]
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Booking {
    /// Find booking by ID
    pub async fn find_by_id<'e, E>(id: BookingId, executor: E) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock the row for the rest of the transaction without waiting.
    ///
    /// Contention comes back as `LockOutcome::Busy` rather than an error.
    pub async fn find_with_lock(
        id: BookingId,
        conn: &mut PgConnection,
    ) -> Result<LockOutcome, sqlx::Error> {
        let result = sqlx::query_as::<_, Self>(
            "SELECT * FROM bookings WHERE id = $1 FOR UPDATE NOWAIT",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;

        match result {
            Ok(Some(booking)) => Ok(LockOutcome::Locked(booking)),
            Ok(None) => Ok(LockOutcome::NotFound),
            Err(e) if is_lock_not_available(&e) => Ok(LockOutcome::Busy),
            Err(e) => Err(e),
        }
    }

    /// Requested bookings created at or before `cutoff`
    pub async fn find_expirable_ids<'e, E>(
        cutoff: DateTime<Utc>,
        executor: E,
    ) -> Result<Vec<BookingId>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_scalar::<_, BookingId>(
            "SELECT id FROM bookings
             WHERE session_state = 'requested'
               AND created_at <= $1
             ORDER BY created_at ASC",
        )
        .bind(cutoff)
        .fetch_all(executor)
        .await
    }

    /// Scheduled bookings whose start time is at or before `cutoff`
    pub async fn find_startable_ids<'e, E>(
        cutoff: DateTime<Utc>,
        executor: E,
    ) -> Result<Vec<BookingId>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_scalar::<_, BookingId>(
            "SELECT id FROM bookings
             WHERE session_state = 'scheduled'
               AND start_time <= $1
             ORDER BY start_time ASC",
        )
        .bind(cutoff)
        .fetch_all(executor)
        .await
    }

    /// Active bookings whose end time is at or before `cutoff`
    pub async fn find_endable_ids<'e, E>(
        cutoff: DateTime<Utc>,
        executor: E,
    ) -> Result<Vec<BookingId>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_scalar::<_, BookingId>(
            "SELECT id FROM bookings
             WHERE session_state = 'active'
               AND end_time <= $1
             ORDER BY end_time ASC",
        )
        .bind(cutoff)
        .fetch_all(executor)
        .await
    }

    /// Persist a transition computed by the state machine.
    ///
    /// Compare-and-increment: the row is only written if its stored version
    /// still equals `expected_version`, and the stored version is bumped by
    /// the database. Returns `None` when another writer got there first.
    pub async fn commit_transition(
        &self,
        expected_version: i32,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "UPDATE bookings
             SET session_state = $3,
                 session_outcome = $4,
                 dispute_state = $5,
                 cancellation_reason = $6,
                 cancelled_by = $7,
                 no_show_reported_by = $8,
                 confirmed_at = $9,
                 started_at = $10,
                 ended_at = $11,
                 cancelled_at = $12,
                 expired_at = $13,
                 disputed_at = $14,
                 version = version + 1,
                 updated_at = NOW()
             WHERE id = $1
               AND version = $2
             RETURNING *",
        )
        .bind(self.id)
        .bind(expected_version)
        .bind(self.session_state)
        .bind(self.session_outcome)
        .bind(self.dispute_state)
        .bind(&self.cancellation_reason)
        .bind(self.cancelled_by)
        .bind(self.no_show_reported_by)
        .bind(self.confirmed_at)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(self.cancelled_at)
        .bind(self.expired_at)
        .bind(self.disputed_at)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Insert a new booking in the `requested` state
    pub async fn insert<'e, E>(new: NewBooking, executor: E) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Self>(
            "INSERT INTO bookings (
                id,
                student_id,
                tutor_id,
                package_id,
                start_time,
                end_time,
                timezone,
                payment_state,
                created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, NOW()))
             RETURNING *",
        )
        .bind(new.id)
        .bind(new.student_id)
        .bind(new.tutor_id)
        .bind(new.package_id)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.timezone)
        .bind(new.payment_state)
        .bind(new.created_at)
        .fetch_one(executor)
        .await
    }
}

fn is_lock_not_available(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == LOCK_NOT_AVAILABLE)
}
