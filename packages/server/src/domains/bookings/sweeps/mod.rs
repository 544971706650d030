//! Time-driven booking sweeps.
//!
//! Each sweep reads one `now` from the database, selects candidate ids, and
//! then handles every id in its own short transaction:
//!
//! ```text
//! db_now() ─► find_*_ids(cutoff)
//!                 └─► for each id:
//!                       BEGIN
//!                       SELECT ... FOR UPDATE NOWAIT ── busy ──► skipped_locked
//!                       re-check predicate ─────── stale ──► skipped_already_done
//!                       BookingMachine::decide
//!                       UPDATE ... WHERE version = n
//!                       COMMIT ─► effects::dispatch
//! ```
//!
//! A failure on one id rolls back that id only and is counted in `errors`.
//! Infrastructure failures (lost connection, exhausted pool) abort the run so
//! the scheduler's retry applies to the whole sweep.

use chrono::{DateTime, Duration, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::common::BookingId;
use crate::config::SweepConfig;
use crate::domains::bookings::effects;
use crate::domains::bookings::errors::BookingError;
use crate::domains::bookings::events::BookingEvent;
use crate::domains::bookings::machines::{BookingCommand, BookingMachine, Transition};
use crate::domains::bookings::models::{Booking, LockOutcome, SessionOutcome, SessionState};
use crate::kernel::{clock, ServerDeps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    ExpireRequests,
    StartSessions,
    EndSessions,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [
        SweepKind::ExpireRequests,
        SweepKind::StartSessions,
        SweepKind::EndSessions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SweepKind::ExpireRequests => "expire_requests",
            SweepKind::StartSessions => "start_sessions",
            SweepKind::EndSessions => "end_sessions",
        }
    }

    pub fn command(&self) -> BookingCommand {
        match self {
            SweepKind::ExpireRequests => BookingCommand::Expire,
            SweepKind::StartSessions => BookingCommand::StartSession,
            SweepKind::EndSessions => BookingCommand::EndSession {
                outcome: SessionOutcome::Completed,
            },
        }
    }

    fn source_state(&self) -> SessionState {
        match self {
            SweepKind::ExpireRequests => SessionState::Requested,
            SweepKind::StartSessions => SessionState::Scheduled,
            SweepKind::EndSessions => SessionState::Active,
        }
    }

    /// Timestamp the candidate column is compared against
    pub fn cutoff(&self, now: DateTime<Utc>, windows: &SweepWindows) -> DateTime<Utc> {
        match self {
            SweepKind::ExpireRequests => now - windows.request_expiry,
            SweepKind::StartSessions => now + windows.start_buffer,
            SweepKind::EndSessions => now - windows.end_grace,
        }
    }

    /// The candidate predicate, evaluated against a locked row
    pub fn is_due(&self, booking: &Booking, now: DateTime<Utc>, windows: &SweepWindows) -> bool {
        if booking.session_state != self.source_state() {
            return false;
        }
        let cutoff = self.cutoff(now, windows);
        match self {
            SweepKind::ExpireRequests => booking.created_at <= cutoff,
            SweepKind::StartSessions => booking.start_time <= cutoff,
            SweepKind::EndSessions => booking.end_time <= cutoff,
        }
    }
}

impl std::fmt::Display for SweepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Time windows shared by the sweep predicates
#[derive(Debug, Clone, Copy)]
pub struct SweepWindows {
    pub request_expiry: Duration,
    pub start_buffer: Duration,
    pub end_grace: Duration,
}

impl Default for SweepWindows {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SweepWindows {
    fn from(config: &SweepConfig) -> Self {
        Self {
            request_expiry: config.request_expiry,
            start_buffer: config.start_buffer,
            end_grace: config.end_grace,
        }
    }
}

/// Counters reported by one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub processed: u64,
    pub skipped_already_done: u64,
    pub skipped_locked: u64,
    pub errors: u64,
}

impl SweepStats {
    pub fn skipped(&self) -> u64 {
        self.skipped_already_done + self.skipped_locked
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Transitioned => self.processed += 1,
            ItemOutcome::NoLongerDue => self.skipped_already_done += 1,
            ItemOutcome::Locked => self.skipped_locked += 1,
        }
    }
}

// Serialized with the `skipped` total alongside its two parts
impl Serialize for SweepStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SweepStats", 5)?;
        state.serialize_field("processed", &self.processed)?;
        state.serialize_field("skipped", &self.skipped())?;
        state.serialize_field("skipped_already_done", &self.skipped_already_done)?;
        state.serialize_field("skipped_locked", &self.skipped_locked)?;
        state.serialize_field("errors", &self.errors)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Transitioned,
    NoLongerDue,
    Locked,
}

/// How far a failure on one booking reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureScope {
    /// Counted in `errors`; the run moves on to the next id
    Item,
    /// Aborts the run so the scheduler's retry applies
    Run,
}

impl FailureScope {
    fn of(error: &BookingError) -> Self {
        if error.is_transient() {
            FailureScope::Run
        } else {
            FailureScope::Item
        }
    }
}

/// Runs the booking sweeps against the database in `deps`
#[derive(Clone)]
pub struct SweepRunner {
    deps: ServerDeps,
    windows: SweepWindows,
}

impl SweepRunner {
    pub fn new(deps: ServerDeps, windows: SweepWindows) -> Self {
        Self { deps, windows }
    }

    pub fn windows(&self) -> &SweepWindows {
        &self.windows
    }

    /// One full sweep: read `now`, select candidates, process each.
    pub async fn run(&self, kind: SweepKind) -> Result<SweepStats, BookingError> {
        let pool = &self.deps.db_pool;
        let now = clock::db_now(pool).await?;
        let cutoff = kind.cutoff(now, &self.windows);

        let ids = match kind {
            SweepKind::ExpireRequests => Booking::find_expirable_ids(cutoff, pool).await?,
            SweepKind::StartSessions => Booking::find_startable_ids(cutoff, pool).await?,
            SweepKind::EndSessions => Booking::find_endable_ids(cutoff, pool).await?,
        };

        if ids.is_empty() {
            debug!(sweep = %kind, "no bookings due");
            return Ok(SweepStats::default());
        }

        let stats = self.run_for_ids(kind, &ids, now).await?;

        info!(
            sweep = %kind,
            candidates = ids.len(),
            processed = stats.processed,
            skipped_already_done = stats.skipped_already_done,
            skipped_locked = stats.skipped_locked,
            errors = stats.errors,
            "sweep complete"
        );
        Ok(stats)
    }

    /// Process an explicit candidate list against a fixed `now`.
    ///
    /// Ids that are no longer due are skipped, so re-driving an old list is
    /// harmless.
    pub async fn run_for_ids(
        &self,
        kind: SweepKind,
        ids: &[BookingId],
        now: DateTime<Utc>,
    ) -> Result<SweepStats, BookingError> {
        let mut stats = SweepStats::default();

        for &booking_id in ids {
            match self.process_one(kind, booking_id, now).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => match FailureScope::of(&e) {
                    FailureScope::Run => {
                        warn!(sweep = %kind, booking_id = %booking_id, error = %e, "sweep aborted");
                        return Err(e);
                    }
                    FailureScope::Item => {
                        stats.errors += 1;
                        warn!(sweep = %kind, booking_id = %booking_id, error = %e, "sweep item failed");
                    }
                },
            }
        }

        Ok(stats)
    }

    async fn process_one(
        &self,
        kind: SweepKind,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, BookingError> {
        let mut tx = self.deps.db_pool.begin().await?;

        let booking = match Booking::find_with_lock(booking_id, &mut *tx).await? {
            LockOutcome::Locked(booking) => booking,
            LockOutcome::Busy => {
                debug!(sweep = %kind, booking_id = %booking_id, "booking locked elsewhere, skipping");
                tx.rollback().await?;
                return Ok(ItemOutcome::Locked);
            }
            LockOutcome::NotFound => return Err(BookingError::NotFound(booking_id)),
        };

        if !kind.is_due(&booking, now, &self.windows) {
            debug!(
                sweep = %kind,
                booking_id = %booking_id,
                state = %booking.session_state,
                "booking no longer due, skipping"
            );
            tx.rollback().await?;
            return Ok(ItemOutcome::NoLongerDue);
        }

        let command = kind.command();
        let next = match BookingMachine::decide(&booking, &command, now) {
            Transition::Applied(next) | Transition::EscalatedToDispute(next) => next,
            Transition::AlreadyInTargetState => {
                tx.rollback().await?;
                return Ok(ItemOutcome::NoLongerDue);
            }
            Transition::Rejected(err) => return Err(err.into_booking_error(&booking)),
        };

        // Holding the row lock, so the version can't have moved
        let committed = next
            .commit_transition(booking.version, &mut *tx)
            .await?
            .ok_or_else(|| conflict_under_lock(&booking))?;
        tx.commit().await?;

        debug!(
            sweep = %kind,
            booking_id = %booking_id,
            from = %booking.session_state,
            to = %committed.session_state,
            version = committed.version,
            "booking transitioned"
        );

        let event = BookingEvent::from_commit(&command, booking.session_state, committed);
        effects::dispatch(&event, &self.deps).await;

        Ok(ItemOutcome::Transitioned)
    }
}

/// A conditional write that missed while the row lock was held. Nothing else
/// can have written the row, so the stored version is the one that was read.
fn conflict_under_lock(booking: &Booking) -> BookingError {
    BookingError::VersionConflict {
        booking_id: booking.id,
        expected: booking.version,
        actual: booking.version,
    }
}
