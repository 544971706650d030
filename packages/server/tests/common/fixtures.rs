//! Test fixtures for creating bookings.
//!
//! Times are taken relative to the database clock, the same clock the
//! sweeps read.

use anyhow::Result;
use booking_core::common::{PackageId, UserId};
use booking_core::domains::bookings::actions::accept_booking;
use booking_core::domains::bookings::models::{Booking, NewBooking, SessionState};
use booking_core::domains::bookings::{SweepKind, SweepRunner, SweepWindows};
use booking_core::kernel::{clock, ServerDeps};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

pub async fn db_now(pool: &PgPool) -> Result<DateTime<Utc>> {
    Ok(clock::db_now(pool).await?)
}

/// A requested booking starting `starts_in` from now, one hour long
pub async fn create_requested_booking(pool: &PgPool, starts_in: Duration) -> Result<Booking> {
    let now = db_now(pool).await?;
    let start = now + starts_in;
    let booking = Booking::insert(
        NewBooking::builder()
            .student_id(UserId::new())
            .tutor_id(UserId::new())
            .start_time(start)
            .end_time(start + Duration::hours(1))
            .build(),
        pool,
    )
    .await?;
    Ok(booking)
}

/// A requested booking created `age` ago
pub async fn create_aged_request(pool: &PgPool, age: Duration) -> Result<Booking> {
    let now = db_now(pool).await?;
    let start = now + Duration::days(3);
    let booking = Booking::insert(
        NewBooking::builder()
            .student_id(UserId::new())
            .tutor_id(UserId::new())
            .start_time(start)
            .end_time(start + Duration::hours(1))
            .created_at(now - age)
            .build(),
        pool,
    )
    .await?;
    Ok(booking)
}

/// A requested booking drawing on a session package
pub async fn create_package_booking(pool: &PgPool) -> Result<Booking> {
    let now = db_now(pool).await?;
    let start = now + Duration::days(2);
    let booking = Booking::insert(
        NewBooking::builder()
            .student_id(UserId::new())
            .tutor_id(UserId::new())
            .package_id(PackageId::new())
            .start_time(start)
            .end_time(start + Duration::hours(1))
            .timezone("America/Chicago")
            .build(),
        pool,
    )
    .await?;
    Ok(booking)
}

/// A scheduled booking whose start time is `starts_in` from now
pub async fn create_scheduled_booking(deps: &ServerDeps, starts_in: Duration) -> Result<Booking> {
    let booking = create_requested_booking(&deps.db_pool, starts_in).await?;
    let response = accept_booking(booking.id, booking.version, deps).await?;
    Ok(response.booking)
}

/// An active booking whose session ended `ended_ago` ago.
///
/// Accepted and started through the real paths; the window is placed in the
/// past before the start sweep runs over it.
pub async fn create_active_booking(deps: &ServerDeps, ended_ago: Duration) -> Result<Booking> {
    let pool = &deps.db_pool;
    let now = db_now(pool).await?;
    let end = now - ended_ago;
    let start = end - Duration::hours(1);

    let booking = Booking::insert(
        NewBooking::builder()
            .student_id(UserId::new())
            .tutor_id(UserId::new())
            .start_time(start)
            .end_time(end)
            .build(),
        pool,
    )
    .await?;
    let scheduled = accept_booking(booking.id, booking.version, deps).await?;

    let runner = SweepRunner::new(deps.clone(), SweepWindows::default());
    runner
        .run_for_ids(SweepKind::StartSessions, &[booking.id], now)
        .await?;

    let active = Booking::find_by_id(booking.id, pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("booking {} vanished", booking.id))?;
    anyhow::ensure!(
        active.session_state == SessionState::Active,
        "expected active booking, found {} (scheduled at version {})",
        active.session_state,
        scheduled.version
    );
    Ok(active)
}

pub async fn reload(pool: &PgPool, booking: &Booking) -> Result<Booking> {
    Booking::find_by_id(booking.id, pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("booking {} not found", booking.id))
}
