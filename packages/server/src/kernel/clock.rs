//! Authoritative time source.
//!
//! Every cutoff comparison uses the database server's clock, never the
//! calling process's, so two scheduler hosts with skewed clocks still agree
//! on which bookings are due.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

/// Read `NOW()` from the database server.
///
/// Inside a transaction this is the transaction start time, so callers that
/// need one `now` for a whole sweep read it once and pass it along.
pub async fn db_now<'e, E>(executor: E) -> Result<DateTime<Utc>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (now,): (DateTime<Utc>,) = sqlx::query_as("SELECT NOW()")
        .fetch_one(executor)
        .await?;
    Ok(now)
}
