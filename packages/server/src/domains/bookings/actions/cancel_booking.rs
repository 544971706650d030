use tracing::info;

use super::apply::{apply_interactive, BookingResponse};
use crate::common::BookingId;
use crate::domains::bookings::errors::BookingError;
use crate::domains::bookings::machines::BookingCommand;
use crate::domains::bookings::models::PartyRole;
use crate::kernel::ServerDeps;

/// Either party cancels a booking that hasn't started yet
pub async fn cancel_booking(
    booking_id: BookingId,
    expected_version: i32,
    reason: String,
    cancelled_by: PartyRole,
    deps: &ServerDeps,
) -> Result<BookingResponse, BookingError> {
    let response = apply_interactive(
        booking_id,
        expected_version,
        BookingCommand::Cancel {
            reason,
            cancelled_by,
        },
        deps,
    )
    .await?;

    info!(
        booking_id = %booking_id,
        version = response.version,
        %cancelled_by,
        "booking cancelled"
    );
    Ok(response)
}
