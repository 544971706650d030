use tracing::info;

use super::apply::{apply_interactive, BookingResponse};
use crate::common::BookingId;
use crate::domains::bookings::errors::BookingError;
use crate::domains::bookings::machines::BookingCommand;
use crate::kernel::ServerDeps;

/// Tutor accepts a requested booking
pub async fn accept_booking(
    booking_id: BookingId,
    expected_version: i32,
    deps: &ServerDeps,
) -> Result<BookingResponse, BookingError> {
    let response =
        apply_interactive(booking_id, expected_version, BookingCommand::Accept, deps).await?;

    info!(
        booking_id = %booking_id,
        version = response.version,
        already_accepted = response.already_in_target_state,
        "booking accepted"
    );
    Ok(response)
}
