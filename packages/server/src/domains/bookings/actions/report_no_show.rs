use tracing::{info, warn};

use super::apply::{apply_interactive, BookingResponse};
use crate::common::BookingId;
use crate::domains::bookings::errors::BookingError;
use crate::domains::bookings::machines::BookingCommand;
use crate::domains::bookings::models::PartyRole;
use crate::kernel::ServerDeps;

/// One party reports the other absent.
///
/// The first report ends the session; a later report naming the other party
/// opens a dispute instead of changing the outcome.
pub async fn report_no_show(
    booking_id: BookingId,
    expected_version: i32,
    absent: PartyRole,
    reporter: PartyRole,
    deps: &ServerDeps,
) -> Result<BookingResponse, BookingError> {
    let response = apply_interactive(
        booking_id,
        expected_version,
        BookingCommand::MarkNoShow { absent, reporter },
        deps,
    )
    .await?;

    if response.escalated_to_dispute {
        warn!(
            booking_id = %booking_id,
            %absent,
            %reporter,
            "conflicting no-show reports, dispute opened"
        );
    } else {
        info!(
            booking_id = %booking_id,
            %absent,
            %reporter,
            version = response.version,
            "no-show reported"
        );
    }
    Ok(response)
}
