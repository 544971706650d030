//! Booking side effects - reactions to committed transitions
//!
//! Effects run after the transaction that changed the booking has committed.
//! Each collaborator call is independent: one failing doesn't stop the
//! others, and nothing here rolls back or retries the transition. The
//! booking row is the source of truth; delivery about it is best-effort.
//!
//! ```text
//! BookingConfirmed → notify, consume package credit
//! BookingCancelled → notify, teardown meeting, release credit, payment
//! BookingExpired   → notify, payment
//! SessionStarted   → notify
//! SessionEnded     → notify, payment
//! DisputeOpened    → notify, payment
//! ```

use futures::future::{join_all, BoxFuture};
use tracing::{debug, warn};

use super::events::BookingEvent;
use super::models::{SessionOutcome, SessionState};
use crate::kernel::{PaymentTrigger, ServerDeps};

/// Run every collaborator call for `event`, logging failures.
///
/// Returns the number of calls that failed.
pub async fn dispatch(event: &BookingEvent, deps: &ServerDeps) -> usize {
    let booking = event.booking();
    let mut calls: Vec<(&'static str, BoxFuture<'_, anyhow::Result<()>>)> = Vec::new();

    match event {
        BookingEvent::BookingConfirmed { booking } => {
            calls.push(("notify", deps.notifier.notify_booking_confirmed(booking)));
            if let Some(package_id) = booking.package_id {
                calls.push((
                    "consume_package_credit",
                    deps.package_credits
                        .consume_package_credit(booking.student_id, package_id),
                ));
            }
        }
        BookingEvent::BookingCancelled {
            booking,
            previous_state,
        } => {
            let reason = booking.cancellation_reason.as_deref().unwrap_or_default();
            calls.push((
                "notify",
                deps.notifier.notify_booking_cancelled(booking, reason),
            ));
            calls.push(("teardown_meeting", deps.meetings.teardown_meeting(booking)));
            // Credits are only drawn when the booking is confirmed
            if booking.package_id.is_some() && *previous_state == SessionState::Scheduled {
                calls.push((
                    "release_package_credit",
                    deps.package_credits.release_package_credit(booking),
                ));
            }
            calls.push((
                "reconcile_payment",
                deps.payments
                    .reconcile_payment(booking, PaymentTrigger::Cancelled),
            ));
        }
        BookingEvent::BookingExpired { booking } => {
            calls.push(("notify", deps.notifier.notify_booking_expired(booking)));
            calls.push((
                "reconcile_payment",
                deps.payments.reconcile_payment(booking, PaymentTrigger::Expired),
            ));
        }
        BookingEvent::SessionStarted { booking } => {
            calls.push(("notify", deps.notifier.notify_session_started(booking)));
        }
        BookingEvent::SessionEnded { booking } => {
            let trigger = match booking.session_outcome {
                Some(SessionOutcome::Completed) | None => PaymentTrigger::Completed,
                Some(_) => PaymentTrigger::NoShow,
            };
            calls.push(("notify", deps.notifier.notify_session_ended(booking)));
            calls.push((
                "reconcile_payment",
                deps.payments.reconcile_payment(booking, trigger),
            ));
        }
        BookingEvent::DisputeOpened { booking } => {
            calls.push(("notify", deps.notifier.notify_dispute_opened(booking)));
            calls.push((
                "reconcile_payment",
                deps.payments.reconcile_payment(booking, PaymentTrigger::Disputed),
            ));
        }
    }

    let (names, futures): (Vec<_>, Vec<_>) = calls.into_iter().unzip();
    let results = join_all(futures).await;

    let mut failed = 0;
    for (name, result) in names.into_iter().zip(results) {
        if let Err(e) = result {
            failed += 1;
            warn!(
                booking_id = %booking.id,
                event = event.name(),
                effect = name,
                error = %e,
                "booking side effect failed"
            );
        }
    }

    debug!(booking_id = %booking.id, event = event.name(), failed, "booking effects dispatched");
    failed
}
