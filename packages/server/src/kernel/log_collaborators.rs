//! Collaborators that only log.
//!
//! Used by the scheduler binary until real notification, meeting, package and
//! payment services are wired in; each call emits one structured event.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{
    BaseBookingNotifier, BaseMeetingService, BasePackageCredits, BasePaymentReconciler,
    PaymentTrigger,
};
use crate::common::{PackageId, UserId};
use crate::domains::bookings::models::Booking;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogCollaborators;

#[async_trait]
impl BaseBookingNotifier for LogCollaborators {
    async fn notify_booking_confirmed(&self, booking: &Booking) -> Result<()> {
        info!(booking_id = %booking.id, "notify: booking confirmed");
        Ok(())
    }

    async fn notify_booking_cancelled(&self, booking: &Booking, reason: &str) -> Result<()> {
        info!(booking_id = %booking.id, reason, "notify: booking cancelled");
        Ok(())
    }

    async fn notify_booking_expired(&self, booking: &Booking) -> Result<()> {
        info!(booking_id = %booking.id, "notify: booking expired");
        Ok(())
    }

    async fn notify_session_started(&self, booking: &Booking) -> Result<()> {
        info!(booking_id = %booking.id, "notify: session started");
        Ok(())
    }

    async fn notify_session_ended(&self, booking: &Booking) -> Result<()> {
        info!(
            booking_id = %booking.id,
            outcome = ?booking.session_outcome,
            "notify: session ended"
        );
        Ok(())
    }

    async fn notify_dispute_opened(&self, booking: &Booking) -> Result<()> {
        info!(booking_id = %booking.id, "notify: dispute opened");
        Ok(())
    }
}

#[async_trait]
impl BaseMeetingService for LogCollaborators {
    async fn teardown_meeting(&self, booking: &Booking) -> Result<()> {
        info!(booking_id = %booking.id, "meeting teardown requested");
        Ok(())
    }
}

#[async_trait]
impl BasePackageCredits for LogCollaborators {
    async fn release_package_credit(&self, booking: &Booking) -> Result<()> {
        info!(booking_id = %booking.id, package_id = ?booking.package_id, "package credit released");
        Ok(())
    }

    async fn consume_package_credit(
        &self,
        student_id: UserId,
        package_id: PackageId,
    ) -> Result<()> {
        info!(%student_id, %package_id, "package credit consumed");
        Ok(())
    }
}

#[async_trait]
impl BasePaymentReconciler for LogCollaborators {
    async fn reconcile_payment(&self, booking: &Booking, trigger: PaymentTrigger) -> Result<()> {
        info!(
            booking_id = %booking.id,
            payment_state = ?booking.payment_state,
            %trigger,
            "payment reconciliation requested"
        );
        Ok(())
    }
}
