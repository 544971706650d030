// TestDependencies - recording implementations of the booking collaborators
//
// A single recorder implements every collaborator trait and appends each call
// to a shared log, so tests can assert on what a transition dispatched.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};

use super::{
    BaseBookingNotifier, BaseMeetingService, BasePackageCredits, BasePaymentReconciler,
    PaymentTrigger, ServerDeps,
};
use crate::common::{BookingId, PackageId, UserId};
use crate::domains::bookings::models::Booking;

/// One recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorCall {
    BookingConfirmed(BookingId),
    BookingCancelled { booking_id: BookingId, reason: String },
    BookingExpired(BookingId),
    SessionStarted(BookingId),
    SessionEnded(BookingId),
    DisputeOpened(BookingId),
    MeetingTornDown(BookingId),
    CreditReleased(BookingId),
    CreditConsumed { student_id: UserId, package_id: PackageId },
    PaymentReconciled { booking_id: BookingId, trigger: PaymentTrigger },
}

#[derive(Default)]
pub struct RecordingCollaborators {
    calls: Mutex<Vec<CollaboratorCall>>,
    fail_notifications: bool,
}

impl RecordingCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notifier call records itself and then returns an error
    pub fn with_failing_notifications() -> Self {
        Self {
            fail_notifications: true,
            ..Self::default()
        }
    }

    /// Get all recorded calls, in the order they were made
    pub fn calls(&self) -> Vec<CollaboratorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was recorded
    pub fn was_called(&self, call: &CollaboratorCall) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }

    /// All calls concerning one booking
    pub fn calls_for(&self, booking_id: BookingId) -> Vec<CollaboratorCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                CollaboratorCall::BookingConfirmed(id)
                | CollaboratorCall::BookingExpired(id)
                | CollaboratorCall::SessionStarted(id)
                | CollaboratorCall::SessionEnded(id)
                | CollaboratorCall::DisputeOpened(id)
                | CollaboratorCall::MeetingTornDown(id)
                | CollaboratorCall::CreditReleased(id) => *id == booking_id,
                CollaboratorCall::BookingCancelled { booking_id: id, .. }
                | CollaboratorCall::PaymentReconciled { booking_id: id, .. } => *id == booking_id,
                CollaboratorCall::CreditConsumed { .. } => false,
            })
            .collect()
    }

    fn record(&self, call: CollaboratorCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn notification(&self, call: CollaboratorCall) -> Result<()> {
        self.record(call);
        if self.fail_notifications {
            anyhow::bail!("notification delivery unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl BaseBookingNotifier for RecordingCollaborators {
    async fn notify_booking_confirmed(&self, booking: &Booking) -> Result<()> {
        self.notification(CollaboratorCall::BookingConfirmed(booking.id))
    }

    async fn notify_booking_cancelled(&self, booking: &Booking, reason: &str) -> Result<()> {
        self.notification(CollaboratorCall::BookingCancelled {
            booking_id: booking.id,
            reason: reason.to_string(),
        })
    }

    async fn notify_booking_expired(&self, booking: &Booking) -> Result<()> {
        self.notification(CollaboratorCall::BookingExpired(booking.id))
    }

    async fn notify_session_started(&self, booking: &Booking) -> Result<()> {
        self.notification(CollaboratorCall::SessionStarted(booking.id))
    }

    async fn notify_session_ended(&self, booking: &Booking) -> Result<()> {
        self.notification(CollaboratorCall::SessionEnded(booking.id))
    }

    async fn notify_dispute_opened(&self, booking: &Booking) -> Result<()> {
        self.notification(CollaboratorCall::DisputeOpened(booking.id))
    }
}

#[async_trait]
impl BaseMeetingService for RecordingCollaborators {
    async fn teardown_meeting(&self, booking: &Booking) -> Result<()> {
        self.record(CollaboratorCall::MeetingTornDown(booking.id));
        Ok(())
    }
}

#[async_trait]
impl BasePackageCredits for RecordingCollaborators {
    async fn release_package_credit(&self, booking: &Booking) -> Result<()> {
        self.record(CollaboratorCall::CreditReleased(booking.id));
        Ok(())
    }

    async fn consume_package_credit(
        &self,
        student_id: UserId,
        package_id: PackageId,
    ) -> Result<()> {
        self.record(CollaboratorCall::CreditConsumed {
            student_id,
            package_id,
        });
        Ok(())
    }
}

#[async_trait]
impl BasePaymentReconciler for RecordingCollaborators {
    async fn reconcile_payment(&self, booking: &Booking, trigger: PaymentTrigger) -> Result<()> {
        self.record(CollaboratorCall::PaymentReconciled {
            booking_id: booking.id,
            trigger,
        });
        Ok(())
    }
}

/// Test dependency bundle: one recorder wired into every collaborator slot
pub struct TestDependencies {
    pub collaborators: Arc<RecordingCollaborators>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            collaborators: Arc::new(RecordingCollaborators::new()),
        }
    }

    pub fn with_collaborators(collaborators: RecordingCollaborators) -> Self {
        Self {
            collaborators: Arc::new(collaborators),
        }
    }

    /// Build ServerDeps around the given pool
    pub fn into_server_deps(&self, db_pool: PgPool) -> ServerDeps {
        ServerDeps::new(
            db_pool,
            self.collaborators.clone(),
            self.collaborators.clone(),
            self.collaborators.clone(),
            self.collaborators.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
