// Trait definitions for dependency injection
//
// These are the collaborators a booking transition calls out to after it has
// committed. They are INFRASTRUCTURE traits only - the booking domain decides
// when to call them, the implementations decide how delivery happens.
//
// Naming convention: Base* for trait names (e.g., BaseBookingNotifier)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{PackageId, UserId};
use crate::domains::bookings::models::Booking;

// =============================================================================
// Notification Trait (email / push delivery)
// =============================================================================

#[async_trait]
pub trait BaseBookingNotifier: Send + Sync {
    /// Tutor accepted the request
    async fn notify_booking_confirmed(&self, booking: &Booking) -> Result<()>;

    async fn notify_booking_cancelled(&self, booking: &Booking, reason: &str) -> Result<()>;

    /// Request was never answered and lapsed
    async fn notify_booking_expired(&self, booking: &Booking) -> Result<()>;

    async fn notify_session_started(&self, booking: &Booking) -> Result<()>;

    async fn notify_session_ended(&self, booking: &Booking) -> Result<()>;

    /// Both parties reported the other absent
    async fn notify_dispute_opened(&self, booking: &Booking) -> Result<()>;
}

// =============================================================================
// Meeting Trait (video room provisioning)
// =============================================================================

#[async_trait]
pub trait BaseMeetingService: Send + Sync {
    /// Release the video room reserved for the booking
    async fn teardown_meeting(&self, booking: &Booking) -> Result<()>;
}

// =============================================================================
// Package Credits Trait (prepaid lesson packages)
// =============================================================================

#[async_trait]
pub trait BasePackageCredits: Send + Sync {
    /// Return the credit a cancelled booking was holding
    async fn release_package_credit(&self, booking: &Booking) -> Result<()>;

    /// Draw one credit from the student's package
    async fn consume_package_credit(&self, student_id: UserId, package_id: PackageId)
        -> Result<()>;
}

// =============================================================================
// Payment Trait (capture / refund reconciliation)
// =============================================================================

/// Why the payment collaborator is being asked to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTrigger {
    Cancelled,
    Expired,
    Completed,
    NoShow,
    Disputed,
}

impl std::fmt::Display for PaymentTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentTrigger::Cancelled => write!(f, "cancelled"),
            PaymentTrigger::Expired => write!(f, "expired"),
            PaymentTrigger::Completed => write!(f, "completed"),
            PaymentTrigger::NoShow => write!(f, "no_show"),
            PaymentTrigger::Disputed => write!(f, "disputed"),
        }
    }
}

#[async_trait]
pub trait BasePaymentReconciler: Send + Sync {
    /// Capture, refund or hold the booking's payment according to `trigger`
    async fn reconcile_payment(&self, booking: &Booking, trigger: PaymentTrigger) -> Result<()>;
}
