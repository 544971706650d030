//! Server dependencies (using traits for testability)
//!
//! Central container handed to the booking actions, sweeps and effects.
//! Every collaborator is a trait object so tests can swap in recorders.

use sqlx::PgPool;
use std::sync::Arc;

use crate::kernel::{
    BaseBookingNotifier, BaseMeetingService, BasePackageCredits, BasePaymentReconciler,
};

/// Server dependencies accessible to actions, sweeps and effects
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub notifier: Arc<dyn BaseBookingNotifier>,
    pub meetings: Arc<dyn BaseMeetingService>,
    pub package_credits: Arc<dyn BasePackageCredits>,
    pub payments: Arc<dyn BasePaymentReconciler>,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        db_pool: PgPool,
        notifier: Arc<dyn BaseBookingNotifier>,
        meetings: Arc<dyn BaseMeetingService>,
        package_credits: Arc<dyn BasePackageCredits>,
        payments: Arc<dyn BasePaymentReconciler>,
    ) -> Self {
        Self {
            db_pool,
            notifier,
            meetings,
            package_credits,
            payments,
        }
    }
}
