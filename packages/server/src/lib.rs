// Tutoring Session Booking - Lifecycle Core
//
// This crate owns the booking state machine and the machinery that drives it:
// interactive actions guarded by optimistic versions, and scheduled sweeps
// guarded by non-blocking row locks. Collaborators (notifications, meetings,
// package credits, payments) sit behind kernel traits.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
