//! Booking domain - lifecycle of a scheduled session between two parties
//!
//! Architecture:
//!   Interactive: actions → version guard → machine → commit → effects
//!   Scheduled:   sweeps → row lock (NOWAIT) → machine → commit → effects

pub mod actions;
pub mod effects;
pub mod errors;
pub mod events;
pub mod machines;
pub mod models;
pub mod sweeps;

// Re-export commonly used types
pub use errors::BookingError;
pub use machines::{BookingCommand, BookingMachine, Transition, TransitionResult};
pub use models::Booking;
pub use sweeps::{SweepKind, SweepRunner, SweepStats, SweepWindows};
