//! Typed ID definitions for booking entities.
//!
//! Students and tutors share the `UserId` type; which party an id refers to
//! is carried by the field it sits in (`student_id` / `tutor_id`).

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Booking entities.
pub struct Booking;

/// Marker type for platform users (students and tutors).
pub struct User;

/// Marker type for prepaid lesson packages.
pub struct Package;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type BookingId = Id<Booking>;

pub type UserId = Id<User>;

pub type PackageId = Id<Package>;
