//! Booking actions - interactive entry points
//!
//! Called by the request layer on behalf of a student or tutor. Every action
//! carries the version the caller last saw; see [`apply`] for the guard.

mod accept_booking;
mod apply;
mod cancel_booking;
mod report_no_show;

pub use accept_booking::accept_booking;
pub use apply::{apply_interactive, BookingResponse};
pub use cancel_booking::cancel_booking;
pub use report_no_show::report_no_show;
