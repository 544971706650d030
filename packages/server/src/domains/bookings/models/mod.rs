pub mod booking;

pub use booking::{
    Booking, DisputeState, LockOutcome, NewBooking, PartyRole, PaymentState, SessionOutcome,
    SessionState,
};
