//! Kernel module - server infrastructure and dependencies.

pub mod clock;
pub mod deps;
pub mod log_collaborators;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use log_collaborators::LogCollaborators;
pub use scheduled_tasks::BookingScheduler;
pub use test_dependencies::TestDependencies;
pub use traits::*;
