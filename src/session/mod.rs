/// Session lifecycle: one state machine in the background context

mod coordinator;
mod state;

pub use coordinator::{RefreshOutcome, RefreshPolicy, SessionCoordinator};
pub use state::{AuthSnapshot, AuthStatus, SessionState};
