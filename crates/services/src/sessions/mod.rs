mod plan;
mod progress;
mod service;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use plan::{SessionPlan, SessionPlanBuilder};
pub use progress::SessionProgress;
pub use service::SessionService;
pub use view::SessionListItem;

pub(crate) use service::Applied;
