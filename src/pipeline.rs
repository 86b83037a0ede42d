pub mod dispatcher;
pub mod handler;

pub use dispatcher::{DispatchError, Notification, NotificationDispatcher, NotificationKind};
pub use handler::{DeliverySummary, FailureHandler, FailureOutcome};
