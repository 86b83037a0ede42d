pub mod evaluator;
pub mod window;

pub use evaluator::MaintenanceEvaluator;
pub use window::{deserialize_windows, parse_windows, MaintenanceWindow, RecurringWindow, WindowParseError};
