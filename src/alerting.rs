pub mod evaluator;
pub mod pattern;

pub use evaluator::AlertEvaluator;
pub use pattern::{is_fibonacci_number, AlertPattern, ALERT_PATTERN_SETTING};
