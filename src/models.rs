//! 領域模型模組
//!
//! 監控項、事故與通知頻道都是外部持久層擁有的實體，
//! 這裡只定義引擎讀取與寫回的欄位。

pub mod channel;
pub mod incident;
pub mod monitor;

pub use channel::{ChannelKind, NotificationChannel};
pub use incident::Incident;
pub use monitor::{MaintenanceState, Monitor};
