//! uptime_guard
//!
//! 可用性監控的確認與警報節流引擎：
//! - `probe`：失敗檢查的確認重試週期與錯誤分類
//! - `maintenance`：維護窗口判斷與快取維護
//! - `alerting`：警報模式（每次／費氏數列）與恢復通知判斷
//! - `rate_limit`：各通知頻道的發送限流與退避
//! - `pipeline`：串接以上元件的失敗處理流程

// 模組定義
pub mod alerting;
pub mod clock;
pub mod config;
pub mod maintenance;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod rate_limit;
pub mod redis;
pub mod storage;
pub mod store;
pub mod utils;
