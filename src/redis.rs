//! Redis連接模組
//!
//! 提供限流狀態共享存儲所需的 Redis 連接池。
//! 多個工作行程共用同一組計數器時，透過此連接池存取 Redis。

pub mod pool;

#[cfg(test)]
pub mod test_config;

pub use pool::*;
