//! 共享狀態存儲模組
//!
//! 限流計數器與退避狀態是跨工作者共享的可變狀態。此模組提供統一的
//! 鍵值存儲接口，以及 Redis 與記憶體兩種實現：
//! - 計數器使用原子遞增，首次建立時才設定存活時間
//! - 複合狀態記錄透過 `KeyedLock` 依鍵序列化讀-改-寫

pub mod keyed_lock;
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use keyed_lock::{KeyedGuard, KeyedLock};
pub use memory::MemoryStateStore;
pub use redis_store::RedisStateStore;
pub use traits::{load_count, load_json, save_json, StateStore, StoreError};
