pub mod memory;
pub mod repository;

// 匯出倉儲接口與記憶體實現
pub use memory::{InMemoryIncidentRepository, InMemoryMonitorRepository};
pub use repository::{IncidentRepository, MonitorRepository, RepositoryError};
