use async_trait::async_trait;

use crate::maintenance::MaintenanceWindow;
use crate::models::{Incident, MaintenanceState};

/// 持久層錯誤
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// 監控項不存在
    #[error("監控項不存在: ID {0}")]
    MonitorNotFound(i64),

    /// 事故不存在
    #[error("事故不存在: ID {0}")]
    IncidentNotFound(i64),

    /// 底層存儲錯誤
    #[error("存儲錯誤: {0}")]
    Storage(String),
}

/// 監控項儲存庫特徵
///
/// 只涵蓋引擎會寫回的欄位，監控項的其餘生命週期由外部持久層負責。
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// 寫入維護快取欄位，不觸發任何監控項觀察者
    async fn save_maintenance_state_quietly(
        &self,
        monitor_id: i64,
        state: MaintenanceState,
    ) -> Result<(), RepositoryError>;

    /// 覆寫維護窗口列表
    async fn save_maintenance_windows(
        &self,
        monitor_id: i64,
        windows: &[MaintenanceWindow],
    ) -> Result<(), RepositoryError>;
}

/// 事故儲存庫特徵
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// 取得監控項目前未解決的事故
    async fn open_incident(&self, monitor_id: i64) -> Result<Option<Incident>, RepositoryError>;

    /// 記錄已發出故障通知
    async fn record_down_alert(
        &self,
        incident_id: i64,
        failure_count: u32,
    ) -> Result<Incident, RepositoryError>;
}
