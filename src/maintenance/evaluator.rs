use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::MaintenanceConfig;
use crate::maintenance::window::MaintenanceWindow;
use crate::models::{MaintenanceState, Monitor};
use crate::storage::MonitorRepository;

/// 維護窗口評估器
///
/// 判斷監控項當下是否處於維護期，並維護監控項上的快取欄位。
/// 快取只是快速路徑，窗口列表才是唯一依據；所有判斷都不會失敗，
/// 寫回失敗只記錄警告。
pub struct MaintenanceEvaluator {
    clock: Arc<dyn Clock>,
    repository: Arc<dyn MonitorRepository>,
    reference_tz: Tz,
}

impl MaintenanceEvaluator {
    pub fn new(clock: Arc<dyn Clock>, repository: Arc<dyn MonitorRepository>, reference_tz: Tz) -> Self {
        Self {
            clock,
            repository,
            reference_tz,
        }
    }

    pub fn from_config(
        clock: Arc<dyn Clock>,
        repository: Arc<dyn MonitorRepository>,
        config: &MaintenanceConfig,
    ) -> Self {
        Self::new(clock, repository, config.reference_tz())
    }

    pub fn reference_tz(&self) -> Tz {
        self.reference_tz
    }

    pub fn is_in_maintenance(&self, monitor: &Monitor) -> bool {
        self.is_in_maintenance_at(monitor, self.clock.now())
    }

    pub fn is_in_maintenance_at(&self, monitor: &Monitor, now: DateTime<Utc>) -> bool {
        if monitor.is_in_maintenance && monitor.maintenance_ends_at.is_some_and(|ends| ends > now) {
            return true;
        }
        active_window(monitor, now).is_some()
    }

    /// 重新計算維護快取欄位，僅在變更時寫回
    ///
    /// 返回快取是否改變。
    pub async fn update_status(&self, monitor: &mut Monitor) -> bool {
        self.update_status_at(monitor, self.clock.now()).await
    }

    pub async fn update_status_at(&self, monitor: &mut Monitor, now: DateTime<Utc>) -> bool {
        let state = match active_window(monitor, now) {
            Some((starts_at, ends_at)) => MaintenanceState {
                is_in_maintenance: true,
                starts_at: Some(starts_at),
                ends_at: Some(ends_at),
            },
            None => MaintenanceState {
                is_in_maintenance: false,
                starts_at: None,
                ends_at: None,
            },
        };

        // 只比較旗標；旗標未變時不重寫起訖時間
        if state.is_in_maintenance == monitor.is_in_maintenance {
            return false;
        }

        info!(
            "監控項 {} {}維護期",
            monitor.id,
            if state.is_in_maintenance { "進入" } else { "離開" }
        );
        monitor.apply_maintenance_state(state);

        if let Err(e) = self
            .repository
            .save_maintenance_state_quietly(monitor.id, state)
            .await
        {
            warn!("寫回監控項 {} 的維護狀態失敗: {}", monitor.id, e);
        }
        true
    }

    /// 下一個維護窗口的開始時間（參考時區）
    pub fn next_window(&self, monitor: &Monitor) -> Option<DateTime<Tz>> {
        self.next_window_at(monitor, self.clock.now())
    }

    pub fn next_window_at(&self, monitor: &Monitor, now: DateTime<Utc>) -> Option<DateTime<Tz>> {
        monitor
            .maintenance_windows
            .iter()
            .filter_map(|window| window.next_start_after(now))
            .min()
            .map(|start| start.with_timezone(&self.reference_tz))
    }

    /// 移除已結束的一次性窗口，返回移除數量
    pub async fn prune_expired(&self, monitors: &mut [Monitor]) -> usize {
        self.prune_expired_at(monitors, self.clock.now()).await
    }

    pub async fn prune_expired_at(&self, monitors: &mut [Monitor], now: DateTime<Utc>) -> usize {
        let mut removed = 0;

        for monitor in monitors.iter_mut() {
            let before = monitor.maintenance_windows.len();
            monitor.maintenance_windows.retain(|window| !window.is_expired(now));
            let pruned = before - monitor.maintenance_windows.len();
            if pruned == 0 {
                continue;
            }

            removed += pruned;
            debug!("監控項 {} 移除 {} 個過期的維護窗口", monitor.id, pruned);
            if let Err(e) = self
                .repository
                .save_maintenance_windows(monitor.id, &monitor.maintenance_windows)
                .await
            {
                warn!("寫回監控項 {} 的維護窗口失敗: {}", monitor.id, e);
            }
        }

        if removed > 0 {
            info!("共移除 {} 個過期的維護窗口", removed);
        }
        removed
    }
}

/// 第一個在 `now` 生效的窗口的起訖時間
fn active_window(monitor: &Monitor, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    monitor
        .maintenance_windows
        .iter()
        .find_map(|window: &MaintenanceWindow| window.active_span(now))
}
