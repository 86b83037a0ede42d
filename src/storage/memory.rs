use async_trait::async_trait;
use dashmap::DashMap;

use crate::maintenance::MaintenanceWindow;
use crate::models::{Incident, MaintenanceState, Monitor};
use crate::storage::repository::{IncidentRepository, MonitorRepository, RepositoryError};

/// 記憶體內的監控項儲存庫
#[derive(Debug, Default)]
pub struct InMemoryMonitorRepository {
    monitors: DashMap<i64, Monitor>,
}

impl InMemoryMonitorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, monitor: Monitor) {
        self.monitors.insert(monitor.id, monitor);
    }

    pub fn get(&self, monitor_id: i64) -> Option<Monitor> {
        self.monitors.get(&monitor_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl MonitorRepository for InMemoryMonitorRepository {
    async fn save_maintenance_state_quietly(
        &self,
        monitor_id: i64,
        state: MaintenanceState,
    ) -> Result<(), RepositoryError> {
        let mut monitor = self
            .monitors
            .get_mut(&monitor_id)
            .ok_or(RepositoryError::MonitorNotFound(monitor_id))?;
        monitor.apply_maintenance_state(state);
        Ok(())
    }

    async fn save_maintenance_windows(
        &self,
        monitor_id: i64,
        windows: &[MaintenanceWindow],
    ) -> Result<(), RepositoryError> {
        let mut monitor = self
            .monitors
            .get_mut(&monitor_id)
            .ok_or(RepositoryError::MonitorNotFound(monitor_id))?;
        monitor.maintenance_windows = windows.to_vec();
        Ok(())
    }
}

/// 記憶體內的事故儲存庫
#[derive(Debug, Default)]
pub struct InMemoryIncidentRepository {
    incidents: DashMap<i64, Incident>,
}

impl InMemoryIncidentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, incident: Incident) {
        self.incidents.insert(incident.id, incident);
    }

    pub fn get(&self, incident_id: i64) -> Option<Incident> {
        self.incidents.get(&incident_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl IncidentRepository for InMemoryIncidentRepository {
    async fn open_incident(&self, monitor_id: i64) -> Result<Option<Incident>, RepositoryError> {
        Ok(self
            .incidents
            .iter()
            .filter(|entry| entry.monitor_id == monitor_id && entry.is_open())
            .max_by_key(|entry| entry.started_at)
            .map(|entry| entry.value().clone()))
    }

    async fn record_down_alert(
        &self,
        incident_id: i64,
        failure_count: u32,
    ) -> Result<Incident, RepositoryError> {
        let mut incident = self
            .incidents
            .get_mut(&incident_id)
            .ok_or(RepositoryError::IncidentNotFound(incident_id))?;
        incident.down_alert_sent = true;
        incident.last_alert_at_failure_count = Some(failure_count);
        Ok(incident.clone())
    }
}
