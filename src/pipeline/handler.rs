use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alerting::AlertEvaluator;
use crate::maintenance::MaintenanceEvaluator;
use crate::metrics::GuardMetrics;
use crate::models::{Incident, Monitor, NotificationChannel};
use crate::pipeline::dispatcher::{DispatchError, Notification, NotificationDispatcher, NotificationKind};
use crate::probe::{ConfirmationEngine, RetryResult, SensitivityPreset};
use crate::rate_limit::RateLimiterRegistry;

/// 一輪通知發送的結果統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub throttled: usize,
    pub failed: usize,
}

/// 一次失敗檢查的處理結果
#[derive(Debug, Clone)]
pub enum FailureOutcome {
    /// 處於維護期，不升級
    SuppressedByMaintenance,
    /// 確認週期中已恢復，屬於誤報
    Recovered(RetryResult),
    /// 確認故障，但警報模式在本次失敗次數不通知
    AlertSuppressed(RetryResult),
    /// 確認故障並嘗試通知
    Alerted {
        result: RetryResult,
        summary: DeliverySummary,
        incident: Option<Incident>,
    },
}

/// 失敗檢查處理流程
///
/// 維護期判斷 → 確認週期 → 警報模式 → 頻道限流 → 發送 → 寫回事故。
pub struct FailureHandler {
    engine: ConfirmationEngine,
    maintenance: MaintenanceEvaluator,
    alerts: AlertEvaluator,
    limiters: RateLimiterRegistry,
    dispatcher: Arc<dyn NotificationDispatcher>,
    honor_confirmation_delay: bool,
}

impl FailureHandler {
    pub fn new(
        engine: ConfirmationEngine,
        maintenance: MaintenanceEvaluator,
        alerts: AlertEvaluator,
        limiters: RateLimiterRegistry,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            engine,
            maintenance,
            alerts,
            limiters,
            dispatcher,
            honor_confirmation_delay: false,
        }
    }

    /// 確認前是否先等待預設檔的確認延遲
    pub fn with_confirmation_delay(mut self, honor: bool) -> Self {
        self.honor_confirmation_delay = honor;
        self
    }

    /// 處理一次失敗的檢查
    ///
    /// `identity` 是頻道擁有者，與頻道目的地一起組成限流鍵。
    pub async fn handle_failure(
        &self,
        monitor: &mut Monitor,
        identity: &str,
        channels: &[NotificationChannel],
    ) -> FailureOutcome {
        self.maintenance.update_status(monitor).await;
        if self.maintenance.is_in_maintenance(monitor) {
            info!("監控項 {} 處於維護期，不處理失敗", monitor.id);
            GuardMetrics::record_maintenance_suppression();
            return FailureOutcome::SuppressedByMaintenance;
        }

        let preset = SensitivityPreset::from_key(monitor.sensitivity.as_deref());
        if self.honor_confirmation_delay {
            debug!(
                "監控項 {} 等待 {} 秒後確認",
                monitor.id, preset.confirmation_delay_seconds
            );
            tokio::time::sleep(preset.confirmation_delay()).await;
        }

        let result = self.engine.confirm(monitor, &preset).await;
        if result.success() {
            info!("監控項 {} 確認時已恢復，視為誤報", monitor.id);
            return FailureOutcome::Recovered(result);
        }

        if !self.alerts.should_send_down_alert(monitor) {
            return FailureOutcome::AlertSuppressed(result);
        }

        let incident = match self.alerts.open_incident(monitor.id).await {
            Ok(incident) => incident,
            Err(e) => {
                warn!("查詢監控項 {} 的事故失敗: {}", monitor.id, e);
                None
            }
        };

        let notification = Notification {
            kind: NotificationKind::Down,
            monitor_id: monitor.id,
            url: monitor.url.clone(),
            message: result
                .message()
                .unwrap_or("monitor is down")
                .to_string(),
            failure_count: monitor.consecutive_failures,
            result: Some(result.clone()),
        };
        let summary = self.deliver(identity, channels, &notification).await;

        let incident = match incident {
            Some(incident) if summary.delivered > 0 => {
                match self.alerts.record_down_alert(monitor, &incident).await {
                    Ok(updated) => Some(updated.unwrap_or(incident)),
                    Err(e) => {
                        warn!("寫回事故 {} 的通知狀態失敗: {}", incident.id, e);
                        Some(incident)
                    }
                }
            }
            other => other,
        };

        FailureOutcome::Alerted {
            result,
            summary,
            incident,
        }
    }

    /// 監控項恢復時發送恢復通知
    ///
    /// 只有未解決事故發過故障通知時才發送，否則返回 None。
    pub async fn handle_recovery(
        &self,
        monitor: &Monitor,
        identity: &str,
        channels: &[NotificationChannel],
    ) -> Option<DeliverySummary> {
        if !self.alerts.recovery_due(monitor.id).await {
            debug!("監控項 {} 未發過故障通知，略過恢復通知", monitor.id);
            return None;
        }

        let notification = Notification {
            kind: NotificationKind::Recovery,
            monitor_id: monitor.id,
            url: monitor.url.clone(),
            message: "monitor has recovered".to_string(),
            failure_count: monitor.consecutive_failures,
            result: None,
        };
        Some(self.deliver(identity, channels, &notification).await)
    }

    async fn deliver(
        &self,
        identity: &str,
        channels: &[NotificationChannel],
        notification: &Notification,
    ) -> DeliverySummary {
        let mut summary = DeliverySummary::default();

        for channel in channels.iter().filter(|c| c.enabled) {
            if !self.limiters.should_send(identity, channel).await {
                summary.throttled += 1;
                continue;
            }

            match self.dispatcher.dispatch(channel, notification).await {
                Ok(()) => {
                    self.limiters.track_success(identity, channel).await;
                    summary.delivered += 1;
                }
                Err(DispatchError::RateLimited(reason)) => {
                    warn!("{} 頻道 {} 回報限流: {}", channel.kind, channel.destination, reason);
                    self.limiters.track_failure(identity, channel).await;
                    summary.throttled += 1;
                }
                Err(e) => {
                    warn!("{} 頻道 {} 發送失敗: {}", channel.kind, channel.destination, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "監控項 {} {:?} 通知: 送達 {}，限流 {}，失敗 {}",
            notification.monitor_id,
            notification.kind,
            summary.delivered,
            summary.throttled,
            summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RateLimitConfig;
    use crate::maintenance::MaintenanceWindow;
    use crate::models::ChannelKind;
    use crate::pipeline::dispatcher::MockNotificationDispatcher;
    use crate::probe::{
        ErrorKind, HttpProbeOutcome, HttpProbeRequest, HttpProbeResponse, ProbeFailure, Prober,
        TcpProbeOutcome,
    };
    use crate::rate_limit::RateLimitStats;
    use crate::storage::{IncidentRepository, InMemoryIncidentRepository, InMemoryMonitorRepository};
    use crate::store::MemoryStateStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use chrono_tz::Tz;
    use serde_json::json;
    use std::time::Duration;

    /// 固定回應的探測器
    struct FixedProber {
        status: Option<u16>,
    }

    #[async_trait]
    impl Prober for FixedProber {
        async fn http(&self, _request: HttpProbeRequest) -> HttpProbeOutcome {
            match self.status {
                Some(status) => Ok(HttpProbeResponse {
                    status,
                    body: None,
                    elapsed: Duration::from_millis(5),
                }),
                None => Err(ProbeFailure::new(ErrorKind::ConnectionRefused, "connection refused")),
            }
        }

        async fn tcp(&self, _host: &str, _port: u16, _timeout: Duration) -> TcpProbeOutcome {
            Err(ProbeFailure::new(ErrorKind::ConnectionRefused, "connection refused"))
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        incidents: Arc<InMemoryIncidentRepository>,
        monitors: Arc<InMemoryMonitorRepository>,
        store: Arc<MemoryStateStore>,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 15, 9, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let clock = ManualClock::shared(now());
        Harness {
            store: Arc::new(MemoryStateStore::new(clock.clone())),
            clock,
            incidents: Arc::new(InMemoryIncidentRepository::new()),
            monitors: Arc::new(InMemoryMonitorRepository::new()),
        }
    }

    fn handler(h: &Harness, status: Option<u16>, dispatcher: MockNotificationDispatcher) -> FailureHandler {
        FailureHandler::new(
            ConfirmationEngine::new(Arc::new(FixedProber { status })),
            MaintenanceEvaluator::new(h.clock.clone(), h.monitors.clone(), Tz::UTC),
            AlertEvaluator::new(h.incidents.clone()),
            RateLimiterRegistry::with_defaults(h.store.clone(), h.clock.clone(), &RateLimitConfig::default()),
            Arc::new(dispatcher),
        )
    }

    fn failing_monitor(failures: u32) -> Monitor {
        let mut monitor = Monitor::new(1, "https://app.example.com/health");
        monitor.sensitivity = Some("high".to_string());
        monitor.consecutive_failures = failures;
        monitor
    }

    fn channels() -> Vec<NotificationChannel> {
        let mut disabled = NotificationChannel::new(ChannelKind::Slack, "#ops");
        disabled.enabled = false;
        vec![
            NotificationChannel::new(ChannelKind::Email, "ops@example.com"),
            NotificationChannel::new(ChannelKind::Telegram, "42"),
            disabled,
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_short_circuits_before_probing() {
        let h = harness();
        let mut monitor = failing_monitor(1);
        monitor.maintenance_windows = vec![MaintenanceWindow::OneTime {
            start: now() - ChronoDuration::hours(1),
            end: now() + ChronoDuration::hours(1),
        }];
        h.monitors.insert(monitor.clone());

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_dispatch().never();
        let handler = handler(&h, None, dispatcher);

        let outcome = handler.handle_failure(&mut monitor, "user", &channels()).await;
        assert_matches!(outcome, FailureOutcome::SuppressedByMaintenance);
        assert!(monitor.is_in_maintenance);
        assert!(h.monitors.get(1).unwrap().is_in_maintenance);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_during_confirmation() {
        let h = harness();
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_dispatch().never();
        let handler = handler(&h, Some(200), dispatcher);

        let outcome = handler.handle_failure(&mut failing_monitor(1), "user", &channels()).await;
        assert_matches!(outcome, FailureOutcome::Recovered(result) if result.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fibonacci_pattern_suppresses_alert() {
        let h = harness();
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_dispatch().never();
        let handler = handler(&h, None, dispatcher);

        let mut monitor = failing_monitor(4);
        monitor.notification_settings = json!({"alert_pattern": "fibonacci"}).as_object().cloned();

        let outcome = handler.handle_failure(&mut monitor, "user", &channels()).await;
        assert_matches!(outcome, FailureOutcome::AlertSuppressed(result) if !result.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_delivers_to_enabled_channels_and_records_incident() {
        let h = harness();
        h.incidents.insert(Incident::open(7, 1, now()));

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|channel, notification| {
                channel.kind != ChannelKind::Slack
                    && notification.kind == NotificationKind::Down
                    && notification.message == "connection refused"
            })
            .times(2)
            .returning(|_, _| Ok(()));
        let handler = handler(&h, None, dispatcher);

        let outcome = handler.handle_failure(&mut failing_monitor(3), "user", &channels()).await;

        let FailureOutcome::Alerted { result, summary, incident } = outcome else {
            panic!("expected an alert");
        };
        assert!(!result.success());
        assert_eq!(
            summary,
            DeliverySummary {
                delivered: 2,
                throttled: 0,
                failed: 0
            }
        );
        let incident = incident.unwrap();
        assert!(incident.down_alert_sent);
        assert_eq!(incident.last_alert_at_failure_count, Some(3));
        assert!(h.incidents.get(7).unwrap().down_alert_sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_pattern_alerts_before_counter_is_bumped() {
        let h = harness();
        h.incidents.insert(Incident::open(9, 1, now()));

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|_, notification| notification.kind == NotificationKind::Down && notification.failure_count == 0)
            .times(2)
            .returning(|_, _| Ok(()));
        let handler = handler(&h, None, dispatcher);

        let outcome = handler.handle_failure(&mut failing_monitor(0), "user", &channels()).await;
        assert_matches!(outcome, FailureOutcome::Alerted { summary, .. } if summary.delivered == 2);
        assert_eq!(h.incidents.get(9).unwrap().last_alert_at_failure_count, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_rate_limit_triggers_backoff() {
        let h = harness();
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|channel, _| channel.kind == ChannelKind::Telegram)
            .times(1)
            .returning(|_, _| Err(DispatchError::RateLimited("429 Too Many Requests".to_string())));
        dispatcher
            .expect_dispatch()
            .withf(|channel, _| channel.kind == ChannelKind::Email)
            .times(1)
            .returning(|_, _| Err(DispatchError::Delivery("smtp down".to_string())));
        let handler = handler(&h, None, dispatcher);

        let outcome = handler.handle_failure(&mut failing_monitor(1), "user", &channels()).await;
        assert_matches!(
            outcome,
            FailureOutcome::Alerted {
                summary: DeliverySummary { delivered: 0, throttled: 1, failed: 1 },
                incident: None,
                ..
            }
        );

        let telegram = NotificationChannel::new(ChannelKind::Telegram, "42");
        let stats = handler.limiters.stats("user", &telegram).await.unwrap();
        assert_matches!(stats, Some(RateLimitStats::BackoffWindow(s)) if s.backoff_count == 1 && s.in_backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_channels_are_skipped() {
        let h = harness();
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|channel, _| channel.kind == ChannelKind::Telegram)
            .times(1)
            .returning(|_, _| Ok(()));
        let handler = handler(&h, None, dispatcher);

        let email = NotificationChannel::new(ChannelKind::Email, "ops@example.com");
        for _ in 0..10 {
            handler.limiters.track_success("user", &email).await;
        }

        let outcome = handler.handle_failure(&mut failing_monitor(2), "user", &channels()).await;
        assert_matches!(
            outcome,
            FailureOutcome::Alerted {
                summary: DeliverySummary { delivered: 1, throttled: 1, failed: 0 },
                ..
            }
        );
    }

    #[tokio::test]
    async fn test_recovery_only_after_down_alert() {
        let h = harness();
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|_, notification| notification.kind == NotificationKind::Recovery)
            .times(2)
            .returning(|_, _| Ok(()));
        let handler = handler(&h, Some(200), dispatcher);
        let monitor = failing_monitor(0);

        assert!(handler.handle_recovery(&monitor, "user", &channels()).await.is_none());

        h.incidents.insert(Incident::open(8, 1, now()));
        assert!(handler.handle_recovery(&monitor, "user", &channels()).await.is_none());

        h.incidents.record_down_alert(8, 1).await.unwrap();
        let summary = handler.handle_recovery(&monitor, "user", &channels()).await.unwrap();
        assert_eq!(summary.delivered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_delay_is_honored() {
        let h = harness();
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_dispatch().never();
        let handler = handler(&h, Some(200), dispatcher).with_confirmation_delay(true);

        let before = tokio::time::Instant::now();
        handler.handle_failure(&mut failing_monitor(1), "user", &channels()).await;
        assert!(before.elapsed() >= Duration::from_secs(15));
    }
}
