use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use uptime_guard::alerting::AlertEvaluator;
use uptime_guard::clock::ManualClock;
use uptime_guard::config::{ConfirmationConfig, RateLimitConfig};
use uptime_guard::maintenance::MaintenanceEvaluator;
use uptime_guard::models::{ChannelKind, Incident, Monitor, NotificationChannel};
use uptime_guard::pipeline::{
    DispatchError, FailureHandler, FailureOutcome, Notification, NotificationDispatcher, NotificationKind,
};
use uptime_guard::probe::{ConfirmationEngine, NetworkProber};
use uptime_guard::rate_limit::RateLimiterRegistry;
use uptime_guard::storage::{InMemoryIncidentRepository, InMemoryMonitorRepository};
use uptime_guard::store::MemoryStateStore;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 記錄所有送出通知的發送器
#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<(ChannelKind, NotificationKind, u32)>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, channel: &NotificationChannel, notification: &Notification) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .push((channel.kind, notification.kind, notification.failure_count));
        Ok(())
    }
}

struct Harness {
    handler: FailureHandler,
    dispatcher: Arc<RecordingDispatcher>,
    incidents: Arc<InMemoryIncidentRepository>,
    monitors: Arc<InMemoryMonitorRepository>,
}

fn harness() -> Harness {
    let clock = ManualClock::shared(Utc.with_ymd_and_hms(2025, 12, 15, 9, 0, 0).unwrap());
    let prober = NetworkProber::new(&ConfirmationConfig::default()).expect("建立探測器失敗");
    let monitors = Arc::new(InMemoryMonitorRepository::new());
    let incidents = Arc::new(InMemoryIncidentRepository::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let store = Arc::new(MemoryStateStore::new(clock.clone()));

    let handler = FailureHandler::new(
        ConfirmationEngine::new(Arc::new(prober)),
        MaintenanceEvaluator::new(clock.clone(), monitors.clone(), chrono_tz::UTC),
        AlertEvaluator::new(incidents.clone()),
        RateLimiterRegistry::with_defaults(store, clock, &RateLimitConfig::default()),
        dispatcher.clone(),
    );

    Harness {
        handler,
        dispatcher,
        incidents,
        monitors,
    }
}

async fn failing_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_fibonacci_pattern_end_to_end() {
    let server = failing_server().await;
    let harness = harness();
    let channels = vec![NotificationChannel::new(ChannelKind::Email, "oncall@example.com")];

    let mut monitor = Monitor::new(21, server.uri());
    monitor.sensitivity = Some("high".to_string());
    monitor.notification_settings = json!({"alert_pattern": "fibonacci"}).as_object().cloned();
    harness.monitors.insert(monitor.clone());
    harness
        .incidents
        .insert(Incident::open(500, 21, Utc.with_ymd_and_hms(2025, 12, 15, 8, 55, 0).unwrap()));

    let mut alerted_at = Vec::new();
    for failures in 1..=6 {
        monitor.consecutive_failures = failures;
        let outcome = harness.handler.handle_failure(&mut monitor, "team-1", &channels).await;
        if let FailureOutcome::Alerted { result, summary, .. } = outcome {
            assert!(!result.success());
            assert_eq!(result.status_code(), Some(500));
            assert_eq!(summary.delivered, 1);
            alerted_at.push(failures);
        }
    }
    assert_eq!(alerted_at, vec![1, 2, 3, 5]);

    let incident = harness.incidents.get(500).unwrap();
    assert!(incident.down_alert_sent);
    assert_eq!(incident.last_alert_at_failure_count, Some(5));

    let recovery = harness.handler.handle_recovery(&monitor, "team-1", &channels).await;
    assert_eq!(recovery.map(|s| s.delivered), Some(1));

    let sent = harness.dispatcher.sent.lock().clone();
    assert_eq!(sent.len(), 5);
    assert_eq!(sent.last(), Some(&(ChannelKind::Email, NotificationKind::Recovery, 6)));
}

#[tokio::test]
async fn test_maintenance_window_suppresses_probing() {
    let server = failing_server().await;
    let harness = harness();
    let channels = vec![NotificationChannel::new(ChannelKind::Telegram, "-100200300")];

    let mut monitor = Monitor::new(22, server.uri());
    monitor.consecutive_failures = 1;
    monitor.maintenance_windows = uptime_guard::maintenance::parse_windows(json!([
        {"type": "one_time", "start": "2025-12-15T08:00:00Z", "end": "2025-12-15T10:00:00Z"}
    ]));
    harness.monitors.insert(monitor.clone());

    let outcome = harness.handler.handle_failure(&mut monitor, "team-1", &channels).await;
    assert!(matches!(outcome, FailureOutcome::SuppressedByMaintenance));
    assert!(harness.dispatcher.sent.lock().is_empty());
    assert!(harness.monitors.get(22).unwrap().is_in_maintenance);

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_recovery_skipped_without_down_alert() {
    let harness = harness();
    let channels = vec![NotificationChannel::new(ChannelKind::Email, "oncall@example.com")];

    let monitor = Monitor::new(23, "https://example.com");
    harness
        .incidents
        .insert(Incident::open(600, 23, Utc.with_ymd_and_hms(2025, 12, 15, 8, 0, 0).unwrap()));

    assert!(harness.handler.handle_recovery(&monitor, "team-1", &channels).await.is_none());
    assert!(harness.dispatcher.sent.lock().is_empty());
}
