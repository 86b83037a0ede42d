use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use crate::metrics::GuardMetrics;
use crate::models::Monitor;
use crate::probe::classifier::ErrorKind;
use crate::probe::preset::SensitivityPreset;
use crate::probe::prober::{HttpMethod, HttpProbeOutcome, HttpProbeRequest, ProbeFailure, Prober};
use crate::probe::result::{ProbeType, RetryAttempt, RetryResult};

/// HTTP 全部失敗但 TCP 可連線時的結果訊息
pub const TCP_RESPONSIVE_MESSAGE: &str = "HTTP failure but TCP responsive — likely application issue";

/// 除監控項設定外一律視為成功的狀態碼
const ALWAYS_ACCEPTED_STATUS: [u16; 5] = [200, 201, 204, 301, 302];

fn duration_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// 確認重試引擎
///
/// 以逐步加重的探測序列重新驗證失敗的監控項：每輪先 HEAD，逾時再補一次 GET，
/// 輪與輪之間指數退避，HTTP 全部失敗後以 TCP 連線區分應用層故障與主機離線。
/// `confirm` 永遠不會失敗，所有失敗模式都記錄在探測列表中。
pub struct ConfirmationEngine {
    prober: Arc<dyn Prober>,
}

impl ConfirmationEngine {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }

    /// 執行一次完整的確認週期
    pub async fn confirm(&self, monitor: &Monitor, preset: &SensitivityPreset) -> RetryResult {
        let started = Instant::now();

        let url = match Url::parse(monitor.url.trim()) {
            Ok(url) => url,
            Err(e) => {
                warn!("監控項 {} 的 URL 無法解析: {}", monitor.id, e);
                let message = format!("invalid URL '{}': {}", monitor.url, e);
                let attempt = RetryAttempt::http_failure(
                    1,
                    HttpMethod::Head.as_str(),
                    None,
                    None,
                    ErrorKind::Unknown,
                    message.clone(),
                );
                GuardMetrics::record_confirmation(false, false, 1, started.elapsed());
                return RetryResult::failed(vec![attempt], Some(message), None);
            }
        };

        let rounds = preset.rounds();
        let mut delay_ms = preset.initial_delay_ms;
        let mut attempts: Vec<RetryAttempt> = Vec::new();

        for round in 0..rounds {
            let head = self
                .http_attempt(monitor, &url, HttpMethod::Head, next_attempt_number(&attempts))
                .await;
            let head_timed_out = head.error_kind() == Some(ErrorKind::Timeout);
            let head_ok = head.success();
            attempts.push(head);
            if head_ok {
                return Self::finish_success(monitor, attempts, started);
            }

            // 不接受 HEAD 的伺服器常以逾時表現，改用 GET 再試一次
            if head_timed_out {
                let get = self
                    .http_attempt(monitor, &url, HttpMethod::Get, next_attempt_number(&attempts))
                    .await;
                let get_ok = get.success();
                attempts.push(get);
                if get_ok {
                    return Self::finish_success(monitor, attempts, started);
                }
            }

            if round + 1 < rounds {
                debug!(
                    "監控項 {} 第 {} 輪失敗，{}ms 後重試",
                    monitor.id,
                    round + 1,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = preset.next_delay_ms(delay_ms);
            }
        }

        let status_code = attempts.last().and_then(RetryAttempt::status_code);
        let mut message = attempts
            .last()
            .and_then(RetryAttempt::error_message)
            .map(str::to_string);
        let mut tcp_responsive = false;

        match tcp_target(&url) {
            Some((host, port)) => {
                let tcp = self
                    .tcp_attempt(&host, port, monitor.timeout(), next_attempt_number(&attempts))
                    .await;
                if tcp.success() {
                    tcp_responsive = true;
                    message = Some(TCP_RESPONSIVE_MESSAGE.to_string());
                } else if let Some(tcp_message) = tcp.error_message() {
                    message = Some(tcp_message.to_string());
                }
                attempts.push(tcp);
            }
            None => debug!("監控項 {} 的 URL 沒有可連線的主機，略過 TCP 探測", monitor.id),
        }

        let elapsed = started.elapsed();
        GuardMetrics::record_confirmation(false, tcp_responsive, attempts.len(), elapsed);
        warn!(
            "監控項 {} 確認失敗: {} 次探測，耗時 {:.1}ms，{}",
            monitor.id,
            attempts.len(),
            duration_ms(elapsed),
            message.as_deref().unwrap_or("無錯誤訊息")
        );

        RetryResult::failed(attempts, message, status_code)
    }

    fn finish_success(monitor: &Monitor, attempts: Vec<RetryAttempt>, started: Instant) -> RetryResult {
        let elapsed = started.elapsed();
        GuardMetrics::record_confirmation(true, false, attempts.len(), elapsed);
        info!(
            "監控項 {} 確認成功: 第 {} 次探測恢復，耗時 {:.1}ms",
            monitor.id,
            attempts.len(),
            duration_ms(elapsed)
        );

        RetryResult::succeeded(attempts).unwrap_or_else(|attempts| {
            error!("確認結果缺少成功的探測，改為失敗結果");
            RetryResult::failed(attempts, None, None)
        })
    }

    async fn http_attempt(
        &self,
        monitor: &Monitor,
        url: &Url,
        method: HttpMethod,
        attempt_number: u32,
    ) -> RetryAttempt {
        let request = HttpProbeRequest {
            url: url.clone(),
            method,
            headers: monitor.headers.clone(),
            body: match method {
                HttpMethod::Get => monitor.request_payload.clone(),
                HttpMethod::Head => None,
            },
            timeout: monitor.timeout(),
            read_body: method == HttpMethod::Get && monitor.required_string.is_some(),
        };

        // 在獨立任務中探測，傳輸層的 panic 只會讓這一次探測失敗
        let prober = Arc::clone(&self.prober);
        let outcome = match tokio::spawn(async move { prober.http(request).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "監控項 {} 的 {} 探測異常終止: {}",
                    monitor.id,
                    method.as_str(),
                    e
                );
                Err(ProbeFailure::new(
                    ErrorKind::Unknown,
                    format!("probe aborted unexpectedly: {}", e),
                ))
            }
        };

        let attempt = evaluate_http(monitor, method, attempt_number, outcome);
        GuardMetrics::record_attempt(
            ProbeType::Http,
            attempt.error_kind(),
            Duration::from_secs_f64(attempt.response_time_ms().unwrap_or(0.0) / 1000.0),
        );
        debug!(
            "監控項 {} 探測 #{} {}: {}",
            monitor.id,
            attempt_number,
            method.as_str(),
            attempt.error_kind().map(ErrorKind::as_str).unwrap_or("success")
        );
        attempt
    }

    async fn tcp_attempt(&self, host: &str, port: u16, timeout: Duration, attempt_number: u32) -> RetryAttempt {
        let prober = Arc::clone(&self.prober);
        let target_host = host.to_string();
        let outcome = match tokio::spawn(async move { prober.tcp(&target_host, port, timeout).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("TCP 探測 {}:{} 異常終止: {}", host, port, e);
                Err(ProbeFailure::new(
                    ErrorKind::Unknown,
                    format!("probe aborted unexpectedly: {}", e),
                ))
            }
        };

        let attempt = match outcome {
            Ok(elapsed) => RetryAttempt::tcp_success(attempt_number, duration_ms(elapsed)),
            Err(failure) => RetryAttempt::tcp_failure(
                attempt_number,
                failure.elapsed.map(duration_ms),
                failure.kind,
                failure.message,
            ),
        };
        GuardMetrics::record_attempt(
            ProbeType::Tcp,
            attempt.error_kind(),
            Duration::from_secs_f64(attempt.response_time_ms().unwrap_or(0.0) / 1000.0),
        );
        attempt
    }
}

fn next_attempt_number(attempts: &[RetryAttempt]) -> u32 {
    attempts.last().map_or(1, |a| a.attempt_number() + 1)
}

/// 監控項可接受的狀態碼
pub fn is_acceptable_status(monitor: &Monitor, status: u16) -> bool {
    status == monitor.expected_status_code
        || monitor.extra_status_codes.contains(&status)
        || ALWAYS_ACCEPTED_STATUS.contains(&status)
}

fn evaluate_http(
    monitor: &Monitor,
    method: HttpMethod,
    attempt_number: u32,
    outcome: HttpProbeOutcome,
) -> RetryAttempt {
    let response = match outcome {
        Ok(response) => response,
        Err(failure) => {
            return RetryAttempt::http_failure(
                attempt_number,
                method.as_str(),
                None,
                failure.elapsed.map(duration_ms),
                failure.kind,
                failure.message,
            );
        }
    };

    let response_time_ms = duration_ms(response.elapsed);
    if !is_acceptable_status(monitor, response.status) {
        return RetryAttempt::http_failure(
            attempt_number,
            method.as_str(),
            Some(response.status),
            Some(response_time_ms),
            ErrorKind::HttpStatus,
            format!(
                "HTTP {} (expected {})",
                response.status, monitor.expected_status_code
            ),
        );
    }

    if method == HttpMethod::Get {
        if let Some(required) = monitor.required_string.as_deref() {
            let found = response
                .body
                .as_deref()
                .map(|body| body.to_lowercase().contains(&required.to_lowercase()))
                .unwrap_or(false);
            if !found {
                return RetryAttempt::http_failure(
                    attempt_number,
                    method.as_str(),
                    Some(response.status),
                    Some(response_time_ms),
                    ErrorKind::StringNotFound,
                    format!("required string '{}' not found in response", required),
                );
            }
        }
    }

    RetryAttempt::http_success(attempt_number, method.as_str(), response.status, response_time_ms)
}

/// TCP 探測目標：主機與連接埠（未指定時用協議預設值）
fn tcp_target(url: &Url) -> Option<(String, u16)> {
    let host = match url.host()? {
        Host::Domain(domain) if !domain.is_empty() => domain.to_string(),
        Host::Domain(_) => return None,
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    };
    let port = url.port_or_known_default()?;
    Some((host, port))
}
