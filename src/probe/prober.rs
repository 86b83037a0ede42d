use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::config::ConfirmationConfig;
use crate::probe::classifier::{classify_connect_error, classify_error, error_chain_text, ErrorKind};

/// 探測器初始化錯誤
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("HTTP 客戶端建立失敗: {0}")]
    ClientBuild(String),
}

/// HTTP 探測方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Head,
    Get,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Head => "HEAD",
            HttpMethod::Get => "GET",
        }
    }
}

/// 單次 HTTP 探測請求
#[derive(Debug, Clone)]
pub struct HttpProbeRequest {
    pub url: Url,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
    /// 是否讀取回應內容（僅在需要比對字串時）
    pub read_body: bool,
}

/// HTTP 回應摘要
#[derive(Debug, Clone, PartialEq)]
pub struct HttpProbeResponse {
    pub status: u16,
    pub body: Option<String>,
    pub elapsed: Duration,
}

/// 已分類的傳輸失敗
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProbeFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

pub type HttpProbeOutcome = Result<HttpProbeResponse, ProbeFailure>;
pub type TcpProbeOutcome = Result<Duration, ProbeFailure>;

/// 探測傳輸層
///
/// 實作負責把傳輸錯誤轉成 `ErrorKind`，回應狀態碼的判斷留給確認引擎。
#[async_trait]
pub trait Prober: Send + Sync {
    async fn http(&self, request: HttpProbeRequest) -> HttpProbeOutcome;

    async fn tcp(&self, host: &str, port: u16, timeout: Duration) -> TcpProbeOutcome;
}

/// 以 reqwest 與 tokio TCP 實作的探測器
#[derive(Debug, Clone)]
pub struct NetworkProber {
    client: Client,
}

impl NetworkProber {
    pub fn new(config: &ConfirmationConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .redirect(Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProbeError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }

    fn classify_transport(err: &reqwest::Error) -> ProbeFailure {
        let text = error_chain_text(err);
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            classify_error(&text)
        };
        ProbeFailure::new(kind, text)
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn http(&self, request: HttpProbeRequest) -> HttpProbeOutcome {
        match request.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ProbeFailure::new(
                    ErrorKind::Unknown,
                    format!("unsupported URL scheme: {}", other),
                ));
            }
        }

        let method = match request.method {
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Get => Method::GET,
        };

        let mut builder = self
            .client
            .request(method, request.url.clone())
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        // reqwest 沒有逐請求的計時回呼，改以牆鐘時間量測
        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| Self::classify_transport(&e).with_elapsed(started.elapsed()))?;
        let status = response.status().as_u16();

        let body = if request.read_body {
            let text = response
                .text()
                .await
                .map_err(|e| Self::classify_transport(&e).with_elapsed(started.elapsed()))?;
            Some(text)
        } else {
            None
        };

        let elapsed = started.elapsed();
        debug!(
            "{} {} -> {} ({:.1}ms)",
            request.method.as_str(),
            request.url,
            status,
            elapsed.as_secs_f64() * 1000.0
        );

        Ok(HttpProbeResponse { status, body, elapsed })
    }

    async fn tcp(&self, host: &str, port: u16, timeout: Duration) -> TcpProbeOutcome {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(started.elapsed())
            }
            Ok(Err(e)) => Err(ProbeFailure::new(
                classify_connect_error(&e),
                format!("TCP connect to {}:{} failed: {}", host, port, e),
            )
            .with_elapsed(started.elapsed())),
            Err(_) => Err(ProbeFailure::new(
                ErrorKind::Timeout,
                format!("TCP connect to {}:{} timed out", host, port),
            )
            .with_elapsed(started.elapsed())),
        }
    }
}
