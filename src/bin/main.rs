use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use uptime_guard::clock::{system_clock, ManualClock};
use uptime_guard::config::{self, ApplicationConfig, LogConfig};
use uptime_guard::maintenance::{parse_windows, MaintenanceEvaluator};
use uptime_guard::models::{ChannelKind, Monitor, NotificationChannel};
use uptime_guard::probe::{ConfirmationEngine, NetworkProber, SensitivityPreset};
use uptime_guard::rate_limit::RateLimiterRegistry;
use uptime_guard::redis::ConnectionPool;
use uptime_guard::storage::InMemoryMonitorRepository;
use uptime_guard::store::RedisStateStore;

#[derive(Parser)]
#[command(name = "uptime_guard", version, about = "可用性監控的確認與警報節流工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 對 URL 執行一次確認週期並輸出結果
    Confirm {
        #[arg(long)]
        url: String,
        /// low、medium 或 high
        #[arg(long, default_value = "medium")]
        sensitivity: String,
        /// 單次探測逾時（秒）
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, default_value_t = 200)]
        expected_status: u16,
        #[arg(long)]
        required_string: Option<String>,
    },
    /// 評估維護窗口列表
    Maintenance {
        /// 窗口列表 JSON 檔
        #[arg(long)]
        windows: PathBuf,
        /// 評估時間（RFC3339），預設為現在
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// 查詢通知頻道的限流使用量（Redis）
    Limits {
        #[arg(long, value_parser = parse_channel_kind)]
        kind: ChannelKind,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        identity: String,
    },
}

fn parse_channel_kind(raw: &str) -> Result<ChannelKind, String> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase()))
        .map_err(|_| format!("未知的頻道類型: {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化配置
    let app_config = config::init_config()?;

    // 初始化日誌系統
    init_logging(&app_config.log)?;

    let output = match cli.command {
        Command::Confirm {
            url,
            sensitivity,
            timeout,
            expected_status,
            required_string,
        } => {
            let mut monitor = Monitor::new(0, url);
            monitor.timeout_seconds = timeout.unwrap_or(app_config.confirmation.default_timeout_secs);
            monitor.expected_status_code = expected_status;
            monitor.required_string = required_string.filter(|s| !s.trim().is_empty());
            run_confirm(app_config, &monitor, &sensitivity).await?
        }
        Command::Maintenance { windows, at } => run_maintenance(app_config, windows, at)?,
        Command::Limits {
            kind,
            destination,
            identity,
        } => run_limits(app_config, NotificationChannel::new(kind, destination), &identity).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_confirm(app_config: &ApplicationConfig, monitor: &Monitor, sensitivity: &str) -> Result<Value> {
    let prober = NetworkProber::new(&app_config.confirmation)?;
    let engine = ConfirmationEngine::new(Arc::new(prober));
    let preset = SensitivityPreset::from_key(Some(sensitivity));

    info!("開始確認 {}（{}）", monitor.url, preset.name);
    let result = engine.confirm(monitor, &preset).await;
    Ok(serde_json::to_value(&result)?)
}

fn run_maintenance(app_config: &ApplicationConfig, path: PathBuf, at: Option<DateTime<Utc>>) -> Result<Value> {
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("無法讀取窗口檔案 {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| anyhow!("窗口檔案不是有效的 JSON: {}", e))?;

    let mut monitor = Monitor::new(0, "");
    monitor.maintenance_windows = parse_windows(value);

    let clock = match at {
        Some(at) => ManualClock::shared(at) as Arc<dyn uptime_guard::clock::Clock>,
        None => system_clock(),
    };
    let now = clock.now();
    let evaluator = MaintenanceEvaluator::from_config(
        clock,
        Arc::new(InMemoryMonitorRepository::new()),
        &app_config.maintenance,
    );

    Ok(json!({
        "at": now.to_rfc3339(),
        "windows": monitor.maintenance_windows.len(),
        "in_maintenance": evaluator.is_in_maintenance(&monitor),
        "next_window_start": evaluator.next_window(&monitor).map(|start| start.to_rfc3339()),
    }))
}

async fn run_limits(app_config: &ApplicationConfig, channel: NotificationChannel, identity: &str) -> Result<Value> {
    let pool = ConnectionPool::connect(app_config.redis.clone()).await?;
    let store = Arc::new(RedisStateStore::new(pool));
    let registry = RateLimiterRegistry::with_defaults(store, system_clock(), &app_config.rate_limit);

    let stats = registry.stats(identity, &channel).await?;
    Ok(json!({
        "channel": channel.kind,
        "destination": channel.destination,
        "limited": stats.is_some(),
        "stats": stats,
    }))
}

// 初始化日誌系統
fn init_logging(log_config: &LogConfig) -> Result<()> {
    let level = match log_config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO, // 默認為INFO
    };

    // 結果輸出到 stdout，日誌一律寫到 stderr
    let builder = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let result = if log_config.format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| anyhow!("設置日誌系統失敗: {}", e))?;

    info!("日誌系統初始化完成");
    Ok(())
}
