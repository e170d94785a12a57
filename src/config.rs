//! SDK configuration.
use std::{net::UdpSocket, time::Duration};

use crate::{Error, Result};

/// How the SDK stores definitions and who keeps them up to date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationMode {
    /// Definitions and telemetry live in process memory; this SDK syncs them.
    #[default]
    InMemoryStandalone,
    /// Definitions live in Redis and are kept up to date by another process. This SDK only reads
    /// them and writes telemetry.
    RedisConsumer,
    /// Definitions live in Redis and this SDK syncs them.
    RedisStandalone,
}

impl OperationMode {
    /// Whether this SDK runs the background sync tasks.
    pub fn is_standalone(self) -> bool {
        matches!(
            self,
            OperationMode::InMemoryStandalone | OperationMode::RedisStandalone
        )
    }

    /// Whether storage is kept in Redis.
    pub fn uses_redis(self) -> bool {
        matches!(
            self,
            OperationMode::RedisConsumer | OperationMode::RedisStandalone
        )
    }
}

/// Periods of the background tasks.
#[derive(Debug, Clone)]
pub struct TaskPeriods {
    /// Split sync period. Defaults to [`TaskPeriods::DEFAULT_SPLITS`].
    pub splits: Duration,
    /// Segment sync period.
    pub segments: Duration,
    /// Impression flush period.
    pub impressions: Duration,
    /// Gauge flush period.
    pub gauges: Duration,
    /// Counter flush period.
    pub counters: Duration,
    /// Latency flush period.
    pub latencies: Duration,
    /// Random duration subtracted from each period to avoid many instances running in lockstep.
    ///
    /// Defaults to [`TaskPeriods::DEFAULT_JITTER`].
    pub jitter: Duration,
}

impl TaskPeriods {
    /// Default value for [`TaskPeriods::splits`].
    pub const DEFAULT_SPLITS: Duration = Duration::from_secs(30);
    /// Default value for every other period.
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
    /// Default value for [`TaskPeriods::jitter`].
    pub const DEFAULT_JITTER: Duration = Duration::ZERO;

    /// Update split sync period.
    pub fn with_splits(mut self, period: Duration) -> TaskPeriods {
        self.splits = period;
        self
    }

    /// Update segment sync period.
    pub fn with_segments(mut self, period: Duration) -> TaskPeriods {
        self.segments = period;
        self
    }

    /// Update all telemetry flush periods.
    pub fn with_telemetry(mut self, period: Duration) -> TaskPeriods {
        self.impressions = period;
        self.gauges = period;
        self.counters = period;
        self.latencies = period;
        self
    }

    /// Update jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> TaskPeriods {
        self.jitter = jitter;
        self
    }

    fn all(&self) -> [Duration; 6] {
        [
            self.splits,
            self.segments,
            self.impressions,
            self.gauges,
            self.counters,
            self.latencies,
        ]
    }
}

impl Default for TaskPeriods {
    fn default() -> TaskPeriods {
        TaskPeriods {
            splits: TaskPeriods::DEFAULT_SPLITS,
            segments: TaskPeriods::DEFAULT_PERIOD,
            impressions: TaskPeriods::DEFAULT_PERIOD,
            gauges: TaskPeriods::DEFAULT_PERIOD,
            counters: TaskPeriods::DEFAULT_PERIOD,
            latencies: TaskPeriods::DEFAULT_PERIOD,
            jitter: TaskPeriods::DEFAULT_JITTER,
        }
    }
}

/// Redis connection settings.
#[derive(Clone)]
pub struct RedisConfig {
    #[allow(missing_docs)]
    pub host: String,
    #[allow(missing_docs)]
    pub port: u16,
    /// Database index.
    pub database: i64,
    #[allow(missing_docs)]
    pub password: Option<String>,
    /// Namespace for every key the SDK touches. Empty means no namespace.
    pub prefix: String,
}

impl RedisConfig {
    /// Default value for [`RedisConfig::host`].
    pub const DEFAULT_HOST: &'static str = "localhost";
    /// Default value for [`RedisConfig::port`].
    pub const DEFAULT_PORT: u16 = 6379;

    /// Update prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> RedisConfig {
        self.prefix = prefix.into();
        self
    }

    pub(crate) fn url(&self) -> String {
        let auth = match &self.password {
            Some(password) => format!(":{password}@"),
            None => String::new(),
        };
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for RedisConfig {
    fn default() -> RedisConfig {
        RedisConfig {
            host: RedisConfig::DEFAULT_HOST.to_owned(),
            port: RedisConfig::DEFAULT_PORT,
            database: 0,
            password: None,
            prefix: String::new(),
        }
    }
}

// Hand-written so the password never ends up in logs.
impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Queue sizes and worker counts.
#[derive(Debug, Clone)]
pub struct AdvancedConfig {
    /// Maximum number of segment sync jobs waiting for a worker.
    pub segment_queue_size: usize,
    /// Number of segment sync workers.
    pub segment_workers: usize,
    /// Maximum number of impressions kept in memory.
    pub impressions_queue_size: usize,
    /// Maximum number of impressions sent per flush.
    pub impressions_bulk_size: usize,
    /// Expiration of the shared impression queue.
    pub impressions_ttl: Duration,
}

impl AdvancedConfig {
    #[allow(missing_docs)]
    pub const DEFAULT_SEGMENT_QUEUE_SIZE: usize = 500;
    #[allow(missing_docs)]
    pub const DEFAULT_SEGMENT_WORKERS: usize = 10;
    #[allow(missing_docs)]
    pub const DEFAULT_IMPRESSIONS_QUEUE_SIZE: usize = 10_000;
    #[allow(missing_docs)]
    pub const DEFAULT_IMPRESSIONS_BULK_SIZE: usize = 5_000;
    #[allow(missing_docs)]
    pub const DEFAULT_IMPRESSIONS_TTL: Duration = Duration::from_secs(3600);
}

impl Default for AdvancedConfig {
    fn default() -> AdvancedConfig {
        AdvancedConfig {
            segment_queue_size: AdvancedConfig::DEFAULT_SEGMENT_QUEUE_SIZE,
            segment_workers: AdvancedConfig::DEFAULT_SEGMENT_WORKERS,
            impressions_queue_size: AdvancedConfig::DEFAULT_IMPRESSIONS_QUEUE_SIZE,
            impressions_bulk_size: AdvancedConfig::DEFAULT_IMPRESSIONS_BULK_SIZE,
            impressions_ttl: AdvancedConfig::DEFAULT_IMPRESSIONS_TTL,
        }
    }
}

/// Top-level SDK configuration.
///
/// ```
/// # use std::time::Duration;
/// # use splitio_core::config::{OperationMode, SdkConfig};
/// let config = SdkConfig::new()
///     .with_operation_mode(OperationMode::RedisConsumer)
///     .with_block_until_ready(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct SdkConfig {
    #[allow(missing_docs)]
    pub operation_mode: OperationMode,
    /// Name of this instance, reported with telemetry.
    pub instance_name: String,
    /// Address of this instance, reported with telemetry.
    pub ip_address: String,
    /// When disabled, instance name and address are reported as `NA`.
    pub ip_addresses_enabled: bool,
    /// When disabled, impressions carry an empty label.
    pub labels_enabled: bool,
    /// How long [`SplitFactory::new`](crate::SplitFactory::new) waits for the first sync. `None`
    /// returns immediately.
    pub block_until_ready: Option<Duration>,
    #[allow(missing_docs)]
    pub task_periods: TaskPeriods,
    #[allow(missing_docs)]
    pub redis: RedisConfig,
    #[allow(missing_docs)]
    pub advanced: AdvancedConfig,
}

impl SdkConfig {
    /// Create a default configuration.
    pub fn new() -> SdkConfig {
        SdkConfig::default()
    }

    /// Update operation mode.
    pub fn with_operation_mode(mut self, operation_mode: OperationMode) -> SdkConfig {
        self.operation_mode = operation_mode;
        self
    }

    /// Update block-until-ready timeout.
    pub fn with_block_until_ready(mut self, timeout: Duration) -> SdkConfig {
        self.block_until_ready = Some(timeout);
        self
    }

    /// Update task periods.
    pub fn with_task_periods(mut self, task_periods: TaskPeriods) -> SdkConfig {
        self.task_periods = task_periods;
        self
    }

    /// Update Redis settings.
    pub fn with_redis(mut self, redis: RedisConfig) -> SdkConfig {
        self.redis = redis;
        self
    }

    /// Update advanced settings.
    pub fn with_advanced(mut self, advanced: AdvancedConfig) -> SdkConfig {
        self.advanced = advanced;
        self
    }
}

impl Default for SdkConfig {
    fn default() -> SdkConfig {
        let (instance_name, ip_address) = match local_ip() {
            Some(ip) => (format!("ip-{}", ip.replace('.', "-")), ip),
            None => ("unknown".to_owned(), "unknown".to_owned()),
        };
        SdkConfig {
            operation_mode: OperationMode::default(),
            instance_name,
            ip_address,
            ip_addresses_enabled: true,
            labels_enabled: true,
            block_until_ready: None,
            task_periods: TaskPeriods::default(),
            redis: RedisConfig::default(),
            advanced: AdvancedConfig::default(),
        }
    }
}

/// Address of the interface used for outbound traffic. Connecting a UDP socket sends nothing.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then(|| ip.to_string())
}

/// Validate `config` for use with `api_key` and apply derived settings.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if the api key is empty, a task period or a worker
/// pool size is zero, or Redis is required and has no host.
pub fn normalize(api_key: &str, config: &mut SdkConfig) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(Error::InvalidConfiguration(
            "api key must be a non-empty string".to_owned(),
        ));
    }

    if config.task_periods.all().contains(&Duration::ZERO) {
        return Err(Error::InvalidConfiguration(
            "task periods must be greater than zero".to_owned(),
        ));
    }

    if config.advanced.segment_workers == 0 || config.advanced.segment_queue_size == 0 {
        return Err(Error::InvalidConfiguration(
            "segment workers and segment queue size must be greater than zero".to_owned(),
        ));
    }

    if config.operation_mode.uses_redis() && config.redis.host.trim().is_empty() {
        return Err(Error::InvalidConfiguration(
            "redis host must be a non-empty string".to_owned(),
        ));
    }

    if !config.ip_addresses_enabled {
        config.ip_address = "NA".to_owned();
        config.instance_name = "NA".to_owned();
    }

    Ok(())
}
