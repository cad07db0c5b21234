use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Market data provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Tushare API token.
    pub token: String,
    /// Tushare HTTP endpoint.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Client-side request budget per minute.
    pub calls_per_minute: u32,
    /// Drop special-treatment (ST) names from the universe.
    pub exclude_st: bool,
    /// Drop instruments listed fewer than this many days ago.
    pub min_list_days: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: "http://api.tushare.pro".to_string(),
            timeout: Duration::from_secs(30),
            calls_per_minute: 120,
            exclude_st: true,
            min_list_days: 180,
        }
    }
}

/// Pattern detection and job scheduling defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Percent change at or above which a day counts as limit-up.
    pub limit_up_threshold: f64,
    /// Minimum consecutive limit-up days that form a run.
    pub min_run_length: usize,
    pub default_lookback_days: u32,
    pub default_batch_size: usize,
    pub default_max_instruments: usize,
    /// Emit a progress tick every N processed instruments.
    pub progress_every: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            limit_up_threshold: 9.5,
            min_run_length: 3,
            default_lookback_days: 180,
            default_batch_size: 500,
            default_max_instruments: 200,
            progress_every: 10,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite task store location.
    pub database_path: String,
    pub provider: ProviderConfig,
    pub scan: ScanConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let provider_defaults = ProviderConfig::default();
        let scan_defaults = ScanConfig::default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 8000),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/tasks.db".to_string()),
            provider: ProviderConfig {
                token: env::var("TUSHARE_TOKEN").unwrap_or_default(),
                api_url: env::var("TUSHARE_API_URL").unwrap_or(provider_defaults.api_url),
                timeout: Duration::from_secs(parse_env(
                    "PROVIDER_TIMEOUT_SECS",
                    provider_defaults.timeout.as_secs(),
                )),
                calls_per_minute: parse_env(
                    "PROVIDER_CALLS_PER_MINUTE",
                    provider_defaults.calls_per_minute,
                ),
                exclude_st: parse_flag("EXCLUDE_ST", provider_defaults.exclude_st),
                min_list_days: parse_env("MIN_LIST_DAYS", provider_defaults.min_list_days),
            },
            scan: ScanConfig {
                limit_up_threshold: parse_env(
                    "LIMIT_UP_THRESHOLD",
                    scan_defaults.limit_up_threshold,
                ),
                min_run_length: parse_env("MIN_RUN_LENGTH", scan_defaults.min_run_length).max(1),
                default_lookback_days: parse_env(
                    "DEFAULT_LOOKBACK_DAYS",
                    scan_defaults.default_lookback_days,
                ),
                default_batch_size: parse_env(
                    "DEFAULT_BATCH_SIZE",
                    scan_defaults.default_batch_size,
                )
                .max(1),
                default_max_instruments: parse_env(
                    "DEFAULT_MAX_INSTRUMENTS",
                    scan_defaults.default_max_instruments,
                ),
                progress_every: parse_env("PROGRESS_EVERY", scan_defaults.progress_every).max(1),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Read and parse an env var, falling back to `default` when unset or invalid.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
