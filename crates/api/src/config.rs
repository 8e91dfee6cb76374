//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::{Currency, Money, PricingConfig};
use payments::ReconcilerConfig;
use rust_decimal::Decimal;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres connection string; unset keeps records in memory
/// - `DEFAULT_CURRENCY`: currency for orders that don't name one (default: `YER`)
/// - `FLAT_SHIPPING`: shipping charged per order (default: `0.00`)
/// - `TAX_RATE`: tax as a fraction of the subtotal (default: `0`)
/// - `WALLET_GATEWAY_TIMEOUT_MS`: bound on one wallet gateway call (default: `30000`)
/// - `WALLET_GATEWAY_LATENCY_MS`: simulated latency of the in-memory gateway (default: `0`)
/// - `RECOVERY_SWEEP_INTERVAL_SECS`: period of the wallet recovery sweep, `0` disables it
///
/// Values that don't parse fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub default_currency: Currency,
    pub flat_shipping: Money,
    pub tax_rate: Decimal,
    pub wallet_gateway_timeout: Duration,
    pub wallet_gateway_latency: Duration,
    pub recovery_sweep_interval: Option<Duration>,
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_parse("LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            default_currency: std::env::var("DEFAULT_CURRENCY")
                .ok()
                .and_then(|code| Currency::parse(&code).ok())
                .unwrap_or(defaults.default_currency),
            flat_shipping: std::env::var("FLAT_SHIPPING")
                .ok()
                .and_then(|v| Money::parse(v.trim()).ok())
                .filter(|m| !m.is_negative())
                .unwrap_or(defaults.flat_shipping),
            tax_rate: env_parse::<Decimal>("TAX_RATE")
                .filter(|rate| !rate.is_sign_negative())
                .unwrap_or(defaults.tax_rate),
            wallet_gateway_timeout: env_parse("WALLET_GATEWAY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.wallet_gateway_timeout),
            wallet_gateway_latency: env_parse("WALLET_GATEWAY_LATENCY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.wallet_gateway_latency),
            recovery_sweep_interval: env_parse::<u64>("RECOVERY_SWEEP_INTERVAL_SECS")
                .and_then(sweep_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the order amount calculator.
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            flat_shipping: self.flat_shipping,
            tax_rate: self.tax_rate,
        }
    }

    /// Settings for the wallet reconciler. Payments are considered stale after
    /// twice the gateway timeout, and never sooner than the default.
    pub fn reconciler(&self) -> ReconcilerConfig {
        let defaults = ReconcilerConfig::default();
        ReconcilerConfig {
            gateway_timeout: self.wallet_gateway_timeout,
            stale_after: defaults
                .stale_after
                .max(self.wallet_gateway_timeout.saturating_mul(2)),
            ..defaults
        }
    }
}

fn sweep_interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            default_currency: Currency::default(),
            flat_shipping: Money::zero(),
            tax_rate: Decimal::ZERO,
            wallet_gateway_timeout: Duration::from_millis(30_000),
            wallet_gateway_latency: Duration::ZERO,
            recovery_sweep_interval: None,
        }
    }
}
