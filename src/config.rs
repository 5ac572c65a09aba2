//! Gateway configuration, read from `TRADE_*` environment variables with defaults.

use crate::instrument::InstrumentCatalog;
use crate::risk::{default_volume_limit, RiskLimits};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    pub order_interval: Duration,
    pub query_interval: Duration,
    pub cancel_interval: Duration,
    pub max_order_life: Duration,
    pub account_name: String,
    pub hostname: String,
    pub request_addr: String,
    pub response_addr: String,
    pub audit_addr: String,
    pub health_port: u16,
    pub warmup: Duration,
    pub volume_limits: HashMap<String, Decimal>,
    pub etf_prefixes: Vec<char>,
    pub order_resync: Duration,
    pub holding_resync: Duration,
    pub balance_resync: Duration,
    pub expiry_sweep: Duration,
    pub snapshot_interval: Duration,
    pub broker_workers: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            order_interval: Duration::ZERO,
            query_interval: Duration::ZERO,
            cancel_interval: Duration::ZERO,
            max_order_life: Duration::from_secs(600),
            account_name: "default".to_string(),
            hostname: "order-gateway".to_string(),
            request_addr: "tcp://*:53001".to_string(),
            response_addr: "tcp://*:53002".to_string(),
            audit_addr: "tcp://*:55001".to_string(),
            health_port: 8080,
            warmup: Duration::from_secs(5),
            volume_limits: HashMap::new(),
            etf_prefixes: vec!['1', '5'],
            order_resync: Duration::from_secs(10),
            holding_resync: Duration::from_secs(3),
            balance_resync: Duration::from_secs(30),
            expiry_sweep: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(5),
            broker_workers: 4,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse::<f64>(key)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse `TICKER:LIMIT,...`. Malformed pairs are skipped.
pub fn parse_volume_limits(s: &str) -> HashMap<String, Decimal> {
    s.split(',')
        .filter_map(|part| {
            let mut split = part.trim().splitn(2, ':');
            let ticker = split.next()?.trim();
            let limit = Decimal::from_str(split.next()?.trim()).ok()?;
            if ticker.is_empty() {
                return None;
            }
            Some((ticker.to_string(), limit))
        })
        .collect()
}

/// Parse `1,5` into leading characters.
pub fn parse_prefixes(s: &str) -> Vec<char> {
    s.split(',').filter_map(|p| p.trim().chars().next()).collect()
}

impl GatewayConfig {
    /// Load from env, falling back to [`GatewayConfig::default`] per variable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            order_interval: env_secs("TRADE_ORDER_INTERVAL", d.order_interval),
            query_interval: env_secs("TRADE_QUERY_INTERVAL", d.query_interval),
            cancel_interval: env_secs("TRADE_CANCEL_INTERVAL", d.cancel_interval),
            max_order_life: env_secs("TRADE_MAX_ORDER_LIFE", d.max_order_life),
            account_name: env_string("TRADE_ACCOUNT").unwrap_or(d.account_name),
            hostname: env_string("TRADE_HOSTNAME")
                .or_else(|| env_string("HOSTNAME"))
                .unwrap_or(d.hostname),
            request_addr: env_string("TRADE_REQUEST_ADDR").unwrap_or(d.request_addr),
            response_addr: env_string("TRADE_RESPONSE_ADDR").unwrap_or(d.response_addr),
            audit_addr: env_string("TRADE_AUDIT_ADDR").unwrap_or(d.audit_addr),
            health_port: env_parse("TRADE_HEALTH_PORT").unwrap_or(d.health_port),
            warmup: env_secs("TRADE_WARMUP_SECS", d.warmup),
            volume_limits: env_string("TRADE_VOLUME_LIMITS")
                .map(|s| parse_volume_limits(&s))
                .unwrap_or(d.volume_limits),
            etf_prefixes: env_string("TRADE_ETF_PREFIXES")
                .map(|s| parse_prefixes(&s))
                .unwrap_or(d.etf_prefixes),
            order_resync: env_secs("TRADE_ORDER_RESYNC_SECS", d.order_resync),
            holding_resync: env_secs("TRADE_HOLDING_RESYNC_SECS", d.holding_resync),
            balance_resync: env_secs("TRADE_BALANCE_RESYNC_SECS", d.balance_resync),
            expiry_sweep: env_secs("TRADE_EXPIRY_SWEEP_SECS", d.expiry_sweep),
            snapshot_interval: env_secs("TRADE_SNAPSHOT_SECS", d.snapshot_interval),
            broker_workers: env_parse::<usize>("TRADE_BROKER_WORKERS")
                .filter(|n| *n > 0)
                .unwrap_or(d.broker_workers),
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            order_interval: self.order_interval,
            cancel_interval: self.cancel_interval,
            volume_limits: self.volume_limits.clone(),
            default_volume_limit: default_volume_limit(),
        }
    }

    pub fn catalog(&self) -> InstrumentCatalog {
        InstrumentCatalog::with_etf_prefixes(&self.etf_prefixes)
    }

    /// Broker queries never run more often than the query interval.
    pub fn resync_period(&self, base: Duration) -> Duration {
        base.max(self.query_interval)
    }
}
