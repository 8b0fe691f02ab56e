//! Monitor configuration
//!
//! Defaults reproduce the constants the monitor has always run with: the LME
//! 3-month copper contract, a 1 s refresh, a 100 sample window and a 2 s
//! synthetic walk around 8500 USD/t. Values can be overridden in code through
//! [`MonitorConfigBuilder`] or from `MONITOR_*` environment variables (a
//! `.env` file is honoured) through [`MonitorConfig::from_env`].

use crate::connection::{NewsServiceCandidate, NewsStrategyKind};
use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Upper bound for every timer and timeout
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Session and service-opening settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub market_data_service: String,
    /// Tried in order; the first that opens decides the news strategy
    pub news_services: Vec<NewsServiceCandidate>,
    /// Upper bound for each start/open/stop call
    pub attempt_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            market_data_service: "//blp/mktdata".to_string(),
            news_services: vec![
                NewsServiceCandidate::new("//blp/news", NewsStrategyKind::Headlines),
                NewsServiceCandidate::new("//blp/refdata", NewsStrategyKind::ReferenceData),
                NewsServiceCandidate::new("//blp/apiflds", NewsStrategyKind::ReferenceData),
                NewsServiceCandidate::new("//blp/instruments", NewsStrategyKind::ReferenceData),
            ],
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

/// The single monitored instrument
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    pub security: String,
    pub fields: Vec<String>,
    /// Field decoded into a price observation
    pub price_field: String,
    pub poll_timeout: Duration,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            security: "LMCADS03 Comdty".to_string(),
            fields: vec!["LAST_PRICE".to_string(), "BID".to_string(), "ASK".to_string()],
            price_field: "LAST_PRICE".to_string(),
            poll_timeout: Duration::from_millis(1000),
        }
    }
}

/// News retrieval settings for both strategies
#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub keywords: Vec<String>,
    pub poll_timeout: Duration,
    pub reference_fields: Vec<String>,
    pub reference_interval: Duration,
    /// Events read per reference-data request before giving up
    pub reference_max_events: u32,
    pub reference_event_timeout: Duration,
    /// Used when a headline carries no source
    pub default_source: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["copper".to_string(), "LME".to_string(), "metals".to_string()],
            poll_timeout: Duration::from_millis(500),
            reference_fields: ["NEWS_COUNT", "LAST_UPDATE_DT", "NAME", "SECURITY_DES"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            reference_interval: Duration::from_secs(300),
            reference_max_events: 10,
            reference_event_timeout: Duration::from_millis(1000),
            default_source: "Bloomberg".to_string(),
        }
    }
}

/// Synthetic random-walk generator settings
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// USD per ton
    pub base_price: f64,
    pub interval: Duration,
    pub noise_std_dev: f64,
    pub news_probability: f64,
    /// Fixed seed for reproducible walks
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            base_price: 8500.0,
            interval: Duration::from_secs(2),
            noise_std_dev: 20.0,
            news_probability: 0.1,
            seed: None,
        }
    }
}

/// Consumer-side cadence and window size
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub period: Duration,
    pub history_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Complete monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub connection: ConnectionConfig,
    pub instrument: InstrumentConfig,
    pub news: NewsConfig,
    pub synthetic: SyntheticConfig,
    pub refresh: RefreshConfig,
    pub log_level: Level,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            instrument: InstrumentConfig::default(),
            news: NewsConfig::default(),
            synthetic: SyntheticConfig::default(),
            refresh: RefreshConfig::default(),
            log_level: Level::INFO,
        }
    }
}

impl MonitorConfig {
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::new()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.market_data_service.is_empty() {
            return Err(ConfigError::invalid("market_data_service", "cannot be empty"));
        }
        if self.connection.attempt_timeout.is_zero() {
            return Err(ConfigError::invalid("attempt_timeout", "must be greater than 0"));
        }
        if self.instrument.security.is_empty() {
            return Err(ConfigError::invalid("security", "cannot be empty"));
        }
        if !self.instrument.fields.contains(&self.instrument.price_field) {
            return Err(ConfigError::invalid("price_field", "must be one of the subscribed fields"));
        }
        if self.instrument.poll_timeout.is_zero() || self.news.poll_timeout.is_zero() {
            return Err(ConfigError::invalid("poll_timeout", "must be greater than 0"));
        }
        if self.news.reference_max_events == 0 {
            return Err(ConfigError::invalid("reference_max_events", "must be greater than 0"));
        }
        if !self.synthetic.base_price.is_finite() || self.synthetic.base_price <= 0.0 {
            return Err(ConfigError::invalid("base_price", "must be a positive number"));
        }
        if !self.synthetic.noise_std_dev.is_finite() || self.synthetic.noise_std_dev < 0.0 {
            return Err(ConfigError::invalid("noise_std_dev", "must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.synthetic.news_probability) {
            return Err(ConfigError::invalid("news_probability", "must be within 0..=1"));
        }
        if self.synthetic.interval.is_zero() {
            return Err(ConfigError::invalid("synthetic_interval", "must be greater than 0"));
        }
        if self.refresh.period.is_zero() {
            return Err(ConfigError::invalid("refresh_period", "must be greater than 0"));
        }
        let timers = [
            ("attempt_timeout", self.connection.attempt_timeout),
            ("market_poll_timeout", self.instrument.poll_timeout),
            ("news_poll_timeout", self.news.poll_timeout),
            ("reference_interval", self.news.reference_interval),
            ("reference_event_timeout", self.news.reference_event_timeout),
            ("synthetic_interval", self.synthetic.interval),
            ("refresh_period", self.refresh.period),
        ];
        if let Some((key, _)) = timers.iter().find(|(_, value)| *value > MAX_INTERVAL) {
            return Err(ConfigError::invalid(key, "must not exceed 24h"));
        }
        if self.refresh.history_capacity == 0 {
            return Err(ConfigError::invalid("history_capacity", "must be greater than 0"));
        }
        Ok(())
    }

    /// Defaults overridden by `MONITOR_*` variables, after loading `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(security) = lookup("MONITOR_SECURITY") {
            config.instrument.security = security;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "MONITOR_CONNECT_TIMEOUT_MS")? {
            config.connection.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "MONITOR_REFRESH_MS")? {
            config.refresh.period = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_var(&lookup, "MONITOR_HISTORY_CAPACITY")? {
            config.refresh.history_capacity = capacity;
        }
        if let Some(price) = parse_var(&lookup, "MONITOR_BASE_PRICE")? {
            config.synthetic.base_price = price;
        }
        if let Some(std_dev) = parse_var(&lookup, "MONITOR_NOISE_STD_DEV")? {
            config.synthetic.noise_std_dev = std_dev;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "MONITOR_SYNTHETIC_INTERVAL_MS")? {
            config.synthetic.interval = Duration::from_millis(ms);
        }
        if let Some(seed) = parse_var(&lookup, "MONITOR_DEMO_SEED")? {
            config.synthetic.seed = Some(seed);
        }
        if let Some(keywords) = lookup("MONITOR_NEWS_KEYWORDS") {
            config.news.keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(level) = parse_var(&lookup, "MONITOR_LOG_LEVEL")? {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| ConfigError::Parse {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Builder pattern for monitor configuration
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }

    pub fn security(mut self, security: &str) -> Self {
        self.config.instrument.security = security.to_string();
        self
    }

    pub fn market_data_service(mut self, service: &str) -> Self {
        self.config.connection.market_data_service = service.to_string();
        self
    }

    pub fn news_services(mut self, candidates: Vec<NewsServiceCandidate>) -> Self {
        self.config.connection.news_services = candidates;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.attempt_timeout = timeout;
        self
    }

    pub fn market_poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.instrument.poll_timeout = timeout;
        self
    }

    pub fn news_poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.news.poll_timeout = timeout;
        self
    }

    pub fn reference_interval(mut self, interval: Duration) -> Self {
        self.config.news.reference_interval = interval;
        self
    }

    pub fn reference_event_timeout(mut self, timeout: Duration) -> Self {
        self.config.news.reference_event_timeout = timeout;
        self
    }

    pub fn refresh_period(mut self, period: Duration) -> Self {
        self.config.refresh.period = period;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.refresh.history_capacity = capacity;
        self
    }

    pub fn base_price(mut self, price: f64) -> Self {
        self.config.synthetic.base_price = price;
        self
    }

    pub fn synthetic_interval(mut self, interval: Duration) -> Self {
        self.config.synthetic.interval = interval;
        self
    }

    pub fn noise_std_dev(mut self, std_dev: f64) -> Self {
        self.config.synthetic.noise_std_dev = std_dev;
        self
    }

    pub fn news_probability(mut self, probability: f64) -> Self {
        self.config.synthetic.news_probability = probability;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.synthetic.seed = Some(seed);
        self
    }

    pub fn log_level(mut self, level: Level) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn build(self) -> MonitorConfig {
        self.config
    }
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh.history_capacity, 100);
        assert_eq!(config.connection.news_services[0].kind, NewsStrategyKind::Headlines);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = MonitorConfig::builder().news_probability(1.5).build();
        assert!(config.validate().is_err());

        let config = MonitorConfig::builder().noise_std_dev(-1.0).build();
        assert!(config.validate().is_err());

        let config = MonitorConfig::builder().refresh_period(Duration::ZERO).build();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.instrument.price_field = "VOLUME".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MONITOR_SECURITY", "LMAHDS03 Comdty"),
            ("MONITOR_REFRESH_MS", "250"),
            ("MONITOR_DEMO_SEED", "42"),
            ("MONITOR_NEWS_KEYWORDS", "aluminium, LME ,"),
            ("MONITOR_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let config = MonitorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.instrument.security, "LMAHDS03 Comdty");
        assert_eq!(config.refresh.period, Duration::from_millis(250));
        assert_eq!(config.synthetic.seed, Some(42));
        assert_eq!(config.news.keywords, vec!["aluminium".to_string(), "LME".to_string()]);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_oversized_intervals_rejected() {
        let vars: HashMap<&str, &str> = [("MONITOR_SYNTHETIC_INTERVAL_MS", "18446744073709551615")]
            .into_iter()
            .collect();
        let result = MonitorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "synthetic_interval"
        ));

        let config = MonitorConfig::builder().reference_interval(MAX_INTERVAL).build();
        assert!(config.validate().is_ok());
        let config = MonitorConfig::builder()
            .refresh_period(MAX_INTERVAL + Duration::from_millis(1))
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_reports_parse_errors() {
        let result = MonitorConfig::from_lookup(|k| {
            (k == "MONITOR_BASE_PRICE").then(|| "lots".to_string())
        });
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Parse {
                key: "MONITOR_BASE_PRICE".to_string(),
                value: "lots".to_string()
            }
        );
    }
}
