//! Data models shared between producers, the refresh loop and renderers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observed price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(price: f64, observed_at: DateTime<Utc>) -> Self {
        Self { price, observed_at }
    }

    /// Observation stamped with the local receipt time
    pub fn now(price: f64) -> Self {
        Self::new(price, Utc::now())
    }
}

impl fmt::Display for PriceObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} @ {}", self.price, self.observed_at.format("%H:%M:%S"))
    }
}

/// A formatted news line, treated as opaque text by the core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsLine(String);

impl NewsLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NewsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Item carried on the price queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueMessage {
    Observation(PriceObservation),
    /// Non-fatal ingestion error reported by a producer
    Fault(String),
}

/// Derived statistics over the current history window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub high: f64,
    pub low: f64,
    pub change_percent: f64,
    pub count: usize,
}

impl Statistics {
    /// Signed percentage with two decimals, e.g. `+0.12%`
    pub fn change_label(&self) -> String {
        format!("{:+.2}%", self.change_percent)
    }

    pub fn is_up(&self) -> bool {
        self.change_percent >= 0.0
    }
}

/// Everything a renderer needs to redraw after one refresh tick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Oldest first
    pub history: Vec<PriceObservation>,
    pub latest: PriceObservation,
    pub statistics: Option<Statistics>,
}

impl Snapshot {
    pub fn latest_price(&self) -> f64 {
        self.latest.price
    }

    pub fn latest_price_label(&self) -> String {
        format!("${:.2}", self.latest.price)
    }
}

/// Connection state enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    DemoMode,
    Error(String),
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connected => write!(f, "Connected to market data"),
            ConnectionState::DemoMode => write!(f, "Demo mode (synthetic data)"),
            ConnectionState::Error(cause) => write!(f, "Connection error - {}", cause),
        }
    }
}

/// Whether workers and the refresh loop are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Idle,
    Monitoring,
}
