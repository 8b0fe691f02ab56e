//! # Commodity Monitor
//!
//! Real-time price and news monitor for a single exchange-traded commodity
//! (LME 3-month copper by default).
//!
//! Producers (live market-data and news workers, or a synthetic random walk in
//! demo mode) push into two queues; a single refresh loop drains them on a
//! timer, keeps a sliding price window, derives statistics and pushes
//! snapshots to registered [`Renderer`]s.
//!
//! ## Quick Start
//! ```rust,ignore
//! use commodity_monitor::prelude::*;
//!
//! let mut monitor = MonitorController::offline(MonitorConfig::default())?;
//! monitor.register_renderer(Arc::new(LogRenderer));
//! monitor.start().await?;
//! // ...
//! monitor.shutdown().await;
//! ```

pub mod cancel;
pub mod config;
pub mod connection;
pub mod controller;
pub mod data;
pub mod error;
pub mod events;
pub mod history;
pub mod market_worker;
pub mod mock;
pub mod news_worker;
pub mod parser;
pub mod scheduler;
pub mod session;
pub mod synthetic;

pub use cancel::{RunFlag, RunSignal};
pub use config::{MonitorConfig, MonitorConfigBuilder};
pub use connection::{ConnectionManager, NewsServiceCandidate, NewsStrategy, NewsStrategyKind};
pub use controller::MonitorController;
pub use data::*;
pub use error::*;
pub use events::{LogRenderer, RecordingRenderer, RenderDispatcher, Renderer};
pub use history::SlidingHistory;
pub use scheduler::{RefreshScheduler, TickReport};
pub use session::{Event, Message, Request, Session, Subscription};
pub use synthetic::{RandomWalk, SyntheticDataGenerator};

/// Prelude - the types needed to embed the monitor
///
/// Import with: `use commodity_monitor::prelude::*;`
pub mod prelude {
    pub use crate::config::MonitorConfig;
    pub use crate::controller::MonitorController;
    pub use crate::data::{ConnectionState, MonitorState, NewsLine, Snapshot, Statistics};
    pub use crate::error::MonitorError;
    pub use crate::events::{LogRenderer, Renderer};
    pub use crate::session::Session;
    pub use std::sync::Arc;
}

/// Install a fmt subscriber capped at `level`
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(level: tracing::Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
