//! Top-level monitor state machine
//!
//! [`MonitorController`] switches between `Idle` and `Monitoring`. Starting
//! launches either the live workers or the synthetic generator (never both)
//! plus the refresh loop; stopping clears the shared run flag, aborts the
//! refresh loop and releases the sessions. Producer threads are not joined:
//! each exits on its own within one poll timeout of the flag clearing.

use crate::{
    cancel::RunFlag,
    config::MonitorConfig,
    connection::ConnectionManager,
    data::{ConnectionState, MonitorState, NewsLine, QueueMessage},
    error::MonitorError,
    events::{RenderDispatcher, Renderer},
    history::SlidingHistory,
    market_worker::MarketDataWorker,
    news_worker::NewsWorker,
    scheduler::RefreshScheduler,
    session::Session,
    synthetic::SyntheticDataGenerator,
};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

/// Producer-side ends of the two queues
struct Producers {
    prices: UnboundedSender<QueueMessage>,
    news: UnboundedSender<NewsLine>,
}

pub struct MonitorController {
    config: MonitorConfig,
    connection: ConnectionManager,
    dispatcher: RenderDispatcher,
    state: MonitorState,
    run_flag: Option<RunFlag>,
    refresh_task: Option<JoinHandle<()>>,
}

impl MonitorController {
    pub fn new(config: MonitorConfig, connection: ConnectionManager) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            connection,
            dispatcher: RenderDispatcher::new(),
            state: MonitorState::Idle,
            run_flag: None,
            refresh_task: None,
        })
    }

    /// Controller backed by live sessions
    ///
    /// Without a news session, live mode runs without news.
    pub fn with_sessions(
        config: MonitorConfig,
        market: Arc<dyn Session>,
        news: Option<Arc<dyn Session>>,
    ) -> Result<Self, MonitorError> {
        let connection = ConnectionManager::new(
            config.connection.clone(),
            config.news.clone(),
            Some(market),
            news,
        );
        Self::new(config, connection)
    }

    /// Controller with no live source; `start` always runs in demo mode
    pub fn offline(config: MonitorConfig) -> Result<Self, MonitorError> {
        let connection = ConnectionManager::offline(config.connection.clone(), config.news.clone());
        Self::new(config, connection)
    }

    pub fn register_renderer(&self, renderer: Arc<dyn Renderer>) -> u64 {
        self.dispatcher.register(renderer)
    }

    pub fn unregister_renderer(&self, id: u64) -> bool {
        self.dispatcher.unregister(id)
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_monitoring(&self) -> bool {
        self.state == MonitorState::Monitoring
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.connection_state()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Connect the live sessions ahead of `start`
    ///
    /// Returns the current state untouched while monitoring.
    pub async fn connect(&mut self) -> ConnectionState {
        if self.is_monitoring() {
            tracing::debug!("connect() ignored while monitoring");
            return self.connection_state();
        }
        let state = self.connection.connect().await;
        self.dispatcher.dispatch_connection_state(&state);
        state
    }

    /// Start monitoring, live if a connection exists or can be made
    ///
    /// Falls back to synthetic data when the live source is missing or fails
    /// to connect. A no-op while already monitoring.
    pub async fn start(&mut self) -> Result<ConnectionState, MonitorError> {
        if self.is_monitoring() {
            tracing::debug!("start() ignored, already monitoring");
            return Ok(self.connection_state());
        }

        if !self.connection.is_connected() && self.connection.has_live_source() {
            self.connect().await;
        }

        if self.connection.is_connected() {
            self.launch(Mode::Live)?;
        } else {
            self.launch(Mode::Demo)?;
        }
        Ok(self.connection_state())
    }

    /// Start monitoring on synthetic data regardless of the live source
    pub async fn start_demo(&mut self) -> Result<(), MonitorError> {
        if self.is_monitoring() {
            tracing::debug!("start_demo() ignored, already monitoring");
            return Ok(());
        }
        self.launch(Mode::Demo)
    }

    fn launch(&mut self, mode: Mode) -> Result<(), MonitorError> {
        let flag = RunFlag::new();
        let (price_tx, price_rx) = unbounded_channel();
        let (news_tx, news_rx) = unbounded_channel();
        let producers = Producers {
            prices: price_tx,
            news: news_tx,
        };

        let launched = match mode {
            Mode::Live => self.launch_live(&flag, producers),
            Mode::Demo => self.launch_demo(&flag, producers),
        };
        if let Err(e) = launched {
            flag.clear();
            return Err(e);
        }

        let scheduler = RefreshScheduler::new(
            SlidingHistory::with_capacity(self.config.refresh.history_capacity),
            price_rx,
            news_rx,
            self.dispatcher.clone(),
        );
        self.refresh_task = Some(tokio::spawn(
            scheduler.run(flag.signal(), self.config.refresh.period),
        ));
        self.run_flag = Some(flag);
        self.state = MonitorState::Monitoring;

        tracing::info!("Monitoring {} ({})", self.config.instrument.security, self.connection_state());
        Ok(())
    }

    fn launch_live(&mut self, flag: &RunFlag, producers: Producers) -> Result<(), MonitorError> {
        let market = self
            .connection
            .market_handle()
            .ok_or_else(|| MonitorError::Runtime("no market data session".to_string()))?;
        MarketDataWorker::new(market, &self.config.instrument, producers.prices, flag.signal())
            .spawn()
            .map_err(|e| MonitorError::Runtime(format!("failed to spawn market data worker: {}", e)))?;

        match (self.connection.news_strategy().cloned(), self.connection.news_handle()) {
            (Some(strategy), Some(news)) => {
                NewsWorker::new(
                    news,
                    strategy,
                    &self.config.instrument,
                    &self.config.news,
                    producers.news,
                    flag.signal(),
                )
                .spawn()
                .map_err(|e| MonitorError::Runtime(format!("failed to spawn news worker: {}", e)))?;
            }
            _ => tracing::info!("Running without news"),
        }
        Ok(())
    }

    fn launch_demo(&mut self, flag: &RunFlag, producers: Producers) -> Result<(), MonitorError> {
        SyntheticDataGenerator::new(&self.config.synthetic, producers.prices, producers.news, flag.signal())?
            .spawn()
            .map_err(|e| MonitorError::Runtime(format!("failed to spawn synthetic generator: {}", e)))?;

        self.connection.enter_demo_mode();
        self.dispatcher.dispatch_connection_state(&ConnectionState::DemoMode);
        Ok(())
    }

    /// Stop monitoring and release the sessions
    ///
    /// Returns without waiting for producer threads. A no-op while idle.
    pub async fn stop(&mut self) {
        if !self.is_monitoring() {
            tracing::debug!("stop() ignored, already idle");
            return;
        }

        if let Some(flag) = self.run_flag.take() {
            flag.clear();
        }
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        self.state = MonitorState::Idle;

        self.connection.disconnect().await;
        self.dispatcher.dispatch_connection_state(&self.connection.connection_state());
        tracing::info!("Monitoring stopped");
    }

    /// Final teardown before process exit
    pub async fn shutdown(&mut self) {
        self.stop().await;
        // A connection made with `connect()` but never started
        self.connection.disconnect().await;
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Live,
    Demo,
}
