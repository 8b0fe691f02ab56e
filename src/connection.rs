//! Session lifecycle management
//!
//! The [`ConnectionManager`] is the only owner of the vendor sessions. It
//! starts the market-data session, opens its service, and then walks an
//! ordered list of news-capable services, recording which retrieval strategy
//! (if any) the environment supports. Workers only ever receive weak handles.

use crate::{
    config::{ConnectionConfig, NewsConfig},
    data::ConnectionState,
    error::{ConnectionError, ErrorReporter, FaultClass, SessionError},
    session::Session,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

type PendingCall = JoinHandle<Result<(), SessionError>>;

/// How a candidate service is expected to deliver news
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsStrategyKind {
    /// Subscription returning true headlines
    Headlines,
    /// Periodic reference-data request returning status fields only
    ReferenceData,
}

/// One entry of the news-service cascade
#[derive(Debug, Clone, PartialEq)]
pub struct NewsServiceCandidate {
    pub service: String,
    pub kind: NewsStrategyKind,
}

impl NewsServiceCandidate {
    pub fn new(service: &str, kind: NewsStrategyKind) -> Self {
        Self {
            service: service.to_string(),
            kind,
        }
    }
}

/// News retrieval strategy selected by the cascade
#[derive(Debug, Clone, PartialEq)]
pub enum NewsStrategy {
    Headlines {
        service: String,
        keywords: Vec<String>,
    },
    ReferenceData {
        service: String,
        fields: Vec<String>,
        refresh_interval: Duration,
    },
}

impl NewsStrategy {
    fn from_candidate(candidate: &NewsServiceCandidate, news: &NewsConfig) -> Self {
        match candidate.kind {
            NewsStrategyKind::Headlines => NewsStrategy::Headlines {
                service: candidate.service.clone(),
                keywords: news.keywords.clone(),
            },
            NewsStrategyKind::ReferenceData => NewsStrategy::ReferenceData {
                service: candidate.service.clone(),
                fields: news.reference_fields.clone(),
                refresh_interval: news.reference_interval,
            },
        }
    }

    pub fn service(&self) -> &str {
        match self {
            NewsStrategy::Headlines { service, .. } | NewsStrategy::ReferenceData { service, .. } => service,
        }
    }
}

/// Connection manager for the market-data and news sessions
pub struct ConnectionManager {
    config: ConnectionConfig,
    news_config: NewsConfig,
    market_session: Option<Arc<dyn Session>>,
    news_session: Option<Arc<dyn Session>>,
    state: ConnectionState,
    news_strategy: Option<NewsStrategy>,
    market_started: bool,
    news_started: bool,
    /// Session starts that outlived their timeout and may still complete
    pending_starts: Vec<PendingCall>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        news_config: NewsConfig,
        market_session: Option<Arc<dyn Session>>,
        news_session: Option<Arc<dyn Session>>,
    ) -> Self {
        Self {
            config,
            news_config,
            market_session,
            news_session,
            state: ConnectionState::Disconnected,
            news_strategy: None,
            market_started: false,
            news_started: false,
            pending_starts: Vec::new(),
        }
    }

    /// Manager with no live source, for demo-only operation
    pub fn offline(config: ConnectionConfig, news_config: NewsConfig) -> Self {
        Self::new(config, news_config, None, None)
    }

    pub fn has_live_source(&self) -> bool {
        self.market_session.is_some()
    }

    /// Start the market-data session and run the news-service cascade
    ///
    /// Never returns an error: a failure is reflected in the returned
    /// [`ConnectionState::Error`] and the caller decides whether to fall back
    /// to synthetic data.
    pub async fn connect(&mut self) -> ConnectionState {
        self.news_strategy = None;

        match self.connect_market_data().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                tracing::info!(
                    "Market data service {} opened",
                    self.config.market_data_service
                );
                self.news_strategy = self.open_news_service().await;
            }
            Err(e) => {
                ErrorReporter::report(FaultClass::Connection, "connect", &e);
                self.state = ConnectionState::Error(e.to_string());
            }
        }

        self.state.clone()
    }

    async fn connect_market_data(&mut self) -> Result<(), ConnectionError> {
        let session = self.market_session.clone().ok_or(ConnectionError::NoSession)?;
        let timeout = self.config.attempt_timeout;

        let started = self.start_session(Arc::clone(&session), "session start").await;
        if !matches!(started, Err(BoundedError::Session(_))) {
            self.market_started = true;
        }
        started.map_err(|e| match e {
            BoundedError::Timeout(what) => ConnectionError::Timeout(what),
            BoundedError::Session(e) => ConnectionError::SessionStart(e.to_string()),
        })?;

        let service = self.config.market_data_service.clone();
        bounded(timeout, "market data service open", {
            let service = service.clone();
            move || session.open_service(&service)
        })
        .await
        .map_err(|e| match e {
            BoundedError::Timeout(what) => ConnectionError::Timeout(what),
            BoundedError::Session(e) => ConnectionError::ServiceOpen {
                service,
                reason: e.to_string(),
            },
        })
    }

    /// Try each candidate in order; the first service that opens wins
    async fn open_news_service(&mut self) -> Option<NewsStrategy> {
        let session = match &self.news_session {
            Some(session) => Arc::clone(session),
            None => {
                tracing::info!("No news session configured, news disabled");
                return None;
            }
        };
        let timeout = self.config.attempt_timeout;

        let started = self.start_session(Arc::clone(&session), "news session start").await;
        if !matches!(started, Err(BoundedError::Session(_))) {
            self.news_started = true;
        }
        if let Err(e) = started {
            ErrorReporter::report(FaultClass::Connection, "news session start", &e);
            return None;
        }

        for candidate in &self.config.news_services {
            let opened = bounded(timeout, "news service open", {
                let session = Arc::clone(&session);
                let service = candidate.service.clone();
                move || session.open_service(&service)
            })
            .await;

            match opened {
                Ok(()) => {
                    let strategy = NewsStrategy::from_candidate(candidate, &self.news_config);
                    tracing::info!("Opened news service {} ({:?})", candidate.service, candidate.kind);
                    return Some(strategy);
                }
                Err(e) => {
                    tracing::debug!("News service {} unavailable: {}", candidate.service, e);
                }
            }
        }

        tracing::warn!("No news service available");
        None
    }

    /// Bounded `start`; a start that times out is kept so `disconnect` can
    /// wait for it before stopping the session
    async fn start_session(&mut self, session: Arc<dyn Session>, what: &str) -> Result<(), BoundedError> {
        let mut call = tokio::task::spawn_blocking(move || session.start());
        let result = await_call(&mut call, self.config.attempt_timeout, what).await;
        if matches!(result, Err(BoundedError::Timeout(_))) {
            self.pending_starts.push(call);
        }
        result
    }

    /// Stop both sessions
    ///
    /// Idempotent. Teardown errors are logged and swallowed. A start that
    /// timed out during `connect` gets one more attempt window to finish so
    /// the stop that follows actually releases the session.
    pub async fn disconnect(&mut self) {
        let timeout = self.config.attempt_timeout;

        for mut call in self.pending_starts.drain(..) {
            if let Err(e) = await_call(&mut call, timeout, "late session start").await {
                tracing::debug!("Late session start did not complete cleanly: {}", e);
            }
        }

        if self.market_started {
            self.market_started = false;
            if let Some(session) = &self.market_session {
                stop_session(Arc::clone(session), timeout, "market data").await;
            }
        }
        if self.news_started {
            self.news_started = false;
            if let Some(session) = &self.news_session {
                stop_session(Arc::clone(session), timeout, "news").await;
            }
        }

        self.news_strategy = None;
        if self.state != ConnectionState::Disconnected {
            tracing::info!("Market data sessions released");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Record that the monitor is running on synthetic data
    pub fn enter_demo_mode(&mut self) {
        self.state = ConnectionState::DemoMode;
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.clone()
    }

    pub fn news_strategy(&self) -> Option<&NewsStrategy> {
        self.news_strategy.as_ref()
    }

    /// Non-owning handle for the market-data worker
    pub fn market_handle(&self) -> Option<Weak<dyn Session>> {
        self.market_session.as_ref().map(Arc::downgrade)
    }

    /// Non-owning handle for the news worker, only once a strategy exists
    pub fn news_handle(&self) -> Option<Weak<dyn Session>> {
        self.news_strategy.as_ref()?;
        self.news_session.as_ref().map(Arc::downgrade)
    }
}

async fn stop_session(session: Arc<dyn Session>, timeout: Duration, label: &str) {
    if let Err(e) = bounded(timeout, "session stop", move || session.stop()).await {
        ErrorReporter::report(FaultClass::Teardown, label, &e);
    }
}

#[derive(Debug)]
enum BoundedError {
    Timeout(String),
    Session(SessionError),
}

impl std::fmt::Display for BoundedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundedError::Timeout(what) => write!(f, "{}", what),
            BoundedError::Session(e) => write!(f, "{}", e),
        }
    }
}

/// Run a blocking session call on the blocking pool, giving up after `timeout`
///
/// A call that times out keeps running in the background; its result is
/// discarded.
async fn bounded<F>(timeout: Duration, what: &str, call: F) -> Result<(), BoundedError>
where
    F: FnOnce() -> Result<(), SessionError> + Send + 'static,
{
    let mut call = tokio::task::spawn_blocking(call);
    await_call(&mut call, timeout, what).await
}

/// Wait at most `timeout` for a blocking call without giving up its handle
async fn await_call(call: &mut PendingCall, timeout: Duration, what: &str) -> Result<(), BoundedError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result.map_err(BoundedError::Session),
        Ok(Err(join_error)) => Err(BoundedError::Session(SessionError::Transport(format!(
            "{} panicked: {}",
            what, join_error
        )))),
        Err(_) => Err(BoundedError::Timeout(format!("{} timed out after {:?}", what, timeout))),
    }
}
