//! News ingestion
//!
//! The strategy is fixed when the worker is built, from whatever the
//! connection cascade managed to open:
//!
//! - [`NewsStrategy::Headlines`]: a keyword-filtered subscription polled with
//!   a short timeout, producing `[HH:MM] source: headline` lines.
//! - [`NewsStrategy::ReferenceData`]: a reference-data request re-issued on a
//!   long interval, producing one status line per security.

use crate::{
    cancel::RunSignal,
    config::{InstrumentConfig, NewsConfig},
    connection::NewsStrategy,
    data::NewsLine,
    error::{ErrorReporter, FaultClass, SessionError},
    parser::{decode_news_message, decode_reference_message},
    session::{Event, Message, Request, Session, Subscription},
};
use chrono::Local;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Outcome of one reference-data request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A final response arrived
    Complete { lines: usize },
    /// The event budget ran out before a final response
    Exhausted { lines: usize },
}

pub struct NewsWorker {
    session: Weak<dyn Session>,
    strategy: NewsStrategy,
    security: String,
    config: NewsConfig,
    sender: UnboundedSender<NewsLine>,
    signal: RunSignal,
}

impl NewsWorker {
    pub fn new(
        session: Weak<dyn Session>,
        strategy: NewsStrategy,
        instrument: &InstrumentConfig,
        config: &NewsConfig,
        sender: UnboundedSender<NewsLine>,
        signal: RunSignal,
    ) -> Self {
        Self {
            session,
            strategy,
            security: instrument.security.clone(),
            config: config.clone(),
            sender,
            signal,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("news".to_string())
            .spawn(move || self.run())
    }

    pub fn run(self) {
        tracing::info!("News worker using {}", self.strategy.service());
        let result = match self.strategy.clone() {
            NewsStrategy::Headlines { keywords, .. } => self.run_headlines(&keywords),
            NewsStrategy::ReferenceData {
                service,
                fields,
                refresh_interval,
            } => self.run_reference_data(&service, &fields, refresh_interval),
        };

        if let Err(e) = result {
            if self.signal.is_running() {
                ErrorReporter::report(FaultClass::Streaming, "news", &e);
            }
        }
        tracing::info!("News worker stopped");
    }

    fn session(&self) -> Result<Arc<dyn Session>, SessionError> {
        self.session.upgrade().ok_or(SessionError::Closed)
    }

    fn run_headlines(&self, keywords: &[String]) -> Result<(), SessionError> {
        let filter = keywords.join(" OR ");
        let subscription = Subscription::new(self.strategy.service(), &[]).with_filter(&filter);
        self.session()?.subscribe(&subscription)?;
        tracing::info!("Subscribed to headlines matching {}", filter);

        while self.signal.is_running() {
            let event = self.session()?.next_event(self.config.poll_timeout)?;
            if let Event::SubscriptionData(messages) | Event::Response(messages) | Event::PartialResponse(messages) = event {
                for message in &messages {
                    let lines = decode_news_message(message, &self.config.default_source, Local::now());
                    if !self.push_all(lines) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn run_reference_data(
        &self,
        service: &str,
        fields: &[String],
        refresh_interval: Duration,
    ) -> Result<(), SessionError> {
        let request = Request::reference_data(service, &self.security, fields);

        while self.signal.is_running() {
            match self.fetch_reference_data(&request)? {
                FetchOutcome::Complete { lines } => {
                    tracing::info!("Reference data refreshed ({} lines)", lines);
                }
                FetchOutcome::Exhausted { lines } => {
                    tracing::warn!("Reference data response incomplete ({} lines)", lines);
                }
            }
            if !self.signal.sleep(refresh_interval) {
                break;
            }
        }
        Ok(())
    }

    /// Send one request and read a bounded number of events for its response
    pub fn fetch_reference_data(&self, request: &Request) -> Result<FetchOutcome, SessionError> {
        self.session()?.send_request(request)?;

        let mut lines = 0;
        for _ in 0..self.config.reference_max_events {
            if !self.signal.is_running() {
                break;
            }
            let event = self.session()?.next_event(self.config.reference_event_timeout)?;
            match event {
                Event::Response(messages) => {
                    lines += self.push_reference(&messages);
                    return Ok(FetchOutcome::Complete { lines });
                }
                Event::PartialResponse(messages) => {
                    lines += self.push_reference(&messages);
                }
                other => {
                    tracing::debug!("Waiting for reference data, got {}", other.kind());
                }
            }
        }
        Ok(FetchOutcome::Exhausted { lines })
    }

    fn push_reference(&self, messages: &[Message]) -> usize {
        let mut count = 0;
        for message in messages {
            let lines = decode_reference_message(message, Local::now());
            count += lines.len();
            self.push_all(lines);
        }
        count
    }

    /// Returns `false` once the consumer has gone away
    fn push_all(&self, lines: Vec<NewsLine>) -> bool {
        for line in lines {
            tracing::debug!("News: {}", line);
            if self.sender.send(line).is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{join_within, RunFlag};
    use crate::mock::ScriptedSession;
    use serde_json::json;

    fn config() -> NewsConfig {
        NewsConfig {
            poll_timeout: Duration::from_millis(5),
            reference_event_timeout: Duration::from_millis(5),
            ..NewsConfig::default()
        }
    }

    fn reference_response() -> Event {
        Event::Response(vec![Message::new(
            "ReferenceDataResponse",
            json!({"securityData": [{
                "security": "LMCADS03 Comdty",
                "fieldData": {"NAME": "LME COPPER 3MO ($)", "LAST_UPDATE_DT": "2024-01-01"},
                "fieldExceptions": [{"fieldId": "NEWS_COUNT"}]
            }]}),
        )])
    }

    #[test]
    fn test_reference_fetch_reads_response() {
        let session = Arc::new(ScriptedSession::new(&["//blp/refdata"]).with_responses(vec![reference_response()]));
        session.start().unwrap();
        let dyn_session: Arc<dyn Session> = session.clone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let flag = RunFlag::new();
        let strategy = NewsStrategy::ReferenceData {
            service: "//blp/refdata".into(),
            fields: config().reference_fields,
            refresh_interval: Duration::from_secs(300),
        };
        let worker = NewsWorker::new(
            Arc::downgrade(&dyn_session),
            strategy,
            &InstrumentConfig::default(),
            &config(),
            tx,
            flag.signal(),
        );

        let request = Request::reference_data("//blp/refdata", "LMCADS03 Comdty", &config().reference_fields);
        let outcome = worker.fetch_reference_data(&request).unwrap();
        assert_eq!(outcome, FetchOutcome::Complete { lines: 1 });

        let line = rx.try_recv().unwrap();
        assert!(line.as_str().ends_with("LMCADS03 Comdty: LME COPPER 3MO ($) | Last Update: 2024-01-01"));
        assert_eq!(session.requests()[0].fields.len(), 4);
    }

    #[test]
    fn test_reference_fetch_gives_up_after_budget() {
        let session = Arc::new(ScriptedSession::new(&["//blp/refdata"]));
        session.start().unwrap();
        let dyn_session: Arc<dyn Session> = session.clone();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let flag = RunFlag::new();
        let strategy = NewsStrategy::ReferenceData {
            service: "//blp/refdata".into(),
            fields: Vec::new(),
            refresh_interval: Duration::from_secs(300),
        };
        let worker = NewsWorker::new(
            Arc::downgrade(&dyn_session),
            strategy,
            &InstrumentConfig::default(),
            &config(),
            tx,
            flag.signal(),
        );

        let request = Request::reference_data("//blp/refdata", "LMCADS03 Comdty", &[]);
        assert_eq!(
            worker.fetch_reference_data(&request).unwrap(),
            FetchOutcome::Exhausted { lines: 0 }
        );
    }

    fn reference_worker(
        session: &Arc<dyn Session>,
        config: &NewsConfig,
        flag: &RunFlag,
    ) -> (NewsWorker, tokio::sync::mpsc::UnboundedReceiver<NewsLine>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let strategy = NewsStrategy::ReferenceData {
            service: "//blp/refdata".into(),
            fields: config.reference_fields.clone(),
            refresh_interval: config.reference_interval,
        };
        let worker = NewsWorker::new(
            Arc::downgrade(session),
            strategy,
            &InstrumentConfig::default(),
            config,
            tx,
            flag.signal(),
        );
        (worker, rx)
    }

    #[test]
    fn test_exits_during_reference_interval() {
        let session = Arc::new(ScriptedSession::new(&["//blp/refdata"]).with_responses(vec![reference_response()]));
        session.start().unwrap();
        let dyn_session: Arc<dyn Session> = session.clone();
        let flag = RunFlag::new();
        let (worker, mut rx) = reference_worker(&dyn_session, &NewsConfig::default(), &flag);
        let handle = worker.spawn().unwrap();

        // Response arrives at once; the worker is then inside its 300 s wait
        std::thread::sleep(Duration::from_millis(100));
        flag.clear();
        assert!(join_within(handle, Duration::from_millis(300)).is_some());
        assert!(rx.try_recv().is_ok());
        assert_eq!(session.requests().len(), 1);
    }

    #[test]
    fn test_exits_during_reference_fetch() {
        let event_timeout = Duration::from_millis(200);
        let session = Arc::new(ScriptedSession::new(&["//blp/refdata"]));
        session.start().unwrap();
        let dyn_session: Arc<dyn Session> = session.clone();
        let flag = RunFlag::new();
        let config = NewsConfig {
            reference_event_timeout: event_timeout,
            ..NewsConfig::default()
        };
        let (worker, _rx) = reference_worker(&dyn_session, &config, &flag);
        let handle = worker.spawn().unwrap();

        // Ten empty events would take 2 s; clearing ends the fetch after the current one
        std::thread::sleep(Duration::from_millis(50));
        flag.clear();
        assert!(join_within(handle, event_timeout + Duration::from_millis(300)).is_some());
    }

    #[test]
    fn test_exits_during_headline_poll() {
        let poll_timeout = Duration::from_millis(200);
        let session = Arc::new(ScriptedSession::new(&["//blp/news"]));
        session.start().unwrap();
        let dyn_session: Arc<dyn Session> = session.clone();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let flag = RunFlag::new();
        let config = NewsConfig {
            poll_timeout,
            ..NewsConfig::default()
        };
        let strategy = NewsStrategy::Headlines {
            service: "//blp/news".into(),
            keywords: config.keywords.clone(),
        };
        let handle = NewsWorker::new(
            Arc::downgrade(&dyn_session),
            strategy,
            &InstrumentConfig::default(),
            &config,
            tx,
            flag.signal(),
        )
        .spawn()
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        flag.clear();
        assert!(join_within(handle, poll_timeout + Duration::from_millis(300)).is_some());
    }

    #[test]
    fn test_headlines_skip_bad_items() {
        let session = Arc::new(ScriptedSession::new(&["//blp/news"]));
        session.start().unwrap();
        session.push_event(Event::SubscriptionData(vec![Message::new(
            "NewsEvent",
            json!({"newsItems": [
                {"headline": "Copper hits 3-month high", "source": "Reuters", "publishedDateTime": "2024-01-01T10:15:00Z"},
                {"headline": 42},
                "not an item",
                {"title": "Chile output slips", "provider": "Mining Weekly", "dateTime": "2024-01-01T11:00:00Z"}
            ]}),
        )]));
        session.push_error(SessionError::Transport("feed closed".into()));

        let dyn_session: Arc<dyn Session> = session.clone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let flag = RunFlag::new();
        let strategy = NewsStrategy::Headlines {
            service: "//blp/news".into(),
            keywords: vec!["copper".into(), "LME".into()],
        };
        NewsWorker::new(
            Arc::downgrade(&dyn_session),
            strategy,
            &InstrumentConfig::default(),
            &config(),
            tx,
            flag.signal(),
        )
        .run();

        assert_eq!(rx.try_recv().unwrap().as_str(), "[10:15] Reuters: Copper hits 3-month high");
        assert_eq!(rx.try_recv().unwrap().as_str(), "[11:00] Mining Weekly: Chile output slips");
        assert!(rx.try_recv().is_err());
        assert_eq!(session.subscriptions()[0].filter.as_deref(), Some("copper OR LME"));
    }
}
