//! Scripted in-memory session
//!
//! Replays a queue of events and records every call made against it, so the
//! connection cascade, the workers and the controller can be exercised
//! without a vendor library.

use crate::error::SessionError;
use crate::session::{Event, Request, Session, Subscription};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct ScriptState {
    started: bool,
    stopped: bool,
    opened: Vec<String>,
    subscriptions: Vec<Subscription>,
    requests: Vec<Request>,
    events: VecDeque<Result<Event, SessionError>>,
    start_calls: u32,
    stop_calls: u32,
}

/// Session double driven by a script
#[derive(Debug)]
pub struct ScriptedSession {
    accept_start: bool,
    start_delay: Option<Duration>,
    available_services: HashSet<String>,
    stop_error: Option<SessionError>,
    responses: Vec<Event>,
    state: Mutex<ScriptState>,
}

impl ScriptedSession {
    /// Session that starts and exposes the given services
    pub fn new(services: &[&str]) -> Self {
        Self {
            accept_start: true,
            start_delay: None,
            available_services: services.iter().map(|s| s.to_string()).collect(),
            stop_error: None,
            responses: Vec::new(),
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Session whose `start` is refused
    pub fn refusing() -> Self {
        Self {
            accept_start: false,
            ..Self::new(&[])
        }
    }

    /// Block inside `start` for `delay`
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Fail every `stop` call with `error`
    pub fn with_stop_error(mut self, error: SessionError) -> Self {
        self.stop_error = Some(error);
        self
    }

    /// Events queued after every `send_request`
    pub fn with_responses(mut self, responses: Vec<Event>) -> Self {
        self.responses = responses;
        self
    }

    /// Append an event to the replay queue
    pub fn push_event(&self, event: Event) {
        self.lock().events.push_back(Ok(event));
    }

    /// Append a session-level failure to the replay queue
    pub fn push_error(&self, error: SessionError) {
        self.lock().events.push_back(Err(error));
    }

    pub fn start_calls(&self) -> u32 {
        self.lock().start_calls
    }

    pub fn stop_calls(&self) -> u32 {
        self.lock().stop_calls
    }

    pub fn opened_services(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Session for ScriptedSession {
    fn start(&self) -> Result<(), SessionError> {
        if let Some(delay) = self.start_delay {
            std::thread::sleep(delay);
        }
        let mut state = self.lock();
        state.start_calls += 1;
        if !self.accept_start {
            return Err(SessionError::Refused("scripted refusal".to_string()));
        }
        state.started = true;
        state.stopped = false;
        Ok(())
    }

    fn open_service(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.lock();
        if !state.started {
            return Err(SessionError::Closed);
        }
        if !self.available_services.contains(name) {
            return Err(SessionError::ServiceUnavailable(name.to_string()));
        }
        state.opened.push(name.to_string());
        Ok(())
    }

    fn subscribe(&self, subscription: &Subscription) -> Result<(), SessionError> {
        let mut state = self.lock();
        if !state.started || state.stopped {
            return Err(SessionError::Closed);
        }
        state.subscriptions.push(subscription.clone());
        Ok(())
    }

    fn next_event(&self, timeout: Duration) -> Result<Event, SessionError> {
        {
            let mut state = self.lock();
            if state.stopped {
                return Err(SessionError::Closed);
            }
            if let Some(next) = state.events.pop_front() {
                return next;
            }
        }
        std::thread::sleep(timeout);
        Ok(Event::Timeout)
    }

    fn send_request(&self, request: &Request) -> Result<(), SessionError> {
        let mut state = self.lock();
        if !state.started || state.stopped {
            return Err(SessionError::Closed);
        }
        state.requests.push(request.clone());
        for response in &self.responses {
            state.events.push_back(Ok(response.clone()));
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        state.stop_calls += 1;
        state.stopped = true;
        match &self.stop_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_session_requires_start() {
        let session = ScriptedSession::new(&["//blp/mktdata"]);
        assert!(session.open_service("//blp/mktdata").is_err());

        session.start().expect("scripted session should start");
        session.open_service("//blp/mktdata").expect("service is available");
        assert!(session.open_service("//blp/news").is_err());
        assert_eq!(session.opened_services(), vec!["//blp/mktdata".to_string()]);
    }

    #[test]
    fn test_scripted_session_replays_then_times_out() {
        let session = ScriptedSession::new(&[]);
        session.start().unwrap();
        session.push_event(Event::Status(Vec::new()));

        assert_eq!(session.next_event(Duration::from_millis(1)).unwrap(), Event::Status(Vec::new()));
        assert_eq!(session.next_event(Duration::from_millis(1)).unwrap(), Event::Timeout);

        session.stop().unwrap();
        assert_eq!(session.next_event(Duration::from_millis(1)), Err(SessionError::Closed));
    }
}
