//! Vendor session capability
//!
//! The monitor never talks to a market-data vendor directly. It drives an
//! opaque [`Session`] that can be started, asked to open named services,
//! subscribed, polled for events with a bounded wait, sent requests and
//! stopped. Payloads arrive as loosely-typed element trees which the
//! [`parser`](crate::parser) module turns into typed values.

use crate::error::SessionError;
use serde_json::Value;
use std::time::Duration;

/// Blocking session capability exposed by a market-data vendor
///
/// Implementations must be safe to share between the connection manager and
/// one polling worker thread.
pub trait Session: Send + Sync {
    fn start(&self) -> Result<(), SessionError>;
    fn open_service(&self, name: &str) -> Result<(), SessionError>;
    fn subscribe(&self, subscription: &Subscription) -> Result<(), SessionError>;
    /// Waits at most `timeout`; returns [`Event::Timeout`] when nothing arrived
    fn next_event(&self, timeout: Duration) -> Result<Event, SessionError>;
    fn send_request(&self, request: &Request) -> Result<(), SessionError>;
    fn stop(&self) -> Result<(), SessionError>;
}

/// Event delivered by [`Session::next_event`]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SubscriptionData(Vec<Message>),
    PartialResponse(Vec<Message>),
    Response(Vec<Message>),
    /// Session or subscription status notifications
    Status(Vec<Message>),
    Timeout,
}

impl Event {
    pub fn messages(&self) -> &[Message] {
        match self {
            Event::SubscriptionData(m)
            | Event::PartialResponse(m)
            | Event::Response(m)
            | Event::Status(m) => m,
            Event::Timeout => &[],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::SubscriptionData(_) => "SUBSCRIPTION_DATA",
            Event::PartialResponse(_) => "PARTIAL_RESPONSE",
            Event::Response(_) => "RESPONSE",
            Event::Status(_) => "STATUS",
            Event::Timeout => "TIMEOUT",
        }
    }
}

/// One message inside an event
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_type: String,
    pub body: Value,
}

impl Message {
    pub fn new(message_type: &str, body: Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            body,
        }
    }

    pub fn has_element(&self, name: &str) -> bool {
        self.body.get(name).is_some()
    }

    pub fn element(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// Subscription to a topic for a set of fields
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub topic: String,
    pub fields: Vec<String>,
    /// Optional server-side filter (e.g. a keyword query)
    pub filter: Option<String>,
}

impl Subscription {
    pub fn new(topic: &str, fields: &[String]) -> Self {
        Self {
            topic: topic.to_string(),
            fields: fields.to_vec(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }
}

/// Request/response style call against an opened service
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub service: String,
    pub operation: String,
    pub securities: Vec<String>,
    pub fields: Vec<String>,
}

impl Request {
    pub fn reference_data(service: &str, security: &str, fields: &[String]) -> Self {
        Self {
            service: service.to_string(),
            operation: "ReferenceDataRequest".to_string(),
            securities: vec![security.to_string()],
            fields: fields.to_vec(),
        }
    }
}
