//! Live price ingestion
//!
//! Runs on its own thread, subscribes to one instrument and turns every
//! decodable last-price update into a [`QueueMessage::Observation`]. Malformed
//! ticks are dropped; a session-level failure is reported once as
//! [`QueueMessage::Fault`] and ends the loop.

use crate::{
    cancel::RunSignal,
    config::InstrumentConfig,
    data::{PriceObservation, QueueMessage},
    error::{ErrorReporter, FaultClass},
    parser::decode_price,
    session::{Event, Message, Session, Subscription},
};
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

pub struct MarketDataWorker {
    session: Weak<dyn Session>,
    subscription: Subscription,
    price_field: String,
    poll_timeout: Duration,
    sender: UnboundedSender<QueueMessage>,
    signal: RunSignal,
}

impl MarketDataWorker {
    pub fn new(
        session: Weak<dyn Session>,
        instrument: &InstrumentConfig,
        sender: UnboundedSender<QueueMessage>,
        signal: RunSignal,
    ) -> Self {
        Self {
            session,
            subscription: Subscription::new(&instrument.security, &instrument.fields),
            price_field: instrument.price_field.clone(),
            poll_timeout: instrument.poll_timeout,
            sender,
            signal,
        }
    }

    /// Run the worker on a dedicated, detached thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("market-data".to_string())
            .spawn(move || self.run())
    }

    /// Subscribe and poll until the run signal clears or the session fails
    pub fn run(self) {
        if let Err(message) = self.subscribe() {
            self.report_fault(message);
            return;
        }
        tracing::info!("Subscribed to {} ({})", self.subscription.topic, self.subscription.fields.join(","));

        while self.signal.is_running() {
            let session = match self.session.upgrade() {
                Some(session) => session,
                None => break,
            };

            match session.next_event(self.poll_timeout) {
                Ok(Event::SubscriptionData(messages)) => {
                    for message in &messages {
                        if !self.handle_message(message) {
                            return;
                        }
                    }
                }
                Ok(Event::Timeout) => {}
                Ok(other) => {
                    tracing::debug!("Ignoring {} event on market data session", other.kind());
                }
                Err(e) => {
                    self.report_fault(format!("Market data error: {}", e));
                    break;
                }
            }
        }

        tracing::info!("Market data worker stopped");
    }

    fn subscribe(&self) -> Result<(), String> {
        let session = self
            .session
            .upgrade()
            .ok_or_else(|| "Market data session is no longer available".to_string())?;
        session
            .subscribe(&self.subscription)
            .map_err(|e| format!("Market data subscription failed: {}", e))
    }

    /// Returns `false` once the consumer has gone away
    fn handle_message(&self, message: &Message) -> bool {
        match decode_price(message, &self.price_field) {
            Ok(Some(price)) => {
                let observation = PriceObservation::now(price);
                tracing::debug!("Tick {}", observation);
                self.sender.send(QueueMessage::Observation(observation)).is_ok()
            }
            Ok(None) => true,
            Err(e) => {
                ErrorReporter::report(FaultClass::Decode, "market data tick", &e);
                true
            }
        }
    }

    /// A failure after shutdown began is the teardown itself, not a fault
    fn report_fault(&self, message: String) {
        if !self.signal.is_running() {
            tracing::debug!("Suppressed fault during shutdown: {}", message);
            return;
        }
        ErrorReporter::report(FaultClass::Streaming, "market data", &message);
        let _ = self.sender.send(QueueMessage::Fault(message));
    }
}
