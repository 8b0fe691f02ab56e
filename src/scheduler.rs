//! The single consumer of both producer queues
//!
//! On every tick the scheduler drains whatever is queued without waiting,
//! folds observations into the [`SlidingHistory`], forwards news in arrival
//! order and pushes a fresh [`Snapshot`] to the renderers.

use crate::{
    cancel::RunSignal,
    data::{NewsLine, QueueMessage, Snapshot},
    events::RenderDispatcher,
    history::SlidingHistory,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

/// What one refresh tick consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub observations: usize,
    pub news: usize,
    pub faults: usize,
    pub snapshot_sent: bool,
}

pub struct RefreshScheduler {
    history: SlidingHistory,
    price_receiver: UnboundedReceiver<QueueMessage>,
    news_receiver: UnboundedReceiver<NewsLine>,
    dispatcher: RenderDispatcher,
}

impl RefreshScheduler {
    pub fn new(
        history: SlidingHistory,
        price_receiver: UnboundedReceiver<QueueMessage>,
        news_receiver: UnboundedReceiver<NewsLine>,
        dispatcher: RenderDispatcher,
    ) -> Self {
        Self {
            history,
            price_receiver,
            news_receiver,
            dispatcher,
        }
    }

    pub fn history(&self) -> &SlidingHistory {
        &self.history
    }

    /// Drain both queues and refresh the renderers once
    ///
    /// Only the first fault of a batch reaches the renderers; the rest are
    /// logged.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        while let Ok(message) = self.price_receiver.try_recv() {
            match message {
                QueueMessage::Observation(observation) => {
                    self.history.append(observation);
                    report.observations += 1;
                }
                QueueMessage::Fault(message) => {
                    if report.faults == 0 {
                        self.dispatcher.dispatch_fault(&message);
                    } else {
                        tracing::warn!("Additional fault in batch: {}", message);
                    }
                    report.faults += 1;
                }
            }
        }

        while let Ok(line) = self.news_receiver.try_recv() {
            self.dispatcher.dispatch_news(&line);
            report.news += 1;
        }

        if let Some(latest) = self.history.latest().copied() {
            let snapshot = Snapshot {
                history: self.history.to_vec(),
                latest,
                statistics: self.history.statistics(),
            };
            self.dispatcher.dispatch_snapshot(&snapshot);
            report.snapshot_sent = true;
        }

        report
    }

    /// Tick every `period` until the run signal clears
    pub async fn run(mut self, signal: RunSignal, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Refresh loop started ({:?})", period);
        loop {
            interval.tick().await;
            if !signal.is_running() {
                break;
            }
            let report = self.tick();
            tracing::trace!("Refresh tick {:?}", report);
        }
        tracing::info!("Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::RunFlag;
    use crate::data::PriceObservation;
    use crate::events::RecordingRenderer;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    fn scheduler() -> (
        RefreshScheduler,
        tokio::sync::mpsc::UnboundedSender<QueueMessage>,
        tokio::sync::mpsc::UnboundedSender<NewsLine>,
        Arc<RecordingRenderer>,
    ) {
        let (price_tx, price_rx) = unbounded_channel();
        let (news_tx, news_rx) = unbounded_channel();
        let dispatcher = RenderDispatcher::new();
        let recorder = Arc::new(RecordingRenderer::new());
        dispatcher.register(recorder.clone());
        let scheduler = RefreshScheduler::new(SlidingHistory::new(), price_rx, news_rx, dispatcher);
        (scheduler, price_tx, news_tx, recorder)
    }

    #[test]
    fn test_tick_drains_everything_queued() {
        let (mut scheduler, price_tx, news_tx, recorder) = scheduler();
        for price in [8500.0, 8520.0, 8480.0] {
            price_tx.send(QueueMessage::Observation(PriceObservation::now(price))).unwrap();
        }
        news_tx.send(NewsLine::new("first")).unwrap();
        news_tx.send(NewsLine::new("second")).unwrap();

        let report = scheduler.tick();
        assert_eq!(report.observations, 3);
        assert_eq!(report.news, 2);
        assert!(report.snapshot_sent);

        let recorded = recorder.snapshot();
        assert_eq!(recorded.news, vec![NewsLine::new("first"), NewsLine::new("second")]);
        let snapshot = recorder.last_snapshot().unwrap();
        assert_eq!(snapshot.history.len(), 3);
        assert_eq!(snapshot.latest_price(), 8480.0);
        let stats = snapshot.statistics.unwrap();
        assert_eq!(stats.high, 8520.0);
        assert_eq!(stats.low, 8480.0);
    }

    #[test]
    fn test_empty_tick_does_not_block_or_render() {
        let (mut scheduler, _price_tx, _news_tx, recorder) = scheduler();
        assert_eq!(scheduler.tick(), TickReport::default());
        assert!(recorder.snapshot().snapshots.is_empty());
    }

    #[test]
    fn test_only_first_fault_is_reported() {
        let (mut scheduler, price_tx, _news_tx, recorder) = scheduler();
        price_tx.send(QueueMessage::Fault("link down".into())).unwrap();
        price_tx.send(QueueMessage::Observation(PriceObservation::now(8500.0))).unwrap();
        price_tx.send(QueueMessage::Fault("still down".into())).unwrap();

        let report = scheduler.tick();
        assert_eq!(report.faults, 2);
        assert_eq!(recorder.snapshot().faults, vec!["link down".to_string()]);

        // Single observation: snapshot without statistics
        let snapshot = recorder.last_snapshot().unwrap();
        assert!(snapshot.statistics.is_none());
    }

    #[tokio::test]
    async fn test_run_exits_when_signal_clears() {
        let (scheduler, price_tx, _news_tx, recorder) = scheduler();
        price_tx.send(QueueMessage::Observation(PriceObservation::now(8500.0))).unwrap();

        let flag = RunFlag::new();
        let handle = tokio::spawn(scheduler.run(flag.signal(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.clear();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresh loop should exit")
            .unwrap();
        assert!(!recorder.snapshot().snapshots.is_empty());
    }
}
