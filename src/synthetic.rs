//! Synthetic data generator used in demo mode
//!
//! A discrete Gaussian random walk: every tick adds `N(0, σ)` to the previous
//! price and the result becomes the base for the next tick (no mean
//! reversion). Each tick may also emit one canned headline. The generator
//! speaks the same queue protocol as the live workers, so the refresh loop
//! cannot tell the two apart.

use crate::{
    cancel::RunSignal,
    config::SyntheticConfig,
    data::{NewsLine, PriceObservation, QueueMessage},
    error::ConfigError,
};
use chrono::Local;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Canned headlines emitted in demo mode
pub const DEMO_HEADLINES: [&str; 5] = [
    "LME copper stocks rise 2% on increased supply",
    "China demand for copper shows signs of recovery",
    "Copper futures gain on supply concerns",
    "Mining strikes could impact copper production",
    "Copper demand expected to surge with green energy transition",
];

/// One step of the walk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkStep {
    pub price: f64,
    pub delta: f64,
    pub headline: Option<&'static str>,
}

/// Seedable Gaussian random walk
pub struct RandomWalk {
    price: f64,
    noise: Normal<f64>,
    news_probability: f64,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(config: &SyntheticConfig) -> Result<Self, ConfigError> {
        let noise = Normal::new(0.0, config.noise_std_dev)
            .map_err(|e| ConfigError::invalid("noise_std_dev", &e.to_string()))?;
        if !(0.0..=1.0).contains(&config.news_probability) {
            return Err(ConfigError::invalid("news_probability", "must be within 0..=1"));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            price: config.base_price,
            noise,
            news_probability: config.news_probability,
            rng,
        })
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn step(&mut self) -> WalkStep {
        let delta = self.noise.sample(&mut self.rng);
        self.price += delta;

        let headline = if self.rng.gen_bool(self.news_probability) {
            DEMO_HEADLINES.choose(&mut self.rng).copied()
        } else {
            None
        };

        WalkStep {
            price: self.price,
            delta,
            headline,
        }
    }
}

/// Background producer feeding the walk into the monitor queues
pub struct SyntheticDataGenerator {
    walk: RandomWalk,
    interval: Duration,
    price_sender: UnboundedSender<QueueMessage>,
    news_sender: UnboundedSender<NewsLine>,
    signal: RunSignal,
}

impl SyntheticDataGenerator {
    pub fn new(
        config: &SyntheticConfig,
        price_sender: UnboundedSender<QueueMessage>,
        news_sender: UnboundedSender<NewsLine>,
        signal: RunSignal,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            walk: RandomWalk::new(config)?,
            interval: config.interval,
            price_sender,
            news_sender,
            signal,
        })
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("synthetic".to_string())
            .spawn(move || self.run())
    }

    /// Emit one tick per interval until the run signal clears
    pub fn run(mut self) {
        tracing::info!(
            "Synthetic generator started at {:.2} (every {:?})",
            self.walk.price(),
            self.interval
        );

        while self.signal.is_running() {
            let step = self.walk.step();
            let observation = PriceObservation::now(step.price);
            if self.price_sender.send(QueueMessage::Observation(observation)).is_err() {
                break;
            }

            if let Some(headline) = step.headline {
                let line = NewsLine::new(format!(
                    "[{}] Demo: {}",
                    Local::now().format("%H:%M:%S"),
                    headline
                ));
                if self.news_sender.send(line).is_err() {
                    break;
                }
            }

            if !self.signal.sleep(self.interval) {
                break;
            }
        }

        tracing::info!("Synthetic generator stopped");
    }
}
