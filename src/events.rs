//! Renderer callbacks and dispatch
//!
//! Presentation is kept behind the [`Renderer`] trait. The refresh loop and
//! controller only talk to a [`RenderDispatcher`], which fans each update out
//! to every registered renderer and contains renderer panics.

use crate::data::{ConnectionState, NewsLine, Snapshot};
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for presentation callbacks
///
/// Called from the refresh loop, never from producer threads.
pub trait Renderer: Send + Sync {
    fn on_snapshot(&self, snapshot: &Snapshot);
    fn on_news(&self, line: &NewsLine);
    fn on_fault(&self, message: &str);
    fn on_connection_state(&self, state: &ConnectionState);
}

/// Renderer entry with unique ID for management
#[derive(Clone)]
struct RendererEntry {
    id: u64,
    renderer: Arc<dyn Renderer>,
}

#[derive(Default)]
struct Registry {
    entries: Vec<RendererEntry>,
    next_id: u64,
}

/// Fan-out to registered renderers
#[derive(Clone, Default)]
pub struct RenderDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl RenderDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a renderer, returning its id
    pub fn register(&self, renderer: Arc<dyn Renderer>) -> u64 {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push(RendererEntry { id, renderer });

        tracing::debug!("Registered renderer {}", id);
        id
    }

    /// Unregister a renderer by id
    pub fn unregister(&self, id: u64) -> bool {
        let mut registry = self.registry();
        let initial_len = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        let removed = registry.entries.len() < initial_len;

        if removed {
            tracing::debug!("Unregistered renderer {}", id);
        }
        removed
    }

    pub fn renderer_count(&self) -> usize {
        self.registry().entries.len()
    }

    pub fn dispatch_snapshot(&self, snapshot: &Snapshot) {
        self.dispatch("snapshot", |r| r.on_snapshot(snapshot));
    }

    pub fn dispatch_news(&self, line: &NewsLine) {
        self.dispatch("news", |r| r.on_news(line));
    }

    pub fn dispatch_fault(&self, message: &str) {
        self.dispatch("fault", |r| r.on_fault(message));
    }

    pub fn dispatch_connection_state(&self, state: &ConnectionState) {
        self.dispatch("connection state", |r| r.on_connection_state(state));
    }

    fn dispatch<F>(&self, what: &str, call: F)
    where
        F: Fn(&dyn Renderer),
    {
        // Snapshot the entries so a renderer may (un)register without deadlocking
        let entries = self.registry().entries.clone();

        for entry in &entries {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                call(entry.renderer.as_ref());
            }));
            if outcome.is_err() {
                tracing::error!("Renderer {} panicked while processing {}", entry.id, what);
            }
        }
    }
}

/// Renderer that writes every update to the log
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        match &snapshot.statistics {
            Some(stats) => tracing::info!(
                "{} ({}) high {:.2} low {:.2} over {} points",
                snapshot.latest_price_label(),
                stats.change_label(),
                stats.high,
                stats.low,
                stats.count
            ),
            None => tracing::info!("{}", snapshot.latest_price_label()),
        }
    }

    fn on_news(&self, line: &NewsLine) {
        tracing::info!("{}", line);
    }

    fn on_fault(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn on_connection_state(&self, state: &ConnectionState) {
        tracing::info!("Status: {}", state);
    }
}

/// Everything a [`RecordingRenderer`] has been shown
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub snapshots: Vec<Snapshot>,
    pub news: Vec<NewsLine>,
    pub faults: Vec<String>,
    pub states: Vec<ConnectionState>,
}

/// Renderer that keeps every update in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    recorded: Mutex<Recorded>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn snapshot(&self) -> Recorded {
        self.recorded().clone()
    }

    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.recorded().snapshots.last().cloned()
    }
}

impl Renderer for RecordingRenderer {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        self.recorded().snapshots.push(snapshot.clone());
    }

    fn on_news(&self, line: &NewsLine) {
        self.recorded().news.push(line.clone());
    }

    fn on_fault(&self, message: &str) {
        self.recorded().faults.push(message.to_string());
    }

    fn on_connection_state(&self, state: &ConnectionState) {
        self.recorded().states.push(state.clone());
    }
}
