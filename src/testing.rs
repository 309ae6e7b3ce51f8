//! Log capture for unit tests that assert on emitted warnings.

use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Records the target and level of every event it sees.
#[derive(Clone, Default)]
pub struct CapturedEvents(Arc<Mutex<Vec<(String, Level)>>>);

impl CapturedEvents {
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry().with(self.clone())
    }

    pub fn count(&self, target: &str, level: Level) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, l)| t == target && *l == level)
            .count()
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        self.0.lock().unwrap().push((meta.target().to_string(), *meta.level()));
    }
}
