//! Live order feed over server-sent events.
//!
//! The engine's event hooks publish into a broadcast channel here, and each dashboard subscription drains it as an
//! SSE body. Subscribers get a snapshot event first, then incremental updates. Bursts of identical updates (the
//! synchronous callback and the webhook usually land within milliseconds of each other) are collapsed by a short
//! dedup window, and idle connections are kept open with comment heartbeats.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use actix_web::web::Bytes;
use futures::{Stream, StreamExt};
use log::*;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;
const DEDUP_WINDOW: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct FeedEvent {
    pub event: String,
    pub data: String,
    /// The grouping key a subscription can filter on: a store id for order events, a settings key for settings
    /// events. `None` means the event is relevant to every subscriber.
    pub scope: Option<String>,
}

impl FeedEvent {
    pub fn new<S: Into<String>>(event: S, data: &serde_json::Value) -> Self {
        Self { event: event.into(), data: data.to_string(), scope: None }
    }

    pub fn scoped<S: Into<String>, T: Into<String>>(event: S, data: &serde_json::Value, scope: T) -> Self {
        Self { event: event.into(), data: data.to_string(), scope: Some(scope.into()) }
    }

    fn matches(&self, filter: Option<&str>) -> bool {
        match (filter, &self.scope) {
            (Some(f), Some(s)) => f == s,
            _ => true,
        }
    }

    fn to_bytes(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, self.data))
    }
}

#[derive(Clone)]
pub struct OrderFeed {
    tx: broadcast::Sender<FeedEvent>,
    recent: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Default for OrderFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, recent: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishes an event to every open subscription. Events sharing a dedup `key` within the dedup window are
    /// collapsed into the first one.
    pub fn publish(&self, key: &str, event: FeedEvent) {
        {
            let mut recent = match self.recent.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            recent.retain(|_, t| now.duration_since(*t) < DEDUP_WINDOW);
            if recent.contains_key(key) {
                trace!("📡️ Suppressing duplicate feed event {key}");
                return;
            }
            recent.insert(key.to_string(), now);
        }
        if self.tx.receiver_count() > 0 {
            // send only errs when there are no receivers, which we just checked
            let _ = self.tx.send(event);
        }
    }

    /// Opens a subscription. The `snapshot` is delivered first, then live events as they are published. Events
    /// carrying a scope that does not match `filter` are skipped. The stream ends when the feed is dropped; slow
    /// consumers that lag the channel skip ahead rather than stall everyone.
    pub fn subscribe(
        &self,
        snapshot: FeedEvent,
        filter: Option<String>,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> {
        let rx = self.tx.subscribe();
        debug!("📡️ New feed subscription ({} active)", self.tx.receiver_count());
        let first = futures::stream::once(async move { Ok(snapshot.to_bytes()) });
        let rest = futures::stream::unfold((rx, filter), |(mut rx, filter)| async move {
            loop {
                match tokio::time::timeout(HEARTBEAT_INTERVAL, rx.recv()).await {
                    Ok(Ok(event)) => {
                        if !event.matches(filter.as_deref()) {
                            continue;
                        }
                        return Some((Ok(event.to_bytes()), (rx, filter)));
                    },
                    Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                        warn!("📡️ Feed subscriber lagged by {n} events. Skipping ahead.");
                        continue;
                    },
                    Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                    Err(_) => return Some((Ok(Bytes::from_static(b": keep-alive\n\n")), (rx, filter))),
                }
            }
        });
        first.chain(rest)
    }
}
