// Fire-and-forget click event publisher
//
// The redirect response never waits on analytics: the append is bounded to
// 100 ms and any failure drops the event behind a counter.

use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::cache::ClickStream;
use crate::domain::ClickEventPayload;

/// Hard bound on the event-log append
pub const PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct AnalyticsPublisher {
    stream: ClickStream,
}

impl AnalyticsPublisher {
    pub fn new(stream: ClickStream) -> Self {
        Self { stream }
    }

    /// Append a click event; returns the assigned event id, or `None` when
    /// the event was dropped. Never propagates failure to the caller.
    pub async fn publish(&self, payload: &ClickEventPayload) -> Option<String> {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "click payload serialization failed, dropping");
                metrics::counter!("analytics_events_dropped_total", 1);
                return None;
            }
        };

        match timeout(PUBLISH_TIMEOUT, self.stream.append(&json)).await {
            Ok(Ok(event_id)) => {
                metrics::counter!("analytics_events_published_total", 1);
                Some(event_id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "click event append failed, dropping");
                metrics::counter!("analytics_events_dropped_total", 1);
                None
            }
            Err(_) => {
                warn!("click event append timed out, dropping");
                metrics::counter!("analytics_events_dropped_total", 1);
                None
            }
        }
    }
}
