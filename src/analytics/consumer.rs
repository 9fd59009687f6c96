// Batch consumer over the click event log
//
// At-least-once: a batch is acknowledged only after it persists. Poison
// messages (undecodable or invalid) are quarantined to the DLQ stream and
// acknowledged so they never wedge the group. Persistence failures back
// off and, when retries exhaust, leave the batch pending for re-read or
// auto-claim.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{stream::consumer_name, ClickStream, StreamMessage};
use crate::domain::{ClickEventPayload, Result};
use crate::storage::{ClickEventRepository, StatsRepository};

use super::aggregate::{build_deltas, build_events, ValidMessage};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub batch_size: usize,
    pub block: Duration,
    /// Entries pending for another consumer at least this long are claimed
    pub claim_min_idle: Duration,
    /// Auto-claim attempted at most this often
    pub claim_interval: Duration,
    /// Queue-depth gauge refresh cadence
    pub depth_interval: Duration,
    pub max_persist_attempts: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            block: Duration::from_secs(5),
            claim_min_idle: Duration::from_secs(30),
            claim_interval: Duration::from_secs(10),
            depth_interval: Duration::from_secs(10),
            max_persist_attempts: 3,
        }
    }
}

pub struct ClickConsumer {
    stream: ClickStream,
    clicks: std::sync::Arc<dyn ClickEventRepository>,
    stats: std::sync::Arc<dyn StatsRepository>,
    config: ConsumerConfig,
    consumer: String,
}

impl ClickConsumer {
    pub fn new(
        stream: ClickStream,
        clicks: std::sync::Arc<dyn ClickEventRepository>,
        stats: std::sync::Arc<dyn StatsRepository>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            stream,
            clicks,
            stats,
            config,
            consumer: consumer_name(0),
        }
    }

    /// Long-running loop. Returns after `shutdown` fires and the in-flight
    /// batch has been processed.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.stream.ensure_group().await?;
        info!(consumer = %self.consumer, "analytics consumer started");

        if let Ok(depth) = self.stream.depth().await {
            metrics::gauge!("analytics_queue_depth", depth as f64);
        }
        let mut last_claim = tokio::time::Instant::now();
        let mut last_depth = tokio::time::Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if last_depth.elapsed() >= self.config.depth_interval {
                if let Ok(depth) = self.stream.depth().await {
                    metrics::gauge!("analytics_queue_depth", depth as f64);
                }
                last_depth = tokio::time::Instant::now();
            }

            // Reclaim work stranded on dead consumers before reading new
            // entries
            let batch = if last_claim.elapsed() >= self.config.claim_interval {
                last_claim = tokio::time::Instant::now();
                let claimed = self
                    .stream
                    .auto_claim(
                        &self.consumer,
                        self.config.claim_min_idle.as_millis() as u64,
                        self.config.batch_size,
                    )
                    .await;
                match claimed {
                    Ok(messages) if !messages.is_empty() => {
                        info!(count = messages.len(), "claimed idle messages");
                        messages
                    }
                    Ok(_) => self.read_or_shutdown(&shutdown).await?,
                    Err(e) => {
                        warn!(error = %e, "auto-claim failed");
                        sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                }
            } else {
                self.read_or_shutdown(&shutdown).await?
            };

            if batch.is_empty() {
                continue;
            }

            // Draining: the in-flight batch still completes below
            self.process_batch(batch).await;
        }

        info!(consumer = %self.consumer, "analytics consumer drained");
        Ok(())
    }

    /// Blocking read that aborts promptly on shutdown
    async fn read_or_shutdown(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Vec<StreamMessage>> {
        tokio::select! {
            _ = shutdown.cancelled() => Ok(Vec::new()),
            read = self.stream.read_batch(
                &self.consumer,
                self.config.batch_size,
                self.config.block.as_millis() as usize,
            ) => {
                match read {
                    Ok(messages) => Ok(messages),
                    Err(e) => {
                        warn!(error = %e, "stream read failed");
                        sleep(Duration::from_secs(1)).await;
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    async fn process_batch(&self, batch: Vec<StreamMessage>) {
        let mut valid = Vec::with_capacity(batch.len());
        let mut poison_ids = Vec::new();

        for message in batch {
            match decode(&message) {
                Ok(payload) => valid.push(ValidMessage {
                    event_id: message.id,
                    payload,
                }),
                Err(reason) => {
                    warn!(id = %message.id, reason = %reason.0, "quarantining poison message");
                    if let Err(e) = self
                        .stream
                        .dead_letter(&message.id, reason.0, &reason.1, &message.payload)
                        .await
                    {
                        error!(id = %message.id, error = %e, "dead-letter write failed");
                        // Leave unacknowledged; it will be retried
                        continue;
                    }
                    metrics::counter!("analytics_events_dead_lettered_total", 1);
                    poison_ids.push(message.id);
                }
            }
        }

        // Quarantined messages are done regardless of how the rest fares
        if let Err(e) = self.stream.ack(&poison_ids).await {
            error!(error = %e, "ack of quarantined messages failed");
        }

        if valid.is_empty() {
            return;
        }

        if self.persist_with_retry(&valid).await {
            let ids: Vec<String> = valid.iter().map(|m| m.event_id.clone()).collect();
            match self.stream.ack(&ids).await {
                Ok(()) => {
                    metrics::counter!("analytics_events_persisted_total", ids.len() as u64);
                }
                Err(e) => {
                    // Persisted but unacked: the replay is absorbed by the
                    // idempotent insert
                    error!(error = %e, "batch ack failed");
                }
            }
        }
    }

    /// Exponential backoff (1, 2, 4s) around the two persistence steps.
    /// Returns false when attempts exhaust; the batch stays pending.
    async fn persist_with_retry(&self, batch: &[ValidMessage]) -> bool {
        let mut delay = Duration::from_secs(1);

        for attempt in 1..=self.config.max_persist_attempts {
            match self.persist(batch).await {
                Ok(inserted) => {
                    if inserted < batch.len() as u64 {
                        // Replayed delivery; conflicts were skipped
                        metrics::counter!(
                            "analytics_events_replayed_total",
                            batch.len() as u64 - inserted
                        );
                    }
                    return true;
                }
                Err(e) => {
                    error!(
                        attempt,
                        max_attempts = self.config.max_persist_attempts,
                        error = %e,
                        "batch persistence failed"
                    );
                    if attempt < self.config.max_persist_attempts {
                        sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        metrics::counter!("analytics_batches_abandoned_total", 1);
        false
    }

    async fn persist(&self, batch: &[ValidMessage]) -> Result<u64> {
        let events = build_events(batch);
        let inserted = self.clicks.bulk_insert(&events).await?;

        for ((link_id, date), delta) in build_deltas(batch) {
            self.stats.upsert_delta(link_id, date, &delta).await?;
        }

        Ok(inserted)
    }
}

/// (reason, detail) tuple quarantined alongside the payload
struct PoisonReason(&'static str, String);

fn decode(message: &StreamMessage) -> std::result::Result<ClickEventPayload, PoisonReason> {
    let payload: ClickEventPayload = serde_json::from_str(&message.payload)
        .map_err(|e| PoisonReason("decode_error", e.to_string()))?;
    payload
        .validate()
        .map_err(|e| PoisonReason("validation_error", e.to_string()))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(payload: &str) -> StreamMessage {
        StreamMessage {
            id: "1-0".into(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_decode_valid_payload() {
        let payload = ClickEventPayload {
            short_code: "hello".into(),
            link_id: Uuid::now_v7(),
            referrer: String::new(),
            user_agent: "curl/8".into(),
            visitor_hash: "0123456789abcdef".into(),
            country_code: None,
            clicked_at_ms: Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(decode(&message(&json)).is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(&message("not json")).err().unwrap();
        assert_eq!(err.0, "decode_error");
    }

    #[test]
    fn test_decode_rejects_invalid_fields() {
        let payload = ClickEventPayload {
            short_code: "x".into(), // below the 3-char floor
            link_id: Uuid::now_v7(),
            referrer: String::new(),
            user_agent: String::new(),
            visitor_hash: "0123456789abcdef".into(),
            country_code: None,
            clicked_at_ms: Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let err = decode(&message(&json)).err().unwrap();
        assert_eq!(err.0, "validation_error");
    }
}
