// Append-only click event log with consumer-group semantics
//
// XADD with approximate trimming bounds the log; XREADGROUP delivers
// batches per consumer; unacknowledged entries idle past a threshold are
// reclaimed with XAUTOCLAIM. Poison messages move to a bounded DLQ stream.

use chrono::Utc;
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Value};
use tracing::{debug, warn};

use crate::domain::{PenshortError, Result};

use super::keys;
use super::RedisCache;

/// One entry read from the event log
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Stream entry id, e.g. `1700000000000-0`; the idempotency key
    pub id: String,
    /// Raw JSON payload as appended by the publisher
    pub payload: String,
}

#[derive(Clone)]
pub struct ClickStream {
    cache: RedisCache,
}

impl ClickStream {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Append a serialized payload; returns the assigned entry id
    pub async fn append(&self, payload: &str) -> Result<String> {
        let mut conn = self.cache.connection();
        let id: String = redis::cmd("XADD")
            .arg(keys::CLICK_STREAM)
            .arg("MAXLEN")
            .arg("~")
            .arg(keys::CLICK_STREAM_MAXLEN)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    /// Create the consumer group from the stream origin if absent
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.cache.connection();
        let created: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(keys::CLICK_STREAM)
            .arg(keys::CONSUMER_GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                debug!(group = keys::CONSUMER_GROUP, "consumer group created");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking batch read addressed to this consumer
    pub async fn read_batch(
        &self,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamMessage>> {
        let mut conn = self.cache.connection();
        let opts = StreamReadOptions::default()
            .group(keys::CONSUMER_GROUP, consumer)
            .count(count)
            .block(block_ms);

        let reply: StreamReadReply = conn
            .xread_options(&[keys::CLICK_STREAM], &[">"], &opts)
            .await?;

        let mut messages = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                match payload_field(&entry.map) {
                    Some(payload) => messages.push(StreamMessage {
                        id: entry.id.clone(),
                        payload,
                    }),
                    None => {
                        warn!(id = %entry.id, "stream entry missing payload field");
                        messages.push(StreamMessage {
                            id: entry.id.clone(),
                            payload: String::new(),
                        });
                    }
                }
            }
        }
        Ok(messages)
    }

    /// Claim entries pending for other consumers longer than `min_idle_ms`
    pub async fn auto_claim(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>> {
        let mut conn = self.cache.connection();
        let raw: Value = redis::cmd("XAUTOCLAIM")
            .arg(keys::CLICK_STREAM)
            .arg(keys::CONSUMER_GROUP)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // Reply is [next-cursor, entries, (deleted-ids on redis 7)]
        let items = match raw {
            Value::Bulk(items) if items.len() >= 2 => items,
            other => {
                return Err(PenshortError::internal(format!(
                    "unexpected XAUTOCLAIM reply: {:?}",
                    other
                )))
            }
        };

        let entries: StreamRangeReply = redis::from_redis_value(&items[1])?;
        let mut messages = Vec::new();
        for entry in entries.ids {
            messages.push(StreamMessage {
                id: entry.id.clone(),
                payload: payload_field(&entry.map).unwrap_or_default(),
            });
        }
        Ok(messages)
    }

    /// Acknowledge processed entries
    pub async fn ack(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.cache.connection();
        let _: i64 = conn
            .xack(keys::CLICK_STREAM, keys::CONSUMER_GROUP, ids)
            .await?;
        Ok(())
    }

    /// Quarantine a message that failed decode or validation
    pub async fn dead_letter(
        &self,
        original_id: &str,
        reason: &str,
        detail: &str,
        payload: &str,
    ) -> Result<()> {
        let mut conn = self.cache.connection();
        let _: String = redis::cmd("XADD")
            .arg(keys::CLICK_DLQ)
            .arg("MAXLEN")
            .arg("~")
            .arg(keys::CLICK_DLQ_MAXLEN)
            .arg("*")
            .arg("original_id")
            .arg(original_id)
            .arg("reason")
            .arg(reason)
            .arg("detail")
            .arg(detail)
            .arg("payload")
            .arg(payload)
            .arg("quarantined_at")
            .arg(Utc::now().to_rfc3339())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Current event-log length, sampled into the queue-depth gauge
    pub async fn depth(&self) -> Result<i64> {
        let mut conn = self.cache.connection();
        let len: i64 = conn.xlen(keys::CLICK_STREAM).await?;
        Ok(len)
    }
}

fn payload_field(map: &std::collections::HashMap<String, Value>) -> Option<String> {
    map.get("payload")
        .and_then(|v| redis::from_redis_value::<String>(v).ok())
}

/// Consumer names embed host, process, and a monotonic component so
/// concurrent workers never collide within the group
pub fn consumer_name(seq: u64) -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}-{}-{}", host, std::process::id(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_name_shape() {
        let name = consumer_name(3);
        let parts: Vec<&str> = name.rsplitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "3");
        assert!(parts[1].parse::<u32>().is_ok());
    }

    #[test]
    fn test_payload_field_extraction() {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "payload".to_string(),
            Value::Data(br#"{"short_code":"hello"}"#.to_vec()),
        );
        assert_eq!(
            payload_field(&map).as_deref(),
            Some(r#"{"short_code":"hello"}"#)
        );
        assert_eq!(payload_field(&std::collections::HashMap::new()), None);
    }
}
