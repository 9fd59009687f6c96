// Batch aggregation: stream messages -> click rows + daily stat deltas

use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::{
    referrer_domain, user_agent_family, ClickEvent, ClickEventPayload, StatsDelta,
};

/// A decoded, validated message ready to persist
#[derive(Debug, Clone)]
pub struct ValidMessage {
    pub event_id: String,
    pub payload: ClickEventPayload,
}

/// Build insertable click rows from a batch
pub fn build_events(batch: &[ValidMessage]) -> Vec<ClickEvent> {
    let now = Utc::now();
    batch
        .iter()
        .map(|msg| ClickEvent {
            id: Uuid::now_v7(),
            event_id: msg.event_id.clone(),
            short_code: msg.payload.short_code.clone(),
            link_id: msg.payload.link_id,
            referrer: msg.payload.referrer.clone(),
            user_agent: msg.payload.user_agent.clone(),
            visitor_hash: msg.payload.visitor_hash.clone(),
            country_code: msg.payload.country_code.clone(),
            clicked_at: msg.payload.clicked_at(),
            inserted_at: now,
        })
        .collect()
}

/// Fold a batch into per-(link, UTC date) deltas. Unique visitors are the
/// distinct digests observed within this batch for that date; merging with
/// the stored count accepts a bounded overcount across batches.
pub fn build_deltas(batch: &[ValidMessage]) -> HashMap<(Uuid, NaiveDate), StatsDelta> {
    let mut deltas: HashMap<(Uuid, NaiveDate), StatsDelta> = HashMap::new();
    let mut seen_visitors: HashMap<(Uuid, NaiveDate), HashSet<&str>> = HashMap::new();

    for msg in batch {
        let key = (msg.payload.link_id, msg.payload.clicked_date());
        let delta = deltas.entry(key).or_default();

        delta.total_clicks += 1;
        if seen_visitors
            .entry(key)
            .or_default()
            .insert(&msg.payload.visitor_hash)
        {
            delta.unique_visitors += 1;
        }

        *delta
            .referrers
            .entry(referrer_domain(&msg.payload.referrer))
            .or_insert(0) += 1;

        if let Some(cc) = &msg.payload.country_code {
            *delta.countries.entry(cc.to_ascii_uppercase()).or_insert(0) += 1;
        }

        *delta
            .user_agents
            .entry(user_agent_family(&msg.payload.user_agent))
            .or_insert(0) += 1;
    }

    deltas
}
