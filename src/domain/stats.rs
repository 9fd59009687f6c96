// Daily pre-aggregated link statistics

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One row per (link, UTC date)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLinkStats {
    pub id: Uuid,
    pub link_id: Uuid,
    pub date: NaiveDate,

    pub total_clicks: i64,

    /// Distinct visitor digests observed; bounded overcount across batches
    pub unique_visitors: i64,

    /// referrer domain -> count
    pub referrers: HashMap<String, i64>,

    /// ISO 3166 alpha-2 -> count
    pub countries: HashMap<String, i64>,

    /// user-agent family -> count
    pub user_agents: HashMap<String, i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Increments to apply to one (link, date) row; built from a consumer batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsDelta {
    pub total_clicks: i64,
    pub unique_visitors: i64,
    pub referrers: HashMap<String, i64>,
    pub countries: HashMap<String, i64>,
    pub user_agents: HashMap<String, i64>,
}

impl StatsDelta {
    pub fn merge(&mut self, other: &StatsDelta) {
        self.total_clicks += other.total_clicks;
        self.unique_visitors += other.unique_visitors;
        for (k, v) in &other.referrers {
            *self.referrers.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.countries {
            *self.countries.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.user_agents {
            *self.user_agents.entry(k.clone()).or_insert(0) += v;
        }
    }
}

/// Registrable-domain-ish extraction used for the referrer breakdown key
pub fn referrer_domain(referrer: &str) -> String {
    if referrer.is_empty() {
        return "direct".to_string();
    }
    url::Url::parse(referrer)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Coarse user-agent family bucketing for the breakdown map
pub fn user_agent_family(user_agent: &str) -> String {
    let ua = user_agent.to_ascii_lowercase();
    let family = if ua.is_empty() {
        "unknown"
    } else if ua.contains("curl") {
        "curl"
    } else if ua.contains("wget") {
        "wget"
    } else if ua.contains("bot") || ua.contains("crawler") || ua.contains("spider") {
        "bot"
    } else if ua.contains("edg/") || ua.contains("edge") {
        "edge"
    } else if ua.contains("firefox") {
        "firefox"
    } else if ua.contains("chrome") {
        "chrome"
    } else if ua.contains("safari") {
        "safari"
    } else {
        "other"
    };
    family.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referrer_domain() {
        assert_eq!(referrer_domain("https://www.example.com/page"), "example.com");
        assert_eq!(referrer_domain("https://news.ycombinator.com/"), "news.ycombinator.com");
        assert_eq!(referrer_domain(""), "direct");
        assert_eq!(referrer_domain("garbage"), "unknown");
    }

    #[test]
    fn test_user_agent_family() {
        assert_eq!(user_agent_family("curl/8.4.0"), "curl");
        assert_eq!(
            user_agent_family("Mozilla/5.0 (X11; Linux) Gecko/20100101 Firefox/121.0"),
            "firefox"
        );
        assert_eq!(
            user_agent_family("Mozilla/5.0 AppleWebKit/537.36 Chrome/120.0 Safari/537.36"),
            "chrome"
        );
        assert_eq!(user_agent_family("Googlebot/2.1"), "bot");
        assert_eq!(user_agent_family(""), "unknown");
    }

    #[test]
    fn test_stats_delta_merge() {
        let mut a = StatsDelta {
            total_clicks: 2,
            unique_visitors: 1,
            referrers: HashMap::from([("example.com".to_string(), 2)]),
            countries: HashMap::from([("US".to_string(), 2)]),
            user_agents: HashMap::from([("chrome".to_string(), 2)]),
        };
        let b = StatsDelta {
            total_clicks: 3,
            unique_visitors: 2,
            referrers: HashMap::from([
                ("example.com".to_string(), 1),
                ("direct".to_string(), 2),
            ]),
            countries: HashMap::from([("DE".to_string(), 3)]),
            user_agents: HashMap::from([("chrome".to_string(), 3)]),
        };

        a.merge(&b);
        assert_eq!(a.total_clicks, 5);
        assert_eq!(a.unique_visitors, 3);
        assert_eq!(a.referrers["example.com"], 3);
        assert_eq!(a.referrers["direct"], 2);
        assert_eq!(a.countries["DE"], 3);
        assert_eq!(a.user_agents["chrome"], 5);
    }
}
