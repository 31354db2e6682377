/// Hit records: the raw warehouse row and the normalized extractor output.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a day partition, as stored in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHit {
    pub full_visitor_id: String,
    pub visit_id: i64,
    pub client_id: String,
    /// Visit start, epoch seconds.
    pub visit_start_time: i64,
    pub hit_number: i64,
    /// Milliseconds since visit start.
    pub hit_time: i64,
    pub hit_type: String,
    pub page_path: String,
    pub hostname: String,
    #[serde(default)]
    pub document_type: Option<String>,
}

impl RawHit {
    /// `{full_visitor_id}-{visit_id}`.
    pub fn session_id(&self) -> String {
        format!("{}-{}", self.full_visitor_id, self.visit_id)
    }

    /// Absolute hit time. Out-of-range values fall back to the epoch.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.visit_start_time
            .checked_mul(1000)
            .and_then(|ms| ms.checked_add(self.hit_time))
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default()
    }
}

/// A normalized page hit belonging to a qualifying session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub session_id: String,
    pub client_id: String,
    pub hit_number: i64,
    pub timestamp: DateTime<Utc>,
    pub page_path: String,
    pub hostname: String,
    /// 1-based position within the session, ordered by `hit_number`.
    pub row_number: u32,
}

impl Hit {
    /// `https://{hostname}{page_path}`
    pub fn url(&self) -> String {
        format!("https://{}{}", self.hostname, self.page_path)
    }
}
