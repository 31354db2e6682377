//! Session extractor: turns raw warehouse rows into the page hits of sessions
//! that cross between the primary host and a seed host.
//!
//! Per session, hits are ordered by hit number and renumbered 1..N. Hostnames
//! get a dense rank in reverse lexicographic order; walking the hits in order
//! and keeping a row only when its rank differs from the previous row's rank
//! yields the sequence of distinct domain visits. A session qualifies when
//! that sequence holds the primary host at least twice and any seed host at
//! least once.

use crate::config::ExtractConfig;
use crate::hit::{Hit, RawHit};
use crate::query::{QueryError, QueryJob, PAGE_HIT_TYPE};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

static QUERY_OR_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?#].*").unwrap());

/// Minimum visits to the primary host in the collapsed sequence.
const MIN_PRIMARY_VISITS: usize = 2;

/// Which sessions qualify and how their paths are normalized.
#[derive(Debug, Clone)]
pub struct ExtractParams {
    pub primary_host: String,
    pub seed_hosts: BTreeSet<String>,
    pub remove_query_parameters: bool,
    pub truncate_document_types: HashSet<String>,
}

impl ExtractParams {
    pub fn new(
        primary_host: impl Into<String>,
        seed_hosts: impl IntoIterator<Item = String>,
        remove_query_parameters: bool,
        truncate_document_types: impl IntoIterator<Item = String>,
    ) -> Result<Self, QueryError> {
        let seed_hosts: BTreeSet<String> = seed_hosts.into_iter().collect();
        if seed_hosts.is_empty() {
            return Err(QueryError::NoSeedHosts);
        }
        Ok(Self {
            primary_host: primary_host.into(),
            seed_hosts,
            remove_query_parameters,
            truncate_document_types: truncate_document_types.into_iter().collect(),
        })
    }

    /// Build from config; a non-empty `seed_hosts` override replaces the
    /// configured list.
    pub fn from_config(config: &ExtractConfig, seed_hosts: &[String]) -> Result<Self, QueryError> {
        let seeds = if seed_hosts.is_empty() {
            config.seed_hosts.clone()
        } else {
            seed_hosts.to_vec()
        };
        Self::new(
            config.primary_host.clone(),
            seeds,
            config.remove_query_parameters,
            config.truncate_document_types.iter().cloned(),
        )
    }

    /// Normalize a page path: drop query string and fragment, and collapse
    /// paths of truncated document types to their first segment.
    pub fn normalize_path(&self, page_path: &str, document_type: Option<&str>) -> String {
        let path = if self.remove_query_parameters {
            QUERY_OR_FRAGMENT.replace(page_path, "").into_owned()
        } else {
            page_path.to_string()
        };

        match document_type {
            Some(doc) if self.truncate_document_types.contains(doc) => first_segment(&path),
            _ => path,
        }
    }

    /// Whether a collapsed hostname sequence qualifies its session.
    pub fn qualifies(&self, collapsed: &[&str]) -> bool {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for host in collapsed {
            *counts.entry(*host).or_insert(0) += 1;
        }

        let primary = counts
            .get(self.primary_host.as_str())
            .copied()
            .unwrap_or(0);
        let seeds = self
            .seed_hosts
            .iter()
            .any(|seed| counts.get(seed.as_str()).copied().unwrap_or(0) >= 1);

        primary >= MIN_PRIMARY_VISITS && seeds
    }
}

/// `/a/b/c` -> `/a`. The root path and empty paths become `/`.
fn first_segment(path: &str) -> String {
    let segment = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    format!("/{segment}")
}

/// Collapse consecutive repeats in a hostname sequence.
///
/// Hostnames are dense-ranked in reverse lexicographic order; a row is
/// kept when its rank differs from the previous row's rank.
pub fn collapse_hosts<'a>(hostnames: &[&'a str]) -> Vec<&'a str> {
    let mut distinct: Vec<&str> = hostnames.to_vec();
    distinct.sort_unstable_by(|a, b| b.cmp(a));
    distinct.dedup();
    let ranks: HashMap<&str, usize> = distinct
        .iter()
        .enumerate()
        .map(|(rank, host)| (*host, rank + 1))
        .collect();

    let mut collapsed = Vec::new();
    let mut previous_rank = None;
    for host in hostnames {
        let rank = ranks.get(host).copied();
        if rank != previous_rank {
            collapsed.push(*host);
        }
        previous_rank = rank;
    }
    collapsed
}

/// Counts gathered while extracting, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub raw_rows: usize,
    pub page_rows: usize,
    pub sessions: usize,
    pub qualifying_sessions: usize,
}

/// Output of the extractor.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Hits of qualifying sessions, ordered by session id, hit number, client id.
    pub hits: Vec<Hit>,
    pub stats: ExtractStats,
}

/// Run the extractor over warehouse rows.
pub fn extract(raw: Vec<RawHit>, job: &QueryJob, params: &ExtractParams) -> Extraction {
    let mut stats = ExtractStats {
        raw_rows: raw.len(),
        ..Default::default()
    };

    let mut sessions: BTreeMap<String, Vec<RawHit>> = BTreeMap::new();
    for hit in raw {
        if hit.hit_type != PAGE_HIT_TYPE || job.is_excluded_path(&hit.page_path) {
            continue;
        }
        stats.page_rows += 1;
        sessions.entry(hit.session_id()).or_default().push(hit);
    }
    stats.sessions = sessions.len();

    let mut hits = Vec::new();
    for (session_id, mut session) in sessions {
        session.sort_by(|a, b| {
            a.hit_number
                .cmp(&b.hit_number)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });

        let hostnames: Vec<&str> = session.iter().map(|h| h.hostname.as_str()).collect();
        let collapsed = collapse_hosts(&hostnames);
        if !params.qualifies(&collapsed) {
            continue;
        }
        stats.qualifying_sessions += 1;

        hits.extend(session.into_iter().enumerate().map(|(i, raw)| Hit {
            session_id: session_id.clone(),
            timestamp: raw.timestamp(),
            page_path: params.normalize_path(&raw.page_path, raw.document_type.as_deref()),
            client_id: raw.client_id,
            hit_number: raw.hit_number,
            hostname: raw.hostname,
            row_number: (i + 1) as u32,
        }));
    }

    tracing::debug!(
        raw_rows = stats.raw_rows,
        page_rows = stats.page_rows,
        sessions = stats.sessions,
        qualifying = stats.qualifying_sessions,
        "extraction complete"
    );

    Extraction { hits, stats }
}
