//! Read-only reductions over extracted hits.
//!
//! Every table counts distinct sessions (or distinct pages) per key and is
//! sorted by count descending. Ties fall back to ascending key order.

use crate::hit::Hit;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostCount {
    pub hostname: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCount {
    pub page_path: String,
    pub hostname: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneyCount {
    pub journey: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostPages {
    pub hostname: String,
    pub pages: usize,
}

/// Sessions moving from one page to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionCount {
    pub source: String,
    pub destination: String,
    pub sessions: usize,
}

/// Pages of a single host, ranked on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostBreakdown {
    pub hostname: String,
    pub pages: Vec<PageCount>,
}

/// All reductions for one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub sessions: usize,
    pub hits: usize,
    pub sessions_by_host: Vec<HostCount>,
    pub sessions_by_page: Vec<PageCount>,
    pub journeys: Vec<JourneyCount>,
    pub pages_per_host: Vec<HostPages>,
    pub transitions: Vec<TransitionCount>,
    pub hosts: Vec<HostBreakdown>,
}

impl Report {
    pub fn build(hits: &[Hit]) -> Self {
        let sessions_by_host = sessions_by_host(hits);
        let hosts = sessions_by_host
            .iter()
            .map(|h| HostBreakdown {
                hostname: h.hostname.clone(),
                pages: top_pages_for_host(hits, &h.hostname),
            })
            .collect();

        Self {
            sessions: distinct_sessions(hits),
            hits: hits.len(),
            sessions_by_host,
            sessions_by_page: sessions_by_page(hits),
            journeys: journeys(hits),
            pages_per_host: pages_per_host(hits),
            transitions: transitions(hits),
            hosts,
        }
    }
}

/// Sort `(key, distinct members)` pairs by member count descending.
/// Input comes from a BTreeMap, so the stable sort leaves ties in key order.
fn rank<K, V>(groups: BTreeMap<K, BTreeSet<V>>) -> Vec<(K, usize)> {
    let mut ranked: Vec<(K, usize)> = groups
        .into_iter()
        .map(|(key, members)| (key, members.len()))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

pub fn distinct_sessions(hits: &[Hit]) -> usize {
    hits.iter()
        .map(|h| h.session_id.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn sessions_by_host(hits: &[Hit]) -> Vec<HostCount> {
    let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for hit in hits {
        groups
            .entry(&hit.hostname)
            .or_default()
            .insert(&hit.session_id);
    }
    rank(groups)
        .into_iter()
        .map(|(hostname, sessions)| HostCount {
            hostname: hostname.to_string(),
            sessions,
        })
        .collect()
}

pub fn sessions_by_page(hits: &[Hit]) -> Vec<PageCount> {
    page_counts(hits.iter())
}

/// Pages of `hostname` only, ranked by distinct sessions.
pub fn top_pages_for_host(hits: &[Hit], hostname: &str) -> Vec<PageCount> {
    page_counts(hits.iter().filter(|h| h.hostname == hostname))
}

fn page_counts<'a>(hits: impl Iterator<Item = &'a Hit>) -> Vec<PageCount> {
    let mut groups: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
    for hit in hits {
        groups
            .entry((hit.page_path.as_str(), hit.hostname.as_str()))
            .or_default()
            .insert(&hit.session_id);
    }
    rank(groups)
        .into_iter()
        .map(|((page_path, hostname), sessions)| PageCount {
            page_path: page_path.to_string(),
            hostname: hostname.to_string(),
            sessions,
        })
        .collect()
}

/// Hits grouped by session, each group in row order.
fn by_session(hits: &[Hit]) -> BTreeMap<&str, Vec<&Hit>> {
    let mut sessions: BTreeMap<&str, Vec<&Hit>> = BTreeMap::new();
    for hit in hits {
        sessions.entry(&hit.session_id).or_default().push(hit);
    }
    for session in sessions.values_mut() {
        session.sort_by_key(|h| h.row_number);
    }
    sessions
}

/// Sessions per journey: the comma-joined page paths of a session.
pub fn journeys(hits: &[Hit]) -> Vec<JourneyCount> {
    let mut groups: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for (session_id, session) in by_session(hits) {
        let journey = session
            .iter()
            .map(|h| h.page_path.as_str())
            .collect::<Vec<_>>()
            .join(",");
        groups.entry(journey).or_default().insert(session_id);
    }
    rank(groups)
        .into_iter()
        .map(|(journey, sessions)| JourneyCount { journey, sessions })
        .collect()
}

pub fn pages_per_host(hits: &[Hit]) -> Vec<HostPages> {
    let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for hit in hits {
        groups
            .entry(&hit.hostname)
            .or_default()
            .insert(&hit.page_path);
    }
    rank(groups)
        .into_iter()
        .map(|(hostname, pages)| HostPages {
            hostname: hostname.to_string(),
            pages,
        })
        .collect()
}

/// Page-to-page moves within sessions. The last hit of a session has no
/// outgoing edge.
pub fn transitions(hits: &[Hit]) -> Vec<TransitionCount> {
    let mut groups: BTreeMap<(String, String), BTreeSet<&str>> = BTreeMap::new();
    for (session_id, session) in by_session(hits) {
        for pair in session.windows(2) {
            groups
                .entry((pair[0].url(), pair[1].url()))
                .or_default()
                .insert(session_id);
        }
    }
    rank(groups)
        .into_iter()
        .map(|((source, destination), sessions)| TransitionCount {
            source,
            destination,
            sessions,
        })
        .collect()
}
