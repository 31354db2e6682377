//! Query parameters and SQL text for the session extractor.
//!
//! The warehouse stores one table per day. A `QueryJob` names the inclusive
//! day range and the page filter; the warehouse expands it over whichever
//! partitions exist in that range.

use chrono::NaiveDate;

/// Day-partition suffix format, e.g. `20220524`.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Columns read from every partition, in row order.
pub const HIT_COLUMNS: &[&str] = &[
    "full_visitor_id",
    "visit_id",
    "client_id",
    "visit_start_time",
    "hit_number",
    "hit_time",
    "hit_type",
    "page_path",
    "hostname",
    "document_type",
];

/// Hit type kept by the extractor.
pub const PAGE_HIT_TYPE: &str = "PAGE";

/// Errors raised while validating extractor parameters, before any
/// warehouse call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidDate { field: &'static str, value: String },
    ReversedRange { start: String, end: String },
    NoSeedHosts,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidDate { field, value } => {
                write!(f, "incorrect {field} format {value:?}, should be YYYYMMDD")
            }
            QueryError::ReversedRange { start, end } => {
                write!(f, "start_date {start} is after end_date {end}")
            }
            QueryError::NoSeedHosts => write!(f, "at least one seed host is required"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Parse `YYYYMMDD` start and end dates.
    pub fn parse(start: &str, end: &str) -> Result<Self, QueryError> {
        let start_date = parse_day(start, "start_date")?;
        let end_date = parse_day(end, "end_date")?;
        if start_date > end_date {
            return Err(QueryError::ReversedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start: start_date,
            end: end_date,
        })
    }

    pub fn start_suffix(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_suffix(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// Whether a partition suffix falls inside the range. Suffixes that are
    /// not valid dates never match.
    pub fn contains_suffix(&self, suffix: &str) -> bool {
        match NaiveDate::parse_from_str(suffix, DATE_FORMAT) {
            Ok(day) => suffix.len() == 8 && self.start <= day && day <= self.end,
            Err(_) => false,
        }
    }
}

/// Parse a single `YYYYMMDD` day.
pub fn parse_day(value: &str, field: &'static str) -> Result<NaiveDate, QueryError> {
    // chrono accepts unpadded fields; partitions are always 8 digits.
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QueryError::InvalidDate {
            field,
            value: value.to_string(),
        });
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| QueryError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// A parameterized extractor query.
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub range: DateRange,
    pub hit_type: String,
    pub excluded_path_prefixes: Vec<String>,
}

impl QueryJob {
    pub fn new(range: DateRange, excluded_path_prefixes: Vec<String>) -> Self {
        Self {
            range,
            hit_type: PAGE_HIT_TYPE.to_string(),
            excluded_path_prefixes,
        }
    }

    /// Build the SQL text over the given partition tables.
    ///
    /// Parameter `?1` is the hit type and `?2..` are the excluded path
    /// prefixes; every partition arm reuses the same numbered parameters.
    /// Prefixes are compared with `substr`, which is case-sensitive and
    /// treats `%` and `_` literally, matching `is_excluded_path`.
    pub fn sql(&self, tables: &[String]) -> String {
        let columns = HIT_COLUMNS.join(", ");
        let mut filter = "hit_type = ?1".to_string();
        for i in 0..self.excluded_path_prefixes.len() {
            let n = i + 2;
            filter.push_str(&format!(
                " AND substr(page_path, 1, length(?{n})) <> ?{n}"
            ));
        }

        tables
            .iter()
            .map(|table| {
                format!(
                    "SELECT {columns} FROM {} WHERE {filter}",
                    quote_identifier(table)
                )
            })
            .collect::<Vec<_>>()
            .join("\nUNION ALL\n")
    }

    /// Positional parameter values matching `sql()`.
    pub fn params(&self) -> Vec<String> {
        let mut params = vec![self.hit_type.clone()];
        params.extend(self.excluded_path_prefixes.iter().cloned());
        params
    }

    /// Whether a page path falls under one of the excluded prefixes.
    pub fn is_excluded_path(&self, page_path: &str) -> bool {
        self.excluded_path_prefixes
            .iter()
            .any(|prefix| page_path.starts_with(prefix.as_str()))
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
