use super::{DryRun, Warehouse, WarehouseError};
use crate::hit::RawHit;
use crate::query::{quote_identifier, DateRange, QueryJob, DATE_FORMAT};
use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use std::path::Path;

/// Width charged per integer column per row in a dry run.
const INTEGER_COLUMN_BYTES: u64 = 8;

/// Partitions per `UNION ALL` statement. SQLite rejects compound selects
/// with more than 500 terms.
const PARTITIONS_PER_STATEMENT: usize = 100;

/// Warehouse backed by a local SQLite file with one table per day.
pub struct SqliteWarehouse {
    conn: Connection,
    table_prefix: String,
}

impl SqliteWarehouse {
    /// Opens (or creates) the warehouse file at the given path.
    pub fn open(path: &Path, table_prefix: &str) -> Result<Self, WarehouseError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self {
            conn,
            table_prefix: table_prefix.to_string(),
        })
    }

    /// Table name for a day partition.
    pub fn partition_name(&self, day: NaiveDate) -> String {
        format!("{}{}", self.table_prefix, day.format(DATE_FORMAT))
    }

    /// Existing partitions whose day falls inside `range`, in date order.
    pub fn partitions(&self, range: &DateRange) -> Result<Vec<String>, WarehouseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(names
            .into_iter()
            .filter(|name| {
                name.strip_prefix(self.table_prefix.as_str())
                    .is_some_and(|suffix| range.contains_suffix(suffix))
            })
            .collect())
    }

    /// Create the partition table for `day` if it doesn't exist yet.
    pub fn ensure_partition(&self, day: NaiveDate) -> Result<String, WarehouseError> {
        let table = self.partition_name(day);
        if table.contains('"') {
            return Err(WarehouseError::InvalidPartition(table));
        }
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                full_visitor_id  TEXT NOT NULL,
                visit_id         INTEGER NOT NULL,
                client_id        TEXT NOT NULL,
                visit_start_time INTEGER NOT NULL,
                hit_number       INTEGER NOT NULL,
                hit_time         INTEGER NOT NULL,
                hit_type         TEXT NOT NULL,
                page_path        TEXT NOT NULL,
                hostname         TEXT NOT NULL,
                document_type    TEXT
            );",
            quote_identifier(&table)
        ))?;
        Ok(table)
    }

    /// Append hits to the `day` partition in one transaction.
    /// Returns the number of rows written.
    pub fn insert_hits(&mut self, day: NaiveDate, hits: &[RawHit]) -> Result<usize, WarehouseError> {
        let table = self.ensure_partition(day)?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (full_visitor_id, visit_id, client_id, visit_start_time,
                    hit_number, hit_time, hit_type, page_path, hostname, document_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                quote_identifier(&table)
            ))?;
            for hit in hits {
                stmt.execute(rusqlite::params![
                    hit.full_visitor_id,
                    hit.visit_id,
                    hit.client_id,
                    hit.visit_start_time,
                    hit.hit_number,
                    hit.hit_time,
                    hit.hit_type,
                    hit.page_path,
                    hit.hostname,
                    hit.document_type,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(table = %table, rows = hits.len(), "inserted hits");
        Ok(hits.len())
    }

    /// Bytes a full scan of the hit columns of `table` would read.
    ///
    /// Text columns count their UTF-8 length; integers count a fixed
    /// width. Filters don't reduce the estimate.
    fn scanned_bytes(&self, table: &str) -> Result<u64, WarehouseError> {
        let (rows, text_bytes): (i64, i64) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(
                    LENGTH(CAST(full_visitor_id AS BLOB)) +
                    LENGTH(CAST(client_id AS BLOB)) +
                    LENGTH(CAST(hit_type AS BLOB)) +
                    LENGTH(CAST(page_path AS BLOB)) +
                    LENGTH(CAST(hostname AS BLOB)) +
                    COALESCE(LENGTH(CAST(document_type AS BLOB)), 0)
                ), 0) FROM {}",
                quote_identifier(table)
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let integer_bytes = rows.max(0) as u64 * 4 * INTEGER_COLUMN_BYTES;
        Ok(text_bytes.max(0) as u64 + integer_bytes)
    }
}

impl Warehouse for SqliteWarehouse {
    fn dry_run(&self, job: &QueryJob) -> Result<DryRun, WarehouseError> {
        let partitions = self.partitions(&job.range)?;
        let mut total_bytes_processed = 0;
        for table in &partitions {
            total_bytes_processed += self.scanned_bytes(table)?;
        }
        tracing::debug!(
            partitions = partitions.len(),
            bytes = total_bytes_processed,
            "dry run complete"
        );
        Ok(DryRun {
            total_bytes_processed,
            partitions,
        })
    }

    fn run(&self, job: &QueryJob) -> Result<Vec<RawHit>, WarehouseError> {
        let partitions = self.partitions(&job.range)?;
        if partitions.is_empty() {
            tracing::warn!(
                start = %job.range.start_suffix(),
                end = %job.range.end_suffix(),
                "no partitions in range"
            );
            return Ok(Vec::new());
        }

        let params = job.params();
        let mut rows = Vec::new();
        for chunk in partitions.chunks(PARTITIONS_PER_STATEMENT) {
            let sql = job.sql(chunk);
            tracing::debug!(%sql, "running extractor query");
            let mut stmt = self.conn.prepare(&sql)?;
            let chunk_rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_raw_hit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.extend(chunk_rows);
        }
        tracing::debug!(
            partitions = partitions.len(),
            rows = rows.len(),
            "extractor query complete"
        );
        Ok(rows)
    }
}

fn map_raw_hit(row: &Row) -> rusqlite::Result<RawHit> {
    Ok(RawHit {
        full_visitor_id: row.get(0)?,
        visit_id: row.get(1)?,
        client_id: row.get(2)?,
        visit_start_time: row.get(3)?,
        hit_number: row.get(4)?,
        hit_time: row.get(5)?,
        hit_type: row.get(6)?,
        page_path: row.get(7)?,
        hostname: row.get(8)?,
        document_type: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_warehouse() -> (TempDir, SqliteWarehouse) {
        let dir = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&dir.path().join("warehouse.db"), "ga_sessions_").unwrap();
        (dir, wh)
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn hit(visitor: &str, n: i64, hit_type: &str, path: &str, host: &str) -> RawHit {
        RawHit {
            full_visitor_id: visitor.to_string(),
            visit_id: 1,
            client_id: format!("client-{visitor}"),
            visit_start_time: 1_653_350_400,
            hit_number: n,
            hit_time: n * 1000,
            hit_type: hit_type.to_string(),
            page_path: path.to_string(),
            hostname: host.to_string(),
            document_type: None,
        }
    }

    fn job(start: &str, end: &str) -> QueryJob {
        QueryJob::new(
            DateRange::parse(start, end).unwrap(),
            vec!["/print".to_string()],
        )
    }

    #[test]
    fn partitions_are_filtered_by_range() {
        let (_dir, wh) = test_warehouse();
        wh.ensure_partition(day("20220523")).unwrap();
        wh.ensure_partition(day("20220524")).unwrap();
        wh.ensure_partition(day("20220525")).unwrap();
        wh.conn
            .execute_batch("CREATE TABLE unrelated (x INTEGER);")
            .unwrap();

        let range = DateRange::parse("20220524", "20220530").unwrap();
        assert_eq!(
            wh.partitions(&range).unwrap(),
            vec!["ga_sessions_20220524", "ga_sessions_20220525"]
        );
    }

    #[test]
    fn run_filters_non_page_and_print_hits() {
        let (_dir, mut wh) = test_warehouse();
        wh.insert_hits(
            day("20220524"),
            &[
                hit("a", 1, "PAGE", "/", "www.gov.uk"),
                hit("a", 2, "EVENT", "/", "www.gov.uk"),
                hit("a", 3, "PAGE", "/print/guidance", "www.gov.uk"),
                hit("a", 4, "PAGE", "/sign-in", "account.gov.uk"),
            ],
        )
        .unwrap();

        let rows = wh.run(&job("20220524", "20220524")).unwrap();
        let numbers: Vec<i64> = rows.iter().map(|r| r.hit_number).collect();
        assert_eq!(rows.len(), 2);
        assert!(numbers.contains(&1));
        assert!(numbers.contains(&4));
    }

    #[test]
    fn run_excludes_prefixes_case_sensitively() {
        let (_dir, mut wh) = test_warehouse();
        wh.insert_hits(
            day("20220524"),
            &[
                hit("a", 1, "PAGE", "/", "www.gov.uk"),
                hit("a", 2, "PAGE", "/sign-in", "account.gov.uk"),
                hit("a", 3, "PAGE", "/Printing-guide", "www.gov.uk"),
                hit("a", 4, "PAGE", "/PRINT/form", "www.gov.uk"),
                hit("a", 5, "PAGE", "/print/x", "www.gov.uk"),
                hit("a", 6, "PAGE", "/print_x", "www.gov.uk"),
                hit("a", 7, "PAGE", "/prin", "www.gov.uk"),
            ],
        )
        .unwrap();

        let job = job("20220524", "20220524");
        let rows = wh.run(&job).unwrap();
        let mut paths: Vec<&str> = rows.iter().map(|r| r.page_path.as_str()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["/", "/PRINT/form", "/Printing-guide", "/prin", "/sign-in"]
        );
        assert!(rows.iter().all(|r| !job.is_excluded_path(&r.page_path)));
    }

    #[test]
    fn run_handles_more_partitions_than_one_compound_select() {
        let (_dir, mut wh) = test_warehouse();
        let first = day("20210101");
        for offset in 0..600 {
            let d = first + chrono::Days::new(offset);
            wh.insert_hits(d, &[hit(&offset.to_string(), 1, "PAGE", "/", "www.gov.uk")])
                .unwrap();
        }

        let job = job("20210101", "20220901");
        assert_eq!(wh.dry_run(&job).unwrap().partitions.len(), 600);
        let rows = wh.run(&job).unwrap();
        assert_eq!(rows.len(), 600);
    }

    #[test]
    fn run_spans_multiple_partitions() {
        let (_dir, mut wh) = test_warehouse();
        wh.insert_hits(day("20220524"), &[hit("a", 1, "PAGE", "/", "www.gov.uk")])
            .unwrap();
        wh.insert_hits(day("20220525"), &[hit("b", 1, "PAGE", "/", "www.gov.uk")])
            .unwrap();
        wh.insert_hits(day("20220526"), &[hit("c", 1, "PAGE", "/", "www.gov.uk")])
            .unwrap();

        let rows = wh.run(&job("20220524", "20220525")).unwrap();
        let mut visitors: Vec<&str> = rows.iter().map(|r| r.full_visitor_id.as_str()).collect();
        visitors.sort();
        assert_eq!(visitors, vec!["a", "b"]);
    }

    #[test]
    fn run_without_partitions_is_empty() {
        let (_dir, wh) = test_warehouse();
        assert!(wh.run(&job("20220524", "20220524")).unwrap().is_empty());
    }

    #[test]
    fn dry_run_counts_bytes_without_filters() {
        let (_dir, mut wh) = test_warehouse();
        let mut h = hit("ab", 1, "PAGE", "/x", "h");
        h.client_id = "c".to_string();
        h.document_type = Some("guide".to_string());
        wh.insert_hits(day("20220524"), &[h.clone()]).unwrap();

        let mut event = h;
        event.hit_type = "EVENT".to_string();
        event.document_type = None;
        wh.insert_hits(day("20220524"), &[event]).unwrap();

        let estimate = wh.dry_run(&job("20220524", "20220524")).unwrap();
        // row 1: 2 + 1 + 4 + 2 + 1 + 5 = 15 text bytes, row 2: 2 + 1 + 5 + 2 + 1 = 11
        assert_eq!(estimate.total_bytes_processed, 15 + 11 + 2 * 32);
        assert_eq!(estimate.partitions, vec!["ga_sessions_20220524"]);
    }

    #[test]
    fn dry_run_on_empty_range_is_zero() {
        let (_dir, wh) = test_warehouse();
        let estimate = wh.dry_run(&job("20220524", "20220524")).unwrap();
        assert_eq!(estimate, DryRun::default());
    }
}
