//! Sales readers - where poll cycles get today's sold lines from
//!
//! - `SqliteSalesReader` - queries the point-of-sale `sales` table
//! - `MockSalesReader` - generates occasional fake sales (mock mode)

use super::error::{AlertError, SourceError};
use super::types::{current_timestamp, RawRecord};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use rand::Rng;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source of sold lines for the current day
///
/// Implementations decide what "today" means and own any timeout policy.
/// A returned batch must be ordered the way the sales were recorded.
#[async_trait]
pub trait SalesReader: Send + Sync {
    /// Fetch every sold line recorded today
    async fn fetch_todays_records(&self) -> Result<Vec<RawRecord>, SourceError>;

    /// Reader name for logging
    fn source_name(&self) -> &'static str;
}

/// Reject anything that is not a plain SQL identifier
pub fn validate_table_name(table: &str) -> Result<(), AlertError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AlertError::ConfigurationInvalid(format!(
            "invalid table name '{}'",
            table
        )))
    }
}

/// Reader over the point-of-sale SQLite database
///
/// Opens a fresh read-only connection per fetch, so a database that was
/// unavailable on one tick is picked up again on the next.
#[derive(Debug, Clone)]
pub struct SqliteSalesReader {
    db_path: PathBuf,
    table: String,
}

impl SqliteSalesReader {
    pub fn new(db_path: impl AsRef<Path>, table: &str) -> Result<Self, AlertError> {
        validate_table_name(table)?;

        Ok(Self {
            db_path: db_path.as_ref().to_path_buf(),
            table: table.to_string(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Read all non-cancelled lines billed on `day`, in billing order
    pub fn read_records_for(&self, day: NaiveDate) -> Result<Vec<RawRecord>, SourceError> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let sql = format!(
            "SELECT CAST(BILLNO AS TEXT), CAST(ITEMID AS TEXT), QTY, BILLDATE, ENTRYORDER
             FROM {}
             WHERE date(BILLDATE) = ?1
               AND (Cancel IS NULL OR Cancel != 'Y')
             ORDER BY BILLDATE ASC, ENTRYORDER ASC",
            self.table
        );
        let mut stmt = conn.prepare(&sql)?;

        let day_str = day.format("%Y-%m-%d").to_string();
        let rows = stmt.query_map([day_str], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (bill_no, item_id, quantity, bill_date, line_seq) = row?;

            let bill_no = bill_no
                .ok_or_else(|| SourceError::InvalidRow("BILLNO is NULL".to_string()))?;
            let item_id = item_id.ok_or_else(|| {
                SourceError::InvalidRow(format!("ITEMID is NULL on bill {}", bill_no))
            })?;

            records.push(RawRecord {
                sold_at: parse_bill_date(&bill_date)?,
                quantity: quantity.unwrap_or(0.0),
                bill_no,
                item_id,
                line_seq,
            });
        }

        log::debug!("📥 Read {} sales rows for {}", records.len(), day);
        Ok(records)
    }
}

#[async_trait]
impl SalesReader for SqliteSalesReader {
    async fn fetch_todays_records(&self) -> Result<Vec<RawRecord>, SourceError> {
        let reader = self.clone();
        let today = Local::now().date_naive();

        tokio::task::spawn_blocking(move || reader.read_records_for(today))
            .await
            .map_err(|e| SourceError::Unavailable(format!("reader task failed: {}", e)))?
    }

    fn source_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Parse a `BILLDATE` value (local wall-clock time) into Unix seconds
fn parse_bill_date(value: &str) -> Result<i64, SourceError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];

    let trimmed = value.trim();
    let naive = FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| SourceError::InvalidRow(format!("unparseable BILLDATE '{}'", value)))?;

    // DST gaps have no local mapping; fall back to reading the value as UTC
    let timestamp = Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp());

    Ok(timestamp)
}

/// Fake sales feed used when no database is configured
///
/// Every fetch has `new_sale_probability` chance of recording one new sale.
/// All sales generated so far are returned on every fetch, like a real
/// "today" query would.
pub struct MockSalesReader {
    new_sale_probability: f64,
    sales: Mutex<Vec<RawRecord>>,
}

impl MockSalesReader {
    pub fn new() -> Self {
        Self::with_probability(0.3)
    }

    /// Out-of-range probabilities are clamped; NaN never generates a sale.
    pub fn with_probability(new_sale_probability: f64) -> Self {
        let new_sale_probability = if new_sale_probability.is_nan() {
            0.0
        } else {
            new_sale_probability.clamp(0.0, 1.0)
        };

        Self {
            new_sale_probability,
            sales: Mutex::new(Vec::new()),
        }
    }

    fn next_batch(&self) -> Vec<RawRecord> {
        let mut sales = self
            .sales
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.new_sale_probability) {
            let record = RawRecord {
                bill_no: (sales.len() + 1).to_string(),
                item_id: format!("MOCK-{}", rng.gen_range(0..1000)),
                quantity: f64::from(rng.gen_range(1..=3u8)),
                sold_at: current_timestamp(),
                line_seq: Some(1),
            };
            log::info!("🧪 Mock sale generated: bill {} sku {}", record.bill_no, record.item_id);
            sales.push(record);
        }

        sales.clone()
    }
}

impl Default for MockSalesReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SalesReader for MockSalesReader {
    async fn fetch_todays_records(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.next_batch())
    }

    fn source_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use tempfile::NamedTempFile;

    fn create_sales_db() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE sales (
                BILLNO INTEGER,
                BILLDATE TEXT,
                ITEMID TEXT,
                QTY REAL,
                ENTRYORDER INTEGER,
                Cancel TEXT
            );",
        )
        .unwrap();
        file
    }

    fn insert_row(
        path: &Path,
        bill: i64,
        date: &str,
        item: &str,
        qty: f64,
        line: Option<i64>,
        cancel: Option<&str>,
    ) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "INSERT INTO sales (BILLNO, BILLDATE, ITEMID, QTY, ENTRYORDER, Cancel)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![bill, date, item, qty, line, cancel],
        )
        .unwrap();
    }

    #[test]
    fn test_reads_only_requested_day_in_billing_order() {
        let db = create_sales_db();
        insert_row(db.path(), 2, "2024-03-05 11:00:00", "B", 1.0, Some(1), None);
        insert_row(db.path(), 1, "2024-03-05 09:30:00", "A", 2.0, Some(2), None);
        insert_row(db.path(), 1, "2024-03-05 09:30:00", "C", 1.0, Some(1), None);
        insert_row(db.path(), 9, "2024-03-04 23:59:59", "OLD", 1.0, Some(1), None);

        let reader = SqliteSalesReader::new(db.path(), "sales").unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let records = reader.read_records_for(day).unwrap();

        let keys: Vec<(String, String, Option<i64>)> = records
            .iter()
            .map(|r| (r.bill_no.clone(), r.item_id.clone(), r.line_seq))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("1".to_string(), "C".to_string(), Some(1)),
                ("1".to_string(), "A".to_string(), Some(2)),
                ("2".to_string(), "B".to_string(), Some(1)),
            ]
        );
        assert_eq!(records[1].quantity, 2.0);
    }

    #[test]
    fn test_cancelled_rows_are_skipped() {
        let db = create_sales_db();
        insert_row(db.path(), 1, "2024-03-05 09:00:00", "A", 1.0, Some(1), Some("Y"));
        insert_row(db.path(), 1, "2024-03-05 09:00:00", "B", 1.0, Some(2), Some("N"));

        let reader = SqliteSalesReader::new(db.path(), "sales").unwrap();
        let records = reader
            .read_records_for(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_id, "B");
    }

    #[test]
    fn test_missing_database_is_source_error() {
        let reader = SqliteSalesReader::new("/nonexistent/dir/sales.db", "sales").unwrap();
        let result = reader.read_records_for(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

        assert!(matches!(result, Err(SourceError::Database(_))));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(SqliteSalesReader::new("x.db", "SalesEntry_2").is_ok());
        assert!(matches!(
            SqliteSalesReader::new("x.db", "sales; DROP TABLE sales"),
            Err(AlertError::ConfigurationInvalid(_))
        ));
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn test_bill_date_formats() {
        let plain = parse_bill_date("2024-03-05 09:30:00").unwrap();
        let iso = parse_bill_date("2024-03-05T09:30:00").unwrap();
        let fractional = parse_bill_date("2024-03-05 09:30:00.250").unwrap();

        assert_eq!(plain, iso);
        assert_eq!(plain, fractional);
        assert!(matches!(parse_bill_date("yesterday"), Err(SourceError::InvalidRow(_))));
    }

    #[tokio::test]
    async fn test_sqlite_reader_fetches_today() {
        let db = create_sales_db();
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        insert_row(db.path(), 5, &now, "TODAY", 1.0, Some(1), None);
        insert_row(db.path(), 4, "2000-01-01 10:00:00", "ANCIENT", 1.0, Some(1), None);

        let reader = SqliteSalesReader::new(db.path(), "sales").unwrap();
        let records = reader.fetch_todays_records().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_id, "TODAY");
        assert_eq!(reader.source_name(), "sqlite");
    }

    #[tokio::test]
    async fn test_mock_reader_accumulates_sales() {
        let reader = MockSalesReader::with_probability(1.0);

        let first = reader.fetch_todays_records().await.unwrap();
        let second = reader.fetch_todays_records().await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(first[0], second[0]);
        assert!(second[1].item_id.starts_with("MOCK-"));
        assert_eq!(second[1].bill_no, "2");
    }

    #[tokio::test]
    async fn test_mock_reader_quiet() {
        let reader = MockSalesReader::with_probability(0.0);
        assert!(reader.fetch_todays_records().await.unwrap().is_empty());
        assert_eq!(reader.source_name(), "mock");
    }

    #[tokio::test]
    async fn test_mock_reader_nan_probability_never_sells() {
        let reader = MockSalesReader::with_probability(f64::NAN);
        assert!(reader.fetch_todays_records().await.unwrap().is_empty());

        let eager = MockSalesReader::with_probability(7.5);
        assert_eq!(eager.fetch_todays_records().await.unwrap().len(), 1);
    }
}
