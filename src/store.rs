use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{info, warn};

use crate::domains::DomainTarget;
use crate::merge::{AggregateRow, MergeAction, WriteKind};
use crate::stats::DomainStats;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("invalid table name '{0}': use letters, digits and underscores only")]
	InvalidTableName(String),

	#[error("no stored row for '{0}'")]
	MissingRow(String),

	#[error("{field} of '{name}' does not fit in a database integer")]
	Overflow { name: String, field: &'static str },

	#[error("stored row for '{name}' is corrupt: {reason}")]
	Corrupt { name: String, reason: String },
}

/// Aggregate loaded back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedStats {
	pub stats: DomainStats,
	pub first_seen: DateTime<Utc>,
}

/// Where domains come from and where their aggregates go.
pub trait Store {
	/// Domains to measure, in their configured order.
	fn load_domain_list(&self) -> Result<Vec<DomainTarget>, StoreError>;

	/// The stored aggregate of a domain, `None` if it was never written.
	fn load_existing_stats(&self, domain: &DomainTarget) -> Result<Option<PersistedStats>, StoreError>;

	/// Perform one insert or update decided after a batch.
	fn apply(&self, action: &MergeAction) -> Result<(), StoreError>;
}

/// SQLite-backed store.
///
/// Keeps the measured domains in a `domains` table and one row of running
/// statistics per domain in a configurable results table.
pub struct SqliteStore {
	conn: Connection,
	table: String,
}

impl SqliteStore {
	/// Open (creating if needed) the database at `path`.
	///
	/// `seed_domains` fill the domain table the first time it is created.
	pub fn open(path: impl AsRef<Path>, table: &str, seed_domains: &[String]) -> Result<Self, StoreError> {
		let conn = Connection::open(path)?;
		Self::from_connection(conn, table, seed_domains)
	}

	pub fn from_connection(mut conn: Connection, table: &str, seed_domains: &[String]) -> Result<Self, StoreError> {
		validate_table_name(table)?;
		bootstrap(&mut conn, table, seed_domains)?;
		Ok(Self { conn, table: table.to_string() })
	}

	#[cfg(test)]
	pub(crate) fn connection(&self) -> &Connection {
		&self.conn
	}

	fn insert(&self, row: &AggregateRow) -> Result<(), StoreError> {
		let sql = format!(
			"INSERT INTO {} (name, avg_in_ms, stddev_in_ms, sum_in_ms, sum_sqrt_in_ms, num_queries, first_ts, last_ts) \
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
			self.table,
		);
		self.conn.execute(&sql, params![
			row.name,
			row.average_ms,
			row.stddev_ms,
			to_db_int(&row.name, "sum", row.sum_ms)?,
			to_db_int(&row.name, "sum of squares", row.sum_sq_ms)?,
			to_db_int(&row.name, "count", row.count)?,
			row.first_seen,
			row.last_seen,
		])?;
		Ok(())
	}

	fn update(&self, row: &AggregateRow) -> Result<(), StoreError> {
		let sql = format!(
			"UPDATE {} SET avg_in_ms = ?1, stddev_in_ms = ?2, sum_in_ms = ?3, sum_sqrt_in_ms = ?4, \
			 num_queries = ?5, last_ts = ?6 WHERE name = ?7",
			self.table,
		);
		let changed = self.conn.execute(&sql, params![
			row.average_ms,
			row.stddev_ms,
			to_db_int(&row.name, "sum", row.sum_ms)?,
			to_db_int(&row.name, "sum of squares", row.sum_sq_ms)?,
			to_db_int(&row.name, "count", row.count)?,
			row.last_seen,
			row.name,
		])?;
		if changed == 0 {
			return Err(StoreError::MissingRow(row.name.clone()));
		}
		Ok(())
	}
}

impl Store for SqliteStore {
	fn load_domain_list(&self) -> Result<Vec<DomainTarget>, StoreError> {
		let mut stmt = self.conn.prepare("SELECT name FROM domains ORDER BY rank")?;
		let names = stmt
			.query_map([], |row| row.get::<_, String>(0))?
			.collect::<Result<Vec<String>, _>>()?;

		let mut targets = Vec::with_capacity(names.len());
		for name in names {
			match DomainTarget::new(&name) {
				Ok(target) if !targets.contains(&target) => targets.push(target),
				Ok(_) => {}
				Err(e) => {
					warn!(action = "load", component = "store", name = ?name, error = %e, "Skipping unusable domain entry");
				}
			}
		}
		Ok(targets)
	}

	fn load_existing_stats(&self, domain: &DomainTarget) -> Result<Option<PersistedStats>, StoreError> {
		let sql = format!(
			"SELECT sum_in_ms, sum_sqrt_in_ms, num_queries, first_ts, last_ts FROM {} WHERE name = ?1",
			self.table,
		);
		// Columns are decoded one by one so a bad value stays scoped to this domain
		type Column<T> = rusqlite::Result<Option<T>>;
		type Raw = (Column<i64>, Column<i64>, Column<i64>, Column<DateTime<Utc>>, Column<DateTime<Utc>>);
		let raw: Option<Raw> = self.conn
			.query_row(&sql, params![domain.as_str()], |row| {
				Ok((row.get(0), row.get(1), row.get(2), row.get(3), row.get(4)))
			})
			.optional()?;

		let Some((sum, sum_sq, count, first_ts, last_ts)) = raw else {
			return Ok(None);
		};
		let name = domain.as_str();
		let first_ts = readable_time(name, "first_ts", first_ts);
		let last_ts = readable_time(name, "last_ts", last_ts);
		let stats = DomainStats {
			sum_ms: from_db_int(name, "sum", sum)?,
			sum_sq_ms: from_db_int(name, "sum of squares", sum_sq)?,
			count: from_db_int(name, "count", count)?,
			last_time: last_ts,
		};
		// Rows are always written with both timestamps; fall back rather than re-insert
		let first_seen = first_ts.or(last_ts).unwrap_or_else(Utc::now);
		Ok(Some(PersistedStats { stats, first_seen }))
	}

	fn apply(&self, action: &MergeAction) -> Result<(), StoreError> {
		match action.kind {
			WriteKind::Insert => self.insert(&action.row),
			WriteKind::Update => self.update(&action.row),
		}
	}
}

fn validate_table_name(table: &str) -> Result<(), StoreError> {
	let mut chars = table.chars();
	let valid = match chars.next() {
		Some(first) => {
			(first.is_ascii_alphabetic() || first == '_')
				&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
		}
		None => false,
	};
	if valid && !table.eq_ignore_ascii_case("domains") {
		Ok(())
	} else {
		Err(StoreError::InvalidTableName(table.to_string()))
	}
}

fn bootstrap(conn: &mut Connection, table: &str, seed_domains: &[String]) -> Result<(), StoreError> {
	conn.execute_batch(
		"CREATE TABLE IF NOT EXISTS domains (
			rank INTEGER PRIMARY KEY AUTOINCREMENT,
			name TEXT NOT NULL
		)",
	)?;

	let existing: i64 = conn.query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))?;
	if existing == 0 && !seed_domains.is_empty() {
		let tx = conn.transaction()?;
		for domain in seed_domains {
			tx.execute("INSERT INTO domains (name) VALUES (?1)", params![domain])?;
		}
		tx.commit()?;
		info!(action = "seed", component = "store", domains = seed_domains.len(), "Seeded domain table");
	}

	conn.execute_batch(&format!(
		"CREATE TABLE IF NOT EXISTS {} (
			name TEXT PRIMARY KEY,
			avg_in_ms REAL,
			stddev_in_ms REAL,
			sum_in_ms INTEGER,
			sum_sqrt_in_ms INTEGER,
			num_queries INTEGER,
			first_ts TEXT,
			last_ts TEXT
		)",
		table,
	))?;
	Ok(())
}

fn to_db_int(name: &str, field: &'static str, value: u64) -> Result<i64, StoreError> {
	i64::try_from(value).map_err(|_| StoreError::Overflow { name: name.to_string(), field })
}

fn from_db_int(name: &str, field: &'static str, value: rusqlite::Result<Option<i64>>) -> Result<u64, StoreError> {
	let value = value
		.map_err(|e| StoreError::Corrupt {
			name: name.to_string(),
			reason: format!("unreadable {}: {}", field, e),
		})?
		.unwrap_or(0);
	u64::try_from(value).map_err(|_| StoreError::Corrupt {
		name: name.to_string(),
		reason: format!("negative {} {}", field, value),
	})
}

/// Timestamps are informational, so an unparsable one is dropped rather than failing the row.
fn readable_time(name: &str, column: &str, value: rusqlite::Result<Option<DateTime<Utc>>>) -> Option<DateTime<Utc>> {
	value.unwrap_or_else(|e| {
		warn!(action = "load", component = "store", domain = name, column, error = %e, "Ignoring unreadable timestamp");
		None
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	use crate::domains::default_domains;

	fn at(secs: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
	}

	fn memory_store(seed: &[String]) -> SqliteStore {
		SqliteStore::from_connection(Connection::open_in_memory().unwrap(), "queries_result", seed).unwrap()
	}

	fn row(name: &str, sum: u64, sum_sq: u64, count: u64, first: DateTime<Utc>, last: DateTime<Utc>) -> AggregateRow {
		let stats = DomainStats { sum_ms: sum, sum_sq_ms: sum_sq, count, last_time: Some(last) };
		AggregateRow {
			name: name.to_string(),
			average_ms: stats.average().unwrap(),
			stddev_ms: stats.stddev().unwrap(),
			sum_ms: sum,
			sum_sq_ms: sum_sq,
			count,
			first_seen: first,
			last_seen: last,
		}
	}

	fn action(kind: WriteKind, row: AggregateRow) -> MergeAction {
		MergeAction { index: 0, kind, row }
	}

	#[test]
	fn test_bootstrap_seeds_domains_in_order() {
		let store = memory_store(&default_domains());
		let domains = store.load_domain_list().unwrap();
		assert_eq!(domains.len(), 10);
		assert_eq!(domains[0].as_str(), "google.com");
		assert_eq!(domains[9].as_str(), "qq.com");
	}

	#[test]
	fn test_existing_domain_table_not_reseeded() {
		let path = std::env::temp_dir().join(format!("dns-latency-store-{}.sqlite", std::process::id()));
		std::fs::remove_file(&path).ok();
		{
			let store = SqliteStore::open(&path, "queries_result", &["first.example".to_string()]).unwrap();
			assert_eq!(store.load_domain_list().unwrap().len(), 1);
		}
		let store = SqliteStore::open(&path, "queries_result", &default_domains()).unwrap();
		let domains = store.load_domain_list().unwrap();
		std::fs::remove_file(&path).ok();
		assert_eq!(domains.len(), 1);
		assert_eq!(domains[0].as_str(), "first.example");
	}

	#[test]
	fn test_invalid_table_names_rejected() {
		for table in ["", "1abc", "results; DROP TABLE domains", "my-table", "domains"] {
			let result = SqliteStore::from_connection(Connection::open_in_memory().unwrap(), table, &[]);
			assert!(matches!(result, Err(StoreError::InvalidTableName(_))), "accepted {:?}", table);
		}
	}

	#[test]
	fn test_unknown_domain_has_no_stats() {
		let store = memory_store(&default_domains());
		let target = DomainTarget::new("google.com").unwrap();
		assert_eq!(store.load_existing_stats(&target).unwrap(), None);
	}

	#[test]
	fn test_insert_then_load() {
		let store = memory_store(&[]);
		store.apply(&action(WriteKind::Insert, row("example.com", 30, 500, 2, at(10), at(10)))).unwrap();

		let loaded = store.load_existing_stats(&DomainTarget::new("example.com").unwrap()).unwrap().unwrap();
		assert_eq!(loaded.first_seen, at(10));
		assert_eq!(loaded.stats, DomainStats { sum_ms: 30, sum_sq_ms: 500, count: 2, last_time: Some(at(10)) });
	}

	#[test]
	fn test_update_keeps_first_seen() {
		let store = memory_store(&[]);
		store.apply(&action(WriteKind::Insert, row("example.com", 10, 100, 1, at(0), at(0)))).unwrap();
		// The update carries a different first_seen that must not be written
		store.apply(&action(WriteKind::Update, row("example.com", 30, 500, 2, at(999), at(60)))).unwrap();

		let loaded = store.load_existing_stats(&DomainTarget::new("example.com").unwrap()).unwrap().unwrap();
		assert_eq!(loaded.first_seen, at(0));
		assert_eq!(loaded.stats.last_time, Some(at(60)));
		assert_eq!(loaded.stats.count, 2);

		let avg: f64 = store.conn
			.query_row("SELECT avg_in_ms FROM queries_result WHERE name = 'example.com'", [], |r| r.get(0))
			.unwrap();
		assert_eq!(avg, 15.0);
	}

	#[test]
	fn test_update_without_row_fails() {
		let store = memory_store(&[]);
		let result = store.apply(&action(WriteKind::Update, row("ghost.example", 5, 25, 1, at(0), at(0))));
		assert!(matches!(result, Err(StoreError::MissingRow(name)) if name == "ghost.example"));
	}

	#[test]
	fn test_duplicate_insert_fails() {
		let store = memory_store(&[]);
		let insert = action(WriteKind::Insert, row("example.com", 5, 25, 1, at(0), at(0)));
		store.apply(&insert).unwrap();
		assert!(matches!(store.apply(&insert), Err(StoreError::Sqlite(_))));
	}

	#[test]
	fn test_oversized_counter_rejected() {
		let store = memory_store(&[]);
		let mut big = row("example.com", 5, 25, 1, at(0), at(0));
		big.sum_sq_ms = u64::MAX;
		let result = store.apply(&action(WriteKind::Insert, big));
		assert!(matches!(result, Err(StoreError::Overflow { field: "sum of squares", .. })));
	}

	#[test]
	fn test_negative_counter_is_corrupt() {
		let store = memory_store(&[]);
		store.conn
			.execute(
				"INSERT INTO queries_result (name, sum_in_ms, sum_sqrt_in_ms, num_queries, first_ts, last_ts) \
				 VALUES ('bad.example', -5, 25, 1, NULL, NULL)",
				[],
			)
			.unwrap();
		let result = store.load_existing_stats(&DomainTarget::new("bad.example").unwrap());
		assert!(matches!(result, Err(StoreError::Corrupt { .. })));
	}

	#[test]
	fn test_real_counter_is_corrupt() {
		let store = memory_store(&[]);
		store.apply(&action(WriteKind::Insert, row("example.com", 30, 500, 2, at(0), at(10)))).unwrap();
		store.conn
			.execute("UPDATE queries_result SET sum_in_ms = 12.5 WHERE name = 'example.com'", [])
			.unwrap();

		let result = store.load_existing_stats(&DomainTarget::new("example.com").unwrap());
		match result {
			Err(StoreError::Corrupt { name, reason }) => {
				assert_eq!(name, "example.com");
				assert!(reason.contains("sum"), "{}", reason);
			}
			other => panic!("expected corrupt row, got {:?}", other),
		}
	}

	#[test]
	fn test_text_counter_is_corrupt() {
		let store = memory_store(&[]);
		store.conn
			.execute(
				"INSERT INTO queries_result (name, sum_in_ms, sum_sqrt_in_ms, num_queries, first_ts, last_ts) \
				 VALUES ('bad.example', 10, 100, 'many', NULL, NULL)",
				[],
			)
			.unwrap();
		let result = store.load_existing_stats(&DomainTarget::new("bad.example").unwrap());
		assert!(matches!(result, Err(StoreError::Corrupt { .. })));
	}

	#[test]
	fn test_garbage_first_ts_falls_back_to_last_ts() {
		let store = memory_store(&[]);
		store.apply(&action(WriteKind::Insert, row("example.com", 30, 500, 2, at(0), at(10)))).unwrap();
		store.conn
			.execute("UPDATE queries_result SET first_ts = 'yesterday' WHERE name = 'example.com'", [])
			.unwrap();

		let loaded = store.load_existing_stats(&DomainTarget::new("example.com").unwrap()).unwrap().unwrap();
		assert_eq!(loaded.first_seen, at(10));
		assert_eq!(loaded.stats, DomainStats { sum_ms: 30, sum_sq_ms: 500, count: 2, last_time: Some(at(10)) });
	}

	#[test]
	fn test_garbage_last_ts_keeps_counters() {
		let store = memory_store(&[]);
		store.apply(&action(WriteKind::Insert, row("example.com", 30, 500, 2, at(0), at(10)))).unwrap();
		store.conn
			.execute("UPDATE queries_result SET last_ts = 'not a date' WHERE name = 'example.com'", [])
			.unwrap();

		let loaded = store.load_existing_stats(&DomainTarget::new("example.com").unwrap()).unwrap().unwrap();
		assert_eq!(loaded.first_seen, at(0));
		assert_eq!(loaded.stats.count, 2);
		assert_eq!(loaded.stats.last_time, None);
	}

	#[test]
	fn test_blank_domain_entries_skipped() {
		let store = memory_store(&["a.example".to_string(), "   ".to_string(), "b.example".to_string(), "a.example".to_string()]);
		let domains = store.load_domain_list().unwrap();
		let names: Vec<&str> = domains.iter().map(|d| d.as_str()).collect();
		assert_eq!(names, ["a.example", "b.example"]);
	}
}
