use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::catalog::DatabaseChecks;
use crate::error::KiraError;
use crate::validate::ValidationReport;

const COMPOUND_TABLE: &str = "molecule_dictionary";
const ACTIVITY_TABLE: &str = "activities";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseMetrics {
    pub table_count: usize,
    pub row_counts: BTreeMap<String, u64>,
    pub compound_count: Option<u64>,
    pub activity_count: Option<u64>,
    pub smoke_rows: Option<usize>,
}

pub fn open_read_only(path: &Path) -> Result<Connection, KiraError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| KiraError::Database(err.to_string()))
}

pub fn inspect(
    path: &Path,
    checks: &DatabaseChecks,
    report: &mut ValidationReport,
) -> Option<DatabaseMetrics> {
    let conn = match open_read_only(path) {
        Ok(conn) => conn,
        Err(err) => {
            report.error(format!("cannot open database: {err}"));
            return None;
        }
    };

    // SQLite opens lazily, so a non-database file first fails here.
    let table_count = match count_tables(&conn) {
        Ok(count) => count,
        Err(err) => {
            report.error(format!("cannot read database schema: {err}"));
            return None;
        }
    };
    if table_count < checks.min_tables {
        report.error(format!(
            "too few tables: found {table_count}, expected at least {}",
            checks.min_tables
        ));
    }

    let mut row_counts = BTreeMap::new();
    for requirement in &checks.tables {
        match count_rows(&conn, &requirement.name) {
            Ok(rows) => {
                if rows < requirement.min_rows {
                    report.error(format!(
                        "table {} has {rows} rows, expected at least {}",
                        requirement.name, requirement.min_rows
                    ));
                }
                row_counts.insert(requirement.name.clone(), rows);
            }
            Err(err) => report.error(format!("table {}: {err}", requirement.name)),
        }
    }

    let smoke_rows = match run_smoke_query(&conn, &checks.smoke_query) {
        Ok(rows) => {
            if rows == 0 {
                report.warn("smoke-test query returned no rows");
            }
            Some(rows)
        }
        Err(err) => {
            report.error(format!("smoke-test query failed: {err}"));
            None
        }
    };

    Some(DatabaseMetrics {
        table_count,
        compound_count: row_counts.get(COMPOUND_TABLE).copied(),
        activity_count: row_counts.get(ACTIVITY_TABLE).copied(),
        row_counts,
        smoke_rows,
    })
}

fn count_tables(conn: &Connection) -> Result<usize, KiraError> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count.max(0) as usize)
    .map_err(|err| KiraError::Database(err.to_string()))
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64, KiraError> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
    conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
        .map(|count| count.max(0) as u64)
        .map_err(|err| KiraError::Database(err.to_string()))
}

fn run_smoke_query(conn: &Connection, sql: &str) -> Result<usize, KiraError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| KiraError::Database(err.to_string()))?;
    let mut rows = stmt
        .query([])
        .map_err(|err| KiraError::Database(err.to_string()))?;
    let mut count = 0usize;
    while rows
        .next()
        .map_err(|err| KiraError::Database(err.to_string()))?
        .is_some()
    {
        count += 1;
    }
    Ok(count)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("activities"), "\"activities\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn counts_tables_and_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE a (id INTEGER);
             CREATE TABLE b (id INTEGER);
             INSERT INTO a VALUES (1), (2), (3);",
        )
        .unwrap();
        assert_eq!(count_tables(&conn).unwrap(), 2);
        assert_eq!(count_rows(&conn, "a").unwrap(), 3);
        assert!(count_rows(&conn, "missing").is_err());
        assert_eq!(run_smoke_query(&conn, "SELECT id FROM a").unwrap(), 3);
    }
}
