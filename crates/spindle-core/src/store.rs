//! SQLite shim: one exclusive connection, bound parameters, no retries.
//!
//! Each worker owns exactly one [`StoreConn`]. The store file itself is
//! shared by every worker in the pool; cross-connection write coordination
//! is left entirely to SQLite's own locking (`busy_timeout` only).

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde_json::Value;

use crate::domain::{ExecOutcome, Row, Statement, StatementKind};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings shared by every worker in a pool.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// One worker's exclusive handle to the shared store.
///
/// Opened once at worker startup, released by `Drop` on every exit path
/// (panic unwind included). Never shared across workers.
pub struct StoreConn {
    conn: Connection,
}

impl StoreConn {
    pub fn open(config: &StoreConfig) -> Result<Self, rusqlite::Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(&config.path, flags)?;
        conn.busy_timeout(config.busy_timeout)?;
        Ok(Self { conn })
    }

    /// Execute one statement with bound parameters.
    ///
    /// Query mode returns the ordered rows; mutate mode returns the
    /// mutation summary. Nothing is retried; native errors surface as-is.
    pub fn execute(
        &mut self,
        statement: &Statement,
        params: &[Value],
    ) -> Result<ExecOutcome, rusqlite::Error> {
        let bound = bind_values(params)?;
        match statement.kind() {
            StatementKind::Query => self.run_query(statement.as_str(), &bound),
            StatementKind::Mutate => self.run_mutation(statement.as_str(), &bound),
        }
    }

    fn run_query(&mut self, sql: &str, bound: &[SqlValue]) -> Result<ExecOutcome, rusqlite::Error> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query(params_from_iter(bound.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in columns.iter().enumerate() {
                map.insert(name.clone(), cell_to_json(row.get_ref(i)?));
            }
            out.push(map);
        }
        Ok(ExecOutcome::Rows(out))
    }

    fn run_mutation(
        &mut self,
        sql: &str,
        bound: &[SqlValue],
    ) -> Result<ExecOutcome, rusqlite::Error> {
        let rows_changed = self.conn.execute(sql, params_from_iter(bound.iter()))? as u64;
        Ok(ExecOutcome::Mutation {
            last_insert_id: self.conn.last_insert_rowid(),
            rows_changed,
        })
    }
}

/// Convert caller params (JSON) to store values. Scalars only; booleans
/// bind as 0/1 the way the original driver bound them.
fn bind_values(params: &[Value]) -> Result<Vec<SqlValue>, rusqlite::Error> {
    params.iter().map(bind_value).collect()
}

fn bind_value(value: &Value) -> Result<SqlValue, rusqlite::Error> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(bind_error(format!("unrepresentable number: {n}")))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => {
            Err(bind_error("non-scalar parameter".to_string()))
        }
    }
}

fn bind_error(message: String) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(message.into())
}

fn cell_to_json(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_conn() -> StoreConn {
        StoreConn::open(&StoreConfig::new(":memory:")).unwrap()
    }

    fn statement(sql: &str) -> Statement {
        Statement::new(sql)
    }

    #[test]
    fn mutation_reports_last_insert_id_and_changes() {
        let mut conn = memory_conn();
        conn.execute(&statement("CREATE TABLE jobs (id INTEGER PRIMARY KEY, name TEXT)"), &[])
            .unwrap();

        let outcome = conn
            .execute(
                &statement("INSERT INTO jobs (name) VALUES (?)"),
                &[json!("carpenter")],
            )
            .unwrap();

        assert_eq!(outcome.as_mutation(), Some((1, 1)));

        let outcome = conn
            .execute(
                &statement("INSERT INTO jobs (name) VALUES (?)"),
                &[json!("mason")],
            )
            .unwrap();
        assert_eq!(outcome.as_mutation(), Some((2, 1)));
    }

    #[test]
    fn query_returns_named_rows_in_order() {
        let mut conn = memory_conn();
        conn.execute(
            &statement("CREATE TABLE jobs (id INTEGER PRIMARY KEY, name TEXT, salary INTEGER)"),
            &[],
        )
        .unwrap();
        for (name, salary) in [("carpenter", 52_000), ("mason", 48_000)] {
            conn.execute(
                &statement("INSERT INTO jobs (name, salary) VALUES (?, ?)"),
                &[json!(name), json!(salary)],
            )
            .unwrap();
        }

        let rows = conn
            .execute(&statement("SELECT id, name, salary FROM jobs ORDER BY id"), &[])
            .unwrap()
            .into_rows()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("carpenter"));
        assert_eq!(rows[1]["salary"], json!(48_000));
    }

    #[test]
    fn null_real_and_bool_values_round_trip() {
        let mut conn = memory_conn();
        conn.execute(
            &statement("CREATE TABLE t (a TEXT, b REAL, c INTEGER)"),
            &[],
        )
        .unwrap();
        conn.execute(
            &statement("INSERT INTO t (a, b, c) VALUES (?, ?, ?)"),
            &[json!(null), json!(1.5), json!(true)],
        )
        .unwrap();

        let rows = conn
            .execute(&statement("SELECT a, b, c FROM t"), &[])
            .unwrap()
            .into_rows()
            .unwrap();

        assert_eq!(rows[0]["a"], json!(null));
        assert_eq!(rows[0]["b"], json!(1.5));
        assert_eq!(rows[0]["c"], json!(1));
    }

    #[test]
    fn parameters_are_bound_not_interpolated() {
        let mut conn = memory_conn();
        conn.execute(&statement("CREATE TABLE t (v TEXT)"), &[]).unwrap();

        // A value full of SQL metacharacters lands verbatim.
        let sneaky = "'); DROP TABLE t; --";
        conn.execute(&statement("INSERT INTO t (v) VALUES (?)"), &[json!(sneaky)])
            .unwrap();

        let rows = conn
            .execute(&statement("SELECT v FROM t"), &[])
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows[0]["v"], json!(sneaky));
    }

    #[test]
    fn non_scalar_parameter_is_a_bind_error() {
        let mut conn = memory_conn();
        conn.execute(&statement("CREATE TABLE t (v TEXT)"), &[]).unwrap();

        let err = conn
            .execute(&statement("INSERT INTO t (v) VALUES (?)"), &[json!([1, 2])])
            .unwrap_err();
        assert!(err.to_string().contains("non-scalar"));
    }

    #[test]
    fn native_errors_surface_as_is() {
        let mut conn = memory_conn();
        let err = conn
            .execute(&statement("INSERT INTO missing (v) VALUES (?)"), &[json!(1)])
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn constraint_violation_is_an_error_not_a_panic() {
        let mut conn = memory_conn();
        conn.execute(
            &statement("CREATE TABLE users (username TEXT UNIQUE)"),
            &[],
        )
        .unwrap();
        conn.execute(
            &statement("INSERT INTO users (username) VALUES (?)"),
            &[json!("amina")],
        )
        .unwrap();

        let err = conn
            .execute(
                &statement("INSERT INTO users (username) VALUES (?)"),
                &[json!("amina")],
            )
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unique"));
    }
}
