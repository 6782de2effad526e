//! SQLite serialization for status enums
//!
//! Implements ToSql and FromSql for InstanceStatus and StepStatus so the
//! status columns are written and read as typed values.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::entities::instance::{InstanceStatus, StepStatus};

fn invalid_data(e: String) -> FromSqlError {
    FromSqlError::Other(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        e,
    )))
}

// =========================================================================
// InstanceStatus - ToSql/FromSql
// =========================================================================

impl ToSql for InstanceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for InstanceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(invalid_data)
    }
}

// =========================================================================
// StepStatus - ToSql/FromSql
// =========================================================================

impl ToSql for StepStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for StepStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(invalid_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_step_status_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE test (status TEXT)", []).unwrap();

        for status in [StepStatus::InProgress, StepStatus::Timeout] {
            conn.execute("DELETE FROM test", []).unwrap();
            conn.execute("INSERT INTO test VALUES (?1)", [&status])
                .unwrap();

            let raw: String = conn
                .query_row("SELECT status FROM test", [], |row| row.get(0))
                .unwrap();
            let retrieved: StepStatus = conn
                .query_row("SELECT status FROM test", [], |row| row.get(0))
                .unwrap();

            assert_eq!(raw, status.to_string());
            assert_eq!(status, retrieved);
        }
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let result: rusqlite::Result<InstanceStatus> =
            conn.query_row("SELECT 'archived'", [], |row| row.get(0));
        assert!(result.is_err());
    }
}
