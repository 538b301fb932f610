use crate::error::CleanupResult;
use crate::value::SqlValue;

/// One result row, column values in projection order.
pub type Row = Vec<SqlValue>;

/// Connection seam to the target database.
///
/// The planner issues one statement at a time and blocks on the result;
/// implementations own transport, pooling and retries. Both methods must be
/// usable inside an explicit `BEGIN TRANSACTION` / `COMMIT TRANSACTION` /
/// `ROLLBACK TRANSACTION` boundary controlled by the caller; the execution
/// emitter drives those as ordinary `execute` calls.
pub trait QueryExecutor {
    /// Run a read-only statement and collect all rows.
    fn query(&mut self, sql: &str) -> CleanupResult<Vec<Row>>;

    /// Run a statement for effect; returns the affected row count.
    fn execute(&mut self, sql: &str) -> CleanupResult<u64>;
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for &mut E {
    fn query(&mut self, sql: &str) -> CleanupResult<Vec<Row>> {
        (**self).query(sql)
    }

    fn execute(&mut self, sql: &str) -> CleanupResult<u64> {
        (**self).execute(sql)
    }
}
