//! Explicit transactions on an open connection.

use crate::driver::Connection;
use crate::error::StoreError;
use tracing::warn;

/// Start a write transaction, taking the database lock up front.
pub(crate) async fn begin(conn: &mut dyn Connection) -> Result<(), StoreError> {
    conn.execute("BEGIN IMMEDIATE").await?;
    Ok(())
}

/// Commit if `result` is `Ok`, otherwise roll back.
///
/// A failed commit is rolled back and returned in place of the value, so an
/// `Ok` from here always means the work is durable.
pub(crate) async fn finish<T: Send>(
    conn: &mut dyn Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => match conn.execute("COMMIT").await {
            Ok(()) => Ok(value),
            Err(err) => {
                rollback(conn).await;
                Err(StoreError::from(err))
            }
        },
        Err(err) => {
            rollback(conn).await;
            Err(err)
        }
    }
}

pub(crate) async fn rollback(conn: &mut dyn Connection) {
    if let Err(err) = conn.execute("ROLLBACK").await {
        warn!(error = %err, "Rollback failed");
    }
}
