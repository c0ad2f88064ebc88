//! Expiry migration: move expired rows from the active table into the archive.
//!
//! One cycle is fetch, partition, archive, purge. The archive inserts and the
//! purge run inside a single `BEGIN IMMEDIATE` transaction, so a failure
//! leaves both tables as they were before the cycle.
//!
//! Archive rows are copied inside SQLite (`INSERT ... SELECT`), never rebuilt
//! from decoded items, so every column keeps its stored value, NULLs included.
//! The purge deletes by predicate (`expiry_date < today`) rather than by the
//! ids just archived. The partition applies the same TEXT comparison through
//! [`StoredExpiry::is_before`](crate::domain::StoredExpiry::is_before), so the
//! rows reported as expired are exactly the rows archived and purged.

use crate::db::rows::{item_from_row, ITEM_COLUMNS};
use crate::db::schema::{ACTIVE_TABLE, ARCHIVE_TABLE};
use crate::db::transaction;
use crate::domain::{ExpiryDate, Item};
use crate::driver::{Connection, Value};
use crate::error::StoreError;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Active rows split around `today`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// `expiry_date >= today`
    pub current: Vec<Item>,
    /// `expiry_date < today`
    pub expired: Vec<Item>,
}

/// Split items by expiry, keeping fetch order within each side.
pub fn partition(items: Vec<Item>, today: ExpiryDate) -> Partition {
    let (expired, current): (Vec<Item>, Vec<Item>) = items
        .into_iter()
        .partition(|item: &Item| item.is_expired_on(today));
    Partition { current, expired }
}

/// Counters for one committed migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    /// Rows newly inserted into the archive.
    pub archived: usize,
    /// Expired rows whose id was already in the archive.
    pub already_archived: usize,
    /// Rows deleted from the active table.
    pub purged: u64,
}

/// Result of one load cycle.
///
/// `current` and `expired` are available even when the migration failed;
/// in that case the transaction was rolled back and the active table still
/// holds the expired rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCycle {
    pub today: ExpiryDate,
    pub current: Vec<Item>,
    pub expired: Vec<Item>,
    pub migration: Result<MigrationStats, StoreError>,
}

fn select_active_sql() -> String {
    format!("SELECT {} FROM {}", ITEM_COLUMNS, ACTIVE_TABLE)
}

fn archive_insert_sql() -> String {
    // The WHERE clause also keeps SQLite from reading ON CONFLICT as a join constraint.
    format!(
        "INSERT INTO {archive} ({cols}) SELECT {cols} FROM {active} WHERE id = ? \
         ON CONFLICT(id) DO NOTHING",
        archive = ARCHIVE_TABLE,
        active = ACTIVE_TABLE,
        cols = ITEM_COLUMNS
    )
}

fn purge_sql() -> String {
    format!("DELETE FROM {} WHERE expiry_date < ?", ACTIVE_TABLE)
}

/// Select every active row in storage order.
///
/// Legacy values (NULL text, non-canonical dates, unreadable prices) decode
/// with a warning instead of failing the fetch.
///
/// # Errors
/// Returns the driver error.
pub async fn fetch_active(conn: &mut dyn Connection) -> Result<Vec<Item>, StoreError> {
    let rows = conn.query(&select_active_sql(), &[]).await?;
    rows.iter().map(item_from_row).collect()
}

/// Run one load cycle on an open connection.
///
/// # Errors
/// Returns an error only if the transaction cannot start or the fetch fails;
/// archive and purge failures are reported in [`LoadCycle::migration`].
pub async fn run_cycle(
    conn: &mut dyn Connection,
    today: ExpiryDate,
) -> Result<LoadCycle, StoreError> {
    transaction::begin(conn).await?;

    let items = match fetch_active(conn).await {
        Ok(items) => items,
        Err(err) => {
            transaction::rollback(conn).await;
            return Err(err);
        }
    };

    let Partition { current, expired } = partition(items, today);
    debug!(
        today = %today,
        current = current.len(),
        expired = expired.len(),
        "Partitioned active items"
    );

    let migration = migrate(conn, &expired, today).await;
    let migration = transaction::finish(conn, migration).await;

    match &migration {
        Ok(stats) => info!(
            today = %today,
            archived = stats.archived,
            already_archived = stats.already_archived,
            purged = stats.purged,
            "Expiry migration committed"
        ),
        Err(err) => warn!(today = %today, error = %err, "Expiry migration rolled back"),
    }

    Ok(LoadCycle {
        today,
        current,
        expired,
        migration,
    })
}

async fn migrate(
    conn: &mut dyn Connection,
    expired: &[Item],
    today: ExpiryDate,
) -> Result<MigrationStats, StoreError> {
    let mut stats = MigrationStats::default();

    let insert = archive_insert_sql();
    for item in expired {
        let changes = conn.run(&insert, &[Value::Integer(item.id)]).await?;
        if changes.rows_affected > 0 {
            stats.archived += 1;
        } else {
            debug!(id = item.id, name = %item.name, "Item already archived");
            stats.already_archived += 1;
        }
    }

    let purged = conn
        .run(&purge_sql(), &[Value::Text(today.to_canonical_string())])
        .await?;
    stats.purged = purged.rows_affected;
    Ok(stats)
}
