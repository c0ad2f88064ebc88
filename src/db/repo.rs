//! Repository layer for inventory records.
//!
//! Every method goes through the connection manager's guarded path. The
//! interactive mutations (`update_by_id`, `delete_by_id`) return the active
//! list as it stands after the change so a caller can redraw from it.

use super::manager::{Cleanup, ConnectionManager};
use super::rows::{
    archived_from_row, general_from_row, general_values, item_values, GENERAL_COLUMNS,
    ITEM_COLUMNS,
};
use super::schema::{ARCHIVE_TABLE, GENERAL_TABLE};
use super::transaction;
use crate::config::Config;
use crate::domain::{ArchivedItem, ExpiryDate, GeneralItem, GeneralItemFields, Item, ItemFields};
use crate::driver::{Connection, Driver, Value};
use crate::engine::expiry::{self, LoadCycle};
use crate::error::StoreError;
use std::sync::Arc;
use tracing::{debug, info};

const INSERT_ITEM: &str = "INSERT INTO medicines (name, type, quantity, expiry_date, batch_no, price) \
     VALUES (?, ?, ?, ?, ?, ?)";
const UPDATE_ITEM: &str = "UPDATE medicines SET name = ?, type = ?, quantity = ?, expiry_date = ?, \
     batch_no = ?, price = ? WHERE id = ?";
const DELETE_ITEM: &str = "DELETE FROM medicines WHERE id = ?";

const INSERT_GENERAL: &str = "INSERT INTO general_items (name, quantity, price) VALUES (?, ?, ?)";
const UPDATE_GENERAL: &str =
    "UPDATE general_items SET name = ?, quantity = ?, price = ? WHERE id = ?";
const DELETE_GENERAL: &str = "DELETE FROM general_items WHERE id = ?";

/// Record access for the active, archive and general item tables.
pub struct Repository {
    manager: ConnectionManager,
}

impl Repository {
    /// Create a new repository over the given connection manager.
    pub fn new(manager: ConnectionManager) -> Self {
        Repository { manager }
    }

    /// Build the manager from configuration.
    pub fn from_config(driver: Arc<dyn Driver>, config: &Config) -> Self {
        Repository::new(ConnectionManager::new(
            driver,
            config.database_name.clone(),
            config.schema_config(),
        ))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.manager
    }

    /// Acquire the connection and create tables. Safe to call repeatedly.
    pub async fn initialize(&mut self) -> Result<(), StoreError> {
        self.manager.initialize().await
    }

    /// Release the connection.
    pub async fn close(&mut self) -> Result<(), StoreError> {
        self.manager.close_and_dispose().await
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        if self.manager.is_ready() {
            Ok(())
        } else {
            Err(StoreError::NotReady)
        }
    }

    fn ensure_general(&self) -> Result<(), StoreError> {
        self.ensure_ready()?;
        if self.manager.schema().general_items {
            Ok(())
        } else {
            Err(StoreError::TableDisabled(GENERAL_TABLE))
        }
    }

    // =========================================================================
    // Load cycle
    // =========================================================================

    /// Run an expiry migration cycle against today's date.
    ///
    /// # Errors
    /// See [`load_cycle_at`](Self::load_cycle_at).
    pub async fn load_cycle(&mut self) -> Result<LoadCycle, StoreError> {
        self.load_cycle_at(ExpiryDate::today()).await
    }

    /// Run an expiry migration cycle with an explicit `today`.
    ///
    /// # Errors
    /// Returns an error if the store is not ready, the connection cannot be
    /// opened, or the active table cannot be read. Archive and purge failures
    /// are reported inside the returned [`LoadCycle`].
    pub async fn load_cycle_at(&mut self, today: ExpiryDate) -> Result<LoadCycle, StoreError> {
        self.ensure_ready()?;
        self.manager
            .with_connection(move |conn| Box::pin(expiry::run_cycle(conn, today)))
            .await
    }

    // =========================================================================
    // Active items
    // =========================================================================

    /// Insert an active item and return its assigned id.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateName` if an active item already has this name.
    pub async fn insert(&mut self, fields: &ItemFields) -> Result<i64, StoreError> {
        self.ensure_ready()?;
        fields.validate()?;
        let values = item_values(fields);

        let id = self
            .manager
            .with_connection(move |conn| Box::pin(insert_returning_id(conn, INSERT_ITEM, values)))
            .await?;
        info!(id, name = %fields.name, "Inserted item");
        Ok(id)
    }

    /// All active items in storage order.
    pub async fn list_active(&mut self) -> Result<Vec<Item>, StoreError> {
        self.ensure_ready()?;
        self.manager
            .with_connection(|conn| Box::pin(expiry::fetch_active(conn)))
            .await
    }

    /// Overwrite every field of the item with `id` and return the refreshed list.
    ///
    /// An unknown id changes nothing and is not reported.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateName` if the new name belongs to another item.
    pub async fn update_by_id(
        &mut self,
        id: i64,
        fields: &ItemFields,
    ) -> Result<Vec<Item>, StoreError> {
        self.update_by_id_inner(id, fields, None).await
    }

    /// [`update_by_id`](Self::update_by_id) with a cleanup step (e.g. resetting
    /// an edit form) that runs after the connection is closed, on success or failure.
    pub async fn update_by_id_with_cleanup(
        &mut self,
        id: i64,
        fields: &ItemFields,
        cleanup: Cleanup<'_>,
    ) -> Result<Vec<Item>, StoreError> {
        self.update_by_id_inner(id, fields, Some(cleanup)).await
    }

    async fn update_by_id_inner(
        &mut self,
        id: i64,
        fields: &ItemFields,
        cleanup: Option<Cleanup<'_>>,
    ) -> Result<Vec<Item>, StoreError> {
        self.ensure_ready()?;
        fields.validate()?;
        let mut values = item_values(fields);
        values.push(Value::Integer(id));

        self.manager
            .with_connection_and_cleanup(
                move |conn| Box::pin(write_then_list(conn, UPDATE_ITEM, values)),
                cleanup,
            )
            .await
    }

    /// Delete the item with `id` and return the refreshed list.
    ///
    /// An unknown id changes nothing and is not reported.
    pub async fn delete_by_id(&mut self, id: i64) -> Result<Vec<Item>, StoreError> {
        self.ensure_ready()?;
        self.manager
            .with_connection(move |conn| {
                Box::pin(write_then_list(conn, DELETE_ITEM, vec![Value::Integer(id)]))
            })
            .await
    }

    // =========================================================================
    // Archive
    // =========================================================================

    /// Archived rows ordered by id.
    pub async fn list_archived(&mut self) -> Result<Vec<ArchivedItem>, StoreError> {
        self.ensure_ready()?;
        self.manager
            .with_connection(|conn| Box::pin(fetch_archived(conn)))
            .await
    }

    // =========================================================================
    // General items
    // =========================================================================

    /// # Errors
    /// Returns `StoreError::TableDisabled` if the schema omits `general_items`.
    pub async fn insert_general_item(
        &mut self,
        fields: &GeneralItemFields,
    ) -> Result<i64, StoreError> {
        self.ensure_general()?;
        fields.validate()?;
        let values = general_values(fields);
        self.manager
            .with_connection(move |conn| {
                Box::pin(insert_returning_id(conn, INSERT_GENERAL, values))
            })
            .await
    }

    pub async fn list_general_items(&mut self) -> Result<Vec<GeneralItem>, StoreError> {
        self.ensure_general()?;
        self.manager
            .with_connection(|conn| Box::pin(fetch_general(conn)))
            .await
    }

    pub async fn update_general_item(
        &mut self,
        id: i64,
        fields: &GeneralItemFields,
    ) -> Result<Vec<GeneralItem>, StoreError> {
        self.ensure_general()?;
        fields.validate()?;
        let mut values = general_values(fields);
        values.push(Value::Integer(id));
        self.manager
            .with_connection(move |conn| {
                Box::pin(write_then_list_general(conn, UPDATE_GENERAL, values))
            })
            .await
    }

    pub async fn delete_general_item(&mut self, id: i64) -> Result<Vec<GeneralItem>, StoreError> {
        self.ensure_general()?;
        self.manager
            .with_connection(move |conn| {
                Box::pin(write_then_list_general(
                    conn,
                    DELETE_GENERAL,
                    vec![Value::Integer(id)],
                ))
            })
            .await
    }
}

async fn insert_returning_id(
    conn: &mut dyn Connection,
    sql: &'static str,
    values: Vec<Value>,
) -> Result<i64, StoreError> {
    let changes = conn.run(sql, &values).await?;
    Ok(changes.last_insert_id)
}

/// Apply a write and read the refreshed list in one transaction, so an `Err`
/// always means the write was not kept.
async fn write_then_list(
    conn: &mut dyn Connection,
    sql: &'static str,
    values: Vec<Value>,
) -> Result<Vec<Item>, StoreError> {
    transaction::begin(conn).await?;
    let result = match conn.run(sql, &values).await {
        Ok(changes) => {
            debug!(rows_affected = changes.rows_affected, "Write applied");
            expiry::fetch_active(conn).await
        }
        Err(err) => Err(StoreError::from(err)),
    };
    transaction::finish(conn, result).await
}

async fn fetch_archived(conn: &mut dyn Connection) -> Result<Vec<ArchivedItem>, StoreError> {
    let sql = format!("SELECT {} FROM {} ORDER BY id", ITEM_COLUMNS, ARCHIVE_TABLE);
    let rows = conn.query(&sql, &[]).await?;
    rows.iter().map(archived_from_row).collect()
}

async fn write_then_list_general(
    conn: &mut dyn Connection,
    sql: &'static str,
    values: Vec<Value>,
) -> Result<Vec<GeneralItem>, StoreError> {
    transaction::begin(conn).await?;
    let result = match conn.run(sql, &values).await {
        Ok(_) => fetch_general(conn).await,
        Err(err) => Err(StoreError::from(err)),
    };
    transaction::finish(conn, result).await
}

async fn fetch_general(conn: &mut dyn Connection) -> Result<Vec<GeneralItem>, StoreError> {
    let sql = format!("SELECT {} FROM {}", GENERAL_COLUMNS, GENERAL_TABLE);
    let rows = conn.query(&sql, &[]).await?;
    rows.iter().map(general_from_row).collect()
}
