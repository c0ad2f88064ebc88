//! Table declarations and idempotent schema creation.

use super::manager::ConnectionManager;
use crate::error::StoreError;
use tracing::{debug, info};

/// Active inventory; names are unique here.
pub const ACTIVE_TABLE: &str = "medicines";
/// Rows moved out of the active table on expiry. Ids are copied, names may repeat.
pub const ARCHIVE_TABLE: &str = "expired_items";
/// Non-perishable stock, no expiry column.
pub const GENERAL_TABLE: &str = "general_items";

/// A table and the statement that creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub create_sql: &'static str,
}

const ACTIVE: TableDefinition = TableDefinition {
    name: ACTIVE_TABLE,
    create_sql: r#"
        CREATE TABLE IF NOT EXISTS medicines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE,
            type TEXT,
            quantity TEXT,
            expiry_date TEXT,
            batch_no TEXT,
            price REAL
        )
    "#,
};

const GENERAL: TableDefinition = TableDefinition {
    name: GENERAL_TABLE,
    create_sql: r#"
        CREATE TABLE IF NOT EXISTS general_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            quantity TEXT,
            price REAL
        )
    "#,
};

const ARCHIVE: TableDefinition = TableDefinition {
    name: ARCHIVE_TABLE,
    create_sql: r#"
        CREATE TABLE IF NOT EXISTS expired_items (
            id INTEGER PRIMARY KEY,
            name TEXT,
            type TEXT,
            quantity TEXT,
            expiry_date TEXT,
            batch_no TEXT,
            price REAL
        )
    "#,
};

/// Which optional tables this store declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaConfig {
    pub general_items: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            general_items: true,
        }
    }
}

impl SchemaConfig {
    /// Tables in creation order.
    pub fn tables(&self) -> Vec<TableDefinition> {
        let mut tables = vec![ACTIVE];
        if self.general_items {
            tables.push(GENERAL);
        }
        tables.push(ARCHIVE);
        tables
    }
}

/// Create every configured table inside one guarded call.
///
/// Safe to run on every start.
///
/// # Errors
/// Returns the first statement failure; later tables are not attempted.
pub async fn initialize_schema(manager: &mut ConnectionManager) -> Result<(), StoreError> {
    let tables = manager.schema().tables();
    let count = tables.len();

    manager
        .with_connection(move |conn| {
            Box::pin(async move {
                for table in &tables {
                    conn.execute(table.create_sql).await?;
                    debug!(table = table.name, "Ensured table exists");
                }
                Ok::<(), StoreError>(())
            })
        })
        .await?;

    info!(tables = count, "Tables created successfully");
    Ok(())
}
