use medstock::driver::DriverError;
use medstock::error::DUPLICATE_NAME_MESSAGE;
use medstock::{
    Config, ConnectionManager, Decimal, DomainError, GeneralItemFields, ItemFields, MockDriver,
    Repository, SchemaConfig, SqliteDriver, StoreError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn medicine(name: &str, expiry: &str, price: &str) -> ItemFields {
    ItemFields::parse(name, "syrup", "2 bottles", expiry, "LOT-7", price).unwrap()
}

fn config_for(dir: &TempDir, general_items: bool) -> Config {
    let mut env_map = HashMap::new();
    env_map.insert(
        "MEDSTOCK_DB_DIR".to_string(),
        dir.path().to_string_lossy().to_string(),
    );
    env_map.insert(
        "MEDSTOCK_GENERAL_ITEMS".to_string(),
        general_items.to_string(),
    );
    Config::from_env_map(env_map).unwrap()
}

async fn setup_repo() -> (Repository, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir, true);
    let driver = Arc::new(SqliteDriver::new(config.database_dir.clone()));
    let mut repo = Repository::from_config(driver, &config);
    assert_ok!(repo.initialize().await);
    (repo, temp_dir)
}

#[tokio::test]
async fn test_duplicate_insert_is_reported_and_changes_nothing() {
    let (mut repo, _temp) = setup_repo().await;
    repo.insert(&medicine("Cough Syrup", "2099-01-01", "4.75"))
        .await
        .unwrap();

    let err = assert_err!(
        repo.insert(&medicine("Cough Syrup", "2100-01-01", "5.00"))
            .await
    );
    assert!(err.is_duplicate_name());
    assert_eq!(err.user_message(), DUPLICATE_NAME_MESSAGE);

    let items = repo.list_active().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].price.to_canonical_string(), "4.75");
}

#[tokio::test]
async fn test_invalid_fields_never_reach_the_store() {
    let (mut repo, _temp) = setup_repo().await;

    let mut fields = medicine("Drops", "2099-01-01", "1");
    fields.name = "   ".to_string();
    assert_eq!(
        repo.insert(&fields).await,
        Err(StoreError::Invalid(DomainError::EmptyName))
    );

    let mut fields = medicine("Drops", "2099-01-01", "1");
    fields.price = Decimal::from_str_canonical("-1").unwrap();
    assert!(matches!(
        repo.insert(&fields).await,
        Err(StoreError::Invalid(DomainError::InvalidPrice(_)))
    ));

    assert!(repo.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_price_must_survive_real_column() {
    let (mut repo, _temp) = setup_repo().await;

    let mut fields = medicine("Vaccine", "2099-01-01", "1");
    fields.price = Decimal::from_str_canonical("1234567890.123456789").unwrap();
    assert!(matches!(
        repo.insert(&fields).await,
        Err(StoreError::Invalid(DomainError::InvalidPrice(_)))
    ));

    let id = repo
        .insert(&medicine("Vaccine", "2099-01-01", "1999.95"))
        .await
        .unwrap();
    let items = repo.list_active().await.unwrap();
    assert_eq!(items[0].id, id);
    assert_eq!(items[0].price.to_canonical_string(), "1999.95");
}

#[tokio::test]
async fn test_update_and_delete_return_refreshed_list() {
    let (mut repo, _temp) = setup_repo().await;
    let a = repo.insert(&medicine("A", "2099-01-01", "1")).await.unwrap();
    let b = repo.insert(&medicine("B", "2099-01-01", "2")).await.unwrap();

    let items = repo
        .update_by_id(a, &medicine("A2", "2098-01-01", "1.10"))
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    let updated = items.iter().find(|i| i.id == a).unwrap();
    assert_eq!(updated.name, "A2");
    assert_eq!(updated.expiry_date.raw(), Some("2098-01-01"));
    assert_eq!(updated.price.to_canonical_string(), "1.1");

    let items = repo.delete_by_id(b).await.unwrap();
    assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a]);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir, true);

    let mut repo = Repository::from_config(
        Arc::new(SqliteDriver::new(config.database_dir.clone())),
        &config,
    );
    repo.initialize().await.unwrap();
    repo.insert(&medicine("Insulin", "2099-01-01", "30"))
        .await
        .unwrap();
    repo.close().await.unwrap();
    assert_eq!(repo.list_active().await, Err(StoreError::NotReady));

    let mut reopened = Repository::from_config(
        Arc::new(SqliteDriver::new(config.database_dir.clone())),
        &config,
    );
    reopened.initialize().await.unwrap();
    let items = reopened.list_active().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Insulin");
}

#[tokio::test]
async fn test_general_items_follow_configuration() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir, false);
    let mut repo = Repository::from_config(
        Arc::new(SqliteDriver::new(config.database_dir.clone())),
        &config,
    );
    repo.initialize().await.unwrap();

    let fields = GeneralItemFields {
        name: "Bandage".to_string(),
        quantity: "3 rolls".to_string(),
        price: Decimal::from_str_canonical("1.5").unwrap(),
    };
    assert_eq!(
        repo.insert_general_item(&fields).await,
        Err(StoreError::TableDisabled("general_items"))
    );

    let (mut enabled, _temp) = setup_repo().await;
    let id = enabled.insert_general_item(&fields).await.unwrap();
    let items = enabled.list_general_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, id);
    assert_eq!(items[0].price, fields.price);
}

#[tokio::test]
async fn test_open_failure_surfaces_as_connection_error() {
    let driver = MockDriver::new();
    let mut repo = Repository::new(ConnectionManager::new(
        Arc::new(driver.clone()),
        "inventory",
        SchemaConfig::default(),
    ));
    repo.initialize().await.unwrap();

    let failing = MockDriver::new().fail_open(DriverError::Connection("database is locked".into()));
    let mut locked = Repository::new(ConnectionManager::new(
        Arc::new(failing),
        "inventory",
        SchemaConfig::default(),
    ));
    assert_eq!(
        locked.initialize().await,
        Err(StoreError::Connection("database is locked".to_string()))
    );
    assert!(!locked.manager().is_ready());
    assert_eq!(driver.open_count(), driver.close_count());
}
