use booking_notifier::database::DatabaseMigrations;
use booking_notifier::test_utils::get_test_database_url;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to the test database and apply migrations
///
/// Tests that call this are `#[ignore]`d; run them with
/// `DATABASE_URL=... cargo test -- --ignored`.
pub async fn setup_test_pool() -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&get_test_database_url())
        .await
        .expect("Failed to connect to test database");

    DatabaseMigrations::run_all(&pool)
        .await
        .expect("Failed to apply migrations");

    pool
}

/// Generate a unique id for test data
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
