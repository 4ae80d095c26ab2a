use sqlx::PgPool;
use tablesync_config::shared::{PgConnectionConfig, TlsConfig};
use tablesync_postgres::sqlx::test_utils::{create_pg_database, drop_pg_database};
use tablesync_postgres::types::TableName;
use uuid::Uuid;

/// Schema holding the tables created by tests.
pub const TEST_DATABASE_SCHEMA: &str = "test";

/// Returns `name` qualified with [`TEST_DATABASE_SCHEMA`].
///
/// # Panics
/// Panics if `name` is not a valid identifier.
pub fn test_table_name(name: &str) -> TableName {
    TableName::parse(&format!("{TEST_DATABASE_SCHEMA}.{name}")).expect("Invalid test table name")
}

/// Connection settings for a fresh, uniquely named database on the local test server.
///
/// Read from `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and
/// the optional `TESTS_DATABASE_PASSWORD`.
fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
    }
}

/// A throwaway database living for the duration of one test.
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Runs `sql` against the database.
    ///
    /// # Panics
    /// Panics if the statement fails.
    pub async fn execute(&self, sql: &str) {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .unwrap_or_else(|err| panic!("Failed to execute test statement `{sql}`: {err}"));
    }

    /// Closes the pool and drops the database.
    pub async fn drop_database(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}

/// Creates a uniquely named database with the [`TEST_DATABASE_SCHEMA`] schema.
///
/// # Panics
/// Panics if the database or schema cannot be created.
pub async fn spawn_target_database() -> TestDatabase {
    let config = local_pg_connection_config();
    let pool = create_pg_database(&config).await;

    let database = TestDatabase { config, pool };
    database
        .execute(&format!("create schema {TEST_DATABASE_SCHEMA}"))
        .await;

    database
}
