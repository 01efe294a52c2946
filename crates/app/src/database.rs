//! Database connection management

use sqlx::{PgPool, Postgres, Transaction, migrate::MigrateError, query};

use recoup::ids::ShopUuid;

/// SQL used to set shop context for row-level security.
pub const SET_SHOP_CONTEXT_SQL: &str = "SELECT set_config('app.current_shop_uuid', $1, true)";

/// Postgres pool handle that opens shop-scoped transactions.
#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a transaction and set shop context for RLS policies.
    ///
    /// # Errors
    ///
    /// Returns an error when starting the transaction or setting shop context fails.
    pub async fn begin_shop_transaction(
        &self,
        shop: ShopUuid,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        query(SET_SHOP_CONTEXT_SQL)
            .bind(shop.into_uuid().to_string())
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
