use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    /// Schema for the booking service database (tickets).
    pub async fn migrate_booking(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running booking database migrations...");
        sqlx::migrate!("../migrations/booking").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Schema for the order service database (orders).
    pub async fn migrate_order(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running order database migrations...");
        sqlx::migrate!("../migrations/order").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}
