use async_trait::async_trait;
use skybook_core::repository::{InsertOutcome, OrderRepository};
use skybook_core::{CoreError, CoreResult};
use skybook_shared::{Order, OrderStatus};
use sqlx::PgPool;

const ORDER_COLUMNS: &str = "id, user_id, ticket_id, price, status, created_at";

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    ticket_id: String,
    price: f64,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| CoreError::CorruptRecord(format!("order {}: {}", row.id, e)))?;

        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            ticket_id: row.ticket_id,
            price: row.price,
            status,
            created_at: row.created_at,
        })
    }
}

fn storage_error(e: sqlx::Error) -> CoreError {
    CoreError::StorageError(e.to_string())
}

fn into_orders(rows: Vec<OrderRow>) -> CoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn find_by_ticket(&self, ticket_id: &str) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE ticket_id = $1", ORDER_COLUMNS))
                .bind(ticket_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(Order::try_from).transpose()
    }

    async fn insert_order(&self, order: &Order) -> CoreResult<InsertOutcome> {
        // The unique constraint on ticket_id absorbs racing duplicates
        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (id, user_id, ticket_id, price, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (ticket_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(&order.ticket_id)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(match inserted {
            Some(_) => InsertOutcome::Inserted,
            None => InsertOutcome::AlreadyExists,
        })
    }

    async fn list_orders(&self, user_id: &str) -> CoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_orders(rows)
    }

    async fn list_all_orders(&self) -> CoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_orders(rows)
    }
}
