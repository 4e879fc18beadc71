use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::repository::{DeleteOutcome, TicketRepository};
use skybook_core::{CoreError, CoreResult};
use skybook_shared::{OutcomeApplication, PaymentOutcome, Ticket, TicketStatus};
use sqlx::PgPool;

const TICKET_COLUMNS: &str = "id, flight_id, user_id, price, status, paid, updated_at";

/// Guarded updates can race with a concurrent re-initiation; retry this many times.
const APPLY_ATTEMPTS: usize = 2;

pub struct PostgresTicketRepository {
    pool: PgPool,
}

impl PostgresTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: &str) -> CoreResult<Option<TicketStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        status
            .map(|s| s.parse::<TicketStatus>().map_err(|e| CoreError::CorruptRecord(e.to_string())))
            .transpose()
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    flight_id: String,
    user_id: String,
    price: f64,
    status: String,
    paid: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = CoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TicketStatus>()
            .map_err(|e| CoreError::CorruptRecord(format!("ticket {}: {}", row.id, e)))?;

        Ok(Ticket {
            id: row.id,
            flight_id: row.flight_id,
            user_id: row.user_id,
            price: row.price,
            status,
            paid: row.paid,
            updated_at: row.updated_at,
        })
    }
}

fn storage_error(e: sqlx::Error) -> CoreError {
    CoreError::StorageError(e.to_string())
}

fn into_tickets(rows: Vec<TicketRow>) -> CoreResult<Vec<Ticket>> {
    rows.into_iter().map(Ticket::try_from).collect()
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn insert_ticket(&self, ticket: &Ticket) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, flight_id, user_id, price, status, paid, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.flight_id)
        .bind(&ticket.user_id)
        .bind(ticket.price)
        .bind(ticket.status.as_str())
        .bind(ticket.paid)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_ticket(&self, id: &str) -> CoreResult<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn list_tickets(&self, user_id: &str) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE user_id = $1 ORDER BY updated_at, id",
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_tickets(rows)
    }

    async fn mark_pending(&self, id: &str, user_id: &str) -> CoreResult<Option<Ticket>> {
        // Status guard makes concurrent pay requests for one ticket mutually exclusive
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tickets
            SET status = 'pending', paid = FALSE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status IN ('booked', 'failed')
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn apply_payment_outcome(
        &self,
        id: &str,
        outcome: PaymentOutcome,
    ) -> CoreResult<OutcomeApplication> {
        let target = TicketStatus::from(outcome);

        for _ in 0..APPLY_ATTEMPTS {
            let updated = sqlx::query(
                r#"
                UPDATE tickets
                SET status = $2, paid = $3, updated_at = NOW()
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(id)
            .bind(target.as_str())
            .bind(target == TicketStatus::Paid)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?
            .rows_affected();

            if updated > 0 {
                return Ok(OutcomeApplication::Applied);
            }

            match self.current_status(id).await? {
                None => return Ok(OutcomeApplication::UnknownTicket),
                // Re-entered pending between the two statements
                Some(TicketStatus::Pending) => continue,
                Some(current) => return Ok(OutcomeApplication::classify(current, outcome)),
            }
        }

        Ok(OutcomeApplication::Stale(TicketStatus::Pending))
    }

    async fn list_stale_pending(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE status = 'pending' AND updated_at < $1
            ORDER BY updated_at, id
            LIMIT 500
            "#,
            TICKET_COLUMNS
        ))
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_tickets(rows)
    }

    async fn touch_pending(&self, id: &str) -> CoreResult<bool> {
        let touched = sqlx::query(
            "UPDATE tickets SET updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        Ok(touched > 0)
    }

    async fn delete_ticket(&self, id: &str, user_id: &str) -> CoreResult<DeleteOutcome> {
        let deleted = sqlx::query(
            "DELETE FROM tickets WHERE id = $1 AND user_id = $2 AND status <> 'pending'",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if deleted > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        match self.get_ticket(id).await? {
            Some(ticket) if ticket.is_owned_by(user_id) && ticket.status == TicketStatus::Pending => {
                Ok(DeleteOutcome::Pending)
            }
            _ => Ok(DeleteOutcome::NotFound),
        }
    }
}
