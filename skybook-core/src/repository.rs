use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_shared::{Order, OutcomeApplication, PaymentOutcome, Ticket};

use crate::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Missing, or owned by someone else.
    NotFound,
    /// A payment is in flight.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Repository trait for ticket documents. Only the booking service holds one.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn insert_ticket(&self, ticket: &Ticket) -> CoreResult<()>;

    async fn get_ticket(&self, id: &str) -> CoreResult<Option<Ticket>>;

    /// Owned tickets, least recently changed first.
    async fn list_tickets(&self, user_id: &str) -> CoreResult<Vec<Ticket>>;

    /// Conditionally move an owned ticket from booked/failed to pending.
    /// Returns `None` when the guard did not match.
    async fn mark_pending(&self, id: &str, user_id: &str) -> CoreResult<Option<Ticket>>;

    /// Apply a payment outcome to a pending ticket. Safe to repeat.
    async fn apply_payment_outcome(
        &self,
        id: &str,
        outcome: PaymentOutcome,
    ) -> CoreResult<OutcomeApplication>;

    /// Tickets that have been pending since before `older_than`, oldest first.
    async fn list_stale_pending(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Ticket>>;

    /// Restart the pending clock of a ticket that is still pending.
    /// Returns `false` when the ticket has left `pending` meanwhile.
    async fn touch_pending(&self, id: &str) -> CoreResult<bool>;

    async fn delete_ticket(&self, id: &str, user_id: &str) -> CoreResult<DeleteOutcome>;
}

/// Repository trait for order documents. Only the order service holds one.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_ticket(&self, ticket_id: &str) -> CoreResult<Option<Order>>;

    /// Insert unless an order for the same ticket already exists.
    async fn insert_order(&self, order: &Order) -> CoreResult<InsertOutcome>;

    async fn list_orders(&self, user_id: &str) -> CoreResult<Vec<Order>>;

    async fn list_all_orders(&self) -> CoreResult<Vec<Order>>;
}
