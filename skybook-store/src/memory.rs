//! In-process implementations of the store and bus contracts.
//!
//! Used by the test suites and for running a service without Postgres or
//! Kafka. Semantics follow the production implementations: guarded status
//! updates, one order per ticket, append-only topic logs with per-group
//! committed offsets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::bus::{BusError, EventPublisher, InboundMessage, MessageSource};
use skybook_core::repository::{DeleteOutcome, InsertOutcome, OrderRepository, TicketRepository};
use skybook_core::CoreResult;
use skybook_shared::{Order, OutcomeApplication, PaymentOutcome, Ticket, TicketStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

// ============================================================================
// Tickets
// ============================================================================

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdate a ticket's last status change.
    pub async fn set_updated_at(&self, id: &str, updated_at: DateTime<Utc>) {
        if let Some(ticket) = self.tickets.write().await.get_mut(id) {
            ticket.updated_at = updated_at;
        }
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }
}

// Same order as the Postgres queries: `ORDER BY updated_at, id`
fn sort_by_last_change(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn insert_ticket(&self, ticket: &Ticket) -> CoreResult<()> {
        self.tickets.write().await.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    async fn get_ticket(&self, id: &str) -> CoreResult<Option<Ticket>> {
        Ok(self.tickets.read().await.get(id).cloned())
    }

    async fn list_tickets(&self, user_id: &str) -> CoreResult<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut owned: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.is_owned_by(user_id))
            .cloned()
            .collect();
        sort_by_last_change(&mut owned);
        Ok(owned)
    }

    async fn mark_pending(&self, id: &str, user_id: &str) -> CoreResult<Option<Ticket>> {
        let mut tickets = self.tickets.write().await;
        let Some(ticket) = tickets.get_mut(id).filter(|t| t.is_owned_by(user_id)) else {
            return Ok(None);
        };

        Ok(ticket.begin_payment().ok().map(|_| ticket.clone()))
    }

    async fn apply_payment_outcome(
        &self,
        id: &str,
        outcome: PaymentOutcome,
    ) -> CoreResult<OutcomeApplication> {
        let mut tickets = self.tickets.write().await;
        Ok(match tickets.get_mut(id) {
            Some(ticket) => ticket.apply_outcome(outcome),
            None => OutcomeApplication::UnknownTicket,
        })
    }

    async fn list_stale_pending(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut stale: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.status == TicketStatus::Pending && t.updated_at < older_than)
            .cloned()
            .collect();
        sort_by_last_change(&mut stale);
        Ok(stale)
    }

    async fn touch_pending(&self, id: &str) -> CoreResult<bool> {
        let mut tickets = self.tickets.write().await;
        Ok(match tickets.get_mut(id).filter(|t| t.status == TicketStatus::Pending) {
            Some(ticket) => {
                ticket.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete_ticket(&self, id: &str, user_id: &str) -> CoreResult<DeleteOutcome> {
        let mut tickets = self.tickets.write().await;
        let status = match tickets.get(id).filter(|t| t.is_owned_by(user_id)) {
            Some(ticket) => ticket.status,
            None => return Ok(DeleteOutcome::NotFound),
        };

        if !status.can_delete() {
            return Ok(DeleteOutcome::Pending);
        }
        tickets.remove(id);
        Ok(DeleteOutcome::Deleted)
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count_for_ticket(&self, ticket_id: &str) -> usize {
        self.orders
            .read()
            .await
            .iter()
            .filter(|o| o.ticket_id == ticket_id)
            .count()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_ticket(&self, ticket_id: &str) -> CoreResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| o.ticket_id == ticket_id)
            .cloned())
    }

    async fn insert_order(&self, order: &Order) -> CoreResult<InsertOutcome> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.ticket_id == order.ticket_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        orders.push(order.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn list_orders(&self, user_id: &str) -> CoreResult<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_orders(&self) -> CoreResult<Vec<Order>> {
        Ok(self.orders.read().await.clone())
    }
}

// ============================================================================
// Bus
// ============================================================================

#[derive(Debug, Clone)]
struct Record {
    key: String,
    payload: String,
}

#[derive(Default)]
struct BusState {
    logs: HashMap<String, Vec<Record>>,
    // (topic, group) -> next offset to read
    committed: HashMap<(String, String), i64>,
    failing_publishes: usize,
}

/// Single-partition, append-only topics shared by every clone.
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Payloads published to `topic`, in offset order.
    pub fn published(&self, topic: &str) -> Vec<String> {
        self.lock()
            .logs
            .get(topic)
            .map(|log| log.iter().map(|r| r.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Make the next `count` publishes fail.
    pub fn fail_next_publishes(&self, count: usize) {
        self.lock().failing_publishes = count;
    }

    pub fn committed_offset(&self, topic: &str, group: &str) -> Option<i64> {
        self.lock()
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
    }

    /// A consumer for `topic` resuming from `group`'s committed offset.
    pub fn source(&self, topic: &str, group: &str) -> MemorySource {
        let cursor = self.committed_offset(topic, group).unwrap_or(0);
        MemorySource {
            bus: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            cursor,
        }
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let mut state = self.lock();
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(BusError::PublishFailed {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        state.logs.entry(topic.to_string()).or_default().push(Record {
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

pub struct MemorySource {
    bus: MemoryBus,
    topic: String,
    group: String,
    cursor: i64,
}

impl MessageSource for MemorySource {
    fn poll(&mut self, timeout: Duration) -> Option<Result<InboundMessage, BusError>> {
        let record = {
            let state = self.bus.lock();
            state
                .logs
                .get(&self.topic)
                .and_then(|log| usize::try_from(self.cursor).ok().and_then(|i| log.get(i)))
                .cloned()
        };

        match record {
            Some(record) => {
                let message = InboundMessage {
                    topic: self.topic.clone(),
                    partition: 0,
                    offset: self.cursor,
                    key: Some(record.key),
                    payload: Some(record.payload.into_bytes()),
                };
                self.cursor += 1;
                Some(Ok(message))
            }
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                None
            }
        }
    }

    fn commit(&mut self, message: &InboundMessage) -> Result<(), BusError> {
        self.bus
            .lock()
            .committed
            .insert((self.topic.clone(), self.group.clone()), message.offset + 1);
        Ok(())
    }

    fn rewind(&mut self, message: &InboundMessage) -> Result<(), BusError> {
        self.cursor = message.offset;
        Ok(())
    }
}
