use skybook_core::bus::{publish_event, BusError, EventPublisher};
use skybook_core::repository::TicketRepository;
use skybook_core::CoreError;
use skybook_shared::models::events::ORDER_REQUESTS_TOPIC;
use skybook_shared::{OutcomeApplication, PaymentResponseEvent, Ticket, TicketStatus};
use std::sync::Arc;
use tracing::{info, warn};

/// Booking side of the payment saga: starts payments and applies their outcomes.
pub struct PaymentSaga {
    tickets: Arc<dyn TicketRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl PaymentSaga {
    pub fn new(tickets: Arc<dyn TicketRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { tickets, publisher }
    }

    /// Flip an owned ticket to `pending` and publish its payment request.
    ///
    /// A publish failure does not roll the ticket back; it stays `pending`
    /// until the reconciler re-publishes the request.
    pub async fn initiate_payment(&self, ticket_id: &str, caller_id: &str) -> Result<Ticket, SagaError> {
        let ticket = self
            .tickets
            .get_ticket(ticket_id)
            .await?
            .filter(|t| t.is_owned_by(caller_id))
            .ok_or_else(|| SagaError::NotFound(ticket_id.to_string()))?;

        if !ticket.status.can_initiate_payment() {
            return Err(SagaError::PaymentNotAllowed {
                ticket_id: ticket_id.to_string(),
                status: ticket.status,
            });
        }

        // Lost the guard to a concurrent request for the same ticket
        let ticket = self
            .tickets
            .mark_pending(ticket_id, caller_id)
            .await?
            .ok_or_else(|| SagaError::PaymentNotAllowed {
                ticket_id: ticket_id.to_string(),
                status: TicketStatus::Pending,
            })?;

        self.publish_request(&ticket)
            .await
            .map_err(|e| SagaError::PublishFailed {
                ticket_id: ticket.id.clone(),
                source: e,
            })?;

        info!(ticket_id = %ticket.id, user_id = %ticket.user_id, "Payment initiated");
        Ok(ticket)
    }

    /// Idempotently apply a payment outcome to the ticket store.
    pub async fn apply_response(&self, event: &PaymentResponseEvent) -> Result<OutcomeApplication, SagaError> {
        let application = self
            .tickets
            .apply_payment_outcome(&event.ticket_id, event.status)
            .await?;

        match application {
            OutcomeApplication::Applied => {
                info!(ticket_id = %event.ticket_id, status = event.status.as_str(), "Ticket updated")
            }
            OutcomeApplication::Duplicate => {
                info!(ticket_id = %event.ticket_id, status = event.status.as_str(), "Duplicate response ignored")
            }
            OutcomeApplication::Stale(current) => warn!(
                ticket_id = %event.ticket_id,
                current = %current,
                status = event.status.as_str(),
                "Response does not apply to ticket, skipping"
            ),
            OutcomeApplication::UnknownTicket => {
                warn!(ticket_id = %event.ticket_id, "Response for unknown ticket, skipping")
            }
        }

        Ok(application)
    }

    /// Publish the payment request for a ticket that is already `pending`.
    pub async fn publish_request(&self, ticket: &Ticket) -> Result<(), BusError> {
        publish_event(
            self.publisher.as_ref(),
            ORDER_REQUESTS_TOPIC,
            &ticket.id,
            &ticket.payment_request(),
        )
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Ticket {ticket_id} is {status}, payment cannot start")]
    PaymentNotAllowed { ticket_id: String, status: TicketStatus },

    #[error("Ticket {ticket_id} is pending but its payment request was not published: {source}")]
    PublishFailed {
        ticket_id: String,
        #[source]
        source: BusError,
    },

    #[error(transparent)]
    Storage(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybook_shared::{PaymentOutcome, PaymentRequestEvent};
    use skybook_store::{InMemoryTicketRepository, MemoryBus};

    struct Fixture {
        saga: PaymentSaga,
        tickets: Arc<InMemoryTicketRepository>,
        bus: MemoryBus,
    }

    async fn fixture_with_ticket(ticket: &Ticket) -> Fixture {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        tickets.insert_ticket(ticket).await.unwrap();
        let bus = MemoryBus::new();
        Fixture {
            saga: PaymentSaga::new(tickets.clone(), Arc::new(bus.clone())),
            tickets,
            bus,
        }
    }

    fn t1() -> Ticket {
        let mut ticket = Ticket::new("FL-100".to_string(), "u1".to_string(), 2500.0);
        ticket.id = "T1".to_string();
        ticket
    }

    fn requests(bus: &MemoryBus) -> Vec<PaymentRequestEvent> {
        bus.published(ORDER_REQUESTS_TOPIC)
            .iter()
            .map(|p| serde_json::from_str(p).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initiate_payment_publishes_request() {
        let f = fixture_with_ticket(&t1()).await;

        let ticket = f.saga.initiate_payment("T1", "u1").await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);

        let stored = f.tickets.get_ticket("T1").await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Pending);
        assert!(!stored.paid);

        assert_eq!(
            requests(&f.bus),
            vec![PaymentRequestEvent {
                ticket_id: "T1".to_string(),
                user_id: "u1".to_string(),
                price: 2500.0,
            }]
        );
    }

    #[tokio::test]
    async fn test_second_initiate_while_pending_is_rejected() {
        let f = fixture_with_ticket(&t1()).await;
        f.saga.initiate_payment("T1", "u1").await.unwrap();

        let err = f.saga.initiate_payment("T1", "u1").await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::PaymentNotAllowed { status: TicketStatus::Pending, .. }
        ));
        assert_eq!(requests(&f.bus).len(), 1);
    }

    #[tokio::test]
    async fn test_paid_ticket_cannot_be_paid_again() {
        let f = fixture_with_ticket(&t1()).await;
        f.saga.initiate_payment("T1", "u1").await.unwrap();
        f.saga.apply_response(&PaymentResponseEvent::paid("T1")).await.unwrap();

        let err = f.saga.initiate_payment("T1", "u1").await.unwrap_err();
        assert!(matches!(err, SagaError::PaymentNotAllowed { status: TicketStatus::Paid, .. }));
    }

    #[tokio::test]
    async fn test_foreign_ticket_looks_missing() {
        let f = fixture_with_ticket(&t1()).await;

        let err = f.saga.initiate_payment("T1", "intruder").await.unwrap_err();
        assert!(matches!(err, SagaError::NotFound(_)));

        let stored = f.tickets.get_ticket("T1").await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Booked);
        assert!(f.bus.published(ORDER_REQUESTS_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_ticket_pending() {
        let f = fixture_with_ticket(&t1()).await;
        f.bus.fail_next_publishes(1);

        let err = f.saga.initiate_payment("T1", "u1").await.unwrap_err();
        assert!(matches!(err, SagaError::PublishFailed { .. }));

        let stored = f.tickets.get_ticket("T1").await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Pending);
        assert!(f.bus.published(ORDER_REQUESTS_TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_response_application_is_idempotent() {
        let f = fixture_with_ticket(&t1()).await;
        f.saga.initiate_payment("T1", "u1").await.unwrap();
        let response = PaymentResponseEvent::paid("T1");

        assert_eq!(f.saga.apply_response(&response).await.unwrap(), OutcomeApplication::Applied);
        let once = f.tickets.get_ticket("T1").await.unwrap().unwrap();

        assert_eq!(f.saga.apply_response(&response).await.unwrap(), OutcomeApplication::Duplicate);
        let twice = f.tickets.get_ticket("T1").await.unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.status, TicketStatus::Paid);
        assert!(twice.paid);
    }

    #[tokio::test]
    async fn test_response_for_booked_ticket_is_stale() {
        let f = fixture_with_ticket(&t1()).await;

        let result = f.saga.apply_response(&PaymentResponseEvent::paid("T1")).await.unwrap();
        assert_eq!(result, OutcomeApplication::Stale(TicketStatus::Booked));

        let stored = f.tickets.get_ticket("T1").await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Booked);
        assert!(!stored.paid);
    }

    #[tokio::test]
    async fn test_failed_outcome_allows_retry() {
        let f = fixture_with_ticket(&t1()).await;
        f.saga.initiate_payment("T1", "u1").await.unwrap();
        f.saga
            .apply_response(&PaymentResponseEvent {
                ticket_id: "T1".to_string(),
                status: PaymentOutcome::Failed,
            })
            .await
            .unwrap();

        let ticket = f.saga.initiate_payment("T1", "u1").await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(requests(&f.bus).len(), 2);
    }
}
