use skybook_core::bus::{publish_event, BusError, EventPublisher};
use skybook_core::repository::{InsertOutcome, OrderRepository};
use skybook_core::CoreError;
use skybook_shared::models::events::ORDER_RESPONSES_TOPIC;
use skybook_shared::{Order, PaymentRequestEvent, PaymentResponseEvent};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// First time this ticket was seen; a new order was written.
    Created,
    /// An order already existed; only the response was re-sent.
    AlreadyRecorded,
}

/// Order side of the payment saga.
pub struct OrderFulfillment {
    orders: Arc<dyn OrderRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl OrderFulfillment {
    pub fn new(orders: Arc<dyn OrderRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { orders, publisher }
    }

    /// Record at most one order per ticket, then confirm payment.
    ///
    /// The response is published on every call, so a redelivered request
    /// whose earlier response was lost still gets one.
    pub async fn handle_request(&self, request: &PaymentRequestEvent) -> Result<FulfillmentOutcome, FulfillmentError> {
        let outcome = match self.orders.find_by_ticket(&request.ticket_id).await? {
            Some(existing) => {
                info!(ticket_id = %request.ticket_id, order_id = %existing.id, "Order already recorded");
                FulfillmentOutcome::AlreadyRecorded
            }
            None => {
                let order = Order::from_request(request);
                match self.orders.insert_order(&order).await? {
                    InsertOutcome::Inserted => {
                        info!(
                            ticket_id = %order.ticket_id,
                            order_id = %order.id,
                            user_id = %order.user_id,
                            "Order created"
                        );
                        FulfillmentOutcome::Created
                    }
                    InsertOutcome::AlreadyExists => FulfillmentOutcome::AlreadyRecorded,
                }
            }
        };

        publish_event(
            self.publisher.as_ref(),
            ORDER_RESPONSES_TOPIC,
            &request.ticket_id,
            &PaymentResponseEvent::paid(request.ticket_id.as_str()),
        )
        .await?;

        Ok(outcome)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Storage(#[from] CoreError),

    #[error(transparent)]
    Publish(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybook_shared::OrderStatus;
    use skybook_store::{InMemoryOrderRepository, MemoryBus};

    fn request() -> PaymentRequestEvent {
        PaymentRequestEvent {
            ticket_id: "T1".to_string(),
            user_id: "u1".to_string(),
            price: 2500.0,
        }
    }

    fn fulfillment() -> (OrderFulfillment, Arc<InMemoryOrderRepository>, MemoryBus) {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let bus = MemoryBus::new();
        (OrderFulfillment::new(orders.clone(), Arc::new(bus.clone())), orders, bus)
    }

    #[tokio::test]
    async fn test_request_creates_order_and_confirms() {
        let (fulfillment, orders, bus) = fulfillment();

        let outcome = fulfillment.handle_request(&request()).await.unwrap();
        assert_eq!(outcome, FulfillmentOutcome::Created);

        let order = orders.find_by_ticket("T1").await.unwrap().unwrap();
        assert_eq!(order.user_id, "u1");
        assert_eq!(order.price, 2500.0);
        assert_eq!(order.status, OrderStatus::Created);

        assert_eq!(
            bus.published(ORDER_RESPONSES_TOPIC),
            vec![r#"{"ticket_id":"T1","status":"paid"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_redelivered_request_resends_response_only() {
        let (fulfillment, orders, bus) = fulfillment();

        fulfillment.handle_request(&request()).await.unwrap();
        let outcome = fulfillment.handle_request(&request()).await.unwrap();

        assert_eq!(outcome, FulfillmentOutcome::AlreadyRecorded);
        assert_eq!(orders.count_for_ticket("T1").await, 1);

        let responses = bus.published(ORDER_RESPONSES_TOPIC);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], responses[1]);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_order_for_retry() {
        let (fulfillment, orders, bus) = fulfillment();
        bus.fail_next_publishes(1);

        let err = fulfillment.handle_request(&request()).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Publish(_)));
        assert_eq!(orders.count_for_ticket("T1").await, 1);

        // Redelivery publishes without a second order
        assert_eq!(
            fulfillment.handle_request(&request()).await.unwrap(),
            FulfillmentOutcome::AlreadyRecorded
        );
        assert_eq!(orders.count_for_ticket("T1").await, 1);
        assert_eq!(bus.published(ORDER_RESPONSES_TOPIC).len(), 1);
    }
}
