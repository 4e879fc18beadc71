use async_trait::async_trait;
use skybook_core::bus::InboundMessage;
use skybook_shared::PaymentResponseEvent;
use std::sync::Arc;
use tracing::{error, warn};

use super::saga::{PaymentSaga, SagaError};
use crate::worker::{Disposition, MessageHandler};

/// Applies `order_responses` events to the ticket store.
pub struct PaymentResponseHandler {
    saga: Arc<PaymentSaga>,
}

impl PaymentResponseHandler {
    pub fn new(saga: Arc<PaymentSaga>) -> Self {
        Self { saga }
    }
}

#[async_trait]
impl MessageHandler for PaymentResponseHandler {
    async fn handle(&self, message: &InboundMessage) -> Disposition {
        let event: PaymentResponseEvent = match message.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Skipping undecodable payment response: {}",
                    e
                );
                return Disposition::Ack;
            }
        };

        match self.saga.apply_response(&event).await {
            Ok(_) => Disposition::Ack,
            Err(SagaError::Storage(e)) => {
                error!(ticket_id = %event.ticket_id, "Failed to apply payment response: {}", e);
                Disposition::Retry
            }
            Err(e) => {
                warn!(ticket_id = %event.ticket_id, "Dropping payment response: {}", e);
                Disposition::Ack
            }
        }
    }
}
