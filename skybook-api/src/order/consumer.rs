use async_trait::async_trait;
use skybook_core::bus::InboundMessage;
use skybook_shared::PaymentRequestEvent;
use std::sync::Arc;
use tracing::{error, warn};

use super::fulfillment::OrderFulfillment;
use crate::worker::{Disposition, MessageHandler};

/// Turns `order_requests` events into orders and `order_responses` events.
pub struct PaymentRequestHandler {
    fulfillment: Arc<OrderFulfillment>,
}

impl PaymentRequestHandler {
    pub fn new(fulfillment: Arc<OrderFulfillment>) -> Self {
        Self { fulfillment }
    }
}

#[async_trait]
impl MessageHandler for PaymentRequestHandler {
    async fn handle(&self, message: &InboundMessage) -> Disposition {
        let request: PaymentRequestEvent = match message.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Skipping undecodable payment request: {}",
                    e
                );
                return Disposition::Ack;
            }
        };

        match self.fulfillment.handle_request(&request).await {
            Ok(_) => Disposition::Ack,
            Err(e) => {
                error!(ticket_id = %request.ticket_id, "Failed to fulfil payment request: {}", e);
                Disposition::Retry
            }
        }
    }
}
