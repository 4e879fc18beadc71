use serde::{Deserialize, Serialize};

/// Topic carrying payment requests from booking to order.
pub const ORDER_REQUESTS_TOPIC: &str = "order_requests";
/// Topic carrying payment outcomes from order back to booking.
pub const ORDER_RESPONSES_TOPIC: &str = "order_responses";

pub const ORDER_REQUESTS_GROUP: &str = "order_requests_group";
pub const ORDER_RESPONSES_GROUP: &str = "order_responses_group";

/// Published by booking when a ticket enters `pending`.
/// Field names and order are part of the wire contract.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentRequestEvent {
    pub ticket_id: String,
    pub user_id: String,
    pub price: f64,
}

/// Published by order once the payment has been recorded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentResponseEvent {
    pub ticket_id: String,
    pub status: PaymentOutcome,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Paid => "paid",
            PaymentOutcome::Failed => "failed",
        }
    }
}

impl PaymentResponseEvent {
    pub fn paid(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            status: PaymentOutcome::Paid,
        }
    }
}
