use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::PaymentRequestEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Durable record of a processed payment request. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub ticket_id: String,
    pub price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_request(request: &PaymentRequestEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            ticket_id: request.ticket_id.clone(),
            price: request.price,
            status: OrderStatus::Created,
            created_at: Utc::now(),
        }
    }
}
