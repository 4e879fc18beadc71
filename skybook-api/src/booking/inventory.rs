//! Seat inventory held by the dictionaries service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Flight not found: {0}")]
    FlightNotFound(String),

    #[error("Failed to decrement passenger count: {0}")]
    NoSeats(String),

    #[error("Inventory service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SeatInventory: Send + Sync {
    /// Take one seat on `flight_id`.
    async fn reserve_seat(&self, flight_id: &str) -> Result<(), InventoryError>;
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: Option<String>,
}

pub struct HttpSeatInventory {
    client: Client,
    base_url: String,
}

impl HttpSeatInventory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SeatInventory for HttpSeatInventory {
    async fn reserve_seat(&self, flight_id: &str) -> Result<(), InventoryError> {
        let url = format!("{}/flights/{}/decrement", self.base_url, flight_id);

        let response = self
            .client
            .patch(&url)
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response
            .json::<ErrorDetail>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .unwrap_or_else(|| "Unknown error".to_string());

        Err(match status {
            StatusCode::NOT_FOUND => InventoryError::FlightNotFound(flight_id.to_string()),
            s if s.is_client_error() => InventoryError::NoSeats(detail),
            s => InventoryError::Unavailable(format!("{}: {}", s, detail)),
        })
    }
}
