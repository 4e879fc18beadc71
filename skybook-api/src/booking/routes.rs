use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use skybook_core::repository::DeleteOutcome;
use skybook_shared::{Ticket, TicketStatus};
use tracing::info;

use super::inventory::InventoryError;
use super::saga::SagaError;
use super::state::BookingState;
use crate::error::AppError;
use crate::identity::CallerId;

pub fn app(state: BookingState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/tickets", post(create_ticket).get(list_tickets))
        .route("/tickets/{ticket_id}", axum::routing::delete(delete_ticket))
        .route("/tickets/{ticket_id}/pay", patch(pay_ticket))
        .with_state(state);

    crate::with_common_layers(router)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub flight_id: String,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTicketResponse {
    pub ticket_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PayTicketResponse {
    pub ticket_id: String,
    pub status: TicketStatus,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TicketResponse {
    pub ticket_id: String,
    pub flight_id: String,
    pub user_id: String,
    pub price: f64,
    pub status: TicketStatus,
    pub paid: bool,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            ticket_id: ticket.id,
            flight_id: ticket.flight_id,
            user_id: ticket.user_id,
            price: ticket.price,
            status: ticket.status,
            paid: ticket.paid,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// POST /tickets
pub async fn create_ticket(
    State(state): State<BookingState>,
    CallerId(user_id): CallerId,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<CreateTicketResponse>, AppError> {
    if req.flight_id.trim().is_empty() {
        return Err(AppError::ValidationError("flight_id is required".to_string()));
    }
    if !req.price.is_finite() || req.price < 0.0 {
        return Err(AppError::ValidationError("price must be a non-negative number".to_string()));
    }

    state.inventory.reserve_seat(&req.flight_id).await?;

    let ticket = Ticket::new(req.flight_id, user_id, req.price);
    state.tickets.insert_ticket(&ticket).await?;

    info!(ticket_id = %ticket.id, flight_id = %ticket.flight_id, "Ticket booked");
    Ok(Json(CreateTicketResponse { ticket_id: ticket.id }))
}

/// PATCH /tickets/{ticket_id}/pay
pub async fn pay_ticket(
    State(state): State<BookingState>,
    CallerId(user_id): CallerId,
    Path(ticket_id): Path<String>,
) -> Result<Json<PayTicketResponse>, AppError> {
    let ticket = state.saga.initiate_payment(&ticket_id, &user_id).await?;

    Ok(Json(PayTicketResponse {
        ticket_id: ticket.id,
        status: ticket.status,
    }))
}

/// GET /tickets
pub async fn list_tickets(
    State(state): State<BookingState>,
    CallerId(user_id): CallerId,
) -> Result<Json<Vec<TicketResponse>>, AppError> {
    let tickets = state.tickets.list_tickets(&user_id).await?;
    Ok(Json(tickets.into_iter().map(TicketResponse::from).collect()))
}

/// DELETE /tickets/{ticket_id}
pub async fn delete_ticket(
    State(state): State<BookingState>,
    CallerId(user_id): CallerId,
    Path(ticket_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    match state.tickets.delete_ticket(&ticket_id, &user_id).await? {
        DeleteOutcome::Deleted => Ok(Json(MessageResponse {
            message: format!("Ticket {} deleted successfully", ticket_id),
        })),
        DeleteOutcome::NotFound => Err(AppError::NotFoundError(
            "Ticket not found or not yours".to_string(),
        )),
        DeleteOutcome::Pending => Err(AppError::ConflictError(format!(
            "Ticket {} has a payment in progress",
            ticket_id
        ))),
    }
}

impl From<SagaError> for AppError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::NotFound(_) => AppError::NotFoundError("Ticket not found or not yours".to_string()),
            e @ SagaError::PaymentNotAllowed { .. } => AppError::ConflictError(e.to_string()),
            e @ SagaError::PublishFailed { .. } => AppError::BadGatewayError(e.to_string()),
            SagaError::Storage(e) => e.into(),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            e @ InventoryError::FlightNotFound(_) => AppError::NotFoundError(e.to_string()),
            e @ InventoryError::NoSeats(_) => AppError::ConflictError(e.to_string()),
            e @ InventoryError::Unavailable(_) => AppError::BadGatewayError(e.to_string()),
        }
    }
}
