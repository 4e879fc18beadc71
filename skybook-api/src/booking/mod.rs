//! Booking service: ticket catalog and the initiating side of the payment saga.

pub mod consumer;
pub mod inventory;
pub mod reconcile;
pub mod routes;
pub mod saga;
pub mod state;

pub use consumer::PaymentResponseHandler;
pub use inventory::{HttpSeatInventory, InventoryError, SeatInventory};
pub use reconcile::PendingReconciler;
pub use routes::app;
pub use saga::{PaymentSaga, SagaError};
pub use state::BookingState;
