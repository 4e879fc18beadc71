//! Order service: records payment requests and confirms them back to booking.

pub mod consumer;
pub mod fulfillment;
pub mod routes;
pub mod state;

pub use consumer::PaymentRequestHandler;
pub use fulfillment::{FulfillmentError, FulfillmentOutcome, OrderFulfillment};
pub use routes::app;
pub use state::OrderState;
