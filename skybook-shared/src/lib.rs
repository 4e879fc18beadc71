pub mod models;

pub use models::events::{PaymentOutcome, PaymentRequestEvent, PaymentResponseEvent};
pub use models::order::{Order, OrderStatus};
pub use models::ticket::{OutcomeApplication, Ticket, TicketError, TicketStatus};
