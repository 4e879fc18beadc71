use skybook_core::repository::TicketRepository;
use std::sync::Arc;

use super::inventory::SeatInventory;
use super::saga::PaymentSaga;

#[derive(Clone)]
pub struct BookingState {
    pub tickets: Arc<dyn TicketRepository>,
    pub inventory: Arc<dyn SeatInventory>,
    pub saga: Arc<PaymentSaga>,
}
