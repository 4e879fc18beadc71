use skybook_core::repository::OrderRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct OrderState {
    pub orders: Arc<dyn OrderRepository>,
}
