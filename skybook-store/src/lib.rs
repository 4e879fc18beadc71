pub mod app_config;
pub mod consumer;
pub mod database;
pub mod events;
pub mod memory;
pub mod order_repo;
pub mod subscription;
pub mod ticket_repo;

pub use consumer::KafkaSource;
pub use database::DbClient;
pub use events::EventProducer;
pub use memory::{InMemoryOrderRepository, InMemoryTicketRepository, MemoryBus};
pub use order_repo::PostgresOrderRepository;
pub use subscription::{Delivery, Subscription, SubscriptionOptions};
pub use ticket_repo::PostgresTicketRepository;
