use anyhow::Context;
use skybook_api::order::{self, OrderFulfillment, OrderState, PaymentRequestHandler};
use skybook_api::telemetry::init_tracing;
use skybook_api::worker::{run_consumer, shutdown_signal};
use skybook_shared::models::events::{ORDER_REQUESTS_GROUP, ORDER_REQUESTS_TOPIC};
use skybook_store::app_config::Config;
use skybook_store::{DbClient, EventProducer, KafkaSource, PostgresOrderRepository, Subscription, SubscriptionOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("skybook_api=debug,skybook_store=debug,tower_http=debug");

    let config = Config::load("order").context("Failed to load config")?;
    tracing::info!("Starting order service on port {}", config.server.port);

    // Postgres Connection
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to order database")?;
    db.migrate_order().await.context("Failed to run order migrations")?;
    let orders = Arc::new(PostgresOrderRepository::new(db.pool.clone()));

    // Kafka Connection
    let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;
    let fulfillment = Arc::new(OrderFulfillment::new(orders.clone(), Arc::new(producer)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let source = KafkaSource::new(&config.kafka.brokers, ORDER_REQUESTS_GROUP, ORDER_REQUESTS_TOPIC)
        .context("Failed to subscribe to order requests")?;
    let subscription = Subscription::spawn(
        ORDER_REQUESTS_TOPIC,
        source,
        SubscriptionOptions {
            poll_timeout: config.kafka.poll_timeout(),
            retry_backoff: config.kafka.retry_backoff(),
        },
    )
    .context("Failed to start poll thread")?;
    let consumer = tokio::spawn(run_consumer(
        "order-requests",
        subscription,
        PaymentRequestHandler::new(fulfillment),
        shutdown_rx,
    ));

    let app = order::app(OrderState { orders });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("Server error")?;

    consumer.await.context("Request consumer panicked")?;

    tracing::info!("Order service stopped");
    Ok(())
}
