use anyhow::Context;
use skybook_api::booking::{self, BookingState, HttpSeatInventory, PaymentResponseHandler, PaymentSaga, PendingReconciler};
use skybook_api::telemetry::init_tracing;
use skybook_api::worker::{run_consumer, shutdown_signal};
use skybook_shared::models::events::{ORDER_RESPONSES_GROUP, ORDER_RESPONSES_TOPIC};
use skybook_store::app_config::Config;
use skybook_store::{DbClient, EventProducer, KafkaSource, PostgresTicketRepository, Subscription, SubscriptionOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("skybook_api=debug,skybook_store=debug,tower_http=debug");

    let config = Config::load("booking").context("Failed to load config")?;
    tracing::info!("Starting booking service on port {}", config.server.port);

    // Postgres Connection
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to booking database")?;
    db.migrate_booking().await.context("Failed to run booking migrations")?;
    let tickets = Arc::new(PostgresTicketRepository::new(db.pool.clone()));

    // Kafka Connection
    let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;
    let saga = Arc::new(PaymentSaga::new(tickets.clone(), Arc::new(producer)));

    let inventory = HttpSeatInventory::new(
        &config.dictionaries.url,
        Duration::from_secs(config.dictionaries.timeout_secs),
    )
    .context("Failed to create dictionaries client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let source = KafkaSource::new(&config.kafka.brokers, ORDER_RESPONSES_GROUP, ORDER_RESPONSES_TOPIC)
        .context("Failed to subscribe to order responses")?;
    let subscription = Subscription::spawn(
        ORDER_RESPONSES_TOPIC,
        source,
        SubscriptionOptions {
            poll_timeout: config.kafka.poll_timeout(),
            retry_backoff: config.kafka.retry_backoff(),
        },
    )
    .context("Failed to start poll thread")?;
    let consumer = tokio::spawn(run_consumer(
        "order-responses",
        subscription,
        PaymentResponseHandler::new(saga.clone()),
        shutdown_rx.clone(),
    ));

    let reconciler = match config.saga.reconcile_interval_secs {
        0 => None,
        secs => {
            let reconciler = PendingReconciler::new(
                tickets.clone(),
                saga.clone(),
                Duration::from_secs(config.saga.pending_timeout_secs),
            );
            Some(tokio::spawn(reconciler.run(Duration::from_secs(secs), shutdown_rx.clone())))
        }
    };

    let app = booking::app(BookingState {
        tickets,
        inventory: Arc::new(inventory),
        saga,
    });

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

    consumer.await.context("Response consumer panicked")?;
    if let Some(reconciler) = reconciler {
        reconciler.await.context("Reconciler panicked")?;
    }

    tracing::info!("Booking service stopped");
    Ok(())
}
