use async_trait::async_trait;
use skybook_core::bus::InboundMessage;
use skybook_store::Subscription;
use tokio::sync::watch;
use tracing::{info, warn};

/// What to do with a message once its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done (or permanently undeliverable); commit the offset.
    Ack,
    /// Transient failure; leave uncommitted and redeliver.
    Retry,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> Disposition;
}

/// Drive `handler` with every message from `subscription` until shutdown.
///
/// Shutdown is only observed between messages: a handler that has started
/// always runs to completion and gets its verdict recorded before the
/// subscription is closed.
pub async fn run_consumer<H: MessageHandler>(
    name: &'static str,
    mut subscription: Subscription,
    handler: H,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(consumer = name, topic = subscription.topic(), "Consumer started");

    loop {
        let delivery = tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown) => break,
            delivery = subscription.recv() => match delivery {
                Some(delivery) => delivery,
                None => {
                    warn!(consumer = name, "Poll thread stopped unexpectedly");
                    break;
                }
            },
        };

        match handler.handle(delivery.message()).await {
            Disposition::Ack => delivery.ack(),
            Disposition::Retry => delivery.nack(),
        }
    }

    subscription.close().await;
    info!(consumer = name, "Consumer stopped");
}

/// Resolves once `true` is sent, or the sender is gone.
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
