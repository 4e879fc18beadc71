use chrono::Utc;
use skybook_core::repository::TicketRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::saga::PaymentSaga;
use crate::worker::stop_requested;

/// Re-publishes payment requests for tickets stuck in `pending`.
///
/// The order side collapses repeats onto the existing order and booking
/// treats the repeated response as a duplicate. A re-published ticket has its
/// pending clock restarted, so a backlog larger than one sweep's batch rotates.
pub struct PendingReconciler {
    tickets: Arc<dyn TicketRepository>,
    saga: Arc<PaymentSaga>,
    pending_timeout: Duration,
}

impl PendingReconciler {
    pub fn new(tickets: Arc<dyn TicketRepository>, saga: Arc<PaymentSaga>, pending_timeout: Duration) -> Self {
        Self {
            tickets,
            saga,
            pending_timeout,
        }
    }

    /// One pass over stale pending tickets. Returns how many were re-published.
    pub async fn sweep(&self) -> usize {
        let cutoff = match chrono::Duration::from_std(self.pending_timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
        {
            Some(cutoff) => cutoff,
            None => {
                error!(
                    pending_timeout_secs = self.pending_timeout.as_secs(),
                    "Pending timeout out of range, skipping sweep"
                );
                return 0;
            }
        };

        let stale = match self.tickets.list_stale_pending(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                error!("Failed to list pending tickets: {}", e);
                return 0;
            }
        };

        let mut republished = 0;
        for ticket in &stale {
            if let Err(e) = self.saga.publish_request(ticket).await {
                warn!(ticket_id = %ticket.id, "Failed to re-publish payment request: {}", e);
                continue;
            }
            republished += 1;

            if let Err(e) = self.tickets.touch_pending(&ticket.id).await {
                warn!(ticket_id = %ticket.id, "Failed to restart pending clock: {}", e);
            }
        }

        if !stale.is_empty() {
            info!(stale = stale.len(), republished, "Pending tickets reconciled");
        }
        republished
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Pending reconciler started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("Pending reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybook_shared::models::events::ORDER_REQUESTS_TOPIC;
    use skybook_shared::Ticket;
    use skybook_store::{InMemoryTicketRepository, MemoryBus};

    async fn ticket(repo: &InMemoryTicketRepository, id: &str, pending: bool) {
        let mut ticket = Ticket::new("FL-100".to_string(), "u1".to_string(), 2500.0);
        ticket.id = id.to_string();
        repo.insert_ticket(&ticket).await.unwrap();
        if pending {
            repo.mark_pending(id, "u1").await.unwrap();
        }
    }

    fn reconciler(tickets: &Arc<InMemoryTicketRepository>, bus: &MemoryBus) -> PendingReconciler {
        reconciler_with_timeout(tickets, bus, Duration::from_secs(300))
    }

    fn reconciler_with_timeout(
        tickets: &Arc<InMemoryTicketRepository>,
        bus: &MemoryBus,
        pending_timeout: Duration,
    ) -> PendingReconciler {
        let saga = Arc::new(PaymentSaga::new(tickets.clone(), Arc::new(bus.clone())));
        PendingReconciler::new(tickets.clone(), saga, pending_timeout)
    }

    #[tokio::test]
    async fn test_sweep_republishes_only_stale_pending() {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        ticket(&tickets, "stale", true).await;
        ticket(&tickets, "fresh", true).await;
        ticket(&tickets, "booked", false).await;
        tickets
            .set_updated_at("stale", Utc::now() - chrono::Duration::minutes(10))
            .await;
        tickets
            .set_updated_at("booked", Utc::now() - chrono::Duration::minutes(10))
            .await;

        let bus = MemoryBus::new();
        assert_eq!(reconciler(&tickets, &bus).sweep().await, 1);

        let published = bus.published(ORDER_REQUESTS_TOPIC);
        assert_eq!(published, vec![r#"{"ticket_id":"stale","user_id":"u1","price":2500.0}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_continues_past_publish_failure() {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        for id in ["a", "b"] {
            ticket(&tickets, id, true).await;
            tickets.set_updated_at(id, Utc::now() - chrono::Duration::hours(1)).await;
        }

        let bus = MemoryBus::new();
        bus.fail_next_publishes(1);

        assert_eq!(reconciler(&tickets, &bus).sweep().await, 1);
        assert_eq!(bus.published(ORDER_REQUESTS_TOPIC).len(), 1);
    }

    #[tokio::test]
    async fn test_republished_tickets_wait_a_full_timeout() {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        for id in ["a", "b"] {
            ticket(&tickets, id, true).await;
            tickets.set_updated_at(id, Utc::now() - chrono::Duration::hours(1)).await;
        }

        let bus = MemoryBus::new();
        let reconciler = reconciler(&tickets, &bus);

        assert_eq!(reconciler.sweep().await, 2);
        assert_eq!(reconciler.sweep().await, 0);
        assert_eq!(bus.published(ORDER_REQUESTS_TOPIC).len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_skips_sweep() {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        ticket(&tickets, "T1", true).await;
        let bus = MemoryBus::new();

        // Wraps to -1 when cast to i64 seconds
        let wrapped = reconciler_with_timeout(&tickets, &bus, Duration::from_secs(u64::MAX));
        assert_eq!(wrapped.sweep().await, 0);

        // Beyond what a chrono duration can hold in milliseconds
        let huge = reconciler_with_timeout(&tickets, &bus, Duration::from_secs(10_000_000_000_000_000));
        assert_eq!(huge.sweep().await, 0);

        assert!(bus.published(ORDER_REQUESTS_TOPIC).is_empty());
        assert_eq!(tickets.get_ticket("T1").await.unwrap().unwrap().status, skybook_shared::TicketStatus::Pending);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let tickets = Arc::new(InMemoryTicketRepository::new());
        let bus = MemoryBus::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(reconciler(&tickets, &bus).run(Duration::from_millis(10), stop_rx));
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("reconciler did not stop")
            .unwrap();
    }
}
