//! Poll-thread subscription.
//!
//! A [`Subscription`] moves a blocking [`MessageSource`] onto its own OS thread.
//! The thread polls with a bounded timeout and hands each message to the async
//! side as a [`Delivery`], then waits for the verdict before touching the
//! partition again:
//!
//! ```text
//! poll ──► Delivery ──► handler ──► ack  ──► commit offset ──► poll
//!                             └──► nack ──► backoff, rewind ──► poll (same message)
//! ```
//!
//! Waiting on each verdict keeps per-partition order and means an offset is only
//! committed after the business write it guards.

use skybook_core::bus::{InboundMessage, MessageSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub poll_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Commit,
    Retry,
}

/// A message awaiting a verdict. Dropping it without `ack`/`nack` abandons the
/// subscription: nothing is committed and the poll thread stops.
#[derive(Debug)]
pub struct Delivery {
    message: InboundMessage,
    verdict: oneshot::Sender<Verdict>,
}

impl Delivery {
    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    /// Processing finished; commit the offset.
    pub fn ack(self) {
        let _ = self.verdict.send(Verdict::Commit);
    }

    /// Processing failed; redeliver after the retry backoff.
    pub fn nack(self) {
        let _ = self.verdict.send(Verdict::Retry);
    }
}

pub struct Subscription {
    topic: String,
    receiver: mpsc::Receiver<Delivery>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Start the poll thread. The source is owned by that thread from here on.
    pub fn spawn<S: MessageSource>(
        topic: &str,
        source: S,
        options: SubscriptionOptions,
    ) -> std::io::Result<Self> {
        // Capacity 1: the poll thread never runs ahead of the handler.
        let (sender, receiver) = mpsc::channel(1);
        let stop = Arc::new(AtomicBool::new(false));

        let worker = std::thread::Builder::new()
            .name(format!("poll-{}", topic))
            .spawn({
                let stop = stop.clone();
                move || poll_loop(source, sender, stop, options)
            })?;

        info!(topic, "Subscription started");

        Ok(Self {
            topic: topic.to_string(),
            receiver,
            stop,
            worker: Some(worker),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the poll thread has stopped.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Stop polling, close the source and wait for the poll thread to exit.
    pub async fn close(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.receiver.close();
        // Buffered deliveries are dropped unacknowledged and will be redelivered
        while self.receiver.try_recv().is_ok() {}

        if let Some(worker) = self.worker.take() {
            match tokio::task::spawn_blocking(move || worker.join()).await {
                Ok(Ok(())) => {}
                _ => warn!(topic = %self.topic, "Poll thread did not shut down cleanly"),
            }
        }
        info!(topic = %self.topic, "Subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn poll_loop<S: MessageSource>(
    mut source: S,
    sender: mpsc::Sender<Delivery>,
    stop: Arc<AtomicBool>,
    options: SubscriptionOptions,
) {
    while !stop.load(Ordering::SeqCst) {
        let message = match source.poll(options.poll_timeout) {
            None => continue,
            Some(Err(e)) => {
                warn!(error = %e, "Poll failed, continuing");
                continue;
            }
            Some(Ok(message)) => message,
        };

        let (verdict_tx, verdict_rx) = oneshot::channel();
        let delivery = Delivery {
            message: message.clone(),
            verdict: verdict_tx,
        };

        if sender.blocking_send(delivery).is_err() {
            debug!(topic = %message.topic, "Receiver closed, leaving offset uncommitted");
            break;
        }

        match verdict_rx.blocking_recv() {
            Ok(Verdict::Commit) => {
                if let Err(e) = source.commit(&message) {
                    warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Failed to commit offset (message may be redelivered)"
                    );
                }
            }
            Ok(Verdict::Retry) => {
                if !sleep_unless_stopped(options.retry_backoff, &stop) {
                    break;
                }
                if let Err(e) = source.rewind(&message) {
                    warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Failed to rewind for redelivery"
                    );
                }
            }
            Err(_) => {
                debug!(topic = %message.topic, "Delivery abandoned, stopping poll thread");
                break;
            }
        }
    }

    source.close();
    debug!("Poll thread exiting");
}

/// Returns false if `stop` was raised before `duration` elapsed.
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10).min(duration));
    }
    !stop.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBus;
    use skybook_core::bus::EventPublisher;

    fn fast() -> SubscriptionOptions {
        SubscriptionOptions {
            poll_timeout: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(20),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ack_commits_offset() {
        let bus = MemoryBus::new();
        bus.publish("order_requests", "T1", "{}").await.unwrap();

        let mut subscription =
            Subscription::spawn("order_requests", bus.source("order_requests", "g1"), fast()).unwrap();
        let delivery = subscription.recv().await.unwrap();
        assert_eq!(delivery.message().offset, 0);
        assert_eq!(delivery.message().key.as_deref(), Some("T1"));
        delivery.ack();

        subscription.close().await;
        assert_eq!(bus.committed_offset("order_requests", "g1"), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_nack_redelivers_same_message() {
        let bus = MemoryBus::new();
        bus.publish("order_requests", "T1", "first").await.unwrap();
        bus.publish("order_requests", "T2", "second").await.unwrap();

        let mut subscription =
            Subscription::spawn("order_requests", bus.source("order_requests", "g1"), fast()).unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.message().offset, 0);
        first.nack();

        let again = subscription.recv().await.unwrap();
        assert_eq!(again.message().offset, 0);
        assert_eq!(bus.committed_offset("order_requests", "g1"), None);
        again.ack();

        let second = subscription.recv().await.unwrap();
        assert_eq!(second.message().offset, 1);
        second.ack();

        subscription.close().await;
        assert_eq!(bus.committed_offset("order_requests", "g1"), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_leaves_unacked_message_uncommitted() {
        let bus = MemoryBus::new();
        bus.publish("order_responses", "T1", "{}").await.unwrap();

        let mut subscription =
            Subscription::spawn("order_responses", bus.source("order_responses", "g1"), fast()).unwrap();
        let delivery = subscription.recv().await.unwrap();
        drop(delivery);

        subscription.close().await;
        assert_eq!(bus.committed_offset("order_responses", "g1"), None);

        // A new member of the group starts from the uncommitted message
        let mut resumed =
            Subscription::spawn("order_responses", bus.source("order_responses", "g1"), fast()).unwrap();
        let delivery = resumed.recv().await.unwrap();
        assert_eq!(delivery.message().offset, 0);
        delivery.ack();
        resumed.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_idle_subscription() {
        let bus = MemoryBus::new();
        let subscription =
            Subscription::spawn("order_requests", bus.source("order_requests", "g1"), fast()).unwrap();
        assert_eq!(subscription.topic(), "order_requests");
        subscription.close().await;
    }
}
