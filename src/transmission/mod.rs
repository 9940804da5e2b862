use std::collections::HashMap;
use std::future::poll_fn;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, error, warn};

use crate::config::{Config, MAX_DURATION};
use crate::event::{DestinationKey, Event};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::serializer;
use crate::transport::{BatchRequest, Transport};

enum Command {
    Enqueue(DestinationKey, Event),
    Flush,
    Shutdown(oneshot::Sender<()>),
    #[cfg(test)]
    Barrier(oneshot::Sender<()>),
}

/// Batches events per destination and delivers them through a [`Transport`].
///
/// Every buffer and timer is owned by one worker task; handles only send it
/// commands, so `enqueue` and `flush` never block and never fail from the
/// caller's side. A destination flushes when its queue reaches
/// `max_batch_size` or when its timer, armed by the first event after the
/// previous flush, fires `send_frequency` later, whichever comes first.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Transmission {
    tx: mpsc::UnboundedSender<Command>,
}

impl Transmission {
    pub fn new<T: Transport>(config: &Config, transport: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(config, Arc::new(transport), rx);
        tokio::spawn(worker.run());
        Self { tx }
    }

    /// Hand an event to the worker. Events without a write key or dataset
    /// are dropped here.
    pub fn enqueue(&self, event: Event) {
        let Some(key) = event.destination() else {
            warn!(
                write_key_set = event.write_key.is_some(),
                dataset_set = event.dataset.is_some(),
                "event discarded: missing write key or dataset"
            );
            return;
        };

        if self.tx.send(Command::Enqueue(key, event)).is_err() {
            warn!("event discarded: transmission is shut down");
        }
    }

    /// Flush every non-empty destination now.
    pub fn flush(&self) {
        if self.tx.send(Command::Flush).is_err() {
            debug!("flush ignored: transmission is shut down");
        }
    }

    /// Flush everything, wait for in-flight deliveries (retries included),
    /// then stop the worker. Later events are dropped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Resolves once the worker has handled every command sent before it.
    #[cfg(test)]
    pub(crate) async fn barrier(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

#[derive(Default)]
struct DestinationBuffer {
    queue: Vec<Event>,
    /// Set while a deferred flush is scheduled for this destination.
    pending_timer: Option<delay_queue::Key>,
}

struct Worker<T: Transport> {
    transport: Arc<T>,
    max_batch_size: usize,
    send_frequency: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
    buffers: HashMap<DestinationKey, DestinationBuffer>,
    timers: DelayQueue<DestinationKey>,
    deliveries: JoinSet<()>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<T: Transport> Worker<T> {
    fn new(config: &Config, transport: Arc<T>, rx: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            transport,
            max_batch_size: config.max_batch_size.max(1),
            // Hand-built configs skip parse-time validation.
            send_frequency: config.send_frequency.min(MAX_DURATION),
            max_attempts: config.max_attempts,
            retry_base_delay: config.retry_base_delay,
            buffers: HashMap::new(),
            timers: DelayQueue::new(),
            deliveries: JoinSet::new(),
            rx,
        }
    }

    async fn run(mut self) {
        loop {
            if let ControlFlow::Break(done) = self.tick().await {
                let mut waiters: Vec<oneshot::Sender<()>> = done.into_iter().collect();
                self.rx.close();
                while let Ok(command) = self.rx.try_recv() {
                    match command {
                        Command::Enqueue(key, _) => {
                            warn!(dataset = %key.dataset, "event discarded: transmission is shut down");
                        }
                        Command::Shutdown(done) => waiters.push(done),
                        #[cfg(test)]
                        Command::Barrier(done) => waiters.push(done),
                        Command::Flush => {}
                    }
                }

                self.flush_all();
                self.drain_deliveries().await;
                for done in waiters {
                    let _ = done.send(());
                }
                debug!("transmission worker stopped");
                return;
            }
        }
    }

    /// Handle one command, timer expiry, or finished delivery.
    ///
    /// Breaks on shutdown, carrying the caller's completion signal if any
    /// (none when every handle was dropped).
    async fn tick(&mut self) -> ControlFlow<Option<oneshot::Sender<()>>> {
        tokio::select! {
            command = self.rx.recv() => match command {
                Some(Command::Enqueue(key, event)) => self.write_event(key, event),
                Some(Command::Flush) => self.flush_all(),
                Some(Command::Shutdown(done)) => return ControlFlow::Break(Some(done)),
                #[cfg(test)]
                Some(Command::Barrier(done)) => {
                    let _ = done.send(());
                }
                None => return ControlFlow::Break(None),
            },
            Some(expired) = poll_fn(|cx| self.timers.poll_expired(cx)), if !self.timers.is_empty() => {
                let key = expired.into_inner();
                if let Some(buffer) = self.buffers.get_mut(&key) {
                    // The entry left the queue when it was yielded.
                    buffer.pending_timer = None;
                }
                self.flush_if_needed(&key);
            }
            Some(result) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                if let Err(e) = result {
                    error!(error = %e, "delivery task panicked");
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn write_event(&mut self, key: DestinationKey, event: Event) {
        let buffer = self.buffers.entry(key.clone()).or_default();
        buffer.queue.push(event);

        if buffer.queue.len() >= self.max_batch_size {
            self.flush_if_needed(&key);
        } else if buffer.pending_timer.is_none() {
            buffer.pending_timer = Some(self.timers.insert(key, self.send_frequency));
        }
    }

    fn flush_all(&mut self) {
        let keys: Vec<DestinationKey> = self.buffers.keys().cloned().collect();
        for key in &keys {
            self.flush_if_needed(key);
        }
    }

    /// Snapshot and clear one destination's queue, then deliver the batch in
    /// the background. The buffer entry stays in the map.
    fn flush_if_needed(&mut self, key: &DestinationKey) {
        let Some(buffer) = self.buffers.get_mut(key) else {
            warn!(dataset = %key.dataset, "no buffer for destination");
            return;
        };

        if let Some(timer) = buffer.pending_timer.take() {
            self.timers.remove(&timer);
        }

        if buffer.queue.is_empty() {
            debug!(dataset = %key.dataset, "no events to send");
            return;
        }

        let events: Vec<Event> = buffer.queue.drain(..).collect();
        let body = match serializer::encode_batch(&events) {
            Ok(body) => body,
            Err(e) => {
                error!(
                    dataset = %key.dataset,
                    events = events.len(),
                    error = %e,
                    "failed to encode batch, dropping"
                );
                return;
            }
        };

        let request = BatchRequest::new(key, body, events.len());
        debug!(
            dataset = %request.dataset,
            events = request.event_count,
            "sending batch"
        );

        let transport = Arc::clone(&self.transport);
        let policy = RetryPolicy::new(self.max_attempts, self.retry_base_delay);
        self.deliveries.spawn(deliver(transport, request, policy));
    }

    async fn drain_deliveries(&mut self) {
        while let Some(result) = self.deliveries.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "delivery task panicked");
            }
        }
    }
}

/// Send one batch until the retry policy is satisfied or gives up.
async fn deliver<T: Transport>(transport: Arc<T>, request: BatchRequest, mut policy: RetryPolicy) {
    loop {
        let outcome = transport.send(&request).await;
        let decision = policy.on_outcome(&outcome);
        match decision {
            RetryDecision::Done => {
                debug!(
                    dataset = %request.dataset,
                    events = request.event_count,
                    attempts = policy.attempts(),
                    "batch delivered"
                );
                return;
            }
            RetryDecision::RetryAfter(delay) => {
                match &outcome {
                    Ok(status) => warn!(
                        dataset = %request.dataset,
                        status = status.as_u16(),
                        attempt = policy.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "batch rejected, retrying"
                    ),
                    Err(e) => warn!(
                        dataset = %request.dataset,
                        error = %e,
                        attempt = policy.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "batch send failed, retrying"
                    ),
                }
                tokio::time::sleep(delay).await;
            }
            RetryDecision::GiveUp => {
                let status = outcome.as_ref().ok().map(|s| s.as_u16());
                let error = outcome.as_ref().err().map(|e| e.to_string());
                error!(
                    dataset = %request.dataset,
                    events = request.event_count,
                    attempts = policy.attempts(),
                    ?status,
                    ?error,
                    "giving up on batch, dropping"
                );
                return;
            }
        }
    }
}
