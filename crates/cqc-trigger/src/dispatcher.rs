//! Event dispatch loop
//!
//! Reads events from a broadcast receiver, evaluates every triggered event
//! against each one and forwards what fired. Evaluation can block on remote
//! queries, so it runs on the blocking pool.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cqc_core::Event;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::context::{DriverQuery, EvalContext, RemoteTimeouts};
use crate::manager::{FiredTrigger, TriggeredEventManager};

/// Feeds events to a [`TriggeredEventManager`]
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<TriggeredEventManager>,
    remote: Option<Arc<dyn DriverQuery>>,
    timeouts: RemoteTimeouts,
    night: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(manager: Arc<TriggeredEventManager>) -> Self {
        Self {
            manager,
            remote: None,
            timeouts: RemoteTimeouts::default(),
            night: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach the remote query service
    pub fn with_remote(mut self, remote: Arc<dyn DriverQuery>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Set remote query timeouts
    pub fn with_timeouts(mut self, timeouts: RemoteTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Shared night flag; whoever tracks the clock updates it
    pub fn night_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.night)
    }

    pub fn set_night(&self, is_night: bool) {
        self.night.store(is_night, Ordering::Relaxed);
    }

    /// Context for an evaluation happening now
    pub fn context_for(&self) -> EvalContext {
        let mut ctx = EvalContext::now()
            .with_night(self.night.load(Ordering::Relaxed))
            .with_timeouts(self.timeouts);
        ctx.remote = self.remote.clone();
        ctx
    }

    /// Evaluate one event on the current thread
    pub fn dispatch(&self, event: &Event) -> Vec<FiredTrigger> {
        self.manager.evaluate_all(event, &self.context_for())
    }

    /// Run until the bus closes or the output receiver is dropped
    ///
    /// Returns the number of fired triggers forwarded.
    pub async fn run(&self, rx: broadcast::Receiver<Event>, tx: mpsc::Sender<FiredTrigger>) -> usize {
        self.run_until(rx, tx, std::future::pending()).await
    }

    /// Like [`Dispatcher::run`], but also stops when `shutdown` completes
    ///
    /// Events already queued on the receiver when shutdown arrives are still
    /// evaluated.
    pub async fn run_until<F>(
        &self,
        rx: broadcast::Receiver<Event>,
        tx: mpsc::Sender<FiredTrigger>,
        shutdown: F,
    ) -> usize
    where
        F: Future<Output = ()>,
    {
        self.run_inner(rx, tx, shutdown, Progress::default()).await
    }

    /// Like [`Dispatcher::run_until`], also publishing on `progress` how many
    /// bus events have been handled
    ///
    /// An event counts as handled once its fired triggers are sent, or once
    /// it is known lost to a lag. `progress` is dropped when the loop stops.
    pub async fn run_with_progress<F>(
        &self,
        rx: broadcast::Receiver<Event>,
        tx: mpsc::Sender<FiredTrigger>,
        shutdown: F,
        progress: watch::Sender<u64>,
    ) -> usize
    where
        F: Future<Output = ()>,
    {
        let progress = Progress {
            handled: 0,
            tx: Some(progress),
        };
        self.run_inner(rx, tx, shutdown, progress).await
    }

    async fn run_inner<F>(
        &self,
        mut rx: broadcast::Receiver<Event>,
        tx: mpsc::Sender<FiredTrigger>,
        shutdown: F,
        mut progress: Progress,
    ) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut forwarded = 0;
        info!("Trigger dispatcher started");
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!("Shutdown requested, draining queued events");
                    self.drain(&mut rx, &tx, &mut forwarded, &mut progress).await;
                    break;
                }
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dispatcher lagged behind the event bus");
                        progress.add(skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let open = self.forward(event, &tx, &mut forwarded).await;
            progress.add(1);
            if !open {
                debug!("Fired trigger receiver dropped");
                break;
            }
        }

        info!(forwarded, handled = progress.handled, "Trigger dispatcher stopped");
        forwarded
    }

    /// Evaluate whatever is already queued on the receiver
    ///
    /// A lag loses the overwritten events only; the drain carries on with
    /// the ones behind the gap.
    async fn drain(
        &self,
        rx: &mut broadcast::Receiver<Event>,
        tx: &mpsc::Sender<FiredTrigger>,
        forwarded: &mut usize,
        progress: &mut Progress,
    ) {
        loop {
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dispatcher lagged behind the event bus");
                    progress.add(skipped);
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return,
            };
            let open = self.forward(event, tx, forwarded).await;
            progress.add(1);
            if !open {
                return;
            }
        }
    }

    /// Evaluate one event on the blocking pool and send what fired
    ///
    /// Returns false once the output receiver is gone.
    async fn forward(
        &self,
        event: Event,
        tx: &mpsc::Sender<FiredTrigger>,
        forwarded: &mut usize,
    ) -> bool {
        let manager = Arc::clone(&self.manager);
        let ctx = self.context_for();
        let fired = match tokio::task::spawn_blocking(move || manager.evaluate_all(&event, &ctx)).await
        {
            Ok(fired) => fired,
            Err(e) => {
                warn!(error = %e, "Trigger evaluation task failed");
                return true;
            }
        };

        for trigger in fired {
            if tx.send(trigger).await.is_err() {
                return false;
            }
            *forwarded += 1;
        }
        true
    }
}

/// Count of handled bus events, published if anyone asked for it
#[derive(Default)]
struct Progress {
    handled: u64,
    tx: Option<watch::Sender<u64>>,
}

impl Progress {
    fn add(&mut self, events: u64) {
        self.handled += events;
        if let Some(tx) = &self.tx {
            tx.send_replace(self.handled);
        }
    }
}
