//! Single-flight background delivery of queued requests.

use crate::store::DurableStore;
use crate::transport::{Outcome, Transport};
use crate::wire::Renderer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, error, instrument, warn};

/// The device identifier requests are delivered under.
///
/// Delivery waits until one is known.
#[derive(Debug, Default)]
pub struct DeviceIdentity {
    id: RwLock<Option<String>>,
}

impl DeviceIdentity {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id: RwLock::new(id),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, id: impl Into<String>) {
        *self.id.write().unwrap_or_else(PoisonError::into_inner) = Some(id.into());
    }
}

/// Starts delivery workers, never more than one at a time.
pub struct Dispatcher {
    store: Arc<DurableStore>,
    transport: Arc<dyn Transport>,
    renderer: Arc<Renderer>,
    device: Arc<DeviceIdentity>,
    running: Arc<AtomicBool>,
    pending_tick: Arc<AtomicBool>,
    /// Number of worker tasks that have not finished yet.
    active: Arc<watch::Sender<usize>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<DurableStore>,
        transport: Arc<dyn Transport>,
        renderer: Arc<Renderer>,
        device: Arc<DeviceIdentity>,
    ) -> Self {
        Self {
            store,
            transport,
            renderer,
            device,
            running: Arc::new(AtomicBool::new(false)),
            pending_tick: Arc::new(AtomicBool::new(false)),
            active: Arc::new(watch::channel(0).0),
        }
    }

    /// Whether a delivery worker is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a delivery worker if requests are pending and none is running.
    ///
    /// Returns whether a worker was started. The caller never waits for
    /// delivery; use [`Dispatcher::wait_idle`] for that.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> bool {
        match self.store.is_empty_requests().await {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "could not read request queue");
                return false;
            }
        }

        // Set before claiming the slot so a running worker that is about to
        // exit still observes this tick.
        self.pending_tick.store(true, Ordering::SeqCst);
        if !claim(&self.running) {
            debug!("delivery worker already running");
            return false;
        }
        self.pending_tick.store(false, Ordering::SeqCst);

        let worker = DeliveryWorker {
            store: self.store.clone(),
            transport: self.transport.clone(),
            renderer: self.renderer.clone(),
            device: self.device.clone(),
        };
        let running = self.running.clone();
        let pending_tick = self.pending_tick.clone();
        self.active.send_modify(|active| *active += 1);
        let task = ActiveTask(self.active.clone());

        tokio::spawn(async move {
            let _task = task;
            loop {
                {
                    let _slot = RunningSlot(running.clone());
                    worker.run().await;
                }
                // a tick refused while the worker ran gets one more pass
                if !pending_tick.swap(false, Ordering::SeqCst) || !claim(&running) {
                    break;
                }
            }
        });

        true
    }

    /// Wait until no delivery worker is running.
    ///
    /// Any number of callers may wait at once; all of them return when the
    /// last worker, including its extra pass, has finished.
    pub async fn wait_idle(&self) {
        let mut active = self.active.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = active.wait_for(|active| *active == 0).await;
    }
}

fn claim(running: &AtomicBool) -> bool {
    running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Releases the single-flight slot when the worker ends, however it ends.
struct RunningSlot(Arc<AtomicBool>);

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Marks a spawned worker task as finished when dropped.
struct ActiveTask(Arc<watch::Sender<usize>>);

impl Drop for ActiveTask {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("delivery worker terminated abnormally");
        }
        self.0.send_modify(|active| *active = active.saturating_sub(1));
    }
}

/// Drains the request queue head first, one exchange at a time.
struct DeliveryWorker {
    store: Arc<DurableStore>,
    transport: Arc<dyn Transport>,
    renderer: Arc<Renderer>,
    device: Arc<DeviceIdentity>,
}

impl DeliveryWorker {
    async fn run(&self) {
        let mut delivered = 0usize;

        loop {
            let request = match self.store.first_request().await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "could not read request queue");
                    break;
                }
            };

            let Some(device_id) = self.device.get() else {
                debug!(
                    kind = request.kind.name(),
                    "no device id available yet, deferring delivery"
                );
                break;
            };

            let outcome = match self.renderer.prepare(&request, &device_id) {
                Ok(wire) => match self.transport.send(&wire).await {
                    Ok(status) => {
                        let outcome = Outcome::classify(status);
                        if outcome != Outcome::Delivered {
                            warn!(status, kind = request.kind.name(), "collector did not accept request");
                        }
                        outcome
                    }
                    Err(e) => {
                        warn!(error = %e, kind = request.kind.name(), "request delivery failed");
                        Outcome::Retry
                    }
                },
                Err(e) => {
                    error!(error = %e, kind = request.kind.name(), "request cannot be rendered, dropping");
                    Outcome::Rejected
                }
            };

            if outcome == Outcome::Retry {
                debug!("stopping delivery until next tick");
                break;
            }

            if let Err(e) = self.store.remove_request(&request).await {
                warn!(error = %e, "could not remove request from queue");
                break;
            }
            if outcome == Outcome::Delivered {
                delivered += 1;
            }
        }

        debug!(delivered, "delivery worker finished");
    }
}
