/// Named background pollers with coordinated shutdown
///
/// Each poller runs its task on a fixed interval until the set is disposed.
/// Disposal is cooperative first (a watch signal ends each loop at its next
/// select point) and forceful second (abort), so a poller stuck in a slow
/// tick cannot delay teardown.
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct PollerSet {
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for PollerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerSet {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a repeating task. The first tick fires after one full interval.
    /// A failed tick is logged and the schedule continues.
    pub fn spawn<F, Fut>(&self, name: &str, interval: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let mut rx = self.shutdown.subscribe();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            debug!("poller '{}' started ({}ms interval)", task_name, interval.as_millis());
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = tick().await {
                            warn!("poller '{}' tick failed: {:#}", task_name, e);
                        }
                    }
                    _ = rx.changed() => {
                        debug!("poller '{}' stopping", task_name);
                        break;
                    }
                }
            }
        });
        self.tasks.lock().push((name.to_string(), handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Stop all pollers. Idempotent.
    pub fn dispose(&self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks.lock().drain(..) {
            handle.abort();
            debug!("poller '{}' disposed", name);
        }
    }
}

impl Drop for PollerSet {
    fn drop(&mut self) {
        self.dispose();
    }
}
