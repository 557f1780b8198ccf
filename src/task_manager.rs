//! Tracks the pipeline's spawned tasks and joins them on shutdown.
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawns named tasks that share one shutdown signal and awaits them all
/// when the pipeline stops.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles.lock().push((name, handle));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits for every managed task to finish and returns the names of the
    /// tasks that panicked.
    pub async fn join_all(&self) -> Vec<&'static str> {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        info!("Waiting for {} tasks to complete...", handles.len());

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task finished."),
                Err(e) => {
                    error!(task_name = name, error = %e, "Task panicked during shutdown.");
                    panicked.push(name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        }
        panicked
    }
}

/// Resolves once the shutdown flag is set, or when its sender is gone.
pub async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_all_waits_for_tasks_and_reports_panics() {
        let (tx, rx) = watch::channel(false);
        let manager = TaskManager::new(rx);

        let mut shutdown_rx = manager.shutdown_rx();
        manager.spawn("Waiter", async move {
            shutdown_signalled(&mut shutdown_rx).await;
        });
        manager.spawn("Panicker", async {
            panic!("boom");
        });

        tx.send(true).unwrap();
        let panicked = manager.join_all().await;
        assert_eq!(panicked, vec!["Panicker"]);
    }
}
