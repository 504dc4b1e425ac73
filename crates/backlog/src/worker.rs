//! Single-consumer drain loop over the queue.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use {
    tokio::{sync::Notify, task::JoinHandle, time::sleep},
    tracing::{debug, info, warn},
};

use crate::{store::BacklogStore, types::BacklogItem};

/// Callback that processes one dequeued item through the normal inbound
/// pipeline. Injected so the queue stays decoupled from pipeline internals.
pub type ProcessFn = Arc<
    dyn Fn(BacklogItem) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync,
>;

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Attempts before an item is abandoned in place.
    pub max_retries: i64,
    /// Pause when the queue is empty.
    pub idle_interval: Duration,
    /// Pause after a failed attempt, so a struggling downstream is not
    /// hammered.
    pub failure_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            idle_interval: Duration::from_millis(500),
            failure_backoff: Duration::from_secs(1),
        }
    }
}

/// Drains the backlog one item at a time, in arrival order.
///
/// There is exactly one consumer, so items for the same identity can never
/// be processed concurrently or out of order.
pub struct BacklogWorker {
    store: Arc<dyn BacklogStore>,
    process: ProcessFn,
    cfg: WorkerConfig,
    shutdown: Arc<Notify>,
}

impl BacklogWorker {
    pub fn new(store: Arc<dyn BacklogStore>, process: ProcessFn, cfg: WorkerConfig) -> Self {
        Self {
            store,
            process,
            cfg,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop the loop from outside.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run the drain loop until shutdown is signalled.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("backlog worker started");
            loop {
                tokio::select! {
                    () = self.shutdown.notified() => {
                        info!("backlog worker stopping");
                        return;
                    }
                    () = self.drain_one() => {}
                }
            }
        })
    }

    async fn drain_one(&self) {
        let item = match self.store.fetch_pending(self.cfg.max_retries).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                sleep(self.cfg.idle_interval).await;
                return;
            },
            Err(err) => {
                warn!(error = %err, "backlog fetch failed");
                sleep(self.cfg.failure_backoff).await;
                return;
            },
        };

        let id = item.id;
        let resource = item.resource.clone();
        let last_try = item.retry_count + 1 >= self.cfg.max_retries;
        debug!(id, resource = %resource, retry = item.retry_count, "processing backlog item");
        if let Err(err) = self.store.mark_processing(id).await {
            warn!(id, error = %err, "failed to flag backlog item as processing");
        }

        match (self.process)(item).await {
            Ok(()) => {
                if let Err(err) = self.store.mark_done(id).await {
                    warn!(id, error = %err, "failed to remove finished backlog item");
                }
            },
            Err(err) if last_try => {
                warn!(id, resource = %resource, error = %err, "backlog item exhausted its retries");
                if let Err(err) = self.store.mark_exhausted(id, &err.to_string()).await {
                    warn!(id, error = %err, "failed to park exhausted backlog item");
                }
                sleep(self.cfg.failure_backoff).await;
            },
            Err(err) => {
                warn!(id, resource = %resource, error = %err, "backlog item failed");
                if let Err(err) = self.store.mark_failed(id, &err.to_string()).await {
                    warn!(id, error = %err, "failed to record backlog failure");
                }
                sleep(self.cfg.failure_backoff).await;
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {super::*, crate::store_memory::InMemoryBacklogStore};

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            max_retries: 5,
            idle_interval: Duration::from_millis(5),
            failure_backoff: Duration::from_millis(5),
        }
    }

    async fn wait_until(mut condition: impl AsyncFnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if condition().await {
                    return;
                }
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("worker never reached expected state");
    }

    #[tokio::test]
    async fn drains_in_arrival_order() {
        let store = Arc::new(InMemoryBacklogStore::new());
        for n in 1..=3 {
            store
                .enqueue(&BacklogItem::new("t1", &format!("kf-{n}")))
                .await
                .unwrap();
        }

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_by_fn = Arc::clone(&seen);
        let process: ProcessFn = Arc::new(move |item| {
            let seen = Arc::clone(&seen_by_fn);
            Box::pin(async move {
                seen.lock().unwrap().push(item.resource);
                Ok(())
            })
        });

        let worker = BacklogWorker::new(
            Arc::clone(&store) as Arc<dyn BacklogStore>,
            process,
            fast_config(),
        );
        let shutdown = worker.shutdown_handle();
        let handle = worker.spawn();

        let seen_by_wait = Arc::clone(&seen);
        wait_until(async || seen_by_wait.lock().unwrap().len() == 3).await;
        shutdown.notify_one();
        handle.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), ["kf-1", "kf-2", "kf-3"]);
    }

    #[tokio::test]
    async fn failed_item_is_retried_then_abandoned() {
        let store = Arc::new(InMemoryBacklogStore::new());
        let id = store.enqueue(&BacklogItem::new("t1", "kf-1")).await.unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_by_fn = Arc::clone(&attempts);
        let process: ProcessFn = Arc::new(move |_item| {
            let attempts = Arc::clone(&attempts_by_fn);
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("downstream unavailable")
            })
        });

        let worker = BacklogWorker::new(
            Arc::clone(&store) as Arc<dyn BacklogStore>,
            process,
            fast_config(),
        );
        let shutdown = worker.shutdown_handle();
        let handle = worker.spawn();

        // Exhausted items are parked as failed but stay stored.
        let store_by_wait = Arc::clone(&store);
        wait_until(async || {
            store_by_wait
                .get(id)
                .await
                .unwrap()
                .is_some_and(|i| i.status == crate::BacklogStatus::Failed)
        })
        .await;
        shutdown.notify_one();
        handle.await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert!(store.fetch_pending(i64::MAX).await.unwrap().is_none());
        let abandoned = store.get(id).await.unwrap().unwrap();
        assert_eq!(abandoned.retry_count, 5);
        assert!(abandoned.last_error.is_some());
    }

    #[tokio::test]
    async fn failure_does_not_block_later_items_forever() {
        let store = Arc::new(InMemoryBacklogStore::new());
        store.enqueue(&BacklogItem::new("t1", "kf-bad")).await.unwrap();
        store.enqueue(&BacklogItem::new("t1", "kf-good")).await.unwrap();

        let good_seen = Arc::new(AtomicUsize::new(0));
        let good_by_fn = Arc::clone(&good_seen);
        let process: ProcessFn = Arc::new(move |item| {
            let good = Arc::clone(&good_by_fn);
            Box::pin(async move {
                if item.resource == "kf-bad" {
                    anyhow::bail!("downstream unavailable")
                }
                good.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let worker = BacklogWorker::new(
            Arc::clone(&store) as Arc<dyn BacklogStore>,
            process,
            fast_config(),
        );
        let shutdown = worker.shutdown_handle();
        let handle = worker.spawn();

        let good_by_wait = Arc::clone(&good_seen);
        wait_until(async || good_by_wait.load(Ordering::SeqCst) == 1).await;
        shutdown.notify_one();
        handle.await.unwrap();

        assert_eq!(good_seen.load(Ordering::SeqCst), 1);
    }
}
