//! Batched asynchronous deletion pipeline.
//!
//! HTTP handlers enqueue [`DeleteRequest`]s into a bounded channel and return
//! immediately. A fixed pool of workers drains the channel, accumulates tokens
//! per user, and flushes them to storage with one `delete_by_tokens` call per
//! user whenever the buffer reaches `batch_size` tokens or `flush_interval`
//! elapses.
//!
//! Failed flushes are logged and not retried. The affected tokens are left in
//! an unknown state for manual reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::delete_request::DeleteRequest;
use crate::domain::repositories::UrlStorage;
use crate::error::AppError;

/// Tuning for [`DeletionPipeline`].
#[derive(Debug, Clone)]
pub struct DeletionPipelineConfig {
    /// Pending requests the queue absorbs before enqueue starts waiting.
    pub queue_capacity: usize,
    pub workers: usize,
    /// Tokens a worker buffers before flushing early.
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// How long enqueue waits on a full queue before reporting backpressure.
    pub enqueue_timeout: Duration,
    /// Deadline for a single `delete_by_tokens` call.
    pub storage_timeout: Duration,
    /// How long shutdown waits for workers to drain the queue.
    pub drain_timeout: Duration,
}

impl Default for DeletionPipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            workers: 5,
            batch_size: 100,
            flush_interval: Duration::from_millis(500),
            enqueue_timeout: Duration::from_millis(100),
            storage_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Bounded queue plus worker pool applying deletes to storage in batches.
pub struct DeletionPipeline {
    sender: RwLock<Option<mpsc::Sender<DeleteRequest>>>,
    receiver: Arc<Mutex<mpsc::Receiver<DeleteRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    enqueue_timeout: Duration,
    drain_timeout: Duration,
    queue_capacity: usize,
}

impl DeletionPipeline {
    /// Spawns the worker pool on the current tokio runtime.
    pub fn start<S>(storage: Arc<S>, config: DeletionPipelineConfig) -> Self
    where
        S: UrlStorage + ?Sized + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_deletion_worker(
                    worker_id,
                    rx.clone(),
                    storage.clone(),
                    config.batch_size.max(1),
                    config.flush_interval,
                    config.storage_timeout,
                ))
            })
            .collect::<Vec<_>>();

        tracing::info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            "Deletion pipeline started"
        );

        Self {
            sender: RwLock::new(Some(tx)),
            receiver: rx,
            workers: Mutex::new(workers),
            enqueue_timeout: config.enqueue_timeout,
            drain_timeout: config.drain_timeout,
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    /// Queues a delete request without waiting for it to be applied.
    ///
    /// Waits at most `enqueue_timeout` when the queue is full. Requests with no
    /// tokens are accepted and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] if the queue stays full past the
    /// timeout or the pipeline has been shut down.
    pub async fn enqueue(&self, request: DeleteRequest) -> Result<(), AppError> {
        if request.is_empty() {
            return Ok(());
        }

        let Some(sender) = self.sender.read().await.clone() else {
            return Err(AppError::unavailable(
                "Deletion pipeline is shut down",
                json!({ "user_id": request.user_id }),
            ));
        };

        let user_id = request.user_id.clone();
        let token_count = request.tokens.len();

        match sender.send_timeout(request, self.enqueue_timeout).await {
            Ok(()) => {
                tracing::debug!(%user_id, token_count, "Delete request queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                metrics::counter!("deletion_enqueue_rejected_total").increment(1);
                tracing::warn!(%user_id, token_count, "Deletion queue full");
                Err(AppError::unavailable(
                    "Deletion queue is full",
                    json!({ "capacity": self.queue_capacity }),
                ))
            }
            Err(SendTimeoutError::Closed(_)) => Err(AppError::unavailable(
                "Deletion pipeline is shut down",
                json!({ "user_id": user_id }),
            )),
        }
    }

    /// Number of requests waiting in the queue.
    pub async fn pending(&self) -> usize {
        match self.sender.read().await.as_ref() {
            Some(sender) => self.queue_capacity - sender.capacity(),
            None => 0,
        }
    }

    /// Stops accepting requests and waits for workers to drain the queue.
    ///
    /// If `drain_timeout` expires first, the workers are aborted and awaited
    /// so none of them touches storage after this returns. Requests still
    /// queued at that point are discarded and counted in the log. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.write().await.take() else {
            return;
        };
        drop(sender);

        let mut workers = std::mem::take(&mut *self.workers.lock().await);
        let total = workers.len();

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(handle) = workers.last_mut() {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Deletion worker panicked");
                }
                workers.pop();
            }
        })
        .await;

        if drained.is_ok() {
            tracing::info!(workers = total, "Deletion pipeline drained");
            return;
        }

        let aborted = workers.len();
        for handle in &workers {
            handle.abort();
        }
        for handle in workers {
            // the in-flight flush of an aborted worker has an unknown outcome
            let _ = handle.await;
        }

        let (requests, tokens) = self.discard_queued().await;
        metrics::counter!("deletion_requests_dropped_total").increment(requests as u64);
        tracing::warn!(
            drain_timeout_ms = self.drain_timeout.as_millis() as u64,
            aborted_workers = aborted,
            dropped_requests = requests,
            dropped_tokens = tokens,
            "Deletion pipeline drain timed out, queued requests dropped"
        );
    }

    /// Empties the queue once no worker holds it. Returns (requests, tokens).
    async fn discard_queued(&self) -> (usize, usize) {
        let mut rx = self.receiver.lock().await;
        rx.close();

        let mut requests = 0;
        let mut tokens = 0;
        while let Ok(request) = rx.try_recv() {
            requests += 1;
            tokens += request.tokens.len();
        }
        (requests, tokens)
    }
}

/// Tokens accumulated by one worker, deduplicated per user.
#[derive(Debug, Default)]
struct DeleteBuffer {
    by_user: HashMap<String, HashSet<String>>,
    len: usize,
}

impl DeleteBuffer {
    fn push(&mut self, request: DeleteRequest) {
        let tokens = self.by_user.entry(request.user_id).or_default();
        for token in request.tokens {
            if tokens.insert(token) {
                self.len += 1;
            }
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn take(&mut self) -> HashMap<String, HashSet<String>> {
        self.len = 0;
        std::mem::take(&mut self.by_user)
    }
}

async fn run_deletion_worker<S>(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DeleteRequest>>>,
    storage: Arc<S>,
    batch_size: usize,
    flush_interval: Duration,
    storage_timeout: Duration,
) where
    S: UrlStorage + ?Sized,
{
    let mut buffer = DeleteBuffer::default();
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = async { rx.lock().await.recv().await } => match received {
                Some(request) => {
                    buffer.push(request);
                    if buffer.len() >= batch_size {
                        flush(worker_id, &mut buffer, storage.as_ref(), storage_timeout).await;
                    }
                }
                None => {
                    flush(worker_id, &mut buffer, storage.as_ref(), storage_timeout).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush(worker_id, &mut buffer, storage.as_ref(), storage_timeout).await;
            }
        }
    }

    tracing::debug!(worker_id, "Deletion worker stopped");
}

async fn flush<S>(worker_id: usize, buffer: &mut DeleteBuffer, storage: &S, storage_timeout: Duration)
where
    S: UrlStorage + ?Sized,
{
    if buffer.is_empty() {
        return;
    }

    for (user_id, tokens) in buffer.take() {
        let tokens: Vec<String> = tokens.into_iter().collect();
        let token_count = tokens.len();
        let started = Instant::now();

        let result = tokio::time::timeout(storage_timeout, storage.delete_by_tokens(&user_id, &tokens))
            .await
            .unwrap_or(Err(AppError::Timeout {
                timeout_ms: storage_timeout.as_millis() as u64,
            }));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(deleted) => {
                metrics::counter!("deletion_tokens_deleted_total").increment(deleted);
                tracing::debug!(worker_id, %user_id, token_count, deleted, elapsed_ms, "Deleted tokens");
            }
            Err(e) => {
                metrics::counter!("deletion_flush_failures_total").increment(1);
                tracing::error!(
                    worker_id,
                    %user_id,
                    token_count,
                    elapsed_ms,
                    error = %e,
                    "Deletion failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{NewRecord, SaveOutcome, UrlRecord};
    use crate::domain::repositories::MockUrlStorage;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Storage whose deletes take a while and which notes writes after close.
    #[derive(Default)]
    struct SlowDeletes {
        closed: AtomicBool,
        deletes: AtomicUsize,
        deletes_after_close: AtomicUsize,
    }

    #[async_trait]
    impl UrlStorage for SlowDeletes {
        async fn save(&self, _: &str, _: &str, _: &str, _: &str) -> Result<SaveOutcome, AppError> {
            unimplemented!()
        }

        async fn save_batch(
            &self,
            _: Vec<NewRecord>,
            _: &str,
            _: &str,
        ) -> Result<Vec<SaveOutcome>, AppError> {
            unimplemented!()
        }

        async fn get(&self, _: &str) -> Result<String, AppError> {
            unimplemented!()
        }

        async fn token_exists(&self, _: &str) -> Result<bool, AppError> {
            unimplemented!()
        }

        async fn get_all_for_user(&self, _: &str) -> Result<Vec<UrlRecord>, AppError> {
            unimplemented!()
        }

        async fn delete_by_tokens(&self, _: &str, tokens: &[String]) -> Result<u64, AppError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.closed.load(Ordering::SeqCst) {
                self.deletes_after_close.fetch_add(1, Ordering::SeqCst);
            }
            Ok(tokens.len() as u64)
        }

        async fn ping(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), AppError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "slow"
        }

        fn atomic_batches(&self) -> bool {
            false
        }
    }

    fn fast_config() -> DeletionPipelineConfig {
        DeletionPipelineConfig {
            queue_capacity: 16,
            workers: 2,
            batch_size: 100,
            flush_interval: Duration::from_millis(20),
            enqueue_timeout: Duration::from_millis(50),
            storage_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_buffer_deduplicates_per_user() {
        let mut buffer = DeleteBuffer::default();
        buffer.push(DeleteRequest::new("u1", vec!["a".into(), "b".into()]));
        buffer.push(DeleteRequest::new("u1", vec!["b".into(), "c".into()]));
        buffer.push(DeleteRequest::new("u2", vec!["a".into()]));

        assert_eq!(buffer.len(), 4);

        let taken = buffer.take();
        assert_eq!(taken["u1"].len(), 3);
        assert_eq!(taken["u2"].len(), 1);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_applies_queued_requests_on_shutdown() {
        let calls: Arc<StdMutex<Vec<(String, Vec<String>)>>> = Arc::default();
        let recorded = calls.clone();

        let mut storage = MockUrlStorage::new();
        storage
            .expect_delete_by_tokens()
            .returning(move |user_id, tokens| {
                recorded
                    .lock()
                    .unwrap()
                    .push((user_id.to_string(), tokens.to_vec()));
                Ok(tokens.len() as u64)
            });

        let pipeline = DeletionPipeline::start(Arc::new(storage), fast_config());
        pipeline
            .enqueue(DeleteRequest::new("u1", vec!["t1".into(), "t2".into()]))
            .await
            .unwrap();
        pipeline.shutdown().await;

        let calls = calls.lock().unwrap();
        let mut tokens: Vec<String> = calls
            .iter()
            .filter(|(user, _)| user == "u1")
            .flat_map(|(_, tokens)| tokens.clone())
            .collect();
        tokens.sort();
        assert_eq!(tokens, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_unavailable() {
        let storage = MockUrlStorage::new();
        let pipeline = DeletionPipeline::start(Arc::new(storage), fast_config());
        pipeline.shutdown().await;

        let result = pipeline
            .enqueue(DeleteRequest::new("u1", vec!["t1".into()]))
            .await;

        assert!(matches!(result, Err(AppError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_empty_request_is_accepted_and_dropped() {
        let mut storage = MockUrlStorage::new();
        storage.expect_delete_by_tokens().times(0);

        let pipeline = DeletionPipeline::start(Arc::new(storage), fast_config());
        assert!(pipeline.enqueue(DeleteRequest::new("u1", vec![])).await.is_ok());
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_retried() {
        let mut storage = MockUrlStorage::new();
        storage
            .expect_delete_by_tokens()
            .times(1)
            .returning(|_, _| Err(AppError::internal("boom", json!({}))));

        let pipeline = DeletionPipeline::start(Arc::new(storage), fast_config());
        pipeline
            .enqueue(DeleteRequest::new("u1", vec!["t1".into()]))
            .await
            .unwrap();
        pipeline.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_reports_backpressure() {
        let mut storage = MockUrlStorage::new();
        storage.expect_delete_by_tokens().returning(|_, tokens| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(tokens.len() as u64)
        });

        let config = DeletionPipelineConfig {
            queue_capacity: 1,
            workers: 1,
            batch_size: 1,
            flush_interval: Duration::from_secs(60),
            enqueue_timeout: Duration::from_millis(10),
            storage_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
        };
        let pipeline = DeletionPipeline::start(Arc::new(storage), config);

        let mut rejected = false;
        for i in 0..10 {
            let request = DeleteRequest::new("u1", vec![format!("t{i}")]);
            if let Err(e) = pipeline.enqueue(request).await {
                assert!(matches!(e, AppError::Unavailable { .. }));
                rejected = true;
                break;
            }
        }

        assert!(rejected);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_drain_timeout_stops_workers_before_storage_closes() {
        let storage = Arc::new(SlowDeletes::default());
        let config = DeletionPipelineConfig {
            queue_capacity: 16,
            workers: 1,
            batch_size: 1,
            flush_interval: Duration::from_secs(60),
            enqueue_timeout: Duration::from_millis(50),
            storage_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_millis(150),
        };
        let pipeline = DeletionPipeline::start(storage.clone(), config);

        for i in 0..10 {
            pipeline
                .enqueue(DeleteRequest::new("u1", vec![format!("t{i}")]))
                .await
                .unwrap();
        }

        pipeline.shutdown().await;
        storage.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(storage.deletes_after_close.load(Ordering::SeqCst), 0);
        assert!(storage.deletes.load(Ordering::SeqCst) < 10);
        assert_eq!(pipeline.pending().await, 0);
    }
}
