// src/core/pool.rs — Bounded worker pool for model dispatch
//
// Each request runs as its own task holding one permit. The caller waits up
// to the deadline, queueing for a permit included; on timeout or shutdown the
// task is detached, not aborted, and whatever it eventually returns is
// dropped. A detached task still ends at its own deadline, which bounds
// `drain` and frees its permit for later turns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::context::ContextWindow;
use super::dispatcher::{DispatchReply, ModelDispatcher};
use crate::infra::errors::ParleyError;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize, shutdown: CancellationToken) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            shutdown,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks spawned and not yet finished, abandoned ones included.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Run one dispatch under the pool, waiting at most `timeout` for it.
    pub async fn run(
        &self,
        dispatcher: Arc<ModelDispatcher>,
        prompt: String,
        window: ContextWindow,
        timeout: Duration,
    ) -> Result<DispatchReply, ParleyError> {
        if self.tracker.is_closed() || self.shutdown.is_cancelled() {
            return Err(ParleyError::Cancelled);
        }

        let secs = timeout.as_secs();
        let cancel = self.shutdown.clone();
        let work = async {
            // Time spent queued for a permit counts against the deadline
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(p) => p,
                Err(_) => return Err(ParleyError::Cancelled),
            };
            // The task carries its own deadline so a stalled request gives
            // its permit back instead of starving later turns.
            let handle = self.tracker.spawn(async move {
                let _permit = permit;
                match tokio::time::timeout(timeout, dispatcher.ask(&prompt, &window, &cancel)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::debug!("Request hit its deadline; releasing its permit");
                        Err(ParleyError::Timeout { secs })
                    }
                }
            });
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ParleyError::Other(anyhow::anyhow!(
                    "dispatch task failed: {e}"
                ))),
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                tracing::debug!("Shutdown while a request was pending; abandoning it");
                Err(ParleyError::Cancelled)
            }
            outcome = tokio::time::timeout(timeout, work) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(timeout_secs = secs, "Request timed out; result will be discarded");
                    Err(ParleyError::Timeout { secs })
                }
            },
        }
    }

    /// Signal-path shutdown: refuse new work and return without waiting.
    pub fn abandon(&self) {
        self.tracker.close();
        self.shutdown.cancel();
    }

    /// Graceful shutdown: refuse new work and wait for in-flight tasks, each
    /// of which ends by its own deadline.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost::PricingTable;
    use crate::core::types::{ModelConfig, ModelKind};
    use crate::provider::local::LocalResponder;
    use crate::provider::{ChatRequest, ChatResponse, ModelProvider, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers after `delay`, tracking peak concurrency.
    struct SlowProvider {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl SlowProvider {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for SlowProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ParleyError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: "done".into(),
                usage: Some(TokenUsage {
                    input_tokens: 1,
                    output_tokens: 1,
                }),
            })
        }
    }

    fn remote(provider: Arc<SlowProvider>) -> Arc<ModelDispatcher> {
        let config = ModelConfig::for_kind(ModelKind::Gpt35Turbo, &PricingTable::builtin());
        Arc::new(ModelDispatcher::remote(provider, config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_deadline() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let provider = SlowProvider::new(Duration::from_secs(2));
        let reply = pool
            .run(remote(provider), "q".into(), ContextWindow::default(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(reply.text, "done");
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_permit_and_bounds_drain() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let provider = SlowProvider::new(Duration::from_secs(3600));
        let start = tokio::time::Instant::now();
        let err = pool
            .run(
                remote(provider.clone()),
                "q".into(),
                ContextWindow::default(),
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Timeout { secs: 30 }));

        pool.drain().await;
        assert!(start.elapsed() <= Duration::from_secs(30));
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(provider.finished.load(Ordering::SeqCst), 0);
        assert_eq!(pool.permits.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_turn_times_out_when_slots_are_stalled() {
        let pool = Arc::new(WorkerPool::new(2, CancellationToken::new()));
        let dispatcher = remote(SlowProvider::new(Duration::from_secs(3600)));

        let mut stalled = Vec::new();
        for i in 0..2 {
            let pool = Arc::clone(&pool);
            let d = Arc::clone(&dispatcher);
            stalled.push(tokio::spawn(async move {
                pool.run(d, format!("q{i}"), ContextWindow::default(), Duration::from_secs(30))
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pool.permits.available_permits(), 0);

        let start = tokio::time::Instant::now();
        let err = pool
            .run(dispatcher, "q2".into(), ContextWindow::default(), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Timeout { secs: 30 }));
        assert!(start.elapsed() <= Duration::from_secs(30));

        for j in stalled {
            assert!(matches!(j.await.unwrap(), Err(ParleyError::Timeout { .. })));
        }
        pool.drain().await;
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_task_keeps_running() {
        let shutdown = CancellationToken::new();
        let pool = Arc::new(WorkerPool::new(2, shutdown.clone()));
        // The local model does not observe cancellation
        let d = Arc::new(ModelDispatcher::local(
            LocalResponder::builtin(),
            Duration::from_secs(5),
        ));

        let p = Arc::clone(&pool);
        let pending = tokio::spawn(async move {
            p.run(d, "hello".into(), ContextWindow::default(), Duration::from_secs(30))
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        pool.abandon();

        assert!(matches!(pending.await.unwrap(), Err(ParleyError::Cancelled)));
        assert_eq!(pool.in_flight(), 1);
        pool.drain().await;
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_size() {
        let pool = Arc::new(WorkerPool::new(2, CancellationToken::new()));
        let provider = SlowProvider::new(Duration::from_secs(1));
        let dispatcher = remote(provider.clone());

        let mut joins = Vec::new();
        for i in 0..5 {
            let pool = Arc::clone(&pool);
            let d = Arc::clone(&dispatcher);
            joins.push(tokio::spawn(async move {
                pool.run(d, format!("q{i}"), ContextWindow::default(), Duration::from_secs(30))
                    .await
            }));
        }
        for j in joins {
            assert!(j.await.unwrap().is_ok());
        }
        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
        assert_eq!(provider.finished.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_returns_cancelled_immediately() {
        let shutdown = CancellationToken::new();
        let pool = Arc::new(WorkerPool::new(2, shutdown.clone()));
        let provider = SlowProvider::new(Duration::from_secs(20));

        let p = Arc::clone(&pool);
        let d = remote(provider);
        let pending = tokio::spawn(async move {
            p.run(d, "q".into(), ContextWindow::default(), Duration::from_secs(30))
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let start = tokio::time::Instant::now();
        pool.abandon();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ParleyError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(pool.is_shut_down());
    }

    #[tokio::test]
    async fn test_run_after_abandon_refused() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        pool.abandon();
        let d = Arc::new(ModelDispatcher::local(LocalResponder::builtin(), Duration::ZERO));
        let err = pool
            .run(d, "hello".into(), ContextWindow::default(), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Cancelled));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_runs_through_pool() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let d = Arc::new(ModelDispatcher::local(
            LocalResponder::builtin(),
            Duration::from_millis(1500),
        ));
        let reply = pool
            .run(d, "hello there".into(), ContextWindow::default(), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(LocalResponder::builtin().pool("greeting").contains(&reply.text));
    }

    #[test]
    fn test_zero_size_clamped() {
        assert_eq!(WorkerPool::new(0, CancellationToken::new()).size(), 1);
    }
}
