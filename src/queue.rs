//! Serialized request queue.
//!
//! All automation shares one browser/session, so requests are processed
//! one at a time by a single worker task, strictly in arrival order.
//! Enqueueing and status polling never block on the automation; they only
//! touch the in-memory state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::LinkCache;

/// Rough per-item processing time used for poller ETA estimates.
pub const SECONDS_PER_REQUEST: u64 = 30;

/// Where a request currently is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Queued { position: usize },
    Processing,
    Completed { url: String },
    Failed { error: String },
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Queued { .. } => "queued",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed { .. } => "completed",
            RequestStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed { .. } | RequestStatus::Failed { .. }
        )
    }
}

/// One client's pending request to resolve a document id.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub request_id: String,
    pub document_id: String,
    pub client_ip: String,
    pub enqueued_at: Instant,
    pub status: RequestStatus,
    pub finished_at: Option<Instant>,
}

/// Resolves a document id to a download URL. The production implementation
/// drives the shared browser; tests substitute a scripted fake.
#[async_trait]
pub trait DownloadResolver: Send {
    async fn resolve(&mut self, document_id: &str) -> anyhow::Result<String>;
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<String>,
    requests: HashMap<String, DownloadRequest>,
}

/// Handle shared by the HTTP handlers and the worker task.
#[derive(Clone)]
pub struct RequestQueue {
    state: Arc<Mutex<QueueState>>,
    wake: Arc<Notify>,
    retention: Duration,
}

impl RequestQueue {
    /// `retention` is how long finished requests stay pollable.
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            wake: Arc::new(Notify::new()),
            retention,
        }
    }

    /// Add a request and return its id immediately.
    pub fn enqueue(&self, document_id: &str, client_ip: &str) -> String {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().simple());

        {
            let mut state = self.state.lock().unwrap();
            state.backlog.push_back(request_id.clone());
            let position = state.backlog.len();
            state.requests.insert(
                request_id.clone(),
                DownloadRequest {
                    request_id: request_id.clone(),
                    document_id: document_id.to_string(),
                    client_ip: client_ip.to_string(),
                    enqueued_at: Instant::now(),
                    status: RequestStatus::Queued { position },
                    finished_at: None,
                },
            );
            info!(%request_id, document_id, position, "Request queued");
        }

        self.wake.notify_one();
        request_id
    }

    /// Current view of a request; finished entries disappear once past
    /// retention.
    pub fn status(&self, request_id: &str) -> Option<DownloadRequest> {
        let mut state = self.state.lock().unwrap();
        prune(&mut state, self.retention);
        state.requests.get(request_id).cloned()
    }

    pub fn backlog_len(&self) -> usize {
        self.state.lock().unwrap().backlog.len()
    }

    /// Pop the next request, mark it processing and re-number the rest.
    fn take_next(&self) -> Option<DownloadRequest> {
        let mut state = self.state.lock().unwrap();
        let request_id = state.backlog.pop_front()?;

        // Everything left moves up one slot.
        let remaining: Vec<(String, usize)> = state
            .backlog
            .iter()
            .cloned()
            .zip(1..)
            .collect();
        for (id, position) in remaining {
            if let Some(request) = state.requests.get_mut(&id) {
                request.status = RequestStatus::Queued { position };
            }
        }

        let request = state.requests.get_mut(&request_id)?;
        request.status = RequestStatus::Processing;
        Some(request.clone())
    }

    fn finish(&self, request_id: &str, outcome: Result<String, String>) {
        let mut state = self.state.lock().unwrap();
        if let Some(request) = state.requests.get_mut(request_id) {
            request.status = match outcome {
                Ok(url) => RequestStatus::Completed { url },
                Err(error) => RequestStatus::Failed { error },
            };
            request.finished_at = Some(Instant::now());
        }
        prune(&mut state, self.retention);
    }
}

fn prune(state: &mut QueueState, retention: Duration) {
    state.requests.retain(|_, request| match request.finished_at {
        Some(at) => at.elapsed() < retention,
        None => true,
    });
}

/// Spawn the single worker that drains the queue in arrival order. One
/// worker means at most one request is ever in `processing`.
pub fn spawn_worker(
    queue: RequestQueue,
    mut resolver: impl DownloadResolver + 'static,
    cache: Arc<LinkCache>,
    cool_down: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(request) = queue.take_next() else {
                queue.wake.notified().await;
                continue;
            };

            info!(
                request_id = %request.request_id,
                document_id = %request.document_id,
                "Processing request"
            );

            match resolver.resolve(&request.document_id).await {
                Ok(url) => {
                    cache.insert(&request.document_id, &url);
                    queue.finish(&request.request_id, Ok(url));
                    info!(request_id = %request.request_id, "Request completed");
                }
                Err(e) => {
                    // The failure is recorded on the request; the queue
                    // keeps draining.
                    warn!(request_id = %request.request_id, "Request failed: {e:#}");
                    queue.finish(&request.request_id, Err(format!("{e:#}")));
                }
            }

            tokio::time::sleep(cool_down).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeResolver {
        calls: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
        delay: Duration,
    }

    impl FakeResolver {
        fn new(delay: Duration) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                active: Arc::new(AtomicBool::new(false)),
                overlapped: Arc::new(AtomicBool::new(false)),
                delay,
            }
        }
    }

    #[async_trait]
    impl DownloadResolver for FakeResolver {
        async fn resolve(&mut self, document_id: &str) -> anyhow::Result<String> {
            if self.active.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(self.delay).await;
            self.calls.lock().unwrap().push(document_id.to_string());
            self.active.store(false, Ordering::SeqCst);

            if document_id == "bad" {
                anyhow::bail!("extraction blew up");
            }
            Ok(format!("https://dl.example/{document_id}.pdf"))
        }
    }

    async fn wait_finished(queue: &RequestQueue, request_id: &str) -> DownloadRequest {
        for _ in 0..500 {
            if let Some(request) = queue.status(request_id) {
                if request.status.is_finished() {
                    return request;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request {request_id} did not finish");
    }

    #[tokio::test]
    async fn processes_in_arrival_order() {
        let queue = RequestQueue::new(Duration::from_secs(60));
        let resolver = FakeResolver::new(Duration::from_millis(20));
        let calls = Arc::clone(&resolver.calls);
        let overlapped = Arc::clone(&resolver.overlapped);
        let cache = Arc::new(LinkCache::new());

        let ids: Vec<String> = ["111", "222", "333"]
            .iter()
            .map(|doc| queue.enqueue(doc, "1.2.3.4"))
            .collect();

        let _worker = spawn_worker(
            queue.clone(),
            resolver,
            Arc::clone(&cache),
            Duration::from_millis(1),
        );

        for id in &ids {
            wait_finished(&queue, id).await;
        }

        assert_eq!(*calls.lock().unwrap(), vec!["111", "222", "333"]);
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn never_processes_two_requests_at_once() {
        let queue = RequestQueue::new(Duration::from_secs(60));
        let resolver = FakeResolver::new(Duration::from_millis(10));
        let overlapped = Arc::clone(&resolver.overlapped);
        let cache = Arc::new(LinkCache::new());

        let _worker = spawn_worker(
            queue.clone(),
            resolver,
            Arc::clone(&cache),
            Duration::from_millis(1),
        );

        // Concurrent arrivals from several tasks.
        let mut handles = Vec::new();
        for i in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(&format!("doc{i}"), "10.0.0.1")
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        for id in &ids {
            wait_finished(&queue, id).await;
        }
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failure_does_not_halt_the_queue() {
        let queue = RequestQueue::new(Duration::from_secs(60));
        let resolver = FakeResolver::new(Duration::from_millis(5));
        let cache = Arc::new(LinkCache::new());

        let bad = queue.enqueue("bad", "1.1.1.1");
        let good = queue.enqueue("777", "1.1.1.1");

        let _worker = spawn_worker(
            queue.clone(),
            resolver,
            Arc::clone(&cache),
            Duration::from_millis(1),
        );

        let bad_request = wait_finished(&queue, &bad).await;
        let good_request = wait_finished(&queue, &good).await;

        assert!(matches!(bad_request.status, RequestStatus::Failed { .. }));
        match good_request.status {
            RequestStatus::Completed { url } => assert!(!url.is_empty()),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completion_populates_the_cache() {
        let queue = RequestQueue::new(Duration::from_secs(60));
        let resolver = FakeResolver::new(Duration::from_millis(5));
        let cache = Arc::new(LinkCache::new());

        let id = queue.enqueue("555", "1.1.1.1");
        let _worker = spawn_worker(
            queue.clone(),
            resolver,
            Arc::clone(&cache),
            Duration::from_millis(1),
        );

        wait_finished(&queue, &id).await;
        assert_eq!(
            cache.get("555"),
            Some("https://dl.example/555.pdf".to_string())
        );
    }

    #[tokio::test]
    async fn positions_are_renumbered_on_dequeue() {
        let queue = RequestQueue::new(Duration::from_secs(60));

        let first = queue.enqueue("a", "ip");
        let second = queue.enqueue("b", "ip");
        let third = queue.enqueue("c", "ip");

        assert_eq!(
            queue.status(&third).unwrap().status,
            RequestStatus::Queued { position: 3 }
        );

        let taken = queue.take_next().unwrap();
        assert_eq!(taken.request_id, first);
        assert_eq!(taken.status, RequestStatus::Processing);

        assert_eq!(
            queue.status(&second).unwrap().status,
            RequestStatus::Queued { position: 1 }
        );
        assert_eq!(
            queue.status(&third).unwrap().status,
            RequestStatus::Queued { position: 2 }
        );
    }

    #[tokio::test]
    async fn finished_requests_expire_after_retention() {
        let queue = RequestQueue::new(Duration::from_millis(20));
        let id = queue.enqueue("999", "ip");

        let taken = queue.take_next().unwrap();
        queue.finish(&taken.request_id, Ok("https://dl.example/x".to_string()));

        assert!(queue.status(&id).is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(queue.status(&id).is_none());
    }
}
