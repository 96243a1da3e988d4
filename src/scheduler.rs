use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::orchestrator::SyncOrchestrator;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSync {
    pub client_id: i64,
    /// `None` syncs every enabled integration of the client.
    pub provider: Option<Provider>,
    pub queued_at: DateTime<Utc>,
}

impl QueuedSync {
    pub fn client(client_id: i64) -> Self {
        Self {
            client_id,
            provider: None,
            queued_at: Utc::now(),
        }
    }

    pub fn provider(client_id: i64, provider: Provider) -> Self {
        Self {
            client_id,
            provider: Some(provider),
            queued_at: Utc::now(),
        }
    }

    fn same_target(&self, other: &QueuedSync) -> bool {
        self.client_id == other.client_id && self.provider == other.provider
    }
}

pub type ExecutorFuture = Pin<Box<dyn Future<Output = bool> + Send>>;
pub type Executor = Arc<dyn Fn(QueuedSync) -> ExecutorFuture + Send + Sync>;

/// FIFO queue of sync jobs drained by a background loop, at most
/// `global_limit` at a time.
#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<Mutex<VecDeque<QueuedSync>>>,
    running: Arc<Mutex<usize>>,
    notify: Arc<Notify>,
    executor: Arc<RwLock<Option<Executor>>>,
    global_limit: usize,
    max_queue_size: usize,
}

impl Scheduler {
    pub fn new(global_limit: usize, max_queue_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            running: Arc::new(Mutex::new(0)),
            notify: Arc::new(Notify::new()),
            executor: Arc::new(RwLock::new(None)),
            global_limit: global_limit.max(1),
            max_queue_size,
        }
    }

    /// One sync at a time, each executed through the orchestrator.
    pub fn for_orchestrator(orchestrator: Arc<SyncOrchestrator>, max_queue_size: usize) -> Self {
        let scheduler = Self::new(1, max_queue_size);
        scheduler.set_executor(Arc::new(move |job: QueuedSync| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                let result = match job.provider {
                    Some(provider) => orchestrator.sync_provider(job.client_id, provider).await,
                    None => orchestrator.sync_client(job.client_id).await,
                };
                match result {
                    Ok(result) => !result.success,
                    Err(error) => {
                        tracing::error!(client_id = job.client_id, error = %error, "queued sync aborted");
                        true
                    }
                }
            }) as ExecutorFuture
        }));
        scheduler
    }

    pub fn set_executor(&self, executor: Executor) {
        let mut writer = match self.executor.write() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        *writer = Some(executor);
    }

    /// Returns `false` when the same target is already waiting.
    pub async fn enqueue(&self, job: QueuedSync) -> AppResult<bool> {
        {
            let mut queue = self.queue.lock().await;
            if queue.iter().any(|queued| queued.same_target(&job)) {
                return Ok(false);
            }
            if queue.len() >= self.max_queue_size {
                return Err(AppError::Validation(format!(
                    "Queue capacity exceeded (max {}).",
                    self.max_queue_size
                )));
            }
            queue.push_back(job);
        }
        self.notify.notify_one();
        Ok(true)
    }

    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn start(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
    }

    async fn run_loop(self) {
        loop {
            self.notify.notified().await;
            loop {
                if !self.try_reserve_slot().await {
                    break;
                }
                let Some(job) = self.queue.lock().await.pop_front() else {
                    self.release_slot().await;
                    break;
                };

                let scheduler = self.clone();
                tokio::spawn(async move {
                    let client_id = job.client_id;
                    let failed = scheduler.execute(job).await;
                    scheduler.release_slot().await;
                    if failed {
                        tracing::warn!(client_id, "queued sync finished with failures");
                    }
                    scheduler.notify.notify_one();
                });
            }
        }
    }

    async fn execute(&self, job: QueuedSync) -> bool {
        let executor = match self.executor.read() {
            Ok(reader) => reader.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match executor {
            Some(executor) => executor(job).await,
            None => true,
        }
    }

    async fn try_reserve_slot(&self) -> bool {
        let mut running = self.running.lock().await;
        if *running >= self.global_limit {
            return false;
        }
        *running += 1;
        true
    }

    async fn release_slot(&self) {
        let mut running = self.running.lock().await;
        if *running > 0 {
            *running -= 1;
        }
    }
}

/// Enqueues every client with an enabled integration once per `interval`,
/// starting with an immediate pass.
pub fn spawn_cron(scheduler: Scheduler, db: Arc<Database>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(error) = enqueue_cron_pass(&scheduler, &db).await {
                tracing::error!(error = %error, "cron pass failed to enqueue clients");
            }
        }
    })
}

pub async fn enqueue_cron_pass(scheduler: &Scheduler, db: &Database) -> AppResult<usize> {
    let client_ids = db.clients_with_integrations()?;
    let mut enqueued = 0;
    for client_id in client_ids {
        match scheduler.enqueue(QueuedSync::client(client_id)).await {
            Ok(true) => enqueued += 1,
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(client_id, error = %error, "cron could not enqueue client");
            }
        }
    }
    tracing::info!(enqueued, "cron pass enqueued clients");
    Ok(enqueued)
}

#[cfg(test)]
mod tests {
    use super::{enqueue_cron_pass, ExecutorFuture, QueuedSync, Scheduler};
    use crate::db::Database;
    use crate::models::{NewClient, Provider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    #[tokio::test]
    async fn queue_capacity_is_enforced() {
        let scheduler = Scheduler::new(1, 1);
        scheduler.enqueue(QueuedSync::client(1)).await.expect("first enqueue");
        let err = scheduler
            .enqueue(QueuedSync::client(2))
            .await
            .expect_err("second enqueue should fail");
        assert!(err.to_string().contains("Queue capacity exceeded"));
    }

    #[tokio::test]
    async fn duplicate_targets_are_collapsed() {
        let scheduler = Scheduler::new(1, 8);
        assert!(scheduler.enqueue(QueuedSync::client(1)).await.expect("enqueue"));
        assert!(!scheduler.enqueue(QueuedSync::client(1)).await.expect("enqueue"));
        assert!(scheduler
            .enqueue(QueuedSync::provider(1, Provider::Yelp))
            .await
            .expect("enqueue"));
        assert_eq!(scheduler.queued().await, 2);
    }

    #[tokio::test]
    async fn jobs_run_one_at_a_time_in_order() {
        let scheduler = Scheduler::new(1, 8);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let active = active.clone();
            let peak = peak.clone();
            scheduler.set_executor(Arc::new(move |job: QueuedSync| {
                let active = active.clone();
                let peak = peak.clone();
                let tx = tx.clone();
                Box::pin(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    let _ = tx.send(job.client_id);
                    false
                }) as ExecutorFuture
            }));
        }

        for client_id in [3, 1, 2] {
            scheduler.enqueue(QueuedSync::client(client_id)).await.expect("enqueue");
        }
        scheduler.start();

        let mut order = Vec::new();
        for _ in 0..3 {
            let client_id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("job finished in time")
                .expect("channel open");
            order.push(client_id);
        }
        assert_eq!(order, vec![3, 1, 2]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cron_pass_enqueues_clients_with_enabled_integrations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("bcc.sqlite")).expect("db");
        let client = db
            .create_client(&NewClient {
                name: "Harbor Cafe".to_string(),
                slug: "harbor-cafe".to_string(),
                location: "Portland, ME".to_string(),
                ..NewClient::default()
            })
            .expect("client");
        db.upsert_integration(client.id, Provider::Yelp, "ciphertext", true)
            .expect("integration");

        let scheduler = Scheduler::new(1, 8);
        assert_eq!(enqueue_cron_pass(&scheduler, &db).await.expect("pass"), 1);
        assert_eq!(enqueue_cron_pass(&scheduler, &db).await.expect("pass"), 0);
        assert_eq!(scheduler.queued().await, 1);
    }
}
