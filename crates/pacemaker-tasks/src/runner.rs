use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::{info, instrument, warn};

use pacemaker_core::types::{Task, TaskKind, TaskPayload, TaskPriority};

use crate::error::{Result, TaskError};
use crate::handler::TaskHandler;

struct QueuedTask {
    task: Task,
    responder: oneshot::Sender<Result<()>>,
}

/// C6: a process-wide bounded task queue with priority insertion and retry
/// (spec §4.6). The runner loop processes one task at a time — there is no
/// concurrent task execution within a single `TaskRunner`.
pub struct TaskRunner {
    handlers: DashMap<TaskKind, Arc<dyn TaskHandler>>,
    queue: Mutex<VecDeque<QueuedTask>>,
    notify: Notify,
    stopping: AtomicBool,
}

impl TaskRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: DashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            stopping: AtomicBool::new(false),
        })
    }

    /// `register(kind, handler)` (spec §4.6).
    pub fn register(&self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// `enqueue(kind, payload, {priority, maxAttempts})` (spec §4.6). Returns
    /// a future that resolves on task success / rejects on terminal failure.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        kind: TaskKind,
        payload: TaskPayload,
        priority: TaskPriority,
        max_attempts: u32,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        if !self.handlers.contains_key(&kind) {
            return Err(TaskError::NoHandler(kind));
        }
        if self.stopping.load(Ordering::SeqCst) {
            return Err(TaskError::ShuttingDown);
        }

        let task = Task::new(kind, payload, max_attempts);
        let (tx, rx) = oneshot::channel();
        let queued = QueuedTask { task, responder: tx };

        let mut queue = self.queue.lock().await;
        match priority {
            TaskPriority::Normal => queue.push_back(queued),
            TaskPriority::High => queue.push_front(queued),
        }
        drop(queue);
        self.notify.notify_one();

        Ok(rx)
    }

    /// Runner loop (spec §4.6): pop front, call handler, retry with
    /// exponential backoff by prepending on failure, resolve/reject the
    /// caller's future.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("task runner started");
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                queue.pop_front()
            };

            let Some(mut queued) = next else {
                tokio::select! {
                    _ = self.notify.notified() => continue,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("task runner shutting down (idle)");
                            break;
                        }
                    }
                }
                continue;
            };

            if self.stopping.load(Ordering::SeqCst) {
                let _ = queued.responder.send(Err(TaskError::ShuttingDown));
                continue;
            }

            queued.task.attempts += 1;
            let handler = self.handlers.get(&queued.task.kind).map(|h| h.clone());

            let outcome = match handler {
                Some(handler) => handler.handle(&queued.task.payload).await,
                None => Err("handler unregistered after enqueue".to_string()),
            };

            match outcome {
                Ok(()) => {
                    let _ = queued.responder.send(Ok(()));
                }
                Err(message) => {
                    if queued.task.attempts < queued.task.max_attempts {
                        let delay_ms = 1000u64
                            .saturating_mul(1u64 << (queued.task.attempts.saturating_sub(1)))
                            .min(10_000);
                        warn!(
                            task_id = %queued.task.id,
                            attempts = queued.task.attempts,
                            delay_ms,
                            "task failed, retrying with backoff"
                        );
                        let runner = Arc::clone(&self);
                        tokio::spawn(async move {
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                            let mut queue = runner.queue.lock().await;
                            queue.push_front(queued);
                            drop(queue);
                            runner.notify.notify_one();
                        });
                    } else {
                        warn!(task_id = %queued.task.id, attempts = queued.task.attempts, "task failed terminally");
                        let _ = queued.responder.send(Err(TaskError::TerminalFailure {
                            attempts: queued.task.attempts,
                            message,
                        }));
                    }
                }
            }
        }
    }

    /// `shutdown()` (spec §4.6): flip the stop flag; in-flight tasks are
    /// allowed to complete naturally by the loop above (which checks the
    /// flag before each new task); remaining queued tasks are discarded with
    /// their futures rejected.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let mut queue = self.queue.lock().await;
        while let Some(queued) = queue.pop_front() {
            let _ = queued.responder.send(Err(TaskError::ShuttingDown));
        }
        info!("task runner: remaining queued tasks discarded");
    }
}
