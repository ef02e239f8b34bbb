use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use parley_core::Power;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TaskFailure {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was cancelled before completing")]
    Cancelled,
}

#[derive(Debug)]
pub struct TaskResult<T> {
    pub power: Power,
    pub outcome: Result<T, TaskFailure>,
}

/// Results of one dispatched batch, yielded in completion order.
pub struct Dispatch<T> {
    receiver: mpsc::Receiver<TaskResult<T>>,
    dispatched: usize,
}

impl<T> Dispatch<T> {
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Next finished task; `None` once every task has reported.
    pub async fn next(&mut self) -> Option<TaskResult<T>> {
        self.receiver.recv().await
    }
}

/// Runs generation jobs concurrently, at most `capacity` at a time. A job
/// that panics is reported as [`TaskFailure::Panicked`] and never affects
/// its siblings.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { permits: Arc::new(Semaphore::new(capacity)), capacity }
    }

    pub fn dispatch<T, F>(&self, jobs: Vec<(Power, F)>) -> Dispatch<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let dispatched = jobs.len();
        let (sender, receiver) = mpsc::channel(dispatched.max(1));
        tracing::debug!(
            event_name = "pool.dispatch",
            jobs = dispatched,
            capacity = self.capacity,
            "dispatching generation tasks"
        );

        for (power, job) in jobs {
            let sender = sender.clone();
            let permits = Arc::clone(&self.permits);
            tokio::spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(permit) => {
                        let handle = tokio::spawn(async move {
                            let _permit = permit;
                            job.await
                        });
                        match handle.await {
                            Ok(value) => Ok(value),
                            Err(error) if error.is_panic() => {
                                Err(TaskFailure::Panicked(panic_message(error.into_panic())))
                            }
                            Err(_) => Err(TaskFailure::Cancelled),
                        }
                    }
                    Err(_) => Err(TaskFailure::Cancelled),
                };

                if let Err(failure) = &outcome {
                    tracing::error!(
                        event_name = "pool.task.failed",
                        power = %power,
                        error = %failure,
                        "generation task did not complete"
                    );
                }
                let _ = sender.send(TaskResult { power, outcome }).await;
            });
        }

        Dispatch { receiver, dispatched }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parley_core::Power;

    use super::{TaskFailure, WorkerPool};

    type Job = Pin<Box<dyn Future<Output = &'static str> + Send>>;

    fn delayed(label: &'static str, millis: u64) -> Job {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            label
        })
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let pool = WorkerPool::new(4);
        let mut dispatch = pool.dispatch(vec![
            (Power::new("SLOW"), delayed("slow", 120)),
            (Power::new("FAST"), delayed("fast", 0)),
        ]);

        assert_eq!(dispatch.dispatched(), 2);
        let first = dispatch.next().await.expect("first result");
        let second = dispatch.next().await.expect("second result");
        assert_eq!(first.power, Power::new("FAST"));
        assert_eq!(second.outcome, Ok("slow"));
        assert!(dispatch.next().await.is_none());
    }

    #[tokio::test]
    async fn panicking_job_is_isolated() {
        let pool = WorkerPool::new(2);
        let panicking: Job = Box::pin(async { panic!("model exploded") });
        let mut dispatch = pool.dispatch(vec![
            (Power::new("AUSTRIA"), delayed("ok", 10)),
            (Power::new("TURKEY"), panicking),
            (Power::new("ITALY"), delayed("ok", 10)),
        ]);

        let mut failures = Vec::new();
        let mut successes = 0;
        while let Some(result) = dispatch.next().await {
            match result.outcome {
                Ok(_) => successes += 1,
                Err(failure) => failures.push((result.power, failure)),
            }
        }
        assert_eq!(successes, 2);
        assert_eq!(
            failures,
            vec![(Power::new("TURKEY"), TaskFailure::Panicked("model exploded".to_string()))]
        );
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_capacity() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6)
            .map(|index| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                let job: Pin<Box<dyn Future<Output = usize> + Send>> = Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    index
                });
                (Power::new(format!("P{index}")), job)
            })
            .collect::<Vec<_>>();

        let mut dispatch = pool.dispatch(jobs);
        let mut finished = 0;
        while dispatch.next().await.is_some() {
            finished += 1;
        }
        assert_eq!(finished, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
