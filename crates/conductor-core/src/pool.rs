use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::error::ConductorError;
use crate::task::Task;

/// A bounded cooperative worker pool (spec.md §4.4/§5). `spawn_task` hands
/// a `Task` to a background future; the semaphore permit and the task's
/// exclusive reservation are both held for the lifetime of that future and
/// released together when it completes.
///
/// Submission is the pool's only in-process shared resource beyond the
/// registry, and is serialized behind `enqueue_lock` so a saturated pool
/// fails fast rather than racing two submissions against the same permit
/// count.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    enqueue_lock: Arc<Mutex<()>>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        WorkerPool {
            semaphore: Arc::new(Semaphore::new(capacity)),
            enqueue_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Number of permits currently free. For diagnostics only.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Hand off `task` to `work`, which takes ownership of it for the
    /// duration of the background future. On saturation the task is
    /// released synchronously before `NoFreeConductorWorker` is returned —
    /// the hand-off contract (spec.md §4.3) is satisfied on both paths.
    pub async fn spawn_task<F, Fut>(&self, task: Task, work: F) -> Result<(), ConductorError>
    where
        F: FnOnce(Task) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let permit = {
            let _guard = self.enqueue_lock.lock().unwrap();
            self.semaphore.clone().try_acquire_owned()
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                task.release().await?;
                return Err(ConductorError::NoFreeConductorWorker);
            }
        };

        tokio::spawn(async move {
            work(task).await;
            drop(permit);
        });
        Ok(())
    }

    /// Submit work with no bound `Task` (e.g. a driver-less vendor call).
    /// Same saturation contract, with nothing to release.
    pub fn spawn<Fut>(&self, work: Fut) -> Result<(), ConductorError>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let permit = {
            let _guard = self.enqueue_lock.lock().unwrap();
            self.semaphore.clone().try_acquire_owned()
        };
        let permit = permit.map_err(|_| ConductorError::NoFreeConductorWorker)?;
        tokio::spawn(async move {
            work.await;
            drop(permit);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::Node;
    use conductor_driver::{DriverCatalog, FakeDriver};
    use conductor_store::InMemoryStore;
    use std::time::Duration;

    use crate::task::TaskManager;

    #[tokio::test]
    async fn saturated_pool_releases_task_and_fails() {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let manager = TaskManager::new(store.clone(), Arc::new(catalog), "conductor-a");
        let node = store.create_node(Node::new("fake")).await.unwrap();

        let pool = WorkerPool::new(0);
        let task = manager.acquire_exclusive(node.uuid).await.unwrap();
        let result = pool.spawn_task(task, |_task| async {}).await;
        assert!(matches!(result, Err(ConductorError::NoFreeConductorWorker)));

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert!(fetched.reservation.is_none());
    }

    #[tokio::test]
    async fn work_releases_task_on_completion() {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let manager = TaskManager::new(store.clone(), Arc::new(catalog), "conductor-a");
        let node = store.create_node(Node::new("fake")).await.unwrap();

        let pool = WorkerPool::new(1);
        let task = manager.acquire_exclusive(node.uuid).await.unwrap();
        pool.spawn_task(task, |task| async move {
            task.release().await.ok();
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert!(fetched.reservation.is_none());
        assert_eq!(pool.available(), 1);
    }
}
