use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A one-shot deferred task that is cancelled when rescheduled or dropped.
///
/// Each schedule gets a new generation so a stale firing can be told apart
/// from the current one.
#[derive(Debug, Default)]
pub struct DeferredTask {
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl DeferredTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fire(generation)` after `delay`, replacing any pending task
    pub fn schedule<F, Fut>(&mut self, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(generation).await;
        }));

        generation
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether `generation` belongs to the most recent schedule
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
