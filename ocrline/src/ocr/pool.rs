use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::error::{OcrlineError, Result};

/// Bounded pool for recognition calls.
///
/// At most `size` calls run at once; the rest queue for a permit. The timeout
/// starts once a permit is held, so queueing time is not charged to the call.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(size: usize, timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run CPU-bound work on a blocking thread.
    ///
    /// The permit moves into the blocking task, so a call that timed out keeps
    /// its slot until the thread actually finishes.
    pub async fn run_blocking<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(joined) => {
                joined.map_err(|e| OcrlineError::Recognition(format!("OCR task panicked: {e}")))?
            }
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Run an async recognition call under a permit and the pool timeout.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;

        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| OcrlineError::Recognition("OCR worker pool is closed".to_string()))
    }

    fn timed_out(&self) -> OcrlineError {
        warn!(timeout_secs = self.timeout.as_secs(), "OCR call timed out");
        OcrlineError::Timeout {
            seconds: self.timeout.as_secs(),
        }
    }
}
