//! Single-flight execution guard for recurring jobs

use std::future::Future;

use tokio::sync::Mutex;

use crate::error::ApiResult;

/// Ensures at most one run of a job at a time. A tick arriving while the
/// previous run still holds the lock is skipped, not queued.
pub struct SingleFlight {
    name: &'static str,
    lock: Mutex<()>,
}

impl SingleFlight {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    pub async fn run<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        let Ok(_guard) = self.lock.try_lock() else {
            tracing::warn!(job = self.name, "Previous run still in flight, skipping tick");
            return;
        };

        match job().await {
            Ok(()) => tracing::debug!(job = self.name, "Job run finished"),
            Err(e) => tracing::error!(job = self.name, error = %e, "Job run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_single_flight_skips_concurrent_tick() {
        let flight = Arc::new(SingleFlight::new("test_job"));
        let runs = Arc::new(AtomicU32::new(0));

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let flight = flight.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                flight
                    .run(|| async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        started_tx.send(()).ok();
                        release_rx.await.ok();
                        Ok(())
                    })
                    .await;
            })
        };

        started_rx.await.unwrap();

        // Second tick while the first is in flight: must be skipped
        flight
            .run(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        release_tx.send(()).ok();
        slow.await.unwrap();

        // After the first run finishes, the next tick runs normally
        flight
            .run(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_run_releases_the_lock() {
        let flight = SingleFlight::new("failing_job");
        flight
            .run(|| async { Err(crate::error::ApiError::Internal("boom".to_string())) })
            .await;
        flight.run(|| async { Ok(()) }).await;
    }
}
