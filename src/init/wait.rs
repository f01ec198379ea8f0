// SPDX-License-Identifier: Apache-2.0

use std::thread::JoinHandle;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error};

use super::BoxError;

pub type TaskSet = JoinSet<Result<(), BoxError>>;

/// Wait for the first task in the set to finish and return its result.
pub async fn wait_for_any_task(tasks: &mut TaskSet) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut TaskSet,
    timeout: Duration,
) -> Result<(), BoxError> {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

/// Drain the set, keeping the last task error. Tasks still running at
/// `stop_at` are left behind and reported as a timeout.
pub async fn wait_for_tasks_with_deadline(
    tasks: &mut TaskSet,
    stop_at: Instant,
) -> Result<(), BoxError> {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => error!("Failed to join with task: {:?}", e),
            },
        }
    }

    result
}

/// Join the harvester's OS thread without blocking the runtime.
pub async fn join_harvester(handle: JoinHandle<crate::Result<()>>) -> Result<(), BoxError> {
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(Ok(()))) => {
            debug!("Harvester thread exited");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(_)) => Err("harvester thread panicked".into()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_task_returns_first_error() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async { Err::<(), BoxError>("sink closed".into()) });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let err = wait_for_any_task(&mut tasks).await.unwrap_err();
        assert_eq!(err.to_string(), "sink closed");
        tasks.abort_all();
    }

    #[tokio::test]
    async fn test_timeout_reported() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let result = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(10)).await;
        assert!(result.is_err());
        tasks.abort_all();
    }

    #[tokio::test]
    async fn test_join_harvester() {
        let ok = std::thread::spawn(|| Ok(()));
        assert!(join_harvester(ok).await.is_ok());

        let failed = std::thread::spawn(|| Err(crate::Error::CheckpointUnavailable("disk".into())));
        let err = join_harvester(failed).await.unwrap_err();
        assert!(err.to_string().contains("disk"));
    }
}
