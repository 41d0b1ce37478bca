//! Calling async manager operations from component threads.

use std::future::Future;
use std::sync::mpsc;
use std::time::Duration;
use taskmesh_protocols::ManagerError;
use tokio::runtime::Handle;

/// Run `future` on `runtime` and block the calling thread for its result.
///
/// The future is spawned rather than driven with `block_on`, so this is
/// safe to call from threads that belong to the runtime as well as from
/// component threads. A `timeout` of `None` waits until the future ends.
pub fn run_blocking<F, T>(
    runtime: &Handle,
    timeout: Option<Duration>,
    future: F,
) -> Result<T, ManagerError>
where
    F: Future<Output = Result<T, ManagerError>> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    runtime.spawn(async move {
        let _ = tx.send(future.await);
    });
    match timeout {
        Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => {
                ManagerError::Network(format!("no reply within {:?}", timeout))
            }
            mpsc::RecvTimeoutError::Disconnected => {
                ManagerError::Network("runtime shut down".to_string())
            }
        })?,
        None => rx
            .recv()
            .map_err(|_| ManagerError::Network("runtime shut down".to_string()))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_result_is_returned() {
        let handle = Handle::current();
        let value = tokio::task::spawn_blocking(move || {
            run_blocking(&handle, Some(Duration::from_secs(1)), async { Ok(7) })
        })
        .await
        .unwrap();
        assert_eq!(value, Ok(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_is_a_network_error() {
        let handle = Handle::current();
        let result: Result<(), ManagerError> = tokio::task::spawn_blocking(move || {
            run_blocking(&handle, Some(Duration::from_millis(20)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(ManagerError::Network(_))));
    }
}
