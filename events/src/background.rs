//! Fire-and-forget execution of side effects.
//!
//! Work handed to [`run_detached`] runs on the tokio runtime without the caller
//! awaiting it. A separate observer task watches for completion and only acts
//! on failure: an `Err` result or a panic is logged, success is ignored.

use log::*;
use std::fmt::Debug;
use std::future::Future;
use tokio::task::JoinHandle;

/// Spawn `operation` detached from the caller and log it if it fails.
///
/// Returns the handle of the observer task. Dropping it detaches the work
/// entirely; awaiting it waits until the operation finished and any failure
/// was logged. The observer itself never fails.
///
/// Must be called from within a tokio runtime.
pub fn run_detached<F, E>(operation: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Debug + Send + 'static,
{
    let task = tokio::spawn(operation);

    tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("An error occurred while executing a background task: {e:?}");
            }
            Err(join_error) => {
                error!("A background task did not run to completion: {join_error}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata, Record};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, Once};
    use std::thread::{self, ThreadId};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Records every log line together with the thread that emitted it. The
    /// tests use current-thread runtimes, so spawned tasks log on the test's
    /// own thread and parallel tests don't see each other's records.
    struct CapturingLogger {
        records: Mutex<Vec<(ThreadId, Level, String)>>,
    }

    impl Log for CapturingLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.records.lock().unwrap().push((
                thread::current().id(),
                record.level(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    static LOGGER: CapturingLogger = CapturingLogger {
        records: Mutex::new(Vec::new()),
    };
    static INSTALL: Once = Once::new();

    fn capture_logs() {
        INSTALL.call_once(|| {
            log::set_logger(&LOGGER).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
        });
    }

    fn errors_on_this_thread() -> Vec<String> {
        let current = thread::current().id();
        LOGGER
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(thread, level, _)| *thread == current && *level == Level::Error)
            .map(|(_, _, message)| message.clone())
            .collect()
    }

    #[tokio::test]
    async fn caller_does_not_wait_for_the_operation() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();

        let observer = run_detached(async move {
            let _ = release_rx.await;
            finished_clone.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });

        // We got control back while the operation is still blocked.
        assert!(!finished.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        observer.await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failures_are_contained_in_the_observer() {
        let observer = run_detached(async { Err::<(), _>("send failed".to_string()) });

        assert!(observer.await.is_ok());
    }

    #[tokio::test]
    async fn panics_are_contained_in_the_observer() {
        async fn explode() -> Result<(), String> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            panic!("relay blew up")
        }

        let observer = run_detached(explode());

        assert!(observer.await.is_ok());
    }

    #[tokio::test]
    async fn success_is_not_logged() {
        capture_logs();

        run_detached(async { Ok::<(), String>(()) }).await.unwrap();

        assert!(errors_on_this_thread().is_empty());
    }

    #[tokio::test]
    async fn failure_is_logged_once_with_its_detail() {
        capture_logs();

        run_detached(async { Err::<(), _>("broker write failed".to_string()) })
            .await
            .unwrap();

        let errors = errors_on_this_thread();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("An error occurred while executing a background task"));
        assert!(errors[0].contains("broker write failed"));
    }

    #[tokio::test]
    async fn panic_is_logged_once() {
        capture_logs();

        async fn explode() -> Result<(), String> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            panic!("relay blew up")
        }

        run_detached(explode()).await.unwrap();

        let errors = errors_on_this_thread();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("A background task did not run to completion"));
    }
}
