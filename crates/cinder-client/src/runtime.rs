//! IO runtime owned by each session.

use std::fmt;
use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::ClientResult;

/// Multi-threaded tokio runtime that drives one session's IO.
///
/// Dropping it shuts the runtime down in the background, so the last
/// session handle may be released from any thread, including a sink running
/// on one of the runtime's own workers.
pub(crate) struct ClientRuntime {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl ClientRuntime {
    pub(crate) fn new(worker_threads: usize) -> ClientResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("cinder-client-io")
            .enable_io()
            .enable_time()
            .build()?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

impl Drop for ClientRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for ClientRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRuntime")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_spawn_and_drop() {
        let runtime = ClientRuntime::new(1).unwrap();
        let (tx, rx) = mpsc::channel();
        runtime.spawn(async move {
            tx.send(tokio::runtime::Handle::current().runtime_flavor())
                .unwrap();
        });
        assert_eq!(
            rx.recv().unwrap(),
            tokio::runtime::RuntimeFlavor::MultiThread
        );
        drop(runtime);
    }

    #[tokio::test]
    async fn test_drop_inside_async_context() {
        let runtime = ClientRuntime::new(1).unwrap();
        drop(runtime);
    }

    #[test]
    fn test_drop_on_own_worker() {
        let runtime = ClientRuntime::new(1).unwrap();
        let handle = runtime.handle().clone();
        let (tx, rx) = mpsc::channel();
        handle.spawn(async move {
            drop(runtime);
            tx.send(()).unwrap();
        });
        rx.recv().unwrap();
    }
}
