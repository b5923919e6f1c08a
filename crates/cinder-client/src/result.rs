//! Result envelopes, sinks and deferred results.
//!
//! Every asynchronous operation completes exactly once with an
//! [`OpResult`]. Callers pick how to observe it:
//!
//! - **Sink** (continuation): a closure invoked once with the envelope, on a
//!   client IO thread. It must not block.
//! - **Deferred**: a one-shot value that can be awaited from async code or
//!   waited on from a plain thread. Deferred forms are built by handing the
//!   operation a sink that fulfills a [`Promise`].
//!
//! ```rust
//! use cinder_client::{Deferred, OpResult};
//!
//! let (promise, deferred) = Deferred::<u32>::pair();
//! let sink = promise.into_sink();
//! std::thread::spawn(move || sink(OpResult::ok(7)));
//! assert_eq!(deferred.wait().unwrap(), 7);
//! ```

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::{ClientError, ClientResult};

/// Single-shot continuation receiving an operation's outcome.
pub type Sink<T> = Box<dyn FnOnce(OpResult<T>) + Send + 'static>;

/// Outcome of one operation: exactly one of a value or an error.
///
/// Reading the side that is not populated is reported as
/// [`ClientError::InvalidState`] instead of being coerced.
pub struct OpResult<T> {
    inner: Result<T, ClientError>,
}

impl<T> OpResult<T> {
    /// Creates a successful envelope.
    pub fn ok(value: T) -> Self {
        Self { inner: Ok(value) }
    }

    /// Creates a failed envelope.
    pub fn err(error: ClientError) -> Self {
        Self { inner: Err(error) }
    }

    /// Returns true if the envelope carries a value.
    pub fn has_value(&self) -> bool {
        self.inner.is_ok()
    }

    /// Returns true if the envelope carries an error.
    pub fn has_error(&self) -> bool {
        self.inner.is_err()
    }

    /// Takes the value.
    ///
    /// Fails with `InvalidState` if the envelope carries an error; check
    /// [`has_error`](Self::has_error) first or use
    /// [`into_result`](Self::into_result).
    pub fn value(self) -> ClientResult<T> {
        match self.inner {
            Ok(value) => Ok(value),
            Err(err) => Err(ClientError::InvalidState(format!(
                "result holds an error, not a value ({err})"
            ))),
        }
    }

    /// Takes the error.
    ///
    /// Fails with `InvalidState` if the envelope carries a value.
    pub fn error(self) -> ClientResult<ClientError> {
        match self.inner {
            Err(err) => Ok(err),
            Ok(_) => Err(ClientError::InvalidState(
                "result holds a value, not an error".to_string(),
            )),
        }
    }

    /// Borrows the error, if any.
    pub fn error_ref(&self) -> Option<&ClientError> {
        self.inner.as_ref().err()
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> ClientResult<T> {
        self.inner
    }

    /// Maps the value, keeping an error untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OpResult<U> {
        OpResult {
            inner: self.inner.map(f),
        }
    }
}

impl<T> From<ClientResult<T>> for OpResult<T> {
    fn from(result: ClientResult<T>) -> Self {
        Self { inner: result }
    }
}

impl<T> From<OpResult<T>> for ClientResult<T> {
    fn from(result: OpResult<T>) -> Self {
        result.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for OpResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Ok(value) => f.debug_tuple("OpResult::Value").field(value).finish(),
            Err(err) => f.debug_tuple("OpResult::Error").field(err).finish(),
        }
    }
}

/// Shared one-shot cell behind a promise/deferred pair.
struct Slot<T> {
    value: Mutex<Option<OpResult<T>>>,
    ready: Condvar,
    notify: Notify,
}

impl<T> Slot<T> {
    fn publish(&self, result: OpResult<T>) {
        {
            let mut value = self.value.lock();
            debug_assert!(value.is_none(), "deferred result fulfilled twice");
            *value = Some(result);
        }
        self.ready.notify_all();
        // Single consumer; notify_one stores a permit if it is not waiting yet.
        self.notify.notify_one();
    }
}

/// Producer half of a deferred result.
///
/// Fulfilled at most once because [`fulfill`](Self::fulfill) consumes it. A
/// promise dropped without being fulfilled resolves its deferred with
/// `SessionClosed`, which is what happens to in-flight work when a session
/// shuts down.
pub struct Promise<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Resolves the deferred result.
    pub fn fulfill(mut self, result: OpResult<T>) {
        if let Some(slot) = self.slot.take() {
            slot.publish(result);
        }
    }

    /// Turns the promise into a sink that fulfills it.
    pub fn into_sink(self) -> Sink<T> {
        Box::new(move |result| self.fulfill(result))
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.publish(OpResult::err(ClientError::SessionClosed));
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("pending", &self.slot.is_some())
            .finish()
    }
}

/// A one-shot value that resolves to an operation's result.
///
/// Await it from async code, or call [`wait`](Self::wait) /
/// [`wait_timeout`](Self::wait_timeout) from a thread that is not driving an
/// async runtime.
pub struct Deferred<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    /// Creates a connected promise/deferred pair.
    pub fn pair() -> (Promise<T>, Deferred<T>) {
        let slot = Arc::new(Slot {
            value: Mutex::new(None),
            ready: Condvar::new(),
            notify: Notify::new(),
        });
        (
            Promise {
                slot: Some(Arc::clone(&slot)),
            },
            Deferred { slot },
        )
    }

    /// Creates an already-resolved deferred result.
    pub fn resolved(result: OpResult<T>) -> Self {
        let (promise, deferred) = Self::pair();
        promise.fulfill(result);
        deferred
    }

    /// Returns true once the result is available.
    pub fn is_ready(&self) -> bool {
        self.slot.value.lock().is_some()
    }

    /// Blocks the calling thread until the result is available.
    ///
    /// Refused with `InvalidState` when called from inside an async runtime,
    /// where blocking could starve the task that would fulfill it.
    pub fn wait(self) -> ClientResult<T> {
        ensure_blocking_allowed()?;

        let mut value = self.slot.value.lock();
        loop {
            if let Some(result) = value.take() {
                return result.into_result();
            }
            self.slot.ready.wait(&mut value);
        }
    }

    /// Blocks for at most `timeout`.
    ///
    /// On expiry returns a `Timeout` error; a result arriving later is
    /// discarded.
    pub fn wait_timeout(self, timeout: Duration) -> ClientResult<T> {
        ensure_blocking_allowed()?;

        let started = Instant::now();
        let deadline = started + timeout;
        let mut value = self.slot.value.lock();
        loop {
            if let Some(result) = value.take() {
                return result.into_result();
            }
            if self.slot.ready.wait_until(&mut value, deadline).timed_out() {
                return match value.take() {
                    Some(result) => result.into_result(),
                    None => Err(ClientError::timeout("deferred wait", started.elapsed())),
                };
            }
        }
    }

    async fn resolve(self) -> ClientResult<T> {
        loop {
            let ready = self.slot.value.lock().take();
            if let Some(result) = ready {
                return result.into_result();
            }
            self.slot.notify.notified().await;
        }
    }
}

impl<T: Send + 'static> IntoFuture for Deferred<T> {
    type Output = ClientResult<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = ClientResult<T>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.resolve())
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("ready", &self.slot.value.lock().is_some())
            .finish()
    }
}

pub(crate) fn ensure_blocking_allowed() -> ClientResult<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ClientError::InvalidState(
            "blocking wait on a deferred result from inside an async runtime; await it instead"
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_envelope_value() {
        let result = OpResult::ok(5);
        assert!(result.has_value());
        assert!(!result.has_error());
        assert!(result.error_ref().is_none());
        assert_eq!(result.value().unwrap(), 5);
    }

    #[test]
    fn test_envelope_wrong_tag_is_invalid_state() {
        let failed: OpResult<u32> = OpResult::err(ClientError::SessionClosed);
        assert!(failed.has_error());
        assert_eq!(failed.value().unwrap_err().kind(), ErrorKind::InvalidState);

        let ok = OpResult::ok(1);
        assert_eq!(ok.error().unwrap_err().kind(), ErrorKind::InvalidState);

        let failed: OpResult<u32> = OpResult::err(ClientError::SessionClosed);
        assert_eq!(failed.error().unwrap().kind(), ErrorKind::SessionClosed);
    }

    #[test]
    fn test_envelope_conversions() {
        let result: OpResult<u32> = Ok(3).into();
        let back: ClientResult<u32> = result.map(|v| v * 2).into();
        assert_eq!(back.unwrap(), 6);
    }

    #[test]
    fn test_wait_from_other_thread() {
        let (promise, deferred) = Deferred::pair();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            promise.fulfill(OpResult::ok("done"));
        });
        assert_eq!(deferred.wait().unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout() {
        let (_promise, deferred) = Deferred::<u32>::pair();
        let started = Instant::now();
        let err = deferred.wait_timeout(Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_dropped_promise_resolves_session_closed() {
        let (promise, deferred) = Deferred::<u32>::pair();
        drop(promise);
        assert!(deferred.is_ready());
        assert_eq!(deferred.wait().unwrap_err().kind(), ErrorKind::SessionClosed);
    }

    #[test]
    fn test_sink_fulfills_once() {
        let (promise, deferred) = Deferred::<u32>::pair();
        let sink = promise.into_sink();
        sink(OpResult::err(ClientError::MalformedReply("bad".into())));
        assert_eq!(deferred.wait().unwrap_err().kind(), ErrorKind::MalformedReply);
    }

    #[test]
    fn test_resolved() {
        let deferred = Deferred::resolved(OpResult::ok(vec![1, 2]));
        assert!(deferred.is_ready());
        assert_eq!(deferred.wait().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_await() {
        let (promise, deferred) = Deferred::pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            promise.fulfill(OpResult::ok(11));
        });
        assert_eq!(deferred.await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_await_already_fulfilled() {
        let (promise, deferred) = Deferred::pair();
        promise.fulfill(OpResult::ok(1));
        assert_eq!(deferred.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blocking_wait_refused_in_runtime() {
        let deferred = Deferred::resolved(OpResult::ok(1));
        assert_eq!(deferred.wait().unwrap_err().kind(), ErrorKind::InvalidState);
    }
}
