//! Per-request units of work and their one-shot completion signals.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::WebError;
use crate::http::{Request, Response, StatusCode};

/// Write side of a one-shot signal. Clones share the same slot; the first
/// `complete` wins.
pub struct Promise<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Promise<T> {
    pub fn channel() -> (Self, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        let promise = Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (promise, Completion { rx })
    }

    /// Returns `false`, dropping `value`, if already completed.
    pub fn complete(&self, value: T) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            warn!("completion signalled more than once; ignored");
            return false;
        };
        // Nobody waiting is fine.
        let _ = tx.send(value);
        true
    }

    pub fn is_done(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("done", &self.is_done()).finish()
    }
}

/// Read side of a [`Promise`]. Resolves to `None` if every promise handle was
/// dropped without completing.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Completion<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

/// How a request finished.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: StatusCode,
    pub error: Option<WebError>,
}

impl Outcome {
    pub fn new(status: StatusCode, error: Option<WebError>) -> Self {
        Self { status, error }
    }
}

/// A request, its response handle and the promise completed when it is done.
#[derive(Debug, Clone)]
pub struct RequestTask {
    request: Arc<Request>,
    response: Response,
    promise: Promise<Outcome>,
}

impl RequestTask {
    pub fn new(request: Request) -> (Self, Completion<Outcome>) {
        Self::with_response(Arc::new(request), Response::new())
    }

    pub fn with_response(request: Arc<Request>, response: Response) -> (Self, Completion<Outcome>) {
        let (promise, completion) = Promise::channel();
        let task = Self {
            request,
            response,
            promise,
        };
        (task, completion)
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn promise(&self) -> &Promise<Outcome> {
        &self.promise
    }

    pub fn is_done(&self) -> bool {
        self.promise.is_done()
    }

    /// Completes with the response's current status.
    pub(crate) fn finish(&self, error: Option<WebError>) -> bool {
        self.promise
            .complete(Outcome::new(self.response.status(), error))
    }
}

/// Handed to async route handlers; signal once with the result.
///
/// Dropping every clone without signalling fails the request with a 500.
#[derive(Debug, Clone)]
pub struct Completer {
    promise: Promise<Result<(), WebError>>,
}

impl Completer {
    pub(crate) fn channel() -> (Self, Completion<Result<(), WebError>>) {
        let (promise, completion) = Promise::channel();
        (Self { promise }, completion)
    }

    pub fn success(&self) -> bool {
        self.promise.complete(Ok(()))
    }

    pub fn failure(&self, error: WebError) -> bool {
        self.promise.complete(Err(error))
    }

    pub fn is_done(&self) -> bool {
        self.promise.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[tokio::test]
    async fn first_completion_wins() {
        let (promise, completion) = Promise::channel();
        let other = promise.clone();
        assert!(promise.complete(1));
        assert!(!other.complete(2));
        assert!(other.is_done());
        assert_eq!(completion.await, Some(1));
    }

    #[tokio::test]
    async fn dropped_promise_resolves_to_none() {
        let (promise, completion) = Promise::<u8>::channel();
        drop(promise);
        assert_eq!(completion.await, None);
    }

    #[tokio::test]
    async fn task_finishes_with_response_status() {
        let (task, completion) = RequestTask::new(Request::builder(Method::Get, "/").build());
        task.response().set_status(StatusCode::Created);
        assert!(task.finish(None));
        assert!(!task.finish(Some(WebError::Internal("late".into()))));
        let outcome = completion.await.unwrap();
        assert_eq!(outcome.status, StatusCode::Created);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn completer_signals_once() {
        let (completer, completion) = Completer::channel();
        let clone = completer.clone();
        tokio::spawn(async move {
            assert!(clone.failure(WebError::BadRequest("nope".into())));
        })
        .await
        .unwrap();
        assert!(!completer.success());
        let result = completion.await.unwrap();
        assert!(matches!(result, Err(WebError::BadRequest(_))));
    }
}
