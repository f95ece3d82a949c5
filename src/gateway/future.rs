//! Caller-facing handles: the cancellable response future and fallbacks.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FusedFuture};
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult, FailureCause};
use crate::http::{CorrelationId, Response, ServiceId};

/// Result of [`Gateway::execute`](crate::gateway::Gateway::execute).
///
/// Resolves to exactly one response or one error. Dropping it, or calling
/// [`cancel`](Self::cancel), stops the call: retries end, in-flight attempts
/// are abandoned and nothing is delivered afterwards.
#[must_use = "futures do nothing unless polled"]
pub struct ResponseFuture {
    inner: BoxFuture<'static, ClientResult<Response>>,
    cancel: CancellationToken,
    service: Option<ServiceId>,
    correlation_id: CorrelationId,
    done: bool,
}

impl ResponseFuture {
    pub(crate) fn new(
        inner: BoxFuture<'static, ClientResult<Response>>,
        cancel: CancellationToken,
        service: Option<ServiceId>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            inner,
            cancel,
            service,
            correlation_id,
            done: false,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this call; usable from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Future for ResponseFuture {
    type Output = ClientResult<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Terminated futures stay pending, like `Fuse`
        if self.done {
            return Poll::Pending;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Poll::Ready(Err(ClientError::RequestFailed {
                service: self.service.clone(),
                correlation_id: self.correlation_id,
                cause: FailureCause::Cancelled,
            }));
        }
        let result = futures_util::ready!(self.inner.poll_unpin(cx));
        self.done = true;
        Poll::Ready(result)
    }
}

impl FusedFuture for ResponseFuture {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        if !self.done {
            self.cancel.cancel();
        }
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("service", &self.service)
            .field("correlation_id", &self.correlation_id)
            .field("done", &self.done)
            .finish()
    }
}

type Produce = Box<dyn FnOnce(ClientError) -> BoxFuture<'static, Response> + Send>;

/// Substitute response used when the primary call fails.
pub struct Fallback {
    produce: Produce,
}

impl Fallback {
    /// Always answer with `response`.
    pub fn value(response: Response) -> Self {
        Self {
            produce: Box::new(move |_| async move { response }.boxed()),
        }
    }

    /// Compute the response from the primary failure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(ClientError) -> Fut + Send + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            produce: Box::new(move |error| f(error).boxed()),
        }
    }

    pub(crate) async fn resolve(self, error: ClientError) -> Response {
        (self.produce)(error).await
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fallback")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_cancel_before_poll_yields_cancelled() {
        let future = ResponseFuture::new(
            async { Ok(Response::new(StatusCode::OK)) }.boxed(),
            CancellationToken::new(),
            Some(ServiceId::new("orders")),
            CorrelationId::new(),
        );
        future.cancel();
        let err = future.await.unwrap_err();
        assert_eq!(err.cause(), Some(&FailureCause::Cancelled));
    }

    #[tokio::test]
    async fn test_completed_future_is_not_polled_again() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut future = ResponseFuture::new(
            futures_util::future::poll_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Poll::Ready(Ok(Response::new(StatusCode::OK)))
            })
            .boxed(),
            CancellationToken::new(),
            Some(ServiceId::new("orders")),
            CorrelationId::new(),
        );

        assert!(!future.is_terminated());
        assert!((&mut future).now_or_never().unwrap().is_ok());
        assert!(future.is_terminated());
        assert!((&mut future).now_or_never().is_none());
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let token = CancellationToken::new();
        let future = ResponseFuture::new(
            futures_util::future::pending().boxed(),
            token.clone(),
            None,
            CorrelationId::new(),
        );
        drop(future);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_fallback_sees_error() {
        let fallback = Fallback::from_fn(|error: ClientError| async move {
            Response::buffered(StatusCode::OK, error.to_string())
        });
        let response = fallback
            .resolve(ClientError::CircuitOpen {
                service: ServiceId::new("orders"),
            })
            .await;
        assert_eq!(
            response.bytes().unwrap().as_ref(),
            b"circuit open for service orders"
        );
    }
}
