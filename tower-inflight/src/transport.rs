use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::sync::PoisonError;

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

use crate::handle::Placeholder;
use crate::token::CancelSignal;

/// What a transport hands back synchronously when a call is admitted.
pub struct Dispatch<T> {
    /// Filled in place by the transport once data arrives.
    pub placeholder: Placeholder<T>,
    /// Settles with the transport's value or error.
    pub response: BoxFuture<'static, Result<T, BoxError>>,
}

impl<T> fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}

impl<T> Dispatch<T> {
    pub fn new<F>(placeholder: Placeholder<T>, response: F) -> Self
    where
        F: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            placeholder,
            response: response.boxed(),
        }
    }
}

/// Fires a request now and populates its result later.
///
/// Implementations must return without waiting on the network. The returned
/// future is driven by the tracker's worker task, which drops it if the call
/// is aborted first. `signal` may be watched for the same purpose.
pub trait Transport<Req>: Send + Sync {
    type Response;

    fn dispatch(&self, req: Req, signal: CancelSignal) -> Dispatch<Self::Response>;
}

/// Returns a [`Transport`] built from a closure, like `tower::service_fn`.
pub fn transport_fn<F>(f: F) -> TransportFn<F> {
    TransportFn { f }
}

#[derive(Clone, Copy)]
pub struct TransportFn<F> {
    f: F,
}

impl<F> fmt::Debug for TransportFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFn")
            .field("f", &std::any::type_name::<F>())
            .finish()
    }
}

impl<F, Req, T> Transport<Req> for TransportFn<F>
where
    F: Fn(Req, CancelSignal) -> Dispatch<T> + Send + Sync,
{
    type Response = T;

    fn dispatch(&self, req: Req, signal: CancelSignal) -> Dispatch<T> {
        (self.f)(req, signal)
    }
}

/// Uses a tower [`Service`] as a transport.
///
/// Each call drives a fresh clone of the service to readiness and then calls
/// it. On success the response is written into the placeholder before the
/// call settles. The service only has to be `Send`; it is cloned under a lock.
#[derive(Debug)]
pub struct ServiceTransport<S> {
    inner: Mutex<S>,
}

impl<S: Clone> Clone for ServiceTransport<S> {
    fn clone(&self) -> Self {
        Self::new(self.service())
    }
}

impl<S> ServiceTransport<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn service(&self) -> S
    where
        S: Clone,
    {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S, Req> Transport<Req> for ServiceTransport<S>
where
    S: Service<Req, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Clone + Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;

    fn dispatch(&self, req: Req, _signal: CancelSignal) -> Dispatch<S::Response> {
        let placeholder = Placeholder::new();
        let shell = placeholder.clone();
        let svc = self.service();

        Dispatch::new(placeholder, async move {
            let response = svc.oneshot(req).await?;
            shell.fill(response.clone());
            Ok::<_, BoxError>(response)
        })
    }
}
