use std::task::Context;
use std::task::Poll;

use futures::future::Ready;
use futures::future::ready;
use inflight_gate::ActionKey;
use inflight_gate::ActionPolicy;
use tower::BoxError;
use tower::Service;

use crate::handle::Handle;
use crate::tracker::RequestTracker;
use crate::transport::ServiceTransport;
use crate::wrapper::invoke;

/// Wraps an inner service so every call returns a tracked [`Handle`].
///
/// The service is always ready. Readiness of the inner service is awaited by
/// the worker task that drives each admitted call.
#[derive(Debug)]
pub struct TrackService<S> {
    transport: ServiceTransport<S>,
    key: ActionKey,
    policy: ActionPolicy,
    tracker: RequestTracker,
}

impl<S: Clone> Clone for TrackService<S> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            key: self.key.clone(),
            policy: self.policy,
            tracker: self.tracker.clone(),
        }
    }
}

impl<S, Req> Service<Req> for TrackService<S>
where
    S: Service<Req, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Clone + Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = Handle<S::Response>;
    type Error = BoxError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        ready(Ok(invoke(
            &self.tracker,
            &self.key,
            &self.policy,
            &self.transport,
            req,
        )))
    }
}

impl<S> TrackService<S> {
    pub fn new(inner: S, key: ActionKey, tracker: RequestTracker) -> Self {
        Self {
            transport: ServiceTransport::new(inner),
            key,
            policy: ActionPolicy::default(),
            tracker,
        }
    }

    pub fn with_policy(mut self, policy: ActionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }

    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    /// Abort every pending call tracked by this service's tracker.
    pub fn abort_all(&self) {
        self.tracker.abort_all();
    }

    pub fn has_pending(&self) -> bool {
        self.tracker.has_pending()
    }
}
