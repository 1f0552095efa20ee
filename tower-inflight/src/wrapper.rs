use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use inflight_gate::ActionKey;
use inflight_gate::ActionPolicy;
use tower::BoxError;

use crate::handle::Handle;
use crate::handle::Placeholder;
use crate::token::AbortHandle;
use crate::token::CancellationToken;
use crate::token::Outcome;
use crate::tracker::RequestTracker;
use crate::transport::Dispatch;
use crate::transport::Transport;

/// Runs one call of `key` through the throttle gate and, if admitted, the transport.
///
/// Admitted calls are registered with `tracker`, dispatched immediately and
/// driven to settlement on a spawned task. Suppressed calls never reach the
/// transport and are not tracked; their handle settles as `Suppressed` when
/// the call already serving `key` settles, or as `Aborted` if aborted first.
///
/// A transport that panics while driving its response settles the call as
/// `Failed`. One that panics inside `dispatch` leaves the call `Aborted`.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime.
pub fn invoke<Req, T, X>(
    tracker: &RequestTracker,
    key: &ActionKey,
    policy: &ActionPolicy,
    transport: &X,
    req: Req,
) -> Handle<T>
where
    X: Transport<Req, Response = T> + ?Sized,
    T: Send + 'static,
{
    let (token, completion) = CancellationToken::new();

    if let Err(serving) = tracker.admit(key.clone(), policy, token.abort_handle()) {
        tracing::debug!(
            action = %key,
            token = %token.id(),
            serving = %serving.id(),
            "request suppressed"
        );
        let suppressed = token.abort_handle();
        serving.token().on_settle(move |_| {
            suppressed.suppress();
        });
        return Handle::new(Placeholder::new(), completion, token.abort_handle());
    }

    // Settles the call if `dispatch` or the worker task unwinds.
    let guard = AbortOnDrop(token.abort_handle());
    let Dispatch {
        placeholder,
        response,
    } = transport.dispatch(req, token.signal());
    tracing::debug!(action = %key, token = %token.id(), "request admitted");

    let handle = Handle::new(placeholder, completion, token.abort_handle());
    tokio::spawn(drive(token, response, guard));
    handle
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn drive<T>(
    token: CancellationToken<T>,
    response: BoxFuture<'static, Result<T, BoxError>>,
    _guard: AbortOnDrop,
) where
    T: Send + 'static,
{
    let signal = token.signal();
    tokio::select! {
        biased;
        _ = signal.cancelled() => {}
        result = AssertUnwindSafe(response).catch_unwind() => {
            let outcome = match result {
                Ok(Ok(value)) => Outcome::Completed(value),
                Ok(Err(err)) => Outcome::Failed(err),
                Err(panic) => {
                    let err = panic_error(panic);
                    tracing::warn!(token = %token.id(), %err, "transport panicked");
                    Outcome::Failed(err)
                }
            };
            token.settle(outcome);
        }
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> BoxError {
    let message = match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    };
    format!("transport panicked: {message}").into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::token::CancelSignal;
    use crate::token::Settlement;
    use crate::transport::transport_fn;

    #[tokio::test]
    async fn admitted_call_settles_with_transport_value() {
        let tracker = RequestTracker::new();
        let key = ActionKey::from("query");
        let transport = transport_fn(|n: u32, _signal: CancelSignal| {
            let placeholder = Placeholder::new();
            let shell = placeholder.clone();
            Dispatch::new(placeholder, async move {
                shell.fill(n * 2);
                Ok::<_, BoxError>(n * 2)
            })
        });

        let handle = invoke(&tracker, &key, &ActionPolicy::default(), &transport, 21);
        assert!(tracker.has_pending());

        let placeholder = handle.placeholder().clone();
        assert!(matches!(handle.await, Outcome::Completed(42)));
        assert_eq!(placeholder.get(), Some(42));
        assert!(!tracker.has_pending());
    }

    #[tokio::test]
    async fn suppressed_call_is_bound_to_the_serving_call() {
        let tracker = RequestTracker::new();
        let key = ActionKey::from("query");
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();
        let rx = std::sync::Mutex::new(Some(rx));
        let counted = calls.clone();
        let transport = transport_fn(move |_: (), _signal: CancelSignal| {
            counted.fetch_add(1, Ordering::SeqCst);
            let rx = rx.lock().unwrap().take();
            Dispatch::new(Placeholder::new(), async move {
                let rx = rx.ok_or("transport reused")?;
                Ok::<_, BoxError>(rx.await?)
            })
        });
        let policy = ActionPolicy::exclusive();

        let first = invoke(&tracker, &key, &policy, &transport, ());
        let mut second = invoke(&tracker, &key, &policy, &transport, ());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.len(), 1);
        assert!(futures::poll!(&mut second).is_pending());

        tx.send(1).unwrap();

        assert!(matches!(first.await, Outcome::Completed(1)));
        assert!(matches!(second.await, Outcome::Suppressed));
        assert!(!tracker.has_pending());
    }

    #[tokio::test]
    async fn aborting_drops_the_transport_future() {
        let tracker = RequestTracker::new();
        let dropped = Arc::new(AtomicUsize::new(0));

        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = dropped.clone();
        let transport = transport_fn(move |_: (), _signal: CancelSignal| {
            let guard = DropCounter(counter.clone());
            Dispatch::new(Placeholder::<()>::new(), async move {
                let _guard = guard;
                futures::future::pending::<Result<(), BoxError>>().await
            })
        });

        let handle = invoke(&tracker, &"slow".into(), &ActionPolicy::default(), &transport, ());
        tokio::task::yield_now().await;
        assert!(handle.abort());
        assert_eq!(handle.settlement(), Some(Settlement::Aborted));

        assert!(handle.await.is_aborted());
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert!(!tracker.has_pending());
    }

    #[tokio::test]
    async fn panicking_transport_settles_as_failed() {
        let tracker = RequestTracker::new();
        let key = ActionKey::from("query");
        let transport = transport_fn(|fail: bool, _signal: CancelSignal| {
            Dispatch::new(Placeholder::<u32>::new(), async move {
                if fail {
                    panic!("transport bug");
                }
                Ok::<_, BoxError>(1)
            })
        });
        let policy = ActionPolicy::exclusive();

        let handle = invoke(&tracker, &key, &policy, &transport, true);
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("handle settles");

        match outcome {
            Outcome::Failed(err) => assert!(err.to_string().contains("transport bug")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!tracker.has_pending());

        let next = invoke(&tracker, &key, &policy, &transport, false);
        assert!(matches!(next.await, Outcome::Completed(1)));
    }

    #[tokio::test]
    async fn panicking_dispatch_leaves_nothing_pending() {
        let tracker = RequestTracker::new();
        let key = ActionKey::from("query");
        let transport = transport_fn(|_: (), _signal: CancelSignal| -> Dispatch<()> {
            panic!("dispatch bug");
        });

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            invoke(&tracker, &key, &ActionPolicy::exclusive(), &transport, ())
        }));

        assert!(result.is_err());
        assert!(!tracker.has_pending());
        assert!(tracker.is_empty());
    }
}
