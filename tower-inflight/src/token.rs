use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use pin_project_lite::pin_project;
use tokio::sync::Notify;
use tokio::sync::oneshot;
use tower::BoxError;

use crate::RequestError;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a token, used to remove exactly its own entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    fn next() -> Self {
        Self(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a token was settled, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Settlement {
    Completed,
    Failed,
    Aborted,
    Suppressed,
}

impl Settlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final state of one logical call.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The transport produced a value.
    Completed(T),
    /// The transport failed. The error is the transport's own.
    Failed(BoxError),
    /// The call was cancelled before the transport finished.
    Aborted,
    /// The call was throttled and the call serving its action has settled.
    Suppressed,
}

impl<T> Outcome<T> {
    pub fn settlement(&self) -> Settlement {
        match self {
            Self::Completed(_) => Settlement::Completed,
            Self::Failed(_) => Settlement::Failed,
            Self::Aborted => Settlement::Aborted,
            Self::Suppressed => Settlement::Suppressed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Converts the outcome into a `Result`, keeping transport errors unchanged.
    ///
    /// # Errors
    ///
    /// Every outcome other than `Completed` maps to the matching `RequestError`.
    pub fn into_result(self) -> Result<T, RequestError> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(err) => Err(RequestError::Transport(err)),
            Self::Aborted => Err(RequestError::Aborted),
            Self::Suppressed => Err(RequestError::Suppressed),
        }
    }
}

/// Callback run once when a token settles.
pub type Listener = Box<dyn FnOnce(Settlement) + Send>;

enum State<T> {
    Pending {
        listeners: Vec<Listener>,
        completion: Option<oneshot::Sender<Outcome<T>>>,
    },
    Settled(Settlement),
}

struct Inner<T> {
    id: TokenId,
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let settlement = outcome.settlement();

        // Listeners may re-enter the tracker, so they run after the lock is released.
        let (listeners, completion) = {
            let mut state = self.lock();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending {
                    listeners,
                    completion,
                } => {
                    let taken = (std::mem::take(listeners), completion.take());
                    *state = State::Settled(settlement);
                    taken
                }
            }
        };

        tracing::trace!(token = %self.id, %settlement, "token settled");
        self.notify.notify_waiters();

        for listener in listeners {
            listener(settlement);
        }
        if let Some(tx) = completion {
            let _ = tx.send(outcome);
        }
        true
    }

    fn on_settle(&self, listener: Listener) {
        let settled = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending { listeners, .. } => {
                    listeners.push(listener);
                    return;
                }
                State::Settled(settlement) => *settlement,
            }
        };
        listener(settled);
    }

    fn settlement(&self) -> Option<Settlement> {
        match &*self.lock() {
            State::Pending { .. } => None,
            State::Settled(settlement) => Some(*settlement),
        }
    }
}

/// The type-erased face of a token, shared by the tracker and abort handles.
trait Erased: Send + Sync {
    fn id(&self) -> TokenId;
    fn abort(&self) -> bool;
    fn suppress(&self) -> bool;
    fn settlement(&self) -> Option<Settlement>;
    fn on_settle(&self, listener: Listener);
    fn notify(&self) -> &Notify;
}

impl<T: Send + 'static> Erased for Inner<T> {
    fn id(&self) -> TokenId {
        self.id
    }

    fn abort(&self) -> bool {
        self.settle(Outcome::Aborted)
    }

    fn suppress(&self) -> bool {
        self.settle(Outcome::Suppressed)
    }

    fn settlement(&self) -> Option<Settlement> {
        Inner::settlement(self)
    }

    fn on_settle(&self, listener: Listener) {
        Inner::on_settle(self, listener)
    }

    fn notify(&self) -> &Notify {
        &self.notify
    }
}

/// A settle-once signal for one in-flight call.
///
/// The transport's natural completion and an explicit abort race to settle the
/// same token. Exactly one wins; every later attempt is ignored and reported
/// as `false`.
pub struct CancellationToken<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CancellationToken<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for CancellationToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("id", &self.inner.id)
            .field("settlement", &self.inner.settlement())
            .finish()
    }
}

impl<T: Send + 'static> CancellationToken<T> {
    /// Creates a pending token and the future that resolves with its outcome.
    pub fn new() -> (Self, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        let token = Self {
            inner: Arc::new(Inner {
                id: TokenId::next(),
                state: Mutex::new(State::Pending {
                    listeners: Vec::new(),
                    completion: Some(tx),
                }),
                notify: Notify::new(),
            }),
        };
        (token, Completion { rx })
    }

    pub fn id(&self) -> TokenId {
        self.inner.id
    }

    /// Settles the token with `outcome`.
    ///
    /// Listeners run before the completion future observes the outcome.
    /// Returns `false` if the token was already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        self.inner.settle(outcome)
    }

    /// Settles the token as `Aborted`. Returns `false` if it was already settled.
    pub fn abort(&self) -> bool {
        self.inner.settle(Outcome::Aborted)
    }

    /// Runs `listener` exactly once when the token settles.
    ///
    /// If the token is already settled, `listener` runs immediately.
    pub fn on_settle<F>(&self, listener: F)
    where
        F: FnOnce(Settlement) + Send + 'static,
    {
        self.inner.on_settle(Box::new(listener));
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.inner.settlement()
    }

    pub fn is_settled(&self) -> bool {
        self.settlement().is_some()
    }

    /// A cancellation view of this token for the transport to observe.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            inner: self.inner.clone(),
        }
    }

    /// A type-erased handle that can abort this token.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            inner: self.inner.clone(),
        }
    }
}

/// Aborts one specific call, whatever its response type.
#[derive(Clone)]
pub struct AbortHandle {
    inner: Arc<dyn Erased>,
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("id", &self.inner.id())
            .field("settlement", &self.inner.settlement())
            .finish()
    }
}

impl AbortHandle {
    pub fn id(&self) -> TokenId {
        self.inner.id()
    }

    /// Settles the call as `Aborted`.
    ///
    /// Idempotent. Returns `false` if the call had already settled, in which
    /// case its original outcome is kept.
    pub fn abort(&self) -> bool {
        self.inner.abort()
    }

    pub(crate) fn suppress(&self) -> bool {
        self.inner.suppress()
    }

    /// Runs `listener` exactly once when the call settles.
    pub fn on_settle<F>(&self, listener: F)
    where
        F: FnOnce(Settlement) + Send + 'static,
    {
        self.inner.on_settle(Box::new(listener));
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.inner.settlement()
    }

    pub fn is_settled(&self) -> bool {
        self.settlement().is_some()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            inner: self.inner.clone(),
        }
    }
}

/// Lets a transport observe that its call was aborted.
///
/// Cancellation is cooperative: the signal only reports intent. A transport
/// holding a socket or similar resource should release it once `cancelled`
/// resolves.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<dyn Erased>,
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("id", &self.inner.id())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        self.inner.settlement() == Some(Settlement::Aborted)
    }

    /// Resolves once the call is aborted.
    ///
    /// Never resolves if the call settles any other way.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify().notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            match self.inner.settlement() {
                Some(Settlement::Aborted) => return,
                Some(_) => return futures::future::pending().await,
                None => notified.await,
            }
        }
    }
}

pin_project! {
    /// Resolves exactly once with the outcome of its token.
    pub struct Completion<T> {
        #[pin]
        rx: oneshot::Receiver<Outcome<T>>,
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T> Future for Completion<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.rx.poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            // Every token clone dropped without settling.
            Err(_) => Poll::Ready(Outcome::Aborted),
        }
    }
}
