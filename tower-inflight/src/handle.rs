use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::task::Context;
use std::task::Poll;

use pin_project_lite::pin_project;

use crate::token::AbortHandle;
use crate::token::Completion;
use crate::token::Outcome;
use crate::token::Settlement;
use crate::token::TokenId;

/// A shared shell the transport fills in place once data arrives.
///
/// Callers may read it at any time, so UI state can be bound before the
/// call completes. Suppressed calls keep an empty placeholder.
pub struct Placeholder<T> {
    slot: Arc<RwLock<Option<T>>>,
}

impl<T> Clone for Placeholder<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Placeholder<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Placeholder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| f.debug_tuple("Placeholder").field(&value).finish())
    }
}

impl<T> Placeholder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any earlier one.
    pub fn fill(&self, value: T) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn is_filled(&self) -> bool {
        self.with(|value| value.is_some())
    }

    /// Runs `f` against the current contents without cloning them.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        f(slot.as_ref())
    }

    /// Returns `true` if both placeholders share the same shell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: Clone> Placeholder<T> {
    pub fn get(&self) -> Option<T> {
        self.with(|value| value.cloned())
    }
}

pin_project! {
    /// What every invocation returns, whether it was admitted or suppressed.
    ///
    /// Awaiting the handle yields the call's [`Outcome`]. The placeholder can be
    /// read before that, and `abort` is safe to call at any point.
    pub struct Handle<T> {
        placeholder: Placeholder<T>,
        abort: AbortHandle,
        #[pin]
        completion: Completion<T>,
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("token", &self.abort.id())
            .field("settlement", &self.abort.settlement())
            .finish_non_exhaustive()
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(
        placeholder: Placeholder<T>,
        completion: Completion<T>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            placeholder,
            abort,
            completion,
        }
    }

    pub fn placeholder(&self) -> &Placeholder<T> {
        &self.placeholder
    }

    /// Aborts this call only, never another call under the same action.
    ///
    /// Returns `false` if the call had already settled. A completed call keeps
    /// its value.
    pub fn abort(&self) -> bool {
        self.abort.abort()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn id(&self) -> TokenId {
        self.abort.id()
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.abort.settlement()
    }

    pub fn into_parts(self) -> (Placeholder<T>, Completion<T>, AbortHandle) {
        (self.placeholder, self.completion, self.abort)
    }
}

impl<T> Future for Handle<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().completion.poll(cx)
    }
}
