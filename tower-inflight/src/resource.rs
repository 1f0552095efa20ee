use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use inflight_gate::ActionKey;
use inflight_gate::ActionPolicy;

use crate::error::RequestError;
use crate::handle::Handle;
use crate::tracker::RequestTracker;
use crate::transport::ServiceTransport;
use crate::transport::Transport;
use crate::wrapper::invoke;

struct Action<Req, Resp> {
    policy: ActionPolicy,
    transport: Arc<dyn Transport<Req, Response = Resp>>,
}

impl<Req, Resp> Clone for Action<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy,
            transport: Arc::clone(&self.transport),
        }
    }
}

/// Assembles the action set of a [`Resource`].
///
/// Builders compose like a base set of actions that a more specific set
/// extends: `extend` overrides same-named actions and `without` filters
/// inherited ones out. The result is immutable once built.
pub struct ResourceBuilder<Req, Resp> {
    actions: HashMap<ActionKey, Action<Req, Resp>>,
    tracker: Option<RequestTracker>,
}

impl<Req, Resp> Clone for ResourceBuilder<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<Req, Resp> Default for ResourceBuilder<Req, Resp> {
    fn default() -> Self {
        Self {
            actions: HashMap::new(),
            tracker: None,
        }
    }
}

impl<Req, Resp> fmt::Debug for ResourceBuilder<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceBuilder")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<Req, Resp> ResourceBuilder<Req, Resp> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `transport` under `policy`, replacing any earlier binding.
    pub fn action<X>(mut self, key: impl Into<ActionKey>, policy: ActionPolicy, transport: X) -> Self
    where
        X: Transport<Req, Response = Resp> + 'static,
    {
        self.actions.insert(
            key.into(),
            Action {
                policy,
                transport: Arc::new(transport),
            },
        );
        self
    }

    /// Bind `key` to a tower service.
    pub fn service<S>(self, key: impl Into<ActionKey>, policy: ActionPolicy, svc: S) -> Self
    where
        ServiceTransport<S>: Transport<Req, Response = Resp> + 'static,
    {
        self.action(key, policy, ServiceTransport::new(svc))
    }

    /// Add every action of `other`, overriding actions with the same key.
    ///
    /// The tracker of `self` wins if both builders set one.
    pub fn extend(mut self, other: ResourceBuilder<Req, Resp>) -> Self {
        self.actions.extend(other.actions);
        self.tracker = self.tracker.or(other.tracker);
        self
    }

    /// Drop an inherited action.
    pub fn without(mut self, key: &str) -> Self {
        self.actions.remove(key);
        self
    }

    /// Track calls with `tracker` instead of a fresh one.
    pub fn with_tracker(mut self, tracker: RequestTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn build(self) -> Resource<Req, Resp> {
        Resource {
            actions: Arc::new(self.actions),
            tracker: self.tracker.unwrap_or_default(),
        }
    }
}

/// A configured set of actions sharing one tracker.
///
/// Every invocation returns a [`Handle`]. `abort_all` and `has_pending` cover
/// all actions of the resource. Clones share the same tracker.
pub struct Resource<Req, Resp> {
    actions: Arc<HashMap<ActionKey, Action<Req, Resp>>>,
    tracker: RequestTracker,
}

impl<Req, Resp> Clone for Resource<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            actions: Arc::clone(&self.actions),
            tracker: self.tracker.clone(),
        }
    }
}

impl<Req, Resp> fmt::Debug for Resource<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl<Req, Resp> Resource<Req, Resp> {
    pub fn builder() -> ResourceBuilder<Req, Resp> {
        ResourceBuilder::new()
    }

    /// Invoke the action named `key`.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::UnknownAction` if `key` is not configured.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn invoke(&self, key: &str, req: Req) -> Result<Handle<Resp>, RequestError>
    where
        Resp: Send + 'static,
    {
        let (key, action) = self
            .actions
            .get_key_value(key)
            .ok_or_else(|| RequestError::UnknownAction(ActionKey::new(key)))?;
        Ok(invoke(
            &self.tracker,
            key,
            &action.policy,
            action.transport.as_ref(),
            req,
        ))
    }

    /// Abort every pending call of every action.
    pub fn abort_all(&self) {
        self.tracker.abort_all();
    }

    pub fn has_pending(&self) -> bool {
        self.tracker.has_pending()
    }

    pub fn policy(&self, key: &str) -> Option<ActionPolicy> {
        self.actions.get(key).map(|action| action.policy)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionKey> {
        self.actions.keys()
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }
}
