use inflight_gate::ActionKey;
use inflight_gate::ActionPolicy;
use tower::Layer;

use crate::service::TrackService;
use crate::tracker::RequestTracker;

/// Tracks calls to the wrapped service as one action.
///
/// Services produced by the same layer share its tracker, so throttling and
/// `abort_all` apply across all of them.
#[derive(Clone, Debug)]
pub struct TrackLayer {
    key: ActionKey,
    policy: ActionPolicy,
    tracker: RequestTracker,
}

impl TrackLayer {
    /// Create a TrackLayer with the default policy and a fresh tracker.
    pub fn new(key: impl Into<ActionKey>) -> Self {
        TrackLayer {
            key: key.into(),
            policy: ActionPolicy::default(),
            tracker: RequestTracker::new(),
        }
    }

    /// Set the policy applied to every call.
    pub fn with_policy(mut self, policy: ActionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share `tracker` with other layers or resources.
    pub fn with_tracker(mut self, tracker: RequestTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }
}

impl<S> Layer<S> for TrackLayer {
    type Service = TrackService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TrackService::new(service, self.key.clone(), self.tracker.clone()).with_policy(self.policy)
    }
}
