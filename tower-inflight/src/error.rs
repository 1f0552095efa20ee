use inflight_gate::ActionKey;
use tower::BoxError;

/// Errors produced when a tracked call does not complete with a value.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The call was cancelled before it completed.
    ///
    /// Either its own handle was aborted or the whole resource was torn down
    /// with `abort_all`.
    #[error("request aborted")]
    Aborted,

    /// The call never reached the transport.
    ///
    /// Its action does not allow concurrency and another call was already in
    /// flight. The handle settles once that call settles.
    #[error("request suppressed; another call is already serving this action")]
    Suppressed,

    /// The transport failed. The inner error is passed through unchanged.
    #[error("transport failed: {0}")]
    Transport(#[source] BoxError),

    /// The action is not configured on the resource.
    #[error("unknown action `{0}`")]
    UnknownAction(ActionKey),
}

impl RequestError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed)
    }
}
