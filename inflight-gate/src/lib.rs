//! # inflight-gate
//!
//! `inflight-gate` decides whether an outgoing call for a named action should be
//! sent or suppressed, given the calls already in flight under that action.
//!
//! ## Key Concepts
//!
//! * **ActionKey**: A cheap, clonable name for one kind of operation (`"query"`, `"create"`).
//! * **ActionPolicy**: Per-action configuration. Concurrency is allowed unless
//!   explicitly disabled.
//! * **PendingSet**: The ordered (oldest-first) collection of in-flight entries for one key.
//! * **Gate Trait**: A unified interface for admission decisions, evaluated against
//!   the number of calls already pending.
//!
//! The crate holds no runtime state of its own. Decisions are pure functions of
//! the policy and a snapshot of pending entries.
//!
//! ## Example
//!
//! ```rust
//! use inflight_gate::ActionPolicy;
//! use inflight_gate::should_suppress;
//!
//! let policy = ActionPolicy::exclusive();
//!
//! assert!(!should_suppress(&policy, &[] as &[u64]));
//! assert!(should_suppress(&policy, &[1u64]));
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;

mod action;
mod gate;
mod pending;

pub use action::ActionKey;
pub use action::ActionPolicy;
pub use gate::should_suppress;
pub use pending::PendingSet;

/// Reasons why a call might be suppressed by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The action does not allow concurrent calls and `pending` calls are in flight.
    Exclusive { pending: usize },
}

/// The core trait for admission decisions.
///
/// Gates are evaluated at call time against the number of calls already
/// pending for the same action key.
pub trait Gate: Debug {
    /// Decides whether one more call may be admitted.
    ///
    /// This method is pure and total: it never fails and has no side effects.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the call should be suppressed.
    fn process(&self, pending: usize) -> ControlFlow<Reason>;
}
