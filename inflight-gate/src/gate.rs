use std::ops::ControlFlow;

use super::ActionPolicy;
use super::Gate;
use super::Reason;

impl Gate for ActionPolicy {
    fn process(&self, pending: usize) -> ControlFlow<Reason> {
        if self.allow_concurrent() || pending == 0 {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(Reason::Exclusive { pending })
        }
    }
}

/// Returns `true` iff `policy` forbids concurrency and `pending` is non-empty.
pub fn should_suppress<E>(policy: &ActionPolicy, pending: &[E]) -> bool {
    policy.process(pending.len()).is_break()
}
