use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Names one kind of operation, e.g. `"query"` or `"create"`.
///
/// Cloning is a reference count bump, so keys can be stored freely in
/// tracking structures and log fields.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey(Arc<str>);

impl ActionKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ActionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ActionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ActionKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Per-action configuration.
///
/// The default allows concurrent calls. An exclusive policy admits a single
/// in-flight call per key and suppresses new calls while it is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    allow_concurrent: bool,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            allow_concurrent: true,
        }
    }
}

impl ActionPolicy {
    /// Any number of calls may be in flight under the key.
    pub fn concurrent() -> Self {
        Self::default()
    }

    /// Only one call may be in flight under the key.
    pub fn exclusive() -> Self {
        Self {
            allow_concurrent: false,
        }
    }

    /// Set whether calls under this key may overlap.
    pub fn with_allow_concurrent(mut self, allow_concurrent: bool) -> Self {
        self.allow_concurrent = allow_concurrent;
        self
    }

    pub fn allow_concurrent(&self) -> bool {
        self.allow_concurrent
    }
}
