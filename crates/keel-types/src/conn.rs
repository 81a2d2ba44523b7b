use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local identifier for one connection.
///
/// Used to key response waiters and to let fan-out collaborators skip the
/// connection an object arrived on. `ConnId`s are never reused within a
/// process but carry no meaning across processes or restarts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnId(u64);

impl ConnId {
    /// Allocate a fresh, process-unique connection id.
    pub fn fresh() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnId({})", self.0)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_unique() {
        let a = ConnId::fresh();
        let b = ConnId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn fresh_ids_are_monotonic() {
        let a = ConnId::fresh();
        let b = ConnId::fresh();
        assert!(b.as_u64() > a.as_u64());
    }
}
