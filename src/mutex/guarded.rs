//! Outcome of a guarded execution.

/// Result of [`DistributedMutex::run_exclusive`](super::DistributedMutex::run_exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Guarded<T> {
    /// The lock was acquired and the body ran to completion
    Ran(T),
    /// Another holder owns the lock; the body did not run
    Busy,
}

impl<T> Guarded<T> {
    /// Whether the body ran.
    pub fn ran(&self) -> bool {
        matches!(self, Guarded::Ran(_))
    }

    /// Whether the lock was busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, Guarded::Busy)
    }

    /// The body's result, if it ran.
    pub fn into_option(self) -> Option<T> {
        match self {
            Guarded::Ran(value) => Some(value),
            Guarded::Busy => None,
        }
    }

    /// Map the body's result.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Guarded<U> {
        match self {
            Guarded::Ran(value) => Guarded::Ran(f(value)),
            Guarded::Busy => Guarded::Busy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_accessors() {
        let ran: Guarded<u32> = Guarded::Ran(7);
        assert!(ran.ran());
        assert!(!ran.is_busy());
        assert_eq!(ran.clone().map(|v| v * 2), Guarded::Ran(14));
        assert_eq!(ran.into_option(), Some(7));

        let busy: Guarded<u32> = Guarded::Busy;
        assert!(busy.is_busy());
        assert_eq!(busy.into_option(), None);
    }
}
