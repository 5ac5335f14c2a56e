//! Window key and entry naming.

/// Store key of the sliding window for one rate-limited subject.
///
/// The key is the limiter name, followed by the subject when one is given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// Name of the limiter this window belongs to
    pub limiter: String,
    /// The rate-limited subject (may be empty)
    pub subject: String,
}

impl WindowKey {
    /// Create a new window key.
    pub fn new(limiter: &str, subject: &str) -> Self {
        Self {
            limiter: limiter.to_string(),
            subject: subject.to_string(),
        }
    }

    /// The key under which the window is stored.
    pub fn to_store_key(&self) -> String {
        if self.subject.is_empty() {
            self.limiter.clone()
        } else {
            format!("{}:{}", self.limiter, self.subject)
        }
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

/// A disambiguator for window entries sharing a timestamp.
pub(crate) fn entry_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_with_subject() {
        let key = WindowKey::new("api", "client_a");
        assert_eq!(key.to_store_key(), "api:client_a");
        assert_eq!(key.to_string(), "api:client_a");
    }

    #[test]
    fn test_window_key_without_subject() {
        let key = WindowKey::new("rate_limiter", "");
        assert_eq!(key.to_store_key(), "rate_limiter");
    }

    #[test]
    fn test_nonces_are_unique() {
        assert_ne!(entry_nonce(), entry_nonce());
    }
}
