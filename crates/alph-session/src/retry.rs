//! Prompt retry policy

use crate::error::AuthError;
use serde::{Deserialize, Serialize};

/// Bounds how often an unlock re-prompts after a retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Prompts per unlock attempt, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Policy with a fixed prompt count
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Whether to prompt again after `attempt` prompts ended with `err`
    pub fn should_retry(&self, attempt: u32, err: &AuthError) -> bool {
        err.is_retryable() && attempt < self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_by_max_attempts() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(1, &AuthError::Cancelled));
        assert!(policy.should_retry(2, &AuthError::InvalidCredential));
        assert!(!policy.should_retry(3, &AuthError::Cancelled));
    }

    #[test]
    fn test_fatal_errors_not_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(1, &AuthError::CredentialCorrupt("tag".into())));
        assert!(!policy.should_retry(1, &AuthError::Storage("io".into())));
    }

    #[test]
    fn test_zero_still_prompts_once() {
        let policy = RetryPolicy::new(0);
        assert!(!policy.should_retry(1, &AuthError::Cancelled));
    }
}
