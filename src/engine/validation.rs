use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::CoordinatorError;

pub const MAX_IDENTIFIER_LEN: usize = 100;

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("identifier pattern compiles"));

/// Checks a worker identifier against the allow-list: 1 to 100 ASCII alphanumerics,
/// `-`, `_` or `.`.
pub fn validate_identifier(identifier: &str) -> Result<(), CoordinatorError> {
    if identifier.is_empty() {
        return Err(CoordinatorError::Validation(
            "identifier must not be empty".into(),
        ));
    }

    let length = identifier.chars().count();
    if length > MAX_IDENTIFIER_LEN {
        return Err(CoordinatorError::Validation(format!(
            "identifier is {length} characters, limit is {MAX_IDENTIFIER_LEN}"
        )));
    }

    if !IDENTIFIER_PATTERN.is_match(identifier) {
        return Err(CoordinatorError::Validation(
            "identifier contains characters outside [A-Za-z0-9._-]".into(),
        ));
    }

    Ok(())
}

/// Rejects an observation older than what the store already holds.
pub fn check_freshness(
    stored: DateTime<Utc>,
    observed: DateTime<Utc>,
) -> Result<(), CoordinatorError> {
    if stored > observed {
        return Err(CoordinatorError::Conflict(format!(
            "stored activity {} is newer than observed {}",
            stored.to_rfc3339(),
            observed.to_rfc3339()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_accepts_allowed_identifiers() {
        let longest = "z".repeat(100);
        for id in ["w1", "worker-42", "feature_x.v2", "A", longest.as_str()] {
            assert!(validate_identifier(id).is_ok(), "{id} should be accepted");
        }
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier(&"a".repeat(101)).is_err());
        assert!(validate_identifier(&"a".repeat(150)).is_err());
    }

    #[test]
    fn test_rejects_injection_shapes() {
        for id in [
            "w1'; DROP TABLE worker_instances; --",
            "../../etc/passwd",
            "w1 OR 1=1",
            "w1\0",
            "$(rm -rf /)",
            "wörker",
            "w1/../w2",
        ] {
            assert!(
                matches!(validate_identifier(id), Err(CoordinatorError::Validation(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_freshness_allows_equal_and_newer_observations() {
        let now = Utc::now();
        assert!(check_freshness(now, now).is_ok());
        assert!(check_freshness(now, now + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn test_freshness_rejects_stale_observation() {
        let now = Utc::now();
        assert!(matches!(
            check_freshness(now, now - Duration::milliseconds(1)),
            Err(CoordinatorError::Conflict(_))
        ));
    }
}
