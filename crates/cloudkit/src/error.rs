//! Classification of `aws` CLI failures into the provider error taxonomy.
//!
//! The CLI reports failures as `An error occurred (<Code>) when calling ...`
//! on stderr. Matching on the code substrings keeps the mapping independent
//! of the CLI version's prose.

use engine::ProviderError;

/// Whether stderr indicates the target resource does not exist. Adapters
/// turn this into the absent-state sentinel instead of an error.
pub fn is_not_found(stderr: &str) -> bool {
    const MARKERS: [&str; 9] = [
        "NoSuchBucket",
        "NoSuchEntity",
        "NoSuchUser",
        "NoSuchRole",
        "NotFound",
        "ResourceNotFoundException",
        "InvalidInstanceID.NotFound",
        "does not exist",
        "(404)",
    ];
    MARKERS.iter().any(|m| stderr.contains(m))
}

/// Map stderr from a failed CLI invocation to a provider error.
pub fn classify(stderr: &str, context: &str) -> ProviderError {
    let trimmed = stderr.trim();
    let message = if trimmed.is_empty() {
        format!("{context} failed")
    } else {
        format!("{context}: {trimmed}")
    };

    // Credential and signing problems are never worth retrying.
    if contains_any(
        stderr,
        &[
            "AuthFailure",
            "ExpiredToken",
            "InvalidClientTokenId",
            "AccessDenied",
            "UnauthorizedOperation",
            "SignatureDoesNotMatch",
            "Unable to locate credentials",
        ],
    ) {
        return ProviderError::Auth(message);
    }

    if contains_any(
        stderr,
        &[
            "BucketAlreadyExists",
            "BucketAlreadyOwnedByYou",
            "EntityAlreadyExists",
            "ResourceInUseException",
            "AlreadyExists",
            "already exists",
        ],
    ) {
        return ProviderError::AlreadyExists(message);
    }

    if contains_any(
        stderr,
        &[
            "Throttling",
            "RequestLimitExceeded",
            "ServiceUnavailable",
            "InternalError",
            "InternalFailure",
            "RequestTimeout",
            "timed out",
            "timeout",
            "connection",
            "Could not connect",
            "(500)",
            "(503)",
        ],
    ) {
        return ProviderError::Transient(message);
    }

    ProviderError::Permanent(message)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_markers() {
        assert!(is_not_found(
            "An error occurred (NoSuchBucket) when calling the HeadBucket operation"
        ));
        assert!(is_not_found(
            "An error occurred (ResourceNotFoundException) when calling the DescribeTable operation"
        ));
        assert!(is_not_found("The specified instance does not exist"));
        assert!(!is_not_found("An error occurred (Throttling)"));
    }

    #[test]
    fn auth_failures_are_not_retryable() {
        let err = classify("Unable to locate credentials", "describe instance");
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn throttling_is_transient() {
        let err = classify(
            "An error occurred (Throttling) when calling the RunInstances operation",
            "create instance",
        );
        assert!(matches!(err, ProviderError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn already_exists_is_surfaced_directly() {
        let err = classify(
            "An error occurred (BucketAlreadyOwnedByYou) when calling the CreateBucket operation",
            "create bucket",
        );
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_errors_default_to_permanent() {
        let err = classify("Something strange happened", "create bucket");
        assert!(matches!(err, ProviderError::Permanent(_)));
    }

    #[test]
    fn message_carries_context() {
        let err = classify("boom", "delete role");
        assert!(err.to_string().contains("delete role"));
        assert!(err.to_string().contains("boom"));
    }
}
