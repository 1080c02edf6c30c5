//! Missing-resource classification
//!
//! The read path turns "file does not exist" into an absent value, so this
//! predicate decides what callers see as data and what they see as a fault.
//! It is the only place that knowledge lives.
//!
//! Structured signals win: [`ApiErrorKind::PathNotFound`] and
//! `object_store::Error::NotFound`. When a service returns an error without a
//! structured kind, the error summary is matched against [`NOT_FOUND_SUMMARY`].
//! That fallback depends on the wording of the provider's error strings and
//! breaks silently if the provider changes them.

use crate::{ApiError, ApiErrorKind, BindError};

/// Error summary prefix the remote service uses for a missing path
pub const NOT_FOUND_SUMMARY: &str = "path/not_found/";

/// Whether `err` means the requested resource does not exist
pub fn is_not_found(err: &BindError) -> bool {
    match err {
        BindError::Api(api) => is_api_not_found(api),
        BindError::ObjectStore(object_store::Error::NotFound { .. }) => true,
        _ => false,
    }
}

fn is_api_not_found(err: &ApiError) -> bool {
    match err.kind {
        Some(kind) => kind == ApiErrorKind::PathNotFound,
        // Fragile: string match on the provider's summary.
        None => err.summary.starts_with(NOT_FOUND_SUMMARY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_kind() {
        assert!(is_not_found(&ApiError::path_not_found("/a.txt").into()));
        assert!(!is_not_found(
            &ApiError::new(ApiErrorKind::AccessDenied, "path/not_found/").into()
        ));
    }

    #[test]
    fn test_summary_fallback() {
        assert!(is_not_found(&ApiError::unclassified("path/not_found/").into()));
        assert!(is_not_found(&ApiError::unclassified("path/not_found/..").into()));
        assert!(!is_not_found(&ApiError::unclassified("path/restricted_content/").into()));
        assert!(!is_not_found(&ApiError::unclassified("not_found").into()));
    }

    #[test]
    fn test_object_store_not_found() {
        let err = object_store::Error::NotFound {
            path: "a.txt".to_string(),
            source: "missing".into(),
        };
        assert!(is_not_found(&err.into()));
    }

    #[test]
    fn test_other_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "local");
        assert!(!is_not_found(&BindError::Io(io)));
        assert!(!is_not_found(&BindError::Config("x".to_string())));
    }
}
