//! Generic walks over `Error::source` chains.

use std::error::Error;
use std::iter;

use super::ApplicationError;
use crate::codes::StatusCode;

/// Iterates over `err` and every error reachable through `source()`.
pub fn chain<'a>(
    err: &'a (dyn Error + 'static),
) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    iter::successors(Some(err), |e| (*e).source())
}

/// Returns the first [`ApplicationError`] in the chain.
pub fn find_app_error<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a ApplicationError> {
    chain(err).find_map(|e| e.downcast_ref::<ApplicationError>())
}

/// Returns `true` if any application error in the chain carries `code`.
pub fn has_code(err: &(dyn Error + 'static), code: StatusCode) -> bool {
    chain(err)
        .filter_map(|e| e.downcast_ref::<ApplicationError>())
        .any(|app| app.code() == code)
}

/// Returns `true` if some link of `err`'s chain matches `target`.
///
/// A link matches when it is the same object as `target`, or when both are
/// application errors with equal codes. Foreign errors are compared by
/// identity only; use [`caused_by`] to match them by value.
pub fn is(err: &(dyn Error + 'static), target: &(dyn Error + 'static)) -> bool {
    let target_app = target.downcast_ref::<ApplicationError>();
    chain(err).any(|e| {
        if std::ptr::addr_eq(e as *const dyn Error, target as *const dyn Error) {
            return true;
        }
        match (e.downcast_ref::<ApplicationError>(), target_app) {
            (Some(app), Some(target)) => app.code() == target.code(),
            _ => false,
        }
    })
}

/// Returns `true` if some link of `err`'s chain is an `E` equal to `target`.
///
/// This is the check for sentinel driver errors such as "no rows", which
/// [`ApplicationError::wrap`] moves behind a shared pointer.
pub fn caused_by<E>(err: &(dyn Error + 'static), target: &E) -> bool
where
    E: Error + PartialEq + 'static,
{
    chain(err).any(|e| e.downcast_ref::<E>() == Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] ApplicationError);

    #[derive(Debug, Error, PartialEq)]
    #[error("sql: no rows in result set")]
    struct NoRows;

    #[derive(Debug, Error, PartialEq)]
    #[error("timeout after {0}ms")]
    struct Timeout(u64);

    #[test]
    fn test_chain_walks_sources() {
        let app = ApplicationError::wrap(
            std::io::Error::other("eof"),
            StatusCode::DataLoss,
            "read failed",
            vec![],
        );
        let outer = Outer(app);

        let texts: Vec<String> = chain(&outer).map(|e| e.to_string()).collect();
        assert_eq!(texts, ["outer", "read failed: eof (data_loss)", "eof"]);
    }

    #[test]
    fn test_find_app_error_behind_wrapper() {
        let outer = Outer(ApplicationError::new(StatusCode::NotFound, "gone", vec![]));

        let found = find_app_error(&outer).unwrap();
        assert_eq!(found.code(), StatusCode::NotFound);
        assert!(find_app_error(&std::io::Error::other("plain")).is_none());
    }

    #[test]
    fn test_has_code_sees_flattened_cause() {
        let not_found = ApplicationError::new(StatusCode::NotFound, "missing", vec![]);
        let internal = ApplicationError::wrap(not_found, StatusCode::Internal, "failed", vec![]);

        assert!(has_code(&internal, StatusCode::Internal));
        assert!(has_code(&internal, StatusCode::NotFound));
        assert!(!has_code(&internal, StatusCode::Unavailable));
    }

    #[test]
    fn test_is_by_identity_and_code() {
        let outer = Outer(ApplicationError::new(StatusCode::PermissionDenied, "no", vec![]));

        assert!(is(&outer, &outer));
        assert!(is(
            &outer,
            &ApplicationError::sentinel(StatusCode::PermissionDenied)
        ));
        assert!(!is(&outer, &ApplicationError::sentinel(StatusCode::NotFound)));
        assert!(!is(&outer, &std::io::Error::other("no")));
    }

    #[test]
    fn test_caused_by_matches_driver_error_by_value() {
        let not_found = ApplicationError::wrap(NoRows, StatusCode::NotFound, "user", vec![]);
        let internal = ApplicationError::wrap(not_found, StatusCode::Internal, "fetch", vec![]);

        assert!(caused_by(&internal, &NoRows));
        assert!(!caused_by(&internal, &Timeout(30)));
        assert!(!is(&internal, &NoRows));
    }

    #[test]
    fn test_caused_by_compares_payload() {
        let err = ApplicationError::wrap(Timeout(30), StatusCode::DeadlineExceeded, "slow", vec![]);

        assert!(caused_by(&err, &Timeout(30)));
        assert!(!caused_by(&err, &Timeout(31)));
    }
}
