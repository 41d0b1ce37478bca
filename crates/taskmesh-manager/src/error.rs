//! Mapping of component runtime errors onto manager errors.

use std::future::Future;
use std::time::Duration;
use taskmesh_core::ComponentError;
use taskmesh_protocols::ManagerError;

/// Await a call to another manager for at most `limit`. Running out of time
/// is a network error, so connect retries count it as a failed attempt.
pub async fn within<T, F>(limit: Duration, what: &str, call: F) -> Result<T, ManagerError>
where
    F: Future<Output = Result<T, ManagerError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ManagerError::Network(format!("{} timed out after {:?}", what, limit)))?
}

/// Convert a runtime error raised in `process` into a manager error.
pub fn from_component_error(process: &str, err: ComponentError) -> ManagerError {
    match err {
        ComponentError::NotFound(component) => ManagerError::ComponentNotFound {
            process: process.to_string(),
            component,
        },
        ComponentError::AlreadyRegistered(name) => ManagerError::AlreadyRegistered(name),
        ComponentError::ClassNotFound(class) => ManagerError::ClassNotFound(class),
        ComponentError::LibraryNotFound(library) => ManagerError::LibraryNotFound(library),
        ComponentError::Incompatible(detail) => ManagerError::Incompatible(detail),
        other => ManagerError::Component(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_times_out_as_network_error() {
        let silent = std::future::pending::<Result<(), ManagerError>>();
        let err = within(Duration::from_millis(20), "Silent call", silent)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Network(ref m) if m.starts_with("Silent call timed out")));
        assert!(err.is_retriable());

        let value = within(Duration::from_secs(1), "Quick call", async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
    }

    #[test]
    fn test_not_found_carries_process() {
        let err = from_component_error("P", ComponentError::NotFound("C".into()));
        assert_eq!(
            err,
            ManagerError::ComponentNotFound {
                process: "P".into(),
                component: "C".into()
            }
        );
        assert!(err.is_retriable());
    }

    #[test]
    fn test_other_errors_become_component_errors() {
        let err = from_component_error("P", ComponentError::task("boom"));
        assert!(matches!(err, ManagerError::Component(ref m) if m.contains("boom")));
        assert!(!err.is_retriable());
    }
}
