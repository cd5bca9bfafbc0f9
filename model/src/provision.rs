/*!

Idempotent creation and deletion of cluster objects. The full setup sequence
must be safely re-runnable: re-provisioning a partially provisioned namespace
converges to the same end state without manual cleanup.

!*/

use crate::clients::{ErrorClass, ErrorKind};
use std::future::Future;

/// Invokes a deferred creation call, swallowing exactly the "already exists"
/// conflict. Returns `Ok(None)` when the object was already present; any
/// other error propagates.
pub async fn create_if_absent<T, E, F, Fut>(create: F) -> Result<Option<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClass,
{
    match create().await {
        Ok(created) => Ok(Some(created)),
        Err(error) if error.error_kind() == ErrorKind::Conflict => Ok(None),
        Err(error) => Err(error),
    }
}

/// Invokes a deferred deletion call, swallowing exactly "not found". Returns
/// `Ok(None)` when there was nothing to delete; any other error propagates.
pub async fn delete_if_present<T, E, F, Fut>(delete: F) -> Result<Option<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClass,
{
    match delete().await {
        Ok(deleted) => Ok(Some(deleted)),
        Err(error) if error.error_kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct ApiError(ErrorKind);

    impl ErrorClass for ApiError {
        fn error_kind(&self) -> ErrorKind {
            self.0
        }
    }

    /// A single-slot store that conflicts on double-create and reports not
    /// found on double-delete.
    struct Slot {
        occupied: Cell<bool>,
    }

    impl Slot {
        fn new(occupied: bool) -> Self {
            Self {
                occupied: Cell::new(occupied),
            }
        }

        async fn create(&self) -> Result<u32, ApiError> {
            if self.occupied.replace(true) {
                Err(ApiError(ErrorKind::Conflict))
            } else {
                Ok(1)
            }
        }

        async fn delete(&self) -> Result<u32, ApiError> {
            if self.occupied.replace(false) {
                Ok(1)
            } else {
                Err(ApiError(ErrorKind::NotFound))
            }
        }
    }

    #[tokio::test]
    async fn create_twice_is_idempotent() {
        let slot = Slot::new(false);
        let first = create_if_absent(|| slot.create()).await.unwrap();
        assert_eq!(first, Some(1));
        let second = create_if_absent(|| slot.create()).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn delete_twice_is_idempotent() {
        let slot = Slot::new(true);
        let first = delete_if_present(|| slot.delete()).await.unwrap();
        assert_eq!(first, Some(1));
        let second = delete_if_present(|| slot.delete()).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn create_propagates_other_kinds() {
        let result = create_if_absent(|| async {
            Err::<(), ApiError>(ApiError(ErrorKind::NotFound))
        })
        .await;
        assert!(matches!(result, Err(ApiError(ErrorKind::NotFound))));
    }

    #[tokio::test]
    async fn delete_propagates_other_kinds() {
        let result = delete_if_present(|| async {
            Err::<(), ApiError>(ApiError(ErrorKind::Conflict))
        })
        .await;
        assert!(matches!(result, Err(ApiError(ErrorKind::Conflict))));
    }
}
