use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};

pub const EXECUTE_PLAN__BEFORE_APPLY: &str = "execute_plan.before_apply";

/// Fails with the error kind named by the failpoint parameter when the failpoint is active.
///
/// Accepted parameters are `lock_timeout`, `constraint_violation` and `connection`, anything
/// else yields [`ErrorKind::FailpointTriggered`].
pub fn sync_fail_point(name: &str) -> SyncResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("lock_timeout") => ErrorKind::LockTimeout,
            Some("constraint_violation") => ErrorKind::ConstraintViolation,
            Some("connection") => ErrorKind::TargetConnectionFailed,
            _ => ErrorKind::FailpointTriggered,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
