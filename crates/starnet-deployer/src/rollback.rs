//! Tear down provisioned resources after a failed run.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::provision::Provisioner;

/// Upper bound on how long a destroy may take.
pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Pass `outcome` through, destroying the fleet first if it is an error.
pub async fn rollback<P, T>(provisioner: &P, outcome: Result<T>) -> Result<T>
where
    P: Provisioner,
{
    rollback_within(provisioner, outcome, ROLLBACK_TIMEOUT).await
}

/// Like [`rollback`], with an explicit bound on the destroy.
///
/// On success the original error comes back wrapped as [`Error::RolledBack`].
/// If the destroy fails or runs out of time, both errors are returned together
/// as [`Error::RollbackFailed`].
pub async fn rollback_within<P, T>(
    provisioner: &P,
    outcome: Result<T>,
    timeout: Duration,
) -> Result<T>
where
    P: Provisioner,
{
    let original = match outcome {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    warn!(error = %original, ?timeout, "run failed, destroying provisioned resources");
    let destroyed = match tokio::time::timeout(timeout, provisioner.destroy()).await {
        Ok(result) => result,
        Err(_) => Err(Error::Provision(format!("destroy did not finish within {timeout:?}"))),
    };

    match destroyed {
        Ok(()) => {
            info!("rollback complete");
            Err(Error::RolledBack {
                original: Box::new(original),
            })
        }
        Err(destroy) => {
            error!(error = %destroy, "rollback failed, resources may still exist");
            Err(Error::RollbackFailed {
                destroy: Box::new(destroy),
                original: Box::new(original),
            })
        }
    }
}
