use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DriveError;

/// Runs `fut` with an upper bound; `what` names the call in the timeout error.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, DriveError>
where
    F: Future<Output = Result<T, DriveError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DriveError::Timeout(format!("{what} exceeded {limit:?}"))),
    }
}

/// Cancels `token` once `limit` elapses. Abort the handle when the guarded work ends first.
pub fn cancel_after(token: CancellationToken, limit: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        token.cancel();
    })
}
