use ridepool_core::{CoreResult, StoreTx};

/// Commits `tx` when `outcome` is `Ok`, rolls it back otherwise.
///
/// A failed commit becomes the operation's error. A failed rollback is
/// logged and the original error returned.
pub async fn finish<T>(mut tx: Box<dyn StoreTx>, outcome: CoreResult<T>) -> CoreResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed after {:?}: {:?}", err, rollback_err);
            }
            Err(err)
        }
    }
}
