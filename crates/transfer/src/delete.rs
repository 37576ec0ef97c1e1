use keel_store::ObjectStore;
use tracing::{debug, warn};

use crate::TransferError;
use crate::listing::directory_prefix;

/// Deletes `names` under `dir` in batches of at most `batch_size` keys.
///
/// Batches run one after another. A failing batch does not stop the rest;
/// the last failure is returned.
pub(crate) async fn delete_batched<I>(
    store: &dyn ObjectStore,
    bucket: &str,
    dir: &str,
    names: I,
    batch_size: usize,
) -> Result<(), TransferError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    assert!(batch_size > 0, "delete batch size must be positive");
    let prefix = directory_prefix(dir);
    let keys: Vec<String> = names
        .into_iter()
        .map(|name| format!("{prefix}{}", name.as_ref()))
        .collect();

    let mut last_failure = None;
    for (index, batch) in keys.chunks(batch_size).enumerate() {
        debug!(bucket, batch = index, keys = batch.len(), first = %batch[0], "deleting batch");
        if let Err(e) = store.delete_objects(bucket, batch.to_vec()).await {
            warn!(bucket, batch = index, keys = batch.len(), error = %e, "delete batch failed");
            last_failure = Some(e);
        }
    }

    match last_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
