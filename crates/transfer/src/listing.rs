use std::collections::BTreeSet;

use keel_store::ObjectStore;
use tracing::debug;

use crate::TransferError;

/// Key prefix for the directory `dir`: `dir/`, or nothing for the bucket root.
pub(crate) fn directory_prefix(dir: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

/// Lists every object under `dir`, returning names relative to it.
///
/// Pages are fetched one after another until the store stops handing out a
/// continuation token. A directory marker key (the prefix itself) is skipped.
pub(crate) async fn list_all(
    store: &dyn ObjectStore,
    bucket: &str,
    dir: &str,
) -> Result<BTreeSet<String>, TransferError> {
    let prefix = directory_prefix(dir);
    let mut names = BTreeSet::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_objects(bucket, &prefix, token.as_deref()).await?;
        pages += 1;

        for key in page.keys {
            match key.strip_prefix(prefix.as_str()) {
                Some("") => {}
                Some(name) => {
                    names.insert(name.to_string());
                }
                None => {
                    return Err(TransferError::Protocol(format!(
                        "listing of {bucket}/{prefix} returned foreign key {key}"
                    )));
                }
            }
        }

        match page.next_token {
            None => break,
            Some(next) if next.is_empty() => {
                return Err(TransferError::Protocol(format!(
                    "listing of {bucket}/{prefix} truncated without a continuation token"
                )));
            }
            Some(next) => token = Some(next),
        }
    }

    debug!(bucket, prefix = %prefix, pages, names = names.len(), "listing complete");
    Ok(names)
}
