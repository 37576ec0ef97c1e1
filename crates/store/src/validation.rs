use crate::StoreError;

/// Checks that `key` stays inside its bucket when laid out as a relative
/// path under the bucket directory.
///
/// Keys are `/`-separated. A usable key is non-empty, does not start at `/`,
/// has no `..` segment, and carries no backslash, NUL byte or drive prefix
/// (`C:`). `.` segments and dot-files are fine.
pub fn validate_object_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| Err(StoreError::InvalidKey(format!("{key:?}: {reason}")));

    if key.is_empty() {
        return Err(StoreError::InvalidKey("key is empty".into()));
    }
    if key.starts_with('/') {
        return invalid("key is rooted");
    }
    if key.contains(['\\', '\0']) {
        return invalid("backslash or NUL in key");
    }

    let mut segments = key.split('/');
    if segments.clone().any(|segment| segment == "..") {
        return invalid("key climbs out of its bucket");
    }
    if let Some(first) = segments.next() {
        let bytes = first.as_bytes();
        if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return invalid("drive prefix in key");
        }
    }

    Ok(())
}

/// Bucket names are a single path component that does not start with `.`
/// (dot-directories under a store root are reserved for staging).
pub fn validate_bucket_name(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty()
        || bucket.starts_with('.')
        || bucket.contains('/')
        || bucket.contains('\\')
    {
        return Err(StoreError::NoSuchBucket(bucket.to_string()));
    }
    Ok(())
}
