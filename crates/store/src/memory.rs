//! In-process object store.
//!
//! Behaves like an S3-compatible service closely enough for the transfer
//! core: parts get MD5 ETags, commits validate ordering and ETags, listings
//! paginate, and delete requests are capped at [`MAX_DELETE_KEYS`]. Every call
//! is recorded in a [`CallLog`], and faults and latency can be injected.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{ObjectStore, StoreFuture};
use crate::types::{ByteRange, CompletedPart, ListPage, ObjectMeta};
use crate::{DEFAULT_LIST_PAGE_SIZE, MAX_DELETE_KEYS, MAX_PART_NUMBER, etag_for};

/// Every request a [`MemoryStore`] has served, successful or not.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub heads: usize,
    pub range_gets: Vec<ByteRange>,
    pub puts: usize,
    pub creates: usize,
    /// Part numbers in the order their requests arrived.
    pub upload_parts: Vec<u32>,
    /// The part lists presented to each commit call.
    pub completes: Vec<Vec<CompletedPart>>,
    pub aborts: usize,
    pub lists: usize,
    /// Number of keys in each delete request.
    pub delete_batches: Vec<usize>,
}

#[derive(Default)]
struct State {
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    uploads: HashMap<String, StagedUpload>,
}

struct StagedUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Default)]
struct Faults {
    parts: HashSet<u32>,
    create: bool,
    complete: bool,
    delete_batches: HashSet<usize>,
    range_starts: HashSet<u64>,
    wrong_region: HashSet<String>,
}

/// Object store held entirely in memory.
pub struct MemoryStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    calls: Mutex<CallLog>,
    page_size: usize,
    max_latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with no buckets.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(CallLog::default()),
            page_size: DEFAULT_LIST_PAGE_SIZE,
            max_latency: None,
        }
    }

    /// Adds an empty bucket.
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.create_bucket(bucket);
        self
    }

    /// Sets how many keys a listing page holds.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delays every request by a random duration in `[0, max]`.
    pub fn with_latency(mut self, max: Duration) -> Self {
        self.max_latency = Some(max);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        let mut state = self.state.lock().unwrap();
        state.buckets.entry(bucket.to_string()).or_default();
    }

    /// Stores an object directly, bypassing the call log.
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let mut state = self.state.lock().unwrap();
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Returns an object's contents, bypassing the call log.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state.buckets.get(bucket)?.get(key).cloned()
    }

    /// Returns all keys of a bucket in ascending order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of multi-part uploads that are neither committed nor aborted.
    pub fn staged_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> CallLog {
        self.calls.lock().unwrap().clone()
    }

    /// Makes every upload of part `part_number` fail.
    pub fn fail_part(&self, part_number: u32) {
        self.faults.lock().unwrap().parts.insert(part_number);
    }

    /// Makes every create-upload request fail.
    pub fn fail_create(&self) {
        self.faults.lock().unwrap().create = true;
    }

    /// Makes every commit request fail.
    pub fn fail_complete(&self) {
        self.faults.lock().unwrap().complete = true;
    }

    /// Makes the `index`-th delete request (0-based, counted over the life of
    /// the store) fail.
    pub fn fail_delete_batch(&self, index: usize) {
        self.faults.lock().unwrap().delete_batches.insert(index);
    }

    /// Makes ranged reads starting at `start` fail.
    pub fn fail_range_at(&self, start: u64) {
        self.faults.lock().unwrap().range_starts.insert(start);
    }

    /// Makes every request against `bucket` report a region redirect.
    pub fn redirect_bucket(&self, bucket: &str) {
        self.faults
            .lock()
            .unwrap()
            .wrong_region
            .insert(bucket.to_string());
    }

    async fn delay(&self) {
        let Some(max) = self.max_latency else {
            return;
        };
        let micros = rand::thread_rng().gen_range(0..=max.as_micros() as u64);
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }

    fn check_region(&self, bucket: &str) -> Result<(), StoreError> {
        if self.faults.lock().unwrap().wrong_region.contains(bucket) {
            return Err(StoreError::WrongRegion(bucket.to_string()));
        }
        Ok(())
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Service(format!("injected failure: {what}"))
    }
}

fn bucket_mut<'s>(
    state: &'s mut State,
    bucket: &str,
) -> Result<&'s mut BTreeMap<String, Bytes>, StoreError> {
    state
        .buckets
        .get_mut(bucket)
        .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))
}

impl ObjectStore for MemoryStore {
    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().heads += 1;
            self.check_region(bucket)?;

            let mut state = self.state.lock().unwrap();
            let objects = bucket_mut(&mut state, bucket)?;
            let data = objects
                .get(key)
                .ok_or_else(|| StoreError::not_found(bucket, key))?;
            Ok(ObjectMeta {
                key: key.to_string(),
                size: data.len() as u64,
            })
        })
    }

    fn get_object_range<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        range: ByteRange,
    ) -> StoreFuture<'a, Bytes> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().range_gets.push(range);
            self.check_region(bucket)?;
            if self.faults.lock().unwrap().range_starts.contains(&range.start) {
                return Err(Self::injected("ranged read"));
            }

            let mut state = self.state.lock().unwrap();
            let objects = bucket_mut(&mut state, bucket)?;
            let data = objects
                .get(key)
                .ok_or_else(|| StoreError::not_found(bucket, key))?;
            let size = data.len() as u64;
            if range.start > range.end || range.end > size {
                return Err(StoreError::InvalidRange { range, size });
            }
            Ok(data.slice(range.start as usize..range.end as usize))
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: Bytes,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().puts += 1;
            self.check_region(bucket)?;

            let mut state = self.state.lock().unwrap();
            bucket_mut(&mut state, bucket)?.insert(key.to_string(), body);
            Ok(())
        })
    }

    fn create_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().creates += 1;
            self.check_region(bucket)?;
            if self.faults.lock().unwrap().create {
                return Err(Self::injected("create multi-part upload"));
            }

            let mut state = self.state.lock().unwrap();
            bucket_mut(&mut state, bucket)?;
            let upload_id = uuid::Uuid::new_v4().to_string();
            state.uploads.insert(
                upload_id.clone(),
                StagedUpload {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    parts: BTreeMap::new(),
                },
            );
            debug!(bucket, key, upload_id = %upload_id, "memory store: upload created");
            Ok(upload_id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Bytes,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().upload_parts.push(part_number);
            if self.faults.lock().unwrap().parts.contains(&part_number) {
                return Err(Self::injected("upload part"));
            }
            if part_number == 0 || part_number > MAX_PART_NUMBER {
                return Err(StoreError::InvalidPart(format!(
                    "part number {part_number} out of range"
                )));
            }

            let etag = etag_for(&body);
            let mut state = self.state.lock().unwrap();
            let upload = state
                .uploads
                .get_mut(upload_id)
                .filter(|u| u.bucket == bucket && u.key == key)
                .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
            upload.parts.insert(part_number, (etag.clone(), body));
            Ok(etag)
        })
    }

    fn complete_multipart_upload<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        upload_id: &'a str,
        parts: Vec<CompletedPart>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().completes.push(parts.clone());
            if self.faults.lock().unwrap().complete {
                return Err(Self::injected("complete multi-part upload"));
            }
            if parts.is_empty() {
                return Err(StoreError::InvalidPart("no parts to complete".into()));
            }
            if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
                return Err(StoreError::InvalidPart(
                    "parts are not in ascending order".into(),
                ));
            }

            let mut state = self.state.lock().unwrap();
            let upload = state
                .uploads
                .get(upload_id)
                .filter(|u| u.bucket == bucket && u.key == key)
                .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;

            let mut assembled = BytesMut::new();
            for part in &parts {
                match upload.parts.get(&part.part_number) {
                    Some((etag, data)) if *etag == part.etag => assembled.extend_from_slice(data),
                    Some(_) => {
                        return Err(StoreError::InvalidPart(format!(
                            "etag mismatch for part {}",
                            part.part_number
                        )));
                    }
                    None => {
                        return Err(StoreError::InvalidPart(format!(
                            "part {} was never uploaded",
                            part.part_number
                        )));
                    }
                }
            }

            state.uploads.remove(upload_id);
            bucket_mut(&mut state, bucket)?.insert(key.to_string(), assembled.freeze());
            Ok(())
        })
    }

    fn abort_multipart_upload<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        upload_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().aborts += 1;
            let mut state = self.state.lock().unwrap();
            state
                .uploads
                .remove(upload_id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))
        })
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> StoreFuture<'a, ListPage> {
        Box::pin(async move {
            self.delay().await;
            self.calls.lock().unwrap().lists += 1;
            self.check_region(bucket)?;

            let mut state = self.state.lock().unwrap();
            let objects = bucket_mut(&mut state, bucket)?;
            let mut matching = objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .filter(|k| continuation.is_none_or(|token| k.as_str() > token));

            let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
            let next_token = match (matching.next(), keys.last()) {
                (Some(_), Some(last)) => Some(last.clone()),
                _ => None,
            };
            Ok(ListPage { keys, next_token })
        })
    }

    fn delete_objects<'a>(&'a self, bucket: &'a str, keys: Vec<String>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.delay().await;
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.delete_batches.push(keys.len());
                calls.delete_batches.len() - 1
            };
            self.check_region(bucket)?;
            if self.faults.lock().unwrap().delete_batches.contains(&index) {
                return Err(Self::injected("delete objects"));
            }
            if keys.len() > MAX_DELETE_KEYS {
                return Err(StoreError::TooManyKeys(keys.len()));
            }

            let mut state = self.state.lock().unwrap();
            let objects = bucket_mut(&mut state, bucket)?;
            for key in &keys {
                objects.remove(key);
            }
            Ok(())
        })
    }
}
