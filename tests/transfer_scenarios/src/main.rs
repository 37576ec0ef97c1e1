fn main() {
    println!("Run `cargo test -p transfer-scenarios` to execute the transfer scenarios.");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};
    use futures_util::future::join_all;
    use keel_store::{LocalStore, MemoryStore, ObjectStore, StoreError};
    use keel_transfer::{
        MIB, ReadGroup, RemoteStorage, TransferConfig, TransferError, WorkerPool, WriteGroup,
    };
    use rand::{Rng, SeedableRng};

    /// Deterministic pseudo-random payload.
    fn payload(len: usize, seed: u64) -> Bytes {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        Bytes::from(data)
    }

    fn storage_over(store: Arc<dyn ObjectStore>, config: TransferConfig) -> RemoteStorage {
        RemoteStorage::new(store, WorkerPool::current(), config).unwrap()
    }

    fn small_parts(part: u64) -> TransferConfig {
        TransferConfig {
            min_part_size: 4,
            default_part_size: part,
            max_part_size: 4 * part,
            single_put_threshold: part,
            ..TransferConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn roundtrip_with_unrelated_part_counts() {
        let max_segment = 32u64;
        let size = 3 * max_segment as usize + 17;
        let data = payload(size, 1);

        let store = Arc::new(
            MemoryStore::new()
                .with_bucket("graphs")
                .with_latency(Duration::from_millis(3)),
        );
        let writer = storage_over(store.clone(), small_parts(max_segment));
        writer.upload("graphs", "rmat/topology", data.clone()).await.unwrap();
        assert_eq!(store.calls().upload_parts.len(), 4);

        let reader = storage_over(store.clone(), small_parts(20));
        let back = reader.download("graphs", "rmat/topology").await.unwrap();
        assert_eq!(back, data);
        assert_eq!(store.calls().range_gets.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn roundtrip_through_local_store() {
        let root = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalStore::new(root.path()));
        local.create_bucket("graphs").await.unwrap();
        let storage = storage_over(local, small_parts(64));

        let data = payload(3 * 64 + 17, 2);
        storage.upload("graphs", "rmat/edges", data.clone()).await.unwrap();
        assert_eq!(storage.size("graphs", "rmat/edges").await.unwrap(), data.len() as u64);

        let middle = storage
            .download_range("graphs", "rmat/edges", 50, BytesMut::zeroed(100))
            .await
            .unwrap();
        assert_eq!(&middle[..], &data[50..150]);
        assert_eq!(storage.download("graphs", "rmat/edges").await.unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn fifty_megabytes_in_seven_ascending_parts() {
        let store = Arc::new(MemoryStore::new().with_bucket("graphs"));
        let storage = storage_over(store.clone(), TransferConfig::default());
        let data = payload(50 * MIB as usize, 3);

        storage.upload("graphs", "big", data.clone()).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.creates, 1);
        assert_eq!(calls.upload_parts.len(), 7);
        assert_eq!(calls.completes.len(), 1);
        let numbers: Vec<u32> = calls.completes[0].iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, (1..=7).collect::<Vec<u32>>());
        assert_eq!(store.object("graphs", "big").unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_failed_part_of_seven_fails_the_upload() {
        let store = Arc::new(
            MemoryStore::new()
                .with_bucket("graphs")
                .with_latency(Duration::from_millis(2)),
        );
        store.fail_part(5);
        let storage = storage_over(store.clone(), small_parts(10));

        let err = storage
            .upload("graphs", "obj", payload(65, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Part { part_number: 5, .. }));

        let calls = store.calls();
        // Every part reported back before the failure surfaced.
        assert_eq!(calls.upload_parts.len(), 7);
        assert!(calls.completes.is_empty());
        assert_eq!(calls.aborts, 1);
        assert!(store.object("graphs", "obj").is_none());
    }

    #[tokio::test]
    async fn batch_delete_respects_ceiling() {
        let store = Arc::new(MemoryStore::new().with_bucket("graphs"));
        let config = TransferConfig::default();
        let ceiling = config.max_delete_batch;
        let names: Vec<String> = (0..2 * ceiling + 1).map(|i| format!("p{i:05}")).collect();
        for name in &names {
            store.insert_object("graphs", &format!("dir/{name}"), vec![0u8]);
        }
        let storage = storage_over(store.clone(), config);

        storage.delete("graphs", "dir", &names).await.unwrap();

        let batches = store.calls().delete_batches;
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|&n| n <= ceiling));
        assert_eq!(batches.iter().sum::<usize>(), names.len());
        assert!(store.keys("graphs").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn grouped_transfers_complete_in_issue_order() {
        let store = Arc::new(
            MemoryStore::new()
                .with_bucket("graphs")
                .with_latency(Duration::from_millis(15)),
        );
        let storage = storage_over(store.clone(), small_parts(16));
        let mut rng = rand::thread_rng();
        let sizes: Vec<usize> = (0..12).map(|_| rng.gen_range(0..120)).collect();

        let writes = WriteGroup::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (i, &len) in sizes.iter().enumerate() {
            let order = Arc::clone(&order);
            writes.add_op(
                storage.put_async("graphs", &format!("set/{i}"), payload(len, i as u64)),
                format!("set/{i}"),
                move || {
                    order.lock().unwrap().push(i);
                    Ok(())
                },
            );
        }
        writes.finish().await.unwrap();
        assert_eq!(*order.lock().unwrap(), (0..sizes.len()).collect::<Vec<_>>());

        let reads = ReadGroup::new();
        let fetched = Arc::new(Mutex::new(Vec::new()));
        for (i, &len) in sizes.iter().enumerate() {
            let fetched = Arc::clone(&fetched);
            reads.add_returns_op(
                storage.get_async("graphs", &format!("set/{i}"), 0, BytesMut::zeroed(len)),
                format!("set/{i}"),
                move |buf: BytesMut| {
                    fetched.lock().unwrap().push((i, buf.freeze()));
                    Ok(())
                },
            );
        }
        reads.finish().await.unwrap();

        let fetched = fetched.lock().unwrap();
        for (pos, (i, data)) in fetched.iter().enumerate() {
            assert_eq!(pos, *i);
            assert_eq!(*data, payload(sizes[*i], *i as u64));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pending_reads() {
        let store = Arc::new(MemoryStore::new().with_bucket("graphs"));
        let data = payload(500, 9);
        store.insert_object("graphs", "shared", data.clone());
        let storage = storage_over(store.clone(), small_parts(32));

        let pending: Vec<_> = (0..5u64)
            .map(|i| storage.get_async("graphs", "shared", i * 100, BytesMut::zeroed(100)))
            .collect();
        for (i, result) in join_all(pending).await.into_iter().enumerate() {
            let start = i * 100;
            assert_eq!(&result.unwrap()[..], &data[start..start + 100]);
        }
    }

    #[tokio::test]
    async fn zero_sized_transfers() {
        let store = Arc::new(MemoryStore::new().with_bucket("graphs"));
        let storage = storage_over(store.clone(), TransferConfig::default());

        let empty = storage
            .download_range("graphs", "whatever", 0, BytesMut::new())
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert!(store.calls().range_gets.is_empty());

        storage.upload("graphs", "empty", Bytes::new()).await.unwrap();
        let calls = store.calls();
        assert_eq!(calls.puts, 1);
        assert_eq!(calls.creates, 0);
        assert_eq!(storage.size("graphs", "empty").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_region_is_distinguishable() {
        let store = Arc::new(MemoryStore::new().with_bucket("graphs"));
        store.redirect_bucket("graphs");
        let storage = storage_over(store.clone(), TransferConfig::default());

        let err = storage.list("graphs", "dir").await.unwrap_err();
        assert!(matches!(err, TransferError::Store(StoreError::WrongRegion(_))));
    }
}
