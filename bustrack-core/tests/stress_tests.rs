/// Stress tests for the location channel store
///
/// These tests verify ordering and delivery under scale:
/// - Many listeners on one busy channel
/// - Many channels written concurrently
/// - Slow listeners that fall behind the buffer
///
/// Run with: cargo test --test stress_tests -- --ignored --nocapture

#[cfg(test)]
mod stress_tests {
    use bustrack_core::config::StoreConfig;
    use bustrack_core::{ChannelKey, LocationStore, Position};
    use std::sync::Arc;
    use std::time::Instant;

    /// Fan one channel out to 500 listeners
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Run with: cargo test --ignored
    async fn stress_fanout_many_listeners() {
        let store = Arc::new(LocationStore::with_config(&StoreConfig {
            listener_buffer: 2048,
        }));
        let key = ChannelKey::new("bus42").unwrap();

        let mut listeners = Vec::new();
        for _ in 0..500 {
            listeners.push(store.subscribe(&key).unwrap());
        }
        assert_eq!(store.listener_count(&key).unwrap(), 500);

        let start = Instant::now();
        for t in 1..=1000 {
            store.write(&key, Position::new(0.0, 0.0, t)).unwrap();
        }
        println!("Wrote 1000 fixes to 500 listeners in {:?}", start.elapsed());

        let readers: Vec<_> = listeners
            .into_iter()
            .map(|mut listener| {
                tokio::spawn(async move {
                    let mut last = 0;
                    for _ in 0..1000 {
                        let p = listener.next().await.unwrap();
                        assert_eq!(p.timestamp, last + 1);
                        last = p.timestamp;
                    }
                    listener.skipped()
                })
            })
            .collect();

        for reader in readers {
            assert_eq!(reader.await.unwrap(), 0);
        }
        println!("All listeners drained in {:?}", start.elapsed());
    }

    /// Write 1000 channels from parallel tasks
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn stress_many_channels() {
        let store = Arc::new(LocationStore::new());
        let start = Instant::now();

        let writers: Vec<_> = (0..1000)
            .map(|bus| {
                let store = store.clone();
                tokio::spawn(async move {
                    let key = ChannelKey::new(format!("bus{}", bus)).unwrap();
                    for t in 1..=100 {
                        store.write(&key, Position::new(0.0, 0.0, t)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        println!("100k writes across 1000 channels in {:?}", start.elapsed());
        assert_eq!(store.channel_count().unwrap(), 1000);
        let key = ChannelKey::new("bus999").unwrap();
        assert_eq!(store.version(&key).unwrap(), Some(100));
    }

    /// A listener that never reads must not hold back the writer or other
    /// listeners
    #[tokio::test]
    #[ignore]
    async fn stress_slow_listener_skips_oldest() {
        let store = LocationStore::with_config(&StoreConfig { listener_buffer: 16 });
        let key = ChannelKey::new("bus42").unwrap();
        let mut slow = store.subscribe(&key).unwrap();
        let mut fast = store.subscribe(&key).unwrap();

        let mut fast_seen = Vec::new();
        for t in 1..=10_000 {
            store.write(&key, Position::new(0.0, 0.0, t)).unwrap();
            fast_seen.push(fast.try_next().unwrap().timestamp);
        }
        assert_eq!(fast_seen.len(), 10_000);
        assert_eq!(fast.skipped(), 0);

        let mut slow_seen = Vec::new();
        while let Some(p) = slow.try_next() {
            slow_seen.push(p.timestamp);
        }
        println!(
            "Slow listener kept {} fixes, skipped {}",
            slow_seen.len(),
            slow.skipped()
        );
        assert_eq!(slow_seen, (9_985..=10_000).collect::<Vec<i64>>());
        assert_eq!(slow.skipped(), 10_000 - 16);
    }
}
