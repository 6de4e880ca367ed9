//! Property-based tests for the persistent audio cache

use infrastructure::{DiskCacheConfig, PersistentAudioCache};
use proptest::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, Vec<u8>),
    Get(u8),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..12, proptest::collection::vec(any::<u8>(), 1..64)).prop_map(|(k, v)| Op::Set(k, v)),
        2 => (0u8..12).prop_map(Op::Get),
        1 => (0u8..12).prop_map(Op::Remove),
    ]
}

fn key(k: u8) -> String {
    format!("clip-{k}")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn limits_hold_after_every_operation(
        ops in proptest::collection::vec(op(), 1..40),
        max_entries in 1u64..6,
        max_bytes in 0u64..200,
        compress in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let cache = PersistentAudioCache::open(DiskCacheConfig {
            max_entries,
            max_bytes,
            compress,
            ..DiskCacheConfig::at(dir.path())
        })
        .unwrap();

        for op in ops {
            match op {
                Op::Set(k, audio) => {
                    cache.set_blocking(&key(k), &audio).unwrap();
                    prop_assert_eq!(cache.get_blocking(&key(k)).unwrap(), Some(audio));
                },
                Op::Get(k) => {
                    cache.get_blocking(&key(k)).unwrap();
                },
                Op::Remove(k) => {
                    cache.remove_blocking(&key(k)).unwrap();
                    prop_assert!(cache.entry(&key(k)).is_none());
                },
            }

            let stats = application::AudioCachePort::stats(&cache);
            prop_assert!(stats.entries <= max_entries);
            if max_bytes > 0 && stats.entries > 1 {
                prop_assert!(stats.stored_bytes <= max_bytes);
            }
        }
    }

    #[test]
    fn reopened_cache_serves_the_same_clips(
        clips in proptest::collection::btree_map(0u8..8, proptest::collection::vec(any::<u8>(), 1..128), 1..8),
    ) {
        let dir = TempDir::new().unwrap();
        {
            let cache = PersistentAudioCache::open(DiskCacheConfig::at(dir.path())).unwrap();
            for (k, audio) in &clips {
                cache.set_blocking(&key(*k), audio).unwrap();
            }
        }

        let cache = PersistentAudioCache::open(DiskCacheConfig::at(dir.path())).unwrap();
        for (k, audio) in &clips {
            let got = cache.get_blocking(&key(*k)).unwrap();
            prop_assert_eq!(got.as_ref(), Some(audio));
        }
    }
}
