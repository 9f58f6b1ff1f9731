//! Watermark eviction scenarios.

use chrono::{Duration as ChronoDuration, Utc};
use outpost::pruner::{prune_cycle, PruneConfig};
use outpost_store::Store;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct PruneEnv {
    _temp: TempDir,
    data_dir: PathBuf,
    store: Store,
}

impl PruneEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let store = Store::open(&temp.path().join("outpost.db"), false).unwrap();
        Self {
            _temp: temp,
            data_dir,
            store,
        }
    }

    /// Write `size` bytes to disk and register the record with a mod time
    /// offset (minutes after an hour-old base).
    fn seed_file(&self, name: &str, size: usize, minutes: i64) -> PathBuf {
        let path = self.data_dir.join(name);
        fs::write(&path, vec![0u8; size]).unwrap();
        let mod_time = Utc::now() - ChronoDuration::hours(1) + ChronoDuration::minutes(minutes);
        self.store
            .register_file(&path.to_string_lossy(), size as u64, mod_time, false)
            .unwrap();
        path
    }
}

fn config(max_bytes: u64) -> PruneConfig {
    PruneConfig {
        max_bytes,
        high_watermark_percent: 80,
        low_watermark_percent: 40,
        batch_size: 50,
    }
}

#[test]
fn evicts_oldest_uploaded_until_low_watermark() {
    let env = PruneEnv::new();

    // Six 20-byte uploaded files: 120 bytes against a 100 byte budget.
    let mut paths = Vec::new();
    for i in 0..6 {
        let path = env.seed_file(&format!("f{i}.png"), 20, i);
        env.store.mark_uploaded(&path.to_string_lossy()).unwrap();
        paths.push(path);
    }

    prune_cycle(&env.store, &config(100));

    // The four least recently modified fall; usage lands on the low mark.
    for path in &paths[..4] {
        assert!(!path.exists(), "{} should be evicted", path.display());
        assert!(env
            .store
            .get_file(&path.to_string_lossy())
            .unwrap()
            .is_none());
    }
    for path in &paths[4..] {
        assert!(path.exists(), "{} should survive", path.display());
        assert!(env
            .store
            .get_file(&path.to_string_lossy())
            .unwrap()
            .is_some());
    }
    assert_eq!(env.store.get_total_size().unwrap(), 40);
}

#[test]
fn never_touches_unuploaded_files() {
    let env = PruneEnv::new();

    // 120 pending bytes against a 100 byte budget: over the high mark but
    // nothing is safe to delete.
    let mut paths = Vec::new();
    for i in 0..3 {
        paths.push(env.seed_file(&format!("p{i}.png"), 40, i));
    }

    prune_cycle(&env.store, &config(100));

    for path in &paths {
        assert!(path.exists());
    }
    assert_eq!(env.store.get_total_size().unwrap(), 120);
    assert_eq!(env.store.count_files().unwrap(), 3);
}

#[test]
fn within_budget_is_a_no_op() {
    let env = PruneEnv::new();
    let path = env.seed_file("small.png", 10, 0);
    env.store.mark_uploaded(&path.to_string_lossy()).unwrap();

    prune_cycle(&env.store, &config(100));

    assert!(path.exists());
    assert_eq!(env.store.get_total_size().unwrap(), 10);
}

#[test]
fn already_deleted_file_still_clears_record() {
    let env = PruneEnv::new();

    let ghost = env.seed_file("ghost.png", 60, 0);
    let survivor = env.seed_file("survivor.png", 60, 1);
    env.store.mark_uploaded(&ghost.to_string_lossy()).unwrap();
    env.store
        .mark_uploaded(&survivor.to_string_lossy())
        .unwrap();

    // Someone removed the oldest file behind our back.
    fs::remove_file(&ghost).unwrap();

    prune_cycle(&env.store, &config(100));

    // ENOENT on unlink is success: the stale record is gone and the cycle
    // continued far enough to satisfy the low watermark.
    assert!(env
        .store
        .get_file(&ghost.to_string_lossy())
        .unwrap()
        .is_none());
    assert!(env.store.get_total_size().unwrap() <= 40);
}
