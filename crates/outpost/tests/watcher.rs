//! Debounce behavior of the filesystem watcher.

use outpost::{FileSink, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<PathBuf>>,
}

impl CollectingSink {
    fn paths(&self) -> Vec<PathBuf> {
        self.events.lock().unwrap().clone()
    }

    fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.events.lock().unwrap().len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

impl FileSink for CollectingSink {
    fn on_stable(&self, path: &Path) {
        self.events.lock().unwrap().push(path.to_path_buf());
    }
}

fn start_watcher(root: &Path, debounce: Duration) -> (Watcher, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let watcher = Watcher::new(root, debounce, sink.clone() as Arc<dyn FileSink>)
        .expect("Failed to start watcher");
    (watcher, sink)
}

#[test]
fn single_write_fires_once() {
    let tmp = TempDir::new().unwrap();
    let (watcher, sink) = start_watcher(tmp.path(), Duration::from_millis(150));

    let path = tmp.path().join("img.png");
    fs::write(&path, b"pixels").unwrap();

    assert!(sink.wait_for_count(1, Duration::from_secs(5)));
    // A lingering timer would double-fire shortly after.
    std::thread::sleep(Duration::from_millis(400));
    let events = sink.paths();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], path);

    watcher.close();
}

#[test]
fn write_burst_collapses_to_one_callback() {
    let tmp = TempDir::new().unwrap();
    let (watcher, sink) = start_watcher(tmp.path(), Duration::from_millis(300));

    let path = tmp.path().join("stream.png");
    // Inter-event gaps well under the debounce window.
    for chunk in 0..5 {
        fs::write(&path, vec![chunk; 64]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
    }

    assert!(sink.wait_for_count(1, Duration::from_secs(5)));
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(sink.paths().len(), 1);

    watcher.close();
}

#[test]
fn quiet_period_allows_refire() {
    let tmp = TempDir::new().unwrap();
    let (watcher, sink) = start_watcher(tmp.path(), Duration::from_millis(100));

    let path = tmp.path().join("rewritten.png");
    fs::write(&path, b"first").unwrap();
    assert!(sink.wait_for_count(1, Duration::from_secs(5)));

    // The file is rewritten after a quiet period: re-ingest is desired.
    fs::write(&path, b"second").unwrap();
    assert!(sink.wait_for_count(2, Duration::from_secs(5)));

    watcher.close();
}

#[test]
fn new_subdirectory_is_watched_but_never_reported() {
    let tmp = TempDir::new().unwrap();
    let (watcher, sink) = start_watcher(tmp.path(), Duration::from_millis(100));

    let subdir = tmp.path().join("cam1");
    fs::create_dir(&subdir).unwrap();
    // Give the backend a moment to pick up the new directory.
    std::thread::sleep(Duration::from_millis(200));

    let nested = subdir.join("shot.png");
    fs::write(&nested, b"pixels").unwrap();

    assert!(sink.wait_for_count(1, Duration::from_secs(5)));
    let events = sink.paths();
    assert!(events.contains(&nested));
    assert!(events.iter().all(|p| p != &subdir));

    watcher.close();
}

#[test]
fn remove_before_debounce_cancels_callback() {
    let tmp = TempDir::new().unwrap();
    let (watcher, sink) = start_watcher(tmp.path(), Duration::from_millis(500));

    let path = tmp.path().join("shortlived.png");
    fs::write(&path, b"pixels").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    fs::remove_file(&path).unwrap();

    std::thread::sleep(Duration::from_millis(1_000));
    assert!(sink.paths().is_empty());

    watcher.close();
}
