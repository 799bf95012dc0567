//! Integration tests for the watch engine and the manager on a real filesystem.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hotfolder::license::StaticLicense;
use hotfolder::manager::{Manager, ManagerSettings};
use hotfolder::processor::{MoveProcessor, UnitProcessor};
use hotfolder::store::{FolderDescriptor, FolderStore, JsonFolderStore, MemoryFolderStore};
use hotfolder::watcher::{ReadyUnit, TrackerSettings, WatchEngine, WatchSettings};
use parking_lot::Mutex;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingProcessor {
    units: Mutex<Vec<ReadyUnit>>,
}

impl RecordingProcessor {
    fn units(&self) -> Vec<ReadyUnit> {
        self.units.lock().clone()
    }
}

impl UnitProcessor for RecordingProcessor {
    fn process_unit(&self, unit: &ReadyUnit, _folder: &FolderDescriptor) -> anyhow::Result<()> {
        self.units.lock().push(unit.clone());
        Ok(())
    }
}

fn fast_watch_settings() -> WatchSettings {
    WatchSettings {
        debounce: Duration::from_millis(50),
        tracker: TrackerSettings {
            stability_window: Duration::from_millis(150),
            partner_wait_timeout: None,
        },
        ..WatchSettings::default()
    }
}

/// Drain until `done` holds or the deadline passes.
async fn drain_until(engine: &WatchEngine, done: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        engine.process_pending().await;
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Test that a pair written after the watch starts is delivered once as a pair.
#[tokio::test]
async fn test_live_pair_is_delivered_once() {
    let tmp = TempDir::new().unwrap();
    let processor = Arc::new(RecordingProcessor::default());
    let engine = WatchEngine::new(fast_watch_settings(), processor.clone());

    engine
        .start_watching(&FolderDescriptor::new("hf", tmp.path()))
        .await
        .unwrap();

    let primary = tmp.path().join("invoice.pdf");
    let companion = tmp.path().join("invoice.xml");
    fs::write(&primary, b"%PDF-1.7").unwrap();
    fs::write(&companion, b"<invoice/>").unwrap();

    let delivered = drain_until(&engine, || !processor.units().is_empty()).await;
    assert!(delivered, "pair was never delivered");

    // A few more ticks must not produce a duplicate.
    for _ in 0..5 {
        engine.process_pending().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(
        processor.units(),
        vec![ReadyUnit::Pair {
            primary,
            companion
        }]
    );

    engine.stop_all().await;
}

/// Test that files present before the watch starts are found by the initial rescan.
#[tokio::test]
async fn test_initial_rescan_finds_existing_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
    fs::write(tmp.path().join("a.xml"), b"a").unwrap();
    fs::write(tmp.path().join("orphan.xml"), b"o").unwrap();
    fs::write(tmp.path().join("notes.txt"), b"n").unwrap();

    let processor = Arc::new(RecordingProcessor::default());
    let engine = WatchEngine::new(fast_watch_settings(), processor.clone());

    engine
        .start_watching(&FolderDescriptor::new("hf", tmp.path()))
        .await
        .unwrap();

    assert!(drain_until(&engine, || !processor.units().is_empty()).await);

    let units = processor.units();
    assert_eq!(units.len(), 1);
    assert!(units[0].is_pair());

    let snapshot = engine.snapshot("hf").await.unwrap().unwrap();
    assert!(snapshot.is_waiting(&tmp.path().join("orphan.xml")));
    assert!(!snapshot.is_pending(&tmp.path().join("notes.txt")));

    engine.stop_all().await;
}

/// Test that a restarted watch does not re-emit what was already processed.
#[tokio::test]
async fn test_restart_does_not_duplicate() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("scan.pdf"), b"s").unwrap();

    let descriptor = FolderDescriptor::new("hf", &input)
        .with_pairing(false)
        .with_output(&output);
    let engine = WatchEngine::new(fast_watch_settings(), Arc::new(MoveProcessor::new()));

    engine.start_watching(&descriptor).await.unwrap();
    assert!(drain_until(&engine, || output.join("scan.pdf").exists()).await);

    assert!(engine.stop_watching("hf").await);
    let summary = engine.start_watching(&descriptor).await.unwrap();
    assert_eq!(summary.pending, 0);

    let report = engine.process_pending().await;
    assert_eq!(report.dispatched, 0);

    engine.stop_all().await;
}

/// Test the manager end to end against a JSON folder list.
#[tokio::test]
async fn test_manager_moves_pairs_from_json_store() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    fs::create_dir_all(&input).unwrap();

    let folders_file = tmp.path().join("hotfolders.json");
    let store = JsonFolderStore::new(&folders_file);
    store
        .persist(&[FolderDescriptor::new("hf", &input).with_output(&output)])
        .unwrap();

    let settings = ManagerSettings {
        watch: fast_watch_settings(),
        drain_interval: Duration::from_millis(50),
        grace_delay: Duration::from_millis(10),
        ..ManagerSettings::default()
    };
    let manager = Manager::new(
        Arc::new(store),
        Arc::new(MoveProcessor::new()),
        Arc::new(StaticLicense::new(true)),
        settings,
    );

    let report = manager.start().await.unwrap();
    assert_eq!(report.watches_started, 1);

    fs::write(input.join("doc.pdf"), b"d").unwrap();
    fs::write(input.join("doc.xml"), b"<doc/>").unwrap();

    let moved = |name: &str| -> PathBuf { output.join(name) };
    let mut delivered = false;
    for _ in 0..100 {
        if moved("doc.pdf").exists() && moved("doc.xml").exists() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered, "pair was not moved to the output folder");

    assert!(manager.stop().await);
}

/// Test that the manager watches nothing without a license.
#[tokio::test]
async fn test_manager_without_license_watches_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(MemoryFolderStore::new(vec![FolderDescriptor::new(
        "hf",
        tmp.path(),
    )]));
    let manager = Manager::new(
        Arc::clone(&store) as Arc<dyn FolderStore>,
        Arc::new(RecordingProcessor::default()),
        Arc::new(StaticLicense::new(false)),
        ManagerSettings::default(),
    );

    let report = manager.start().await.unwrap();
    assert!(!report.licensed);
    assert!(manager.engine().watched_ids().await.is_empty());
    assert!(!store.list().unwrap()[0].is_enabled());

    manager.stop().await;
}
