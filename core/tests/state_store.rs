//! State store integration tests: durability, retention, restart recovery.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use hashpilot_core::{Mode, StateStore, StatsPatch, StoreOptions};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn open(dir: &TempDir, opts: StoreOptions) -> StateStore {
    StateStore::open(dir.path(), opts).expect("open state store")
}

#[test]
fn history_retention_drops_old_points() {
    let dir = TempDir::new().unwrap();
    let opts = StoreOptions {
        history_retention: Duration::from_secs(60),
        ..StoreOptions::default()
    };
    let store = open(&dir, opts);

    // 20 points, 10s apart: spans 190s, far past the 60s window.
    let base = now_ms() - 200_000;
    for i in 0..20 {
        let ts = base + i * 10_000;
        store.append_history_point_blocking(ts, 1_000.0 + i as f64, 1_000.0 + i as f64, 0.0);
    }

    let history = store.history();
    assert!(!history.is_empty());
    let newest = history.last().unwrap().timestamp_ms;
    for point in &history {
        assert!(
            point.timestamp_ms >= newest - 60_000,
            "point at {} survived past the retention window",
            point.timestamp_ms
        );
    }
    // Chronological, oldest first.
    for pair in history.windows(2) {
        assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
    }
}

#[test]
fn history_survives_restart_in_order() {
    let dir = TempDir::new().unwrap();
    let base = now_ms() - 50_000;
    {
        let store = open(&dir, StoreOptions::default());
        for i in 0..5 {
            store.append_history_point_blocking(base + i * 10_000, 500.0 * i as f64, 0.0, 0.0);
        }
    }

    let store = open(&dir, StoreOptions::default());
    let history = store.history();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].timestamp_ms, base);
    assert_eq!(history[4].total_hr, 2_000.0);
}

#[test]
fn snapshot_roundtrip_across_restart() {
    let dir = TempDir::new().unwrap();
    let blob = json!({
        "workers": [{"name": "rig1", "h15": 12_345.0}],
        "total_live_h15": 12_345.0,
        "nested": {"deep": [1, 2, 3]},
    });

    {
        let store = open(&dir, StoreOptions::default());
        store.save_snapshot_blocking(&blob);
    }

    let store = open(&dir, StoreOptions::default());
    assert_eq!(store.load_snapshot(), Some(blob));
}

#[test]
fn snapshot_is_empty_on_first_boot() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, StoreOptions::default());
    assert_eq!(store.load_snapshot(), None);
}

#[test]
fn donation_stats_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir, StoreOptions::default());
        store.apply_stats_patch_blocking(&StatsPatch::mode(Mode::Xvb, "XVB (split)"));
        store.apply_stats_patch_blocking(&StatsPatch::averages(9_500.0, 20_000.0, 1));
        store.apply_stats_patch_blocking(&StatsPatch::donated(15_000));
    }

    let store = open(&dir, StoreOptions::default());
    let stats = store.donation_stats();
    assert_eq!(stats.current_mode, Mode::Xvb);
    assert_eq!(stats.mode_label, "XVB (split)");
    assert_eq!(stats.avg_1h, 9_500.0);
    assert_eq!(stats.avg_24h, 20_000.0);
    assert_eq!(stats.fail_count, 1);
    assert_eq!(stats.total_donated_ms, 15_000);
    assert!(stats.last_update_ms > 0);
}

#[test]
fn last_update_only_bumps_on_numeric_change() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, StoreOptions::default());

    store.apply_stats_patch_blocking(&StatsPatch::mode(Mode::Xvb, "XVB"));
    assert_eq!(store.donation_stats().last_update_ms, 0);

    store.apply_stats_patch_blocking(&StatsPatch::averages(1_000.0, 2_000.0, 0));
    let first = store.donation_stats().last_update_ms;
    assert!(first > 0);

    // Re-applying identical numbers changes nothing.
    store.apply_stats_patch_blocking(&StatsPatch::averages(1_000.0, 2_000.0, 0));
    assert_eq!(store.donation_stats().last_update_ms, first);
}

#[test]
fn fail_count_resets_only_via_sync_reporting_zero() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, StoreOptions::default());

    store.apply_stats_patch_blocking(&StatsPatch::fail_count(2));
    store.apply_stats_patch_blocking(&StatsPatch::fail_count(3));
    assert_eq!(store.donation_stats().fail_count, 3);

    // A successful sync reporting zero clears the breaker.
    store.apply_stats_patch_blocking(&StatsPatch::averages(5_000.0, 5_000.0, 0));
    assert_eq!(store.donation_stats().fail_count, 0);
}

#[test]
fn workers_prune_after_retention() {
    let dir = TempDir::new().unwrap();
    let opts = StoreOptions {
        worker_retention: Duration::from_secs(3600),
        ..StoreOptions::default()
    };

    let old = now_ms() - 2 * 3600 * 1000;
    {
        let store = open(&dir, opts.clone());
        store.upsert_workers_blocking(
            &[("rig-old".to_string(), "192.168.1.10".to_string())],
            old,
        );
        store.upsert_workers_blocking(
            &[("rig-new".to_string(), "192.168.1.11".to_string())],
            now_ms(),
        );
        let names: Vec<_> = store.known_workers().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["rig-new"]);
    }

    // The prune also held on disk.
    let store = open(&dir, opts);
    let names: Vec<_> = store.known_workers().into_iter().map(|w| w.name).collect();
    assert_eq!(names, vec!["rig-new"]);
}

#[test]
fn worker_ip_updates_on_reappearance() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir, StoreOptions::default());

    store.upsert_workers_blocking(&[("rig1".to_string(), "10.0.0.5".to_string())], now_ms());
    store.upsert_workers_blocking(&[("rig1".to_string(), "10.0.0.9".to_string())], now_ms());

    let workers = store.known_workers();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].ip, "10.0.0.9");
}
