//! End-to-end reconcile cycles over in-memory shards.

mod common;

use std::sync::atomic::Ordering;

use common::harness;
use scrapegrid_coordinator::ShardManager;

#[tokio::test]
async fn active_targets_land_on_the_first_shard() {
    let h = harness(30, 3);
    h.run_until_placed().await;

    let snap = h.coordinator.snapshot();
    assert_eq!(snap.active.values().map(Vec::len).sum::<usize>(), 2);
    assert_eq!(snap.dropped.values().map(Vec::len).sum::<usize>(), 1);
    assert_eq!(h.shards[0].targets(), 2);
    assert_eq!(h.shards[1].targets(), 0);
    assert_eq!(h.manager.active_count(), 1);
    assert!(h.shards[0].config_pushes.load(Ordering::SeqCst) >= 1);

    let _ = h.shutdown.send(true);
}

#[tokio::test]
async fn settled_pool_stops_pushing() {
    let h = harness(30, 2);
    h.run_until_placed().await;
    h.settle_all();
    h.coordinator.run_once().await.unwrap();

    let pushes = h.shards[0].target_pushes.load(Ordering::SeqCst);
    let snap = h.coordinator.run_once().await.unwrap();
    assert_eq!(snap.transfers, 0);
    assert_eq!(snap.need_space, 0);
    assert_eq!(h.shards[0].target_pushes.load(Ordering::SeqCst), pushes);

    let _ = h.shutdown.send(true);
}

#[tokio::test]
async fn oversized_demand_grows_the_pool() {
    // Two targets of 80 series cannot share a 100-series shard.
    let h = harness(80, 3);
    h.run_until_placed().await;
    h.settle_all();

    for _ in 0..5 {
        h.coordinator.run_once().await.unwrap();
        h.settle_all();
    }

    assert_eq!(h.manager.active_count(), 2);
    assert_eq!(h.manager.shards().len(), 2);
    assert_eq!(h.shards[0].targets(), 1);
    assert_eq!(h.shards[1].targets(), 1);

    let _ = h.shutdown.send(true);
}

#[tokio::test]
async fn unreachable_shard_keeps_the_cycle_running() {
    let h = harness(30, 1);
    h.run_until_placed().await;

    h.shards[0].down.store(true, Ordering::SeqCst);
    let snap = h.coordinator.run_once().await.unwrap();
    assert!(!snap.shards[0].changeable);
    assert!(snap.global_status.values().all(|s| s.shards.is_empty()));

    h.shards[0].down.store(false, Ordering::SeqCst);
    let snap = h.coordinator.run_once().await.unwrap();
    assert!(snap.shards[0].changeable);
    assert_eq!(h.shards[0].targets(), 2);

    let _ = h.shutdown.send(true);
}
