use std::collections::HashSet;

use ctidscan_core::{
    configuration::{Configuration, ConnectionParams},
    core::{
        address::TupleAddress,
        mock_session::{MockConnector, MockStore},
        orchestrator::Orchestrator,
        partition::TailPolicy,
        report::ScanEvent,
    },
    error::{CtidScanError, SessionError},
};
use tokio::sync::mpsc;

fn config(workers: usize) -> Configuration {
    let mut config = Configuration::new(ConnectionParams::new("shop"), "public", "orders");
    config.workers = workers;
    config
}

// 40 blocks of five rows each, one row with a broken TOAST pointer and one
// tuple that cannot be read at all.
fn damaged_store() -> MockStore {
    let store = MockStore::new();
    store.set_statistics("40", "400");
    for block in 0..40 {
        store.fill_block(block, 1..=5);
    }
    store.insert_toasted_row(12, 3, "1203");
    store.insert_unreadable_row(30, 5);
    store
}

fn probed_blocks(store: &MockStore) -> HashSet<u64> {
    store.probed_addresses().iter().map(|a| a.block).collect()
}

#[tokio::test]
async fn test_full_sweep_finds_damaged_tuples() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = damaged_store();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(MockConnector::new(store.clone()), config(2)).with_events(tx);

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.blocks_scanned(), 40);
    assert_eq!(report.blocks_failed(), 0);
    assert_eq!(report.rows_found(), 198);
    assert_eq!(report.query_errors(), 1);
    assert_eq!(report.corrupted(), 1);
    assert!(report.is_complete());

    // metadata session plus one per worker, all closed
    assert_eq!(store.connects(), 3);
    assert_eq!(store.closes(), 3);

    let mut blocks = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            ScanEvent::BlockScanned { summary, .. } => blocks.push(summary.block),
            ScanEvent::BlockFailed { block, .. } => panic!("block {} failed", block),
        }
    }
    blocks.sort_unstable();
    assert_eq!(blocks, (0..40).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_workers_get_interleaved_ranges() {
    let store = damaged_store();
    let orchestrator = Orchestrator::new(MockConnector::new(store), config(2));

    let plan = orchestrator.plan().await.unwrap();
    assert_eq!(plan.total_blocks, 40);
    assert_eq!(plan.rows_per_block, 10.0);

    let starts: Vec<Vec<u64>> = plan
        .partition
        .workers
        .iter()
        .map(|ranges| ranges.iter().map(|r| r.start).collect())
        .collect();
    assert_eq!(starts, vec![vec![0, 20], vec![10, 30]]);
}

#[tokio::test]
async fn test_missing_relation_starts_no_worker() {
    let store = MockStore::new();
    store.fail_statistics(SessionError::with_code("relation \"public.orders\" does not exist", "42P01"));

    let orchestrator = Orchestrator::new(MockConnector::new(store.clone()), config(4));
    let result = orchestrator.run().await;

    assert!(matches!(result, Err(CtidScanError::RelationNotFound { .. })));
    assert_eq!(store.connects(), 1);
    assert!(store.probed_addresses().is_empty());
}

#[tokio::test]
async fn test_block_override_limits_the_sweep() {
    let store = damaged_store();
    let mut config = config(2);
    config.blocks = Some(4);

    let report = Orchestrator::new(MockConnector::new(store.clone()), config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.blocks_scanned(), 4);
    assert_eq!(probed_blocks(&store), HashSet::from([0, 1, 2, 3]));
}

#[tokio::test]
async fn test_empty_table_probes_nothing() {
    let store = MockStore::new();
    store.set_statistics("0", "0");

    let report = Orchestrator::new(MockConnector::new(store.clone()), config(3))
        .run()
        .await
        .unwrap();

    assert_eq!(report.workers.len(), 3);
    assert_eq!(report.blocks_scanned(), 0);
    assert!(store.probed_addresses().is_empty());
}

#[tokio::test]
async fn test_dropped_tail_is_reported_and_not_scanned() {
    let store = MockStore::new();
    store.set_statistics("1000", "0");

    let report = Orchestrator::new(MockConnector::new(store.clone()), config(4))
        .run()
        .await
        .unwrap();

    assert_eq!(report.unassigned_blocks, 8);
    assert_eq!(report.blocks_scanned(), 992);
    assert!(!report.is_complete());

    let blocks = probed_blocks(&store);
    assert!(blocks.contains(&991));
    assert!((992..1000).all(|b| !blocks.contains(&b)));
}

#[tokio::test]
async fn test_redistributed_tail_is_scanned() {
    let store = MockStore::new();
    store.set_statistics("1000", "0");
    let mut config = config(4);
    config.tail_policy = TailPolicy::Redistribute;

    let report = Orchestrator::new(MockConnector::new(store.clone()), config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.unassigned_blocks, 0);
    assert_eq!(report.blocks_scanned(), 1000);
    assert_eq!(probed_blocks(&store).len(), 1000);
}

#[tokio::test]
async fn test_worker_without_connection_does_not_stop_the_others() {
    let store = damaged_store();
    let orchestrator = Orchestrator::new(MockConnector::new(store.clone()), config(2));

    let plan = orchestrator.plan().await.unwrap();
    store.fail_next_connects(1);
    let report = orchestrator.execute(plan).await.unwrap();

    assert_eq!(report.workers_aborted(), 1);
    assert_eq!(report.blocks_scanned(), 20);
}

#[tokio::test]
async fn test_lost_connection_only_ends_its_worker() {
    let store = damaged_store();
    store.lose_connection_at(TupleAddress::new(25, 1));

    let report = Orchestrator::new(MockConnector::new(store.clone()), config(2))
        .run()
        .await
        .unwrap();

    assert_eq!(report.workers_aborted(), 1);
    // worker 0 scans 20..30 first and dies on block 25; worker 1 is unaffected
    let worker0 = &report.workers[0];
    assert!(worker0.aborted);
    assert_eq!(worker0.blocks_scanned, 5);
    assert_eq!(report.workers[1].blocks_scanned, 20);
    assert!(!report.workers[1].aborted);
}

#[tokio::test]
async fn test_crashed_worker_keeps_the_other_reports() {
    let store = damaged_store();
    store.panic_at(TupleAddress::new(25, 1));

    let report = Orchestrator::new(MockConnector::new(store.clone()), config(2))
        .run()
        .await
        .unwrap();

    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.workers_aborted(), 1);
    assert!(report.workers[0].aborted);
    assert_eq!(report.workers[0].worker, 0);
    assert_eq!(report.workers[1].blocks_scanned, 20);
    assert_eq!(report.workers[1].rows_found, 98);
    assert!(!report.workers[1].aborted);
}
