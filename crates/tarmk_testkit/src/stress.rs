//! Stress testing utilities.
//!
//! Runs concurrent merges, optionally alongside compaction and cleanup, and
//! reports how many operations succeeded.

use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tarmk_core::{CancellationToken, CommitHooks, CompactionStatus, SegmentNodeStore};
use tracing::info;

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Operations that succeeded.
    pub successful_ops: usize,
    /// Operations that failed.
    pub failed_ops: usize,
    /// Compactions installed while the run was going.
    pub compactions: usize,
    /// Wall time.
    pub duration: Duration,
    /// Throughput.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a result and derives the throughput.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            successful_ops: successful,
            failed_ops: failed,
            compactions: 0,
            duration,
            ops_per_second,
        }
    }

    /// Logs a summary.
    pub fn log_summary(&self) {
        info!(
            successful = self.successful_ops,
            failed = self.failed_ops,
            compactions = self.compactions,
            duration_ms = self.duration.as_millis() as u64,
            ops_per_second = self.ops_per_second,
            "stress run finished"
        );
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writer threads.
    pub num_threads: usize,
    /// Merges per thread.
    pub ops_per_thread: usize,
    /// Distinct top-level children the writers touch.
    pub key_space: usize,
    /// Whether writers may touch the same children.
    pub overlapping: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            ops_per_thread: 50,
            key_space: 16,
            overlapping: false,
        }
    }
}

/// Runs concurrent merges, each setting one property on one child.
///
/// Without `overlapping`, each thread owns its own children and every merge
/// should succeed. A merge that exhausts its retries counts as failed.
pub fn stress_concurrent_merges(store: &SegmentNodeStore, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.num_threads)
        .map(|thread_id| {
            let store = store.clone();
            let config = config.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for op in 0..config.ops_per_thread {
                    let slot = rng.gen_range(0..config.key_space.max(1));
                    let child = if config.overlapping {
                        format!("k{slot}")
                    } else {
                        format!("t{thread_id}_k{slot}")
                    };
                    if merge_one(&store, &child, op as i64) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs [`stress_concurrent_merges`] while another thread repeatedly
/// compacts and cleans up.
pub fn stress_merges_with_compaction(
    store: &SegmentNodeStore,
    config: &StressConfig,
) -> StressTestResult {
    let done = Arc::new(AtomicBool::new(false));
    let compactions = Arc::new(AtomicUsize::new(0));

    let compactor = {
        let store = store.clone();
        let done = Arc::clone(&done);
        let compactions = Arc::clone(&compactions);
        thread::spawn(move || {
            let mut errors = 0usize;
            while !done.load(Ordering::Acquire) {
                match store.compact(&CancellationToken::new()) {
                    Ok(outcome) if outcome.status == CompactionStatus::Installed => {
                        compactions.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(_) => errors += 1,
                }
                if store.cleanup().is_err() {
                    errors += 1;
                }
                thread::sleep(Duration::from_millis(1));
            }
            errors
        })
    };

    let mut result = stress_concurrent_merges(store, config);
    done.store(true, Ordering::Release);
    match compactor.join() {
        Ok(errors) => result.failed_ops += errors,
        Err(_) => result.failed_ops += 1,
    }
    result.compactions = compactions.load(Ordering::Relaxed);
    result
}

fn merge_one(store: &SegmentNodeStore, child: &str, value: i64) -> bool {
    let Ok(mut branch) = store.branch() else {
        return false;
    };
    let root = branch.builder_mut();
    let exists = matches!(root.has_child(child), Ok(true));
    let node = if exists {
        match root.child_mut(child) {
            Ok(Some(node)) => node,
            _ => return false,
        }
    } else {
        root.add_child(child)
    };
    node.set_property("value", value);
    branch.merge(&CommitHooks::empty(), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{node_at, TestStore};
    use tarmk_core::StoreConfig;

    #[test]
    fn disjoint_merges_all_succeed() {
        let store = TestStore::memory_with(StoreConfig::default().merge_retries(1_000));
        let config = StressConfig {
            num_threads: 4,
            ops_per_thread: 20,
            key_space: 4,
            overlapping: false,
        };
        let result = stress_concurrent_merges(&store, &config);
        result.log_summary();
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 80);

        let root = store.get_root().unwrap();
        let children = root.child_count().unwrap();
        assert!(children > 0 && children <= 16);
        for name in root.child_names().unwrap() {
            assert!(node_at(&root, &name).unwrap().property("value").unwrap().is_some());
        }
    }

    #[test]
    fn merges_survive_concurrent_compaction() {
        let store = TestStore::memory_with(StoreConfig::default().merge_retries(1_000));
        let config = StressConfig {
            num_threads: 2,
            ops_per_thread: 25,
            key_space: 3,
            overlapping: false,
        };
        let result = stress_merges_with_compaction(&store, &config);
        result.log_summary();
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 50);

        // Every committed child is still readable after the last cleanup.
        let root = store.get_root().unwrap();
        for (_, child) in root.children().unwrap() {
            assert!(child.property("value").unwrap().is_some());
        }
    }
}
