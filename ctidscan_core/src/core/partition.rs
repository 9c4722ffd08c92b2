//! Splits a table's heap into per-worker block range lists.
//!
//! The block space is cut into `workers²` fine ranges which are then grouped and
//! dealt round-robin inside each group. Every worker therefore receives slices
//! from the whole table instead of one contiguous chunk, so spatially clustered
//! bloat or corruption is spread across all workers.

use log::debug;

use super::address::BlockRange;

/// What happens to the trailing group when grouping produces more groups than workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TailPolicy {
    /// The trailing group is not assigned to anyone. Its blocks are not scanned.
    #[default]
    Drop,
    /// The trailing group is dealt round-robin to the workers after their regular ranges.
    Redistribute,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionPlan {
    /// One ordered range list per worker.
    pub workers: Vec<Vec<BlockRange>>,
    /// Blocks left unassigned by [`TailPolicy::Drop`].
    pub dropped: Option<BlockRange>,
}

impl PartitionPlan {
    pub fn assigned_blocks(&self) -> u64 {
        self.workers
            .iter()
            .flat_map(|ranges| ranges.iter())
            .map(BlockRange::len)
            .sum()
    }
}

/// Partitions `[0, total_blocks)` across `worker_count` workers, dropping the
/// trailing group (see [`TailPolicy::Drop`]).
pub fn partition(total_blocks: u64, worker_count: usize) -> Vec<Vec<BlockRange>> {
    partition_plan(total_blocks, worker_count, TailPolicy::Drop).workers
}

pub fn partition_plan(total_blocks: u64, worker_count: usize, policy: TailPolicy) -> PartitionPlan {
    let mut workers: Vec<Vec<BlockRange>> = vec![Vec::new(); worker_count];

    if worker_count == 0 || total_blocks == 0 {
        return PartitionPlan {
            workers,
            dropped: None,
        };
    }

    let worker_count_u64 = worker_count as u64;
    let fine_step = (total_blocks / worker_count_u64.saturating_mul(worker_count_u64)).max(1);
    let fine_ranges = split(0, total_blocks, fine_step);

    let fine_count = fine_ranges.len() as u64;
    let group_step = (fine_count / worker_count_u64).max(1);
    let mut groups = split(0, fine_count, group_step);

    let mut dropped_group = None;
    if groups.len() > worker_count {
        dropped_group = groups.pop();
    }

    for group in groups.iter() {
        deal(&mut workers, &fine_ranges[group.start as usize..group.end as usize]);
    }

    let mut dropped = None;
    if let Some(group) = dropped_group {
        let tail = &fine_ranges[group.start as usize..group.end as usize];
        match policy {
            TailPolicy::Drop => {
                let range = BlockRange::new(tail[0].start, tail[tail.len() - 1].end);
                debug!("main|Partition leaves blocks {} unassigned", range);
                dropped = Some(range);
            }
            TailPolicy::Redistribute => deal(&mut workers, tail),
        }
    }

    PartitionPlan { workers, dropped }
}

// The k-th range of a group goes to worker k. Groups can be wider than the
// worker count when the table has fewer than 2 * workers² blocks; the index
// wraps in that case.
fn deal(workers: &mut [Vec<BlockRange>], ranges: &[BlockRange]) {
    let worker_count = workers.len();
    for (k, range) in ranges.iter().enumerate() {
        workers[k % worker_count].push(*range);
    }
}

fn split(start: u64, end: u64, step: u64) -> Vec<BlockRange> {
    let mut ranges = Vec::with_capacity(((end - start) / step + 1) as usize);
    let mut position = start;
    while position < end {
        let next = position.saturating_add(step).min(end);
        ranges.push(BlockRange::new(position, next));
        position = next;
    }
    ranges
}
