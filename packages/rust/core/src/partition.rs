//! Partitioner: split `R` data rows across at most `W` workers.
//!
//! Boundaries are a pure function of `(R, W)`. Every worker but the last gets
//! `floor(R / workers)` rows; the last one also takes the remainder.

use std::ops::Range;

use fanout_shared::{FanoutError, Result, WorkerId};

/// The contiguous row range handed to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBounds {
    pub worker: WorkerId,
    /// 0-based index of the first data row.
    pub start: usize,
    /// 0-based, exclusive.
    pub end: usize,
}

impl PartitionBounds {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 1-based record numbers covered by this partition.
    pub fn record_numbers(&self) -> Range<usize> {
        self.start + 1..self.end + 1
    }
}

/// Ordered partition boundaries for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub total_rows: usize,
    pub requested_workers: u32,
    bounds: Vec<PartitionBounds>,
}

impl PartitionPlan {
    /// Workers that will actually run: `min(requested, total_rows)`.
    pub fn effective_workers(&self) -> u32 {
        self.bounds.len() as u32
    }

    /// Bounds in worker-id order.
    pub fn bounds(&self) -> &[PartitionBounds] {
        &self.bounds
    }
}

/// Compute the partition plan for `total_rows` rows and `requested` workers.
pub fn plan_partitions(total_rows: usize, requested: u32) -> Result<PartitionPlan> {
    if requested == 0 {
        return Err(FanoutError::validation(
            "worker count must be a positive integer",
        ));
    }

    let workers = (requested as usize).min(total_rows);
    let mut bounds = Vec::with_capacity(workers);

    if workers > 0 {
        let chunk = total_rows / workers;
        for i in 0..workers {
            let start = i * chunk;
            let end = if i + 1 == workers {
                total_rows
            } else {
                start + chunk
            };
            bounds.push(PartitionBounds {
                worker: WorkerId::new(i as u32 + 1),
                start,
                end,
            });
        }
    }

    Ok(PartitionPlan {
        total_rows,
        requested_workers: requested,
        bounds,
    })
}
