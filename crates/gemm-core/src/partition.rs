use std::ops::Range;

/// Splits an iteration window into per-thread chunks.
///
/// Every chunk boundary falls on a multiple of the granule, so no chunk
/// splits a kernel tile. The chunks are contiguous, disjoint, and cover
/// `[0, total)` exactly; only the chunk holding the tail may have a
/// length that is not a multiple of the granule.
pub struct ThreadPartitioner;

impl ThreadPartitioner {
    /// Partition `[0, total)` into `num_threads` ranges.
    ///
    /// The `ceil(total / granule)` granules are dealt out evenly, with the
    /// first `blocks % num_threads` threads taking one extra. Threads
    /// beyond the number of granules receive empty ranges.
    ///
    /// # Example
    ///
    /// ```
    /// use gemm_core::ThreadPartitioner;
    ///
    /// let parts = ThreadPartitioner::partition(10, 4, 2);
    /// assert_eq!(parts, vec![0..8, 8..10]);
    /// ```
    pub fn partition(total: usize, granule: usize, num_threads: usize) -> Vec<Range<usize>> {
        let threads = num_threads.max(1);
        (0..threads)
            .map(|tid| Self::thread_range(total, granule, threads, tid))
            .collect()
    }

    /// The range of thread `tid` in [`ThreadPartitioner::partition`].
    pub fn thread_range(total: usize, granule: usize, num_threads: usize, tid: usize) -> Range<usize> {
        let granule = granule.max(1);
        let threads = num_threads.max(1);
        assert!(tid < threads, "thread {tid} out of range for {threads} threads");

        let blocks = total.div_ceil(granule);
        let base = blocks / threads;
        let extra = blocks % threads;

        let first_block = tid * base + tid.min(extra);
        let num_blocks = base + usize::from(tid < extra);

        let start = (first_block * granule).min(total);
        let end = ((first_block + num_blocks) * granule).min(total);
        start..end
    }

    /// Partition `window` (which must start on a granule boundary) the same way.
    pub fn split(window: Range<usize>, granule: usize, num_threads: usize) -> Vec<Range<usize>> {
        let offset = window.start;
        Self::partition(window.len(), granule, num_threads)
            .into_iter()
            .map(|r| (r.start + offset)..(r.end + offset))
            .collect()
    }
}
