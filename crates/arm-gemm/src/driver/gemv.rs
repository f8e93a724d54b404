use super::{
    align_workspace, check_range, GemmArrays, GemmCommon, SyncPtr, ThreadInfo, WORKSPACE_ALIGNMENT,
};
use gemm_core::{roundup, GemmArgs, GemvKernel, NdRange};
use std::mem::size_of;
use std::ops::Range;
use tracing::debug;

/// How a [`GemmGemv`] walks its problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GemvMode {
    /// Rows of all batches form one long matrix sharing the vector.
    Batched,
    /// The vector of every multi is copied to a contiguous buffer up front.
    Pretransposed,
    /// The vector is read in place from B.
    NativeTransposed,
}

/// GEMM specialised for `N == 1`.
pub struct GemmGemv<S: GemvKernel> {
    strategy: S,
    mode: GemvMode,
    args: GemmArgs,
    window: NdRange<3>,
    arrays: GemmArrays<S::OperandType, S::ResultType>,
    vectors: SyncPtr<S::OperandType>,
    nthreads: usize,
}

impl<S: GemvKernel> GemmGemv<S> {
    pub fn new(args: &GemmArgs, mode: GemvMode) -> Self {
        let height = S::OUT_HEIGHT;
        let window = if args.is_degenerate() {
            NdRange::new([0, 0, 0])
        } else if mode == GemvMode::Batched {
            NdRange::new([roundup(args.m * args.nbatches, height), 1, args.nmulti])
        } else {
            NdRange::new([roundup(args.m, height), args.nbatches, args.nmulti])
        };
        debug!(?mode, m = args.m, k = args.k, window = window.total_size(), "configured gemv");
        Self {
            strategy: S::default(),
            mode,
            args: args.clone(),
            window,
            arrays: GemmArrays::default(),
            vectors: SyncPtr::null(),
            nthreads: args.max_threads,
        }
    }

    pub fn batched(args: &GemmArgs) -> Self {
        Self::new(args, GemvMode::Batched)
    }

    pub fn pretransposed(args: &GemmArgs) -> Self {
        Self::new(args, GemvMode::Pretransposed)
    }

    pub fn native_transposed(args: &GemmArgs) -> Self {
        Self::new(args, GemvMode::NativeTransposed)
    }

    pub fn mode(&self) -> GemvMode {
        self.mode
    }

    /// Stride between consecutive elements of the vector inside B.
    fn b_increment(&self, ldb: usize) -> usize {
        if self.args.tr_b {
            1
        } else {
            ldb
        }
    }

    unsafe fn rows(&self, multi: usize, batch: usize, row: usize, count: usize) {
        let arrays = &self.arrays;
        let (x, incx) = if self.vectors.is_null() {
            (arrays.b_at(multi), self.b_increment(arrays.ldb))
        } else {
            (
                self.vectors.0.add(multi * self.args.k) as *const S::OperandType,
                1,
            )
        };
        self.strategy.kernel(
            arrays.a_at(multi, batch).add(row * arrays.lda),
            arrays.lda,
            x,
            incx,
            arrays.c_at(multi, batch).add(row * arrays.ldc),
            arrays.ldc,
            self.args.alpha,
            self.args.beta,
            count,
            self.args.k,
        );
    }
}

impl<S: GemvKernel> GemmCommon<S::OperandType, S::ResultType> for GemmGemv<S> {
    unsafe fn set_arrays(&mut self, arrays: GemmArrays<S::OperandType, S::ResultType>) {
        self.arrays = arrays;
    }

    fn stage_window(&self, _stage: usize) -> usize {
        self.window.total_size()
    }

    fn stage_granule(&self, _stage: usize) -> usize {
        S::OUT_HEIGHT
    }

    fn execute_stage(&self, stage: usize, range: Range<usize>, _info: &ThreadInfo) {
        assert_eq!(stage, 0, "gemv has a single stage");
        check_range(&range, self.window.total_size(), S::OUT_HEIGHT);
        if range.is_empty() {
            return;
        }
        assert!(self.arrays.is_set(), "arrays not set");
        if self.mode == GemvMode::Pretransposed {
            assert!(!self.vectors.is_null(), "pretransposed B not set");
        }

        let m = self.args.m;
        for run in self.window.runs(range) {
            let [_, batch, multi] = run.coords;
            for y0 in run.dim0().step_by(S::OUT_HEIGHT) {
                match self.mode {
                    GemvMode::Batched => {
                        // a tile may straddle batches; split it at each boundary
                        let end = (y0 + S::OUT_HEIGHT).min(m * self.args.nbatches);
                        let mut r = y0;
                        while r < end {
                            let (batch, row) = (r / m, r % m);
                            let count = (end - r).min(m - row);
                            unsafe { self.rows(multi, batch, row, count) };
                            r += count;
                        }
                    }
                    GemvMode::Pretransposed | GemvMode::NativeTransposed => {
                        let count = (y0 + S::OUT_HEIGHT).min(m) - y0;
                        unsafe { self.rows(multi, batch, y0, count) };
                    }
                }
            }
        }
    }

    fn set_nthreads(&mut self, nthreads: usize) {
        self.nthreads = nthreads.clamp(1, self.args.max_threads.max(1));
    }

    fn num_threads(&self) -> usize {
        self.nthreads
    }

    fn b_is_pretransposed(&self) -> bool {
        self.mode == GemvMode::Pretransposed
    }

    fn b_pretranspose_required(&self) -> bool {
        self.mode == GemvMode::Pretransposed && self.vectors.is_null()
    }

    fn get_b_pretransposed_array_size(&self) -> usize {
        if self.mode != GemvMode::Pretransposed {
            return 0;
        }
        self.args.k * self.args.nmulti * size_of::<S::OperandType>() + WORKSPACE_ALIGNMENT
    }

    unsafe fn pretranspose_b_array(
        &mut self,
        buf: *mut u8,
        b: *const S::OperandType,
        ldb: usize,
        b_multi_stride: usize,
    ) {
        let dst = align_workspace(buf) as *mut S::OperandType;
        let inc = self.b_increment(ldb);
        for multi in 0..self.args.nmulti {
            let src = b.add(multi * b_multi_stride);
            for p in 0..self.args.k {
                *dst.add(multi * self.args.k + p) = *src.add(p * inc);
            }
        }
    }

    unsafe fn set_pretransposed_b_data(&mut self, buf: *mut u8) {
        self.vectors = SyncPtr(align_workspace(buf) as *mut S::OperandType);
    }
}
