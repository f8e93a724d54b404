use super::{check_range, row_window, GemmArrays, GemmCommon, ThreadInfo};
use gemm_core::{calculate_block_sizes, BlockSizes, GemmArgs, NativeKernel, NdRange};
use std::ops::Range;
use tracing::debug;

/// GEMM that hands unpacked A, B and C straight to the kernel.
///
/// Needs no working space and no pretransposition. The window covers
/// `[m_round, nbatches, nmulti]` and is split on tile rows.
pub struct GemmNative<S: NativeKernel> {
    strategy: S,
    args: GemmArgs,
    blocks: BlockSizes,
    window: NdRange<3>,
    arrays: GemmArrays<S::OperandType, S::ResultType>,
    nthreads: usize,
}

impl<S: NativeKernel> GemmNative<S> {
    pub fn new(args: &GemmArgs) -> Self {
        let blocks = calculate_block_sizes::<S>(&args.ci, args.m, args.n, args.k);
        let window = row_window(args, blocks.m_round);
        debug!(
            m = args.m,
            n = args.n,
            k = args.k,
            window = window.total_size(),
            "configured native gemm"
        );
        Self {
            strategy: S::default(),
            args: args.clone(),
            blocks,
            window,
            arrays: GemmArrays::default(),
            nthreads: args.max_threads,
        }
    }
}

impl<S: NativeKernel> GemmCommon<S::OperandType, S::ResultType> for GemmNative<S> {
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
        assert_eq!(stage, 0, "native gemm has a single stage");
        check_range(&range, self.window.total_size(), S::OUT_HEIGHT);
        if range.is_empty() {
            return;
        }
        assert!(self.arrays.is_set(), "arrays not set");

        let args = &self.args;
        let arrays = &self.arrays;
        for run in self.window.runs(range) {
            let [_, batch, multi] = run.coords;
            for y0 in run.dim0().step_by(S::OUT_HEIGHT) {
                let ymax = (y0 + S::OUT_HEIGHT).min(args.m);
                unsafe {
                    self.strategy.kernel(
                        arrays.a_at(multi, batch).add(y0 * arrays.lda),
                        arrays.lda,
                        arrays.b_at(multi),
                        arrays.ldb,
                        arrays.c_at(multi, batch).add(y0 * arrays.ldc),
                        arrays.ldc,
                        args.alpha,
                        args.beta,
                        ymax - y0,
                        args.n,
                        args.k,
                    );
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

    fn block_sizes(&self) -> Option<BlockSizes> {
        Some(self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_util::{arrays, data, reference, run_all};
    use gemm_core::CpuInfo;
    use gemm_kernels::{NativeTile, SgemmNative16x4};

    fn check<S: NativeKernel<OperandType = f32, ResultType = f32>>(args: &GemmArgs) {
        let a = data::<f32>(args.m * args.k * args.nbatches * args.nmulti, 1);
        let b = data::<f32>(args.k * args.n * args.nmulti, 2);
        let c_len = args.m * args.n * args.nbatches * args.nmulti;
        let mut c = data::<f32>(c_len, 3);
        let mut expected = c.clone();
        reference(args, &a, args.k, &b, args.n, &mut expected, args.n);

        let mut gemm = GemmNative::<S>::new(args);
        unsafe { gemm.set_arrays(arrays(args, &a, args.k, &b, args.n, &mut c, args.n)) };
        run_all(&gemm, &args.ci);
        assert_eq!(c, expected);
    }

    #[test]
    fn test_native_matches_reference() {
        let ci = CpuInfo::generic();
        check::<NativeTile<f32, f32, 4, 4>>(&GemmArgs::new(&ci, 7, 9, 5));
        check::<SgemmNative16x4>(&GemmArgs::new(&ci, 13, 37, 11).alpha(0.5).beta(2.0));
    }

    #[test]
    fn test_native_batches_and_multis() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 5, 6, 3).batches(3).multis(2).beta(1.0);
        check::<NativeTile<f32, f32, 4, 4>>(&args);
    }

    #[test]
    fn test_native_window() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 10, 8, 8).batches(2).multis(3);
        let gemm = GemmNative::<NativeTile<f32, f32, 4, 4>>::new(&args);
        assert_eq!(gemm.get_window_size(), 12 * 2 * 3);
        assert_eq!(gemm.stage_granule(0), 4);
        assert_eq!(gemm.get_working_size(), 0);
        assert!(!gemm.b_pretranspose_required());
    }

    #[test]
    fn test_native_degenerate_writes_nothing() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 4, 4, 0);
        let gemm = GemmNative::<NativeTile<f32, f32, 4, 4>>::new(&args);
        assert_eq!(gemm.get_window_size(), 0);
        let info = ThreadInfo::new(0, 1, ci);
        // no arrays were ever set; an empty range must not touch them
        gemm.execute(0..0, &info);
    }

    #[test]
    #[should_panic(expected = "outside of window")]
    fn test_native_range_out_of_bounds() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 4, 4, 4);
        let gemm = GemmNative::<NativeTile<f32, f32, 4, 4>>::new(&args);
        gemm.execute(0..8, &ThreadInfo::new(0, 1, ci));
    }

    #[test]
    fn test_native_range_writes_only_its_rows() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 8, 3, 2);
        let a = data::<f32>(8 * 2, 1);
        let b = data::<f32>(2 * 3, 2);
        let mut c = vec![f32::NAN; 8 * 3];
        let mut gemm = GemmNative::<NativeTile<f32, f32, 4, 4>>::new(&args);
        unsafe { gemm.set_arrays(arrays(&args, &a, 2, &b, 3, &mut c, 3)) };
        gemm.execute(0..4, &ThreadInfo::new(0, 1, ci));
        assert!(c[..12].iter().all(|v| !v.is_nan()));
        assert!(c[12..].iter().all(|v| v.is_nan()));
    }

    #[test]
    #[should_panic(expected = "does not end on a multiple")]
    fn test_native_ragged_range_end() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 8, 3, 2);
        let a = [0.0f32; 16];
        let b = [0.0f32; 6];
        let mut c = [0.0f32; 24];
        let mut gemm = GemmNative::<NativeTile<f32, f32, 4, 4>>::new(&args);
        unsafe { gemm.set_arrays(arrays(&args, &a, 2, &b, 3, &mut c, 3)) };
        gemm.execute(0..5, &ThreadInfo::new(0, 1, ci));
    }

    #[test]
    fn test_native_set_nthreads_clamps() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 64, 64, 64).max_threads(4);
        let mut gemm = GemmNative::<NativeTile<f32, f32, 4, 4>>::new(&args);
        gemm.set_nthreads(16);
        assert_eq!(gemm.num_threads(), 4);
        gemm.set_nthreads(0);
        assert_eq!(gemm.num_threads(), 1);
    }
}
