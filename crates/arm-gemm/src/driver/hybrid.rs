use super::{
    align_workspace, check_range, pack_b_panels, row_window, GemmArrays, GemmCommon, SyncPtr,
    ThreadInfo, WORKSPACE_ALIGNMENT,
};
use gemm_core::{
    block_ranges, calculate_block_sizes, pretransposed_b_len, roundup, BlockSizes, GemmArgs,
    HybridKernel, NdRange, Transpose,
};
use std::mem::size_of;
use std::ops::Range;
use tracing::debug;

/// GEMM reading A in place and B from pretransposed panels.
///
/// B is packed once, in block walk order, so execution only needs a
/// running offset into the buffer. Accumulation over k-blocks happens in
/// C: the first block applies the caller's `beta`, later ones add.
pub struct GemmHybrid<S: HybridKernel> {
    strategy: S,
    args: GemmArgs,
    blocks: BlockSizes,
    window: NdRange<3>,
    arrays: GemmArrays<S::OperandType, S::ResultType>,
    b_panels: SyncPtr<S::OperandType>,
    /// Packed elements per multi.
    panel_len: usize,
    nthreads: usize,
}

impl<S: HybridKernel> GemmHybrid<S> {
    pub fn new(args: &GemmArgs) -> Self {
        let blocks = calculate_block_sizes::<S>(&args.ci, args.m, args.n, args.k)
            .with_config(&args.config_or_default(), S::shape());
        let window = row_window(args, blocks.m_round);
        let panel_len = pretransposed_b_len(args.n, args.k, &blocks, S::shape());
        debug!(
            k_block = blocks.k_block,
            x_block = blocks.x_block,
            window = window.total_size(),
            "configured hybrid gemm"
        );
        Self {
            strategy: S::default(),
            args: args.clone(),
            blocks,
            window,
            arrays: GemmArrays::default(),
            b_panels: SyncPtr::null(),
            panel_len,
            nthreads: args.max_threads,
        }
    }
}

impl<S: HybridKernel> GemmCommon<S::OperandType, S::ResultType> for GemmHybrid<S> {
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
        assert_eq!(stage, 0, "hybrid gemm has a single stage");
        check_range(&range, self.window.total_size(), S::OUT_HEIGHT);
        if range.is_empty() {
            return;
        }
        assert!(self.arrays.is_set(), "arrays not set");
        assert!(!self.b_panels.is_null(), "pretransposed B not set");

        let args = &self.args;
        let arrays = &self.arrays;
        for run in self.window.runs(range) {
            let [_, batch, multi] = run.coords;
            for y0 in run.dim0().step_by(S::OUT_HEIGHT) {
                let rows = (y0 + S::OUT_HEIGHT).min(args.m) - y0;
                let mut offset = multi * self.panel_len;
                for ks in block_ranges(args.k, self.blocks.k_block) {
                    let (k0, k_len) = (ks.start, ks.len());
                    let kern_k = roundup(k_len, S::K_UNROLL);
                    let beta = if k0 == 0 { args.beta } else { 1.0 };
                    for xs in block_ranges(args.n, self.blocks.x_block) {
                        let (x0, x_len) = (xs.start, xs.len());
                        unsafe {
                            self.strategy.kernel(
                                arrays.a_at(multi, batch).add(y0 * arrays.lda + k0),
                                arrays.lda,
                                self.b_panels.0.add(offset),
                                arrays.c_at(multi, batch).add(y0 * arrays.ldc + x0),
                                arrays.ldc,
                                args.alpha,
                                beta,
                                rows,
                                x_len,
                                k_len,
                                kern_k,
                            );
                        }
                        offset += roundup(x_len, S::OUT_WIDTH) * kern_k;
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
        true
    }

    fn b_pretranspose_required(&self) -> bool {
        self.b_panels.is_null()
    }

    fn get_b_pretransposed_array_size(&self) -> usize {
        self.panel_len * self.args.nmulti * size_of::<S::OperandType>() + WORKSPACE_ALIGNMENT
    }

    unsafe fn pretranspose_b_array(
        &mut self,
        buf: *mut u8,
        b: *const S::OperandType,
        ldb: usize,
        b_multi_stride: usize,
    ) {
        let dst = align_workspace(buf) as *mut S::OperandType;
        pack_b_panels(
            dst,
            b,
            ldb,
            b_multi_stride,
            Transpose::NoTrans,
            &self.args,
            &self.blocks,
            S::shape(),
        );
    }

    unsafe fn set_pretransposed_b_data(&mut self, buf: *mut u8) {
        self.b_panels = SyncPtr(align_workspace(buf) as *mut S::OperandType);
    }

    fn block_sizes(&self) -> Option<BlockSizes> {
        Some(self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_util::{arrays, data, reference, run_all};
    use gemm_core::{CpuInfo, GemmConfig};
    use gemm_kernels::HybridTile;

    type Fp32 = HybridTile<f32, f32, 8, 4, 1>;
    type S8 = HybridTile<i8, i32, 16, 6, 4>;

    fn run<S: HybridKernel>(
        args: &GemmArgs,
        a: &[S::OperandType],
        b: &[S::OperandType],
        c: &mut [S::ResultType],
    ) {
        let mut gemm = GemmHybrid::<S>::new(args);
        assert!(gemm.b_pretranspose_required());
        let mut buf = vec![0u8; gemm.get_b_pretransposed_array_size()];
        unsafe {
            gemm.pretranspose_b_array(buf.as_mut_ptr(), b.as_ptr(), args.n, args.k * args.n);
            gemm.set_pretransposed_b_data(buf.as_mut_ptr());
            gemm.set_arrays(arrays(args, a, args.k, b, args.n, c, args.n));
        }
        assert!(!gemm.b_pretranspose_required());
        run_all(&gemm, &args.ci);
    }

    #[test]
    fn test_hybrid_matches_reference() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 11, 19, 13).multis(2).beta(1.0);
        let a = data::<f32>(11 * 13 * 2, 1);
        let b = data::<f32>(13 * 19 * 2, 2);
        let mut c = data::<f32>(11 * 19 * 2, 3);
        let mut expected = c.clone();
        reference(&args, &a, 13, &b, 19, &mut expected, 19);
        run::<Fp32>(&args, &a, &b, &mut c);
        assert_eq!(c, expected);
    }

    #[test]
    fn test_hybrid_multiple_k_blocks() {
        let ci = CpuInfo::generic();
        let cfg = GemmConfig::default().block_sizes(3, 8);
        let args = GemmArgs::new(&ci, 6, 20, 10).alpha(2.0).beta(0.5).config(cfg);
        let gemm = GemmHybrid::<Fp32>::new(&args);
        let blocks = gemm.block_sizes().unwrap();
        assert_eq!(blocks.k_block, 3);
        assert_eq!(blocks.x_block, 8);

        let a = data::<f32>(6 * 10, 4);
        let b = data::<f32>(10 * 20, 5);
        let mut c = data::<f32>(6 * 20, 6);
        let mut expected = c.clone();
        reference(&args, &a, 10, &b, 20, &mut expected, 20);
        run::<Fp32>(&args, &a, &b, &mut c);
        assert_eq!(c, expected);
    }

    #[test]
    fn test_hybrid_integer_with_unroll() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 7, 21, 9).batches(2);
        let a = data::<i8>(7 * 9 * 2, 7);
        let b = data::<i8>(9 * 21, 8);
        let mut c = vec![0i32; 7 * 21 * 2];
        let mut expected = c.clone();
        reference(&args, &a, 9, &b, 21, &mut expected, 21);
        run::<S8>(&args, &a, &b, &mut c);
        assert_eq!(c, expected);
    }

    #[test]
    #[should_panic(expected = "pretransposed B not set")]
    fn test_hybrid_requires_pretranspose() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 4, 4, 4);
        let a = [0.0f32; 16];
        let b = [0.0f32; 16];
        let mut c = [0.0f32; 16];
        let mut gemm = GemmHybrid::<Fp32>::new(&args);
        unsafe { gemm.set_arrays(arrays(&args, &a, 4, &b, 4, &mut c, 4)) };
        gemm.execute(0..4, &ThreadInfo::new(0, 1, ci));
    }
}
