use super::{
    align_workspace, aligned_bytes, check_range, pack_b_panels, GemmArrays, GemmCommon, SyncPtr,
    ThreadInfo, WORKSPACE_ALIGNMENT,
};
use gemm_core::{
    calculate_block_sizes, iceildiv, merge_panel, pack_a, pack_b, packed_a_size, panel_ptr,
    pretransposed_b_len, roundup, BlockSizes, BlockWalker, GemmArgs, InterleavedKernel, NdRange,
    Transpose,
};
use std::mem::size_of;
use std::ops::Range;
use tracing::debug;

/// GEMM over packed A and B panels.
///
/// Each worker walks every B block. On the first column block of a new
/// k-block it packs its own rows of A; B comes from the pretransposed
/// buffer or is packed per worker. The kernel writes a scratch C panel
/// which is merged into C with `alpha` and `beta`.
///
/// The window covers `[m_round, nbatches]`; multis are handled by the
/// block walk.
pub struct GemmInterleaved<S: InterleavedKernel> {
    strategy: S,
    args: GemmArgs,
    blocks: BlockSizes,
    window: NdRange<2>,
    arrays: GemmArrays<S::OperandType, S::ResultType>,
    pretransposed: bool,
    b_panels: SyncPtr<S::OperandType>,
    working_space: SyncPtr<u8>,
    nthreads: usize,
}

impl<S: InterleavedKernel> GemmInterleaved<S> {
    pub fn new(args: &GemmArgs) -> Self {
        let blocks = calculate_block_sizes::<S>(&args.ci, args.m, args.n, args.k)
            .with_config(&args.config_or_default(), S::shape());
        let window = if args.is_degenerate() {
            NdRange::new([0, 0])
        } else {
            NdRange::new([blocks.m_round, args.nbatches])
        };
        debug!(
            k_block = blocks.k_block,
            x_block = blocks.x_block,
            pretransposed = args.pretransposed_hint,
            "configured interleaved gemm"
        );
        Self {
            strategy: S::default(),
            args: args.clone(),
            blocks,
            window,
            arrays: GemmArrays::default(),
            pretransposed: args.pretransposed_hint,
            b_panels: SyncPtr::null(),
            working_space: SyncPtr::null(),
            nthreads: args.max_threads,
        }
    }

    fn a_panel_bytes(&self) -> usize {
        aligned_bytes::<S::OperandType>(self.blocks.k_block * self.blocks.m_round * self.args.nbatches)
    }

    fn b_panel_bytes(&self) -> usize {
        if self.pretransposed {
            0
        } else {
            aligned_bytes::<S::OperandType>(self.blocks.k_block * self.blocks.x_block)
        }
    }

    fn c_panel_bytes(&self) -> usize {
        aligned_bytes::<S::ResultType>(S::OUT_HEIGHT * self.blocks.x_block)
    }

    fn per_thread_bytes(&self) -> usize {
        self.a_panel_bytes() + self.b_panel_bytes() + self.c_panel_bytes()
    }
}

impl<S: InterleavedKernel> GemmCommon<S::OperandType, S::ResultType> for GemmInterleaved<S> {
    unsafe fn set_arrays(&mut self, arrays: GemmArrays<S::OperandType, S::ResultType>) {
        self.arrays = arrays;
    }

    fn stage_window(&self, _stage: usize) -> usize {
        self.window.total_size()
    }

    fn stage_granule(&self, _stage: usize) -> usize {
        S::OUT_HEIGHT
    }

    fn execute_stage(&self, stage: usize, range: Range<usize>, info: &ThreadInfo) {
        assert_eq!(stage, 0, "interleaved gemm has a single stage");
        check_range(&range, self.window.total_size(), S::OUT_HEIGHT);
        if range.is_empty() {
            return;
        }
        assert!(self.arrays.is_set(), "arrays not set");
        assert!(!self.working_space.is_null(), "working space not set");
        assert!(
            info.thread_id < self.args.max_threads,
            "thread {} exceeds max_threads {}",
            info.thread_id,
            self.args.max_threads
        );
        if self.pretransposed {
            assert!(!self.b_panels.is_null(), "pretransposed B not set");
        }

        let args = &self.args;
        let arrays = &self.arrays;
        let tr_a = Transpose::from(args.tr_a);
        let tr_b = Transpose::from(args.tr_b);
        let shape = S::shape();

        let (a_panel, b_scratch, c_panel) = unsafe {
            let base = self.working_space.0.add(info.thread_id * self.per_thread_bytes());
            let b = base.add(self.a_panel_bytes());
            let c = b.add(self.b_panel_bytes());
            (
                base as *mut S::OperandType,
                b as *mut S::OperandType,
                c as *mut S::ResultType,
            )
        };

        let mut b_offset = 0;
        for block in BlockWalker::new(args.n, args.k, args.nmulti, &self.blocks) {
            let k_len = block.k_len();
            let x_len = block.x_len();
            let kern_k = roundup(k_len, S::K_UNROLL);
            let bblocks = iceildiv(x_len, S::OUT_WIDTH);

            unsafe {
                if block.new_k_block {
                    let mut a_offset = 0;
                    for run in self.window.runs(range.clone()) {
                        let [y0, batch] = run.coords;
                        let rows = run.dim0().end.min(args.m) - y0;
                        let src = panel_ptr(arrays.a_at(block.multi, batch), y0, block.k0, arrays.lda, tr_a);
                        pack_a(rows, k_len, src, arrays.lda, tr_a, a_panel.add(a_offset), S::OUT_HEIGHT, kern_k);
                        a_offset += packed_a_size(rows, kern_k, S::OUT_HEIGHT);
                    }
                }

                let b_panel = if self.pretransposed {
                    let p = self.b_panels.0.add(b_offset) as *const S::OperandType;
                    b_offset += block.packed_len(shape);
                    p
                } else {
                    let src = panel_ptr(arrays.b_at(block.multi), block.k0, block.x0, arrays.ldb, tr_b);
                    pack_b(k_len, x_len, src, arrays.ldb, tr_b, b_scratch, S::OUT_WIDTH, kern_k);
                    b_scratch as *const S::OperandType
                };

                let beta = if block.k0 == 0 { args.beta } else { 1.0 };
                let mut a_offset = 0;
                for run in self.window.runs(range.clone()) {
                    let [_, batch] = run.coords;
                    for y0 in run.dim0().step_by(S::OUT_HEIGHT) {
                        let rows = (y0 + S::OUT_HEIGHT).min(args.m) - y0;
                        self.strategy
                            .kernel(a_panel.add(a_offset), b_panel, c_panel, bblocks, kern_k);
                        merge_panel(
                            c_panel,
                            bblocks * S::OUT_WIDTH,
                            rows,
                            x_len,
                            arrays.c_at(block.multi, batch).add(y0 * arrays.ldc + block.x0),
                            arrays.ldc,
                            args.alpha,
                            beta,
                        );
                        a_offset += S::OUT_HEIGHT * kern_k;
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

    fn get_working_size(&self) -> usize {
        if self.args.is_degenerate() {
            return 0;
        }
        self.per_thread_bytes() * self.args.max_threads.max(1) + WORKSPACE_ALIGNMENT
    }

    unsafe fn set_working_space(&mut self, ws: *mut u8) {
        self.working_space = SyncPtr(align_workspace(ws));
    }

    fn b_is_pretransposed(&self) -> bool {
        self.pretransposed
    }

    fn b_pretranspose_required(&self) -> bool {
        self.pretransposed && self.b_panels.is_null()
    }

    fn get_b_pretransposed_array_size(&self) -> usize {
        if !self.pretransposed {
            return 0;
        }
        let per_multi = pretransposed_b_len(self.args.n, self.args.k, &self.blocks, S::shape());
        per_multi * self.args.nmulti * size_of::<S::OperandType>() + WORKSPACE_ALIGNMENT
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
            Transpose::from(self.args.tr_b),
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
    use crate::driver::test_util::{arrays, data, reference};
    use gemm_core::{CpuInfo, GemmConfig, ThreadPartitioner};
    use gemm_kernels::{InterleavedTile, SgemmInterleaved8x12};

    fn run<S: InterleavedKernel<OperandType = f32, ResultType = f32>>(args: &GemmArgs, threads: usize) {
        let a_rows = if args.tr_a { args.k } else { args.m };
        let lda = if args.tr_a { args.m } else { args.k };
        let ldb = if args.tr_b { args.k } else { args.n };
        let a = data::<f32>(a_rows * lda * args.nbatches * args.nmulti, 1);
        let b = data::<f32>(args.k * args.n * args.nmulti, 2);
        let mut c = data::<f32>(args.m * args.n * args.nbatches * args.nmulti, 3);
        let mut expected = c.clone();
        reference(args, &a, lda, &b, ldb, &mut expected, args.n);

        let mut gemm = GemmInterleaved::<S>::new(args);
        let mut ws = vec![0u8; gemm.get_working_size()];
        let mut pre = vec![0u8; gemm.get_b_pretransposed_array_size()];
        unsafe {
            gemm.set_working_space(ws.as_mut_ptr());
            if gemm.b_is_pretransposed() {
                gemm.pretranspose_b_array(pre.as_mut_ptr(), b.as_ptr(), ldb, args.k * args.n);
                gemm.set_pretransposed_b_data(pre.as_mut_ptr());
            }
            gemm.set_arrays(arrays(args, &a, lda, &b, ldb, &mut c, args.n));
        }
        let window = gemm.get_window_size();
        for (tid, range) in ThreadPartitioner::partition(window, gemm.stage_granule(0), threads)
            .into_iter()
            .enumerate()
        {
            gemm.execute(range, &ThreadInfo::new(tid, threads, args.ci));
        }
        assert_eq!(c, expected);
    }

    #[test]
    fn test_interleaved_packs_b_per_thread() {
        let ci = CpuInfo::generic();
        run::<InterleavedTile<f32, f32, 4, 4, 1>>(&GemmArgs::new(&ci, 9, 10, 7), 1);
        run::<SgemmInterleaved8x12>(&GemmArgs::new(&ci, 17, 30, 9).beta(1.0).max_threads(3), 3);
    }

    #[test]
    fn test_interleaved_pretransposed() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 12, 25, 14)
            .multis(2)
            .batches(2)
            .pretransposed()
            .max_threads(2);
        run::<SgemmInterleaved8x12>(&args, 2);
    }

    #[test]
    fn test_interleaved_transposed_operands() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 6, 11, 5).trans_a().trans_b().alpha(3.0);
        run::<InterleavedTile<f32, f32, 4, 4, 1>>(&args, 1);
        run::<InterleavedTile<f32, f32, 4, 4, 1>>(&args.clone().pretransposed(), 1);
    }

    #[test]
    fn test_interleaved_blocked_k_and_n() {
        let ci = CpuInfo::generic();
        let cfg = GemmConfig::default().block_sizes(4, 8);
        let args = GemmArgs::new(&ci, 10, 19, 13).beta(2.0).config(cfg).max_threads(2);
        run::<InterleavedTile<f32, f32, 4, 4, 1>>(&args, 2);
        run::<InterleavedTile<f32, f32, 4, 4, 1>>(&args.clone().pretransposed(), 2);
    }

    #[test]
    fn test_interleaved_working_size() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 8, 8, 8).max_threads(4);
        let gemm = GemmInterleaved::<InterleavedTile<f32, f32, 4, 4, 1>>::new(&args);
        assert_eq!(gemm.get_working_size(), gemm.per_thread_bytes() * 4 + WORKSPACE_ALIGNMENT);
        assert_eq!(gemm.get_b_pretransposed_array_size(), 0);

        let degenerate = GemmArgs::new(&ci, 0, 8, 8);
        let gemm = GemmInterleaved::<InterleavedTile<f32, f32, 4, 4, 1>>::new(&degenerate);
        assert_eq!(gemm.get_working_size(), 0);
        assert_eq!(gemm.get_window_size(), 0);
    }

    #[test]
    #[should_panic(expected = "working space not set")]
    fn test_interleaved_requires_working_space() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 4, 4, 4);
        let a = [0.0f32; 16];
        let b = [0.0f32; 16];
        let mut c = [0.0f32; 16];
        let mut gemm = GemmInterleaved::<InterleavedTile<f32, f32, 4, 4, 1>>::new(&args);
        unsafe { gemm.set_arrays(arrays(&args, &a, 4, &b, 4, &mut c, 4)) };
        gemm.execute(0..4, &ThreadInfo::new(0, 1, ci));
    }
}
