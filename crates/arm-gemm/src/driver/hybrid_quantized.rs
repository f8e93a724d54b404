use super::{
    align_workspace, aligned_bytes, check_range, pack_b_panels, row_window, GemmArrays, GemmCommon,
    SyncPtr, ThreadInfo, WORKSPACE_ALIGNMENT,
};
use crate::error::{GemmError, Result};
use gemm_core::quantize::{compute_col_sums, compute_row_sums, requantize_block};
use gemm_core::{
    block_ranges, calculate_block_sizes, pretransposed_b_len, roundup, BlockSizes, GemmArgs,
    HybridKernel, NdRange, Transpose,
};
use gemm_types::{OutputStage, QuantizedElement, Requantize32};
use std::mem::size_of;
use std::ops::Range;
use tracing::debug;

/// Hybrid GEMM that requantizes each output tile as it is produced.
///
/// K is never blocked, so a tile's accumulators are final after one pass
/// and can be narrowed straight into C. Each worker keeps one tile of
/// raw accumulators and the row corrections of its current rows.
///
/// The pretransposed buffer holds the column corrections of every multi,
/// followed by the packed B panels.
pub struct GemmHybridQuantized<S: HybridKernel>
where
    S::OperandType: QuantizedElement<Acc = S::ResultType>,
{
    strategy: S,
    args: GemmArgs,
    qp: Requantize32,
    blocks: BlockSizes,
    window: NdRange<3>,
    arrays: GemmArrays<S::OperandType, S::OperandType>,
    working_space: SyncPtr<u8>,
    col_sums: SyncPtr<i32>,
    b_panels: SyncPtr<S::OperandType>,
    bias: SyncPtr<i32>,
    bias_multi_stride: usize,
    panel_len: usize,
    nthreads: usize,
}

impl<S: HybridKernel> GemmHybridQuantized<S>
where
    S::OperandType: QuantizedElement<Acc = S::ResultType>,
{
    pub fn new(args: &GemmArgs, qp: &Requantize32) -> Self {
        let mut blocks = calculate_block_sizes::<S>(&args.ci, args.m, args.n, args.k)
            .with_config(&args.config_or_default(), S::shape());
        blocks.k_block = roundup(args.k, S::K_UNROLL).max(S::K_UNROLL);
        let window = row_window(args, blocks.m_round);
        let panel_len = pretransposed_b_len(args.n, args.k, &blocks, S::shape());
        debug!(
            x_block = blocks.x_block,
            window = window.total_size(),
            "configured quantized hybrid gemm"
        );
        Self {
            strategy: S::default(),
            args: args.clone(),
            qp: qp.clone(),
            blocks,
            window,
            arrays: GemmArrays::default(),
            working_space: SyncPtr::null(),
            col_sums: SyncPtr::null(),
            b_panels: SyncPtr::null(),
            bias: SyncPtr::null(),
            bias_multi_stride: 0,
            panel_len,
            nthreads: args.max_threads,
        }
    }

    fn tile_bytes(&self) -> usize {
        aligned_bytes::<S::ResultType>(S::OUT_HEIGHT * self.blocks.x_block)
    }

    fn per_thread_bytes(&self) -> usize {
        self.tile_bytes() + aligned_bytes::<i32>(S::OUT_HEIGHT)
    }

    fn col_sum_bytes(&self) -> usize {
        aligned_bytes::<i32>(self.args.n * self.args.nmulti)
    }
}

impl<S: HybridKernel> GemmCommon<S::OperandType, S::OperandType> for GemmHybridQuantized<S>
where
    S::OperandType: QuantizedElement<Acc = S::ResultType>,
{
    unsafe fn set_arrays(&mut self, arrays: GemmArrays<S::OperandType, S::OperandType>) {
        self.arrays = arrays;
    }

    fn stage_window(&self, _stage: usize) -> usize {
        self.window.total_size()
    }

    fn stage_granule(&self, _stage: usize) -> usize {
        S::OUT_HEIGHT
    }

    fn execute_stage(&self, stage: usize, range: Range<usize>, info: &ThreadInfo) {
        assert_eq!(stage, 0, "quantized hybrid gemm has a single stage");
        check_range(&range, self.window.total_size(), S::OUT_HEIGHT);
        if range.is_empty() {
            return;
        }
        assert!(self.arrays.is_set(), "arrays not set");
        assert!(!self.working_space.is_null(), "working space not set");
        assert!(!self.b_panels.is_null(), "pretransposed B not set");
        assert!(
            info.thread_id < self.args.max_threads,
            "thread {} exceeds max_threads {}",
            info.thread_id,
            self.args.max_threads
        );

        let args = &self.args;
        let arrays = &self.arrays;
        let n = args.n;
        let kern_k = self.blocks.k_block;
        let x_block = self.blocks.x_block;

        unsafe {
            let base = self.working_space.0.add(info.thread_id * self.per_thread_bytes());
            let tile = base as *mut S::ResultType;
            let row_sums =
                std::slice::from_raw_parts_mut(base.add(self.tile_bytes()) as *mut i32, S::OUT_HEIGHT);

            for run in self.window.runs(range) {
                let [_, batch, multi] = run.coords;
                let col_sums = std::slice::from_raw_parts(self.col_sums.0.add(multi * n), n);
                for y0 in run.dim0().step_by(S::OUT_HEIGHT) {
                    let rows = (y0 + S::OUT_HEIGHT).min(args.m) - y0;
                    let a_rows = arrays.a_at(multi, batch).add(y0 * arrays.lda);
                    compute_row_sums(&self.qp, rows, args.k, a_rows, arrays.lda, Transpose::NoTrans, row_sums);

                    let mut offset = multi * self.panel_len;
                    for xs in block_ranges(n, x_block) {
                        let (x0, x_len) = (xs.start, xs.len());
                        self.strategy.kernel(
                            a_rows,
                            arrays.lda,
                            self.b_panels.0.add(offset),
                            tile,
                            x_block,
                            1.0,
                            0.0,
                            rows,
                            x_len,
                            args.k,
                            kern_k,
                        );
                        let bias = (!self.bias.is_null()).then(|| {
                            std::slice::from_raw_parts(
                                self.bias.0.add(multi * self.bias_multi_stride + x0),
                                x_len,
                            )
                        });
                        requantize_block::<S::OperandType>(
                            &self.qp,
                            rows,
                            x_len,
                            tile,
                            x_block,
                            arrays.c_at(multi, batch).add(y0 * arrays.ldc + x0),
                            arrays.ldc,
                            &row_sums[..rows],
                            &col_sums[x0..x0 + x_len],
                            bias,
                            x0,
                        );
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
        true
    }

    fn b_pretranspose_required(&self) -> bool {
        self.b_panels.is_null()
    }

    fn get_b_pretransposed_array_size(&self) -> usize {
        self.col_sum_bytes()
            + self.panel_len * self.args.nmulti * size_of::<S::OperandType>()
            + WORKSPACE_ALIGNMENT
    }

    unsafe fn pretranspose_b_array(
        &mut self,
        buf: *mut u8,
        b: *const S::OperandType,
        ldb: usize,
        b_multi_stride: usize,
    ) {
        let base = align_workspace(buf);
        let (n, k) = (self.args.n, self.args.k);
        let sums = std::slice::from_raw_parts_mut(base as *mut i32, n * self.args.nmulti);
        for (multi, out) in sums.chunks_exact_mut(n.max(1)).enumerate() {
            compute_col_sums(
                &self.qp,
                n,
                k,
                b.add(multi * b_multi_stride),
                ldb,
                Transpose::NoTrans,
                out,
            );
        }
        pack_b_panels(
            base.add(self.col_sum_bytes()) as *mut S::OperandType,
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
        let base = align_workspace(buf);
        self.col_sums = SyncPtr(base as *mut i32);
        self.b_panels = SyncPtr(base.add(self.col_sum_bytes()) as *mut S::OperandType);
    }

    unsafe fn set_quantized_bias(&mut self, bias: *const i32, bias_multi_stride: usize) {
        self.bias = SyncPtr(bias as *mut i32);
        self.bias_multi_stride = bias_multi_stride;
    }

    fn block_sizes(&self) -> Option<BlockSizes> {
        Some(self.blocks)
    }
}

pub(crate) fn hybrid_quantized<S: HybridKernel>(
    args: &GemmArgs,
    os: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::OperandType>>>
where
    S::OperandType: QuantizedElement<Acc = S::ResultType>,
{
    let qp = os.requantize().ok_or(GemmError::MissingOutputStage)?;
    Ok(Box::new(GemmHybridQuantized::<S>::new(args, qp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_util::run_all;
    use gemm_core::quantize::requantize_value;
    use gemm_core::CpuInfo;
    use gemm_kernels::HybridTile;

    type U8Dot = HybridTile<u8, u32, 16, 4, 4>;
    type S8Dot = HybridTile<i8, i32, 16, 6, 4>;

    fn expected<T: QuantizedElement>(
        qp: &Requantize32,
        args: &GemmArgs,
        a: &[T],
        b: &[T],
        bias: Option<&[i32]>,
    ) -> Vec<T> {
        let (m, n, k) = (args.m, args.n, args.k);
        let mut out = Vec::new();
        for multi in 0..args.nmulti {
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0i32;
                    for p in 0..k {
                        let av = a[(multi * m + i) * k + p].to_i32() - qp.a_offset;
                        let bv = b[(multi * k + p) * n + j].to_i32() - qp.b_offset;
                        acc += av * bv;
                    }
                    if let Some(bias) = bias {
                        acc += bias[multi * n + j];
                    }
                    out.push(T::saturate_from(requantize_value(qp, acc, j)));
                }
            }
        }
        out
    }

    fn run<S: HybridKernel>(
        args: &GemmArgs,
        qp: &Requantize32,
        a: &[S::OperandType],
        b: &[S::OperandType],
        bias: Option<&[i32]>,
    ) -> Vec<S::OperandType>
    where
        S::OperandType: QuantizedElement<Acc = S::ResultType>,
    {
        let (m, n, k) = (args.m, args.n, args.k);
        let mut c = vec![S::OperandType::default(); m * n * args.nmulti];
        let mut gemm = GemmHybridQuantized::<S>::new(args, qp);
        let mut ws = vec![0u8; gemm.get_working_size()];
        let mut pre = vec![0u8; gemm.get_b_pretransposed_array_size()];
        unsafe {
            gemm.pretranspose_b_array(pre.as_mut_ptr(), b.as_ptr(), n, k * n);
            gemm.set_pretransposed_b_data(pre.as_mut_ptr());
            if let Some(bias) = bias {
                gemm.set_quantized_bias(bias.as_ptr(), n);
            }
            gemm.set_working_space(ws.as_mut_ptr());
            gemm.set_arrays(
                GemmArrays::new(a.as_ptr(), k, b.as_ptr(), n, c.as_mut_ptr(), n)
                    .a_strides(m * k, m * k)
                    .b_multi_stride(k * n)
                    .c_strides(m * n, m * n),
            );
        }
        run_all(&gemm, &args.ci);
        c
    }

    #[test]
    fn test_hybrid_quantized_u8() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 10, 21, 11).multis(2);
        let a: Vec<u8> = (0..10 * 11 * 2).map(|i| (i * 41 % 256) as u8).collect();
        let b: Vec<u8> = (0..11 * 21 * 2).map(|i| (i * 17 % 256) as u8).collect();
        let qp = Requantize32::per_layer(120, 130, 128, 1 << 30, -9, 0, 255);
        assert_eq!(run::<U8Dot>(&args, &qp, &a, &b, None), expected(&qp, &args, &a, &b, None));
    }

    #[test]
    fn test_hybrid_quantized_s8_blocked_columns() {
        let ci = CpuInfo::generic();
        let cfg = gemm_core::GemmConfig::default().block_sizes(4, 16);
        let args = GemmArgs::new(&ci, 7, 40, 9).config(cfg);
        let a: Vec<i8> = (0..7 * 9).map(|i| ((i * 23 % 256) as i32 - 128) as i8).collect();
        let b: Vec<i8> = (0..9 * 40).map(|i| ((i * 19 % 256) as i32 - 128) as i8).collect();
        let bias: Vec<i32> = (0..40).map(|j| j * 31 - 600).collect();
        let qp = Requantize32::per_layer(5, -2, 3, 1 << 30, -7, -128, 127);

        let gemm = GemmHybridQuantized::<S8Dot>::new(&args, &qp);
        let blocks = gemm.block_sizes().unwrap();
        assert_eq!(blocks.x_block, 16);
        assert_eq!(blocks.k_block, 12);

        assert_eq!(
            run::<S8Dot>(&args, &qp, &a, &b, Some(&bias)),
            expected(&qp, &args, &a, &b, Some(&bias))
        );
    }

    #[test]
    fn test_hybrid_quantized_requires_stage() {
        let ci = CpuInfo::generic();
        let args = GemmArgs::new(&ci, 4, 4, 4);
        assert!(hybrid_quantized::<U8Dot>(&args, &OutputStage::Nothing).is_err());
    }
}
