use super::{
    align_workspace, aligned_bytes, GemmArrays, GemmCommon, SyncPtr, ThreadInfo,
    WORKSPACE_ALIGNMENT,
};
use crate::dispatch::{gemm, GemmKernelList};
use crate::error::{GemmError, Result};
use gemm_core::quantize::{compute_col_sums, compute_row_sums, requantize_block};
use gemm_core::{panel_ptr, BlockSizes, GemmArgs, NdRange, Transpose};
use gemm_types::{Operand, OutputStage, QuantizedElement, Requantize32};
use std::ops::Range;
use tracing::debug;

/// Rows of C requantized per scheduling unit.
const REQUANTIZE_ROW_GRANULE: usize = 4;

/// Quantized GEMM built from any integer GEMM plus a requantize pass.
///
/// The inner GEMM writes raw accumulators into working space. After a
/// barrier, a second stage adds the offset corrections and bias and
/// narrows the result into C. Column corrections depend only on B and
/// are computed during pretransposition, which is therefore mandatory.
pub struct QuantizeWrapper<To: QuantizedElement> {
    args: GemmArgs,
    qp: Requantize32,
    inner: Box<dyn GemmCommon<To, To::Acc>>,
    inner_stages: usize,
    arrays: GemmArrays<To, To>,
    working_space: SyncPtr<u8>,
    col_sums: SyncPtr<i32>,
    bias: SyncPtr<i32>,
    bias_multi_stride: usize,
    window: NdRange<3>,
    nthreads: usize,
}

impl<To> QuantizeWrapper<To>
where
    To: QuantizedElement + Operand<<To as QuantizedElement>::Acc> + GemmKernelList<<To as QuantizedElement>::Acc>,
{
    pub fn new(args: &GemmArgs, qp: &Requantize32) -> Result<Self> {
        let inner_args = GemmArgs {
            alpha: 1.0,
            beta: 0.0,
            cfg: None,
            ..args.clone()
        };
        let inner = gemm::<To, To::Acc>(&inner_args, &OutputStage::Nothing)?;
        let inner_stages = inner.num_stages();
        let window = if args.is_degenerate() {
            NdRange::new([0, 0, 0])
        } else {
            NdRange::new([args.m, args.nbatches, args.nmulti])
        };
        debug!(
            inner_stages,
            per_channel = qp.is_per_channel(),
            "configured quantize wrapper"
        );
        Ok(Self {
            args: args.clone(),
            qp: qp.clone(),
            inner,
            inner_stages,
            arrays: GemmArrays::default(),
            working_space: SyncPtr::null(),
            col_sums: SyncPtr::null(),
            bias: SyncPtr::null(),
            bias_multi_stride: 0,
            window,
            nthreads: args.max_threads,
        })
    }
}

impl<To: QuantizedElement> QuantizeWrapper<To> {
    fn inner_working_bytes(&self) -> usize {
        aligned_bytes::<u8>(self.inner.get_working_size())
    }

    fn result_len(&self) -> usize {
        self.args.m * self.args.n * self.args.nbatches * self.args.nmulti
    }

    fn col_sum_bytes(&self) -> usize {
        aligned_bytes::<i32>(self.args.n * self.args.nmulti)
    }

    fn result_ptr(&self) -> *mut To::Acc {
        self.working_space
            .0
            .wrapping_add(self.inner_working_bytes()) as *mut To::Acc
    }

    /// Point the inner GEMM at the intermediate buffer once both A/C and working space are known.
    unsafe fn connect_inner(&mut self) {
        if !self.arrays.is_set() || self.working_space.is_null() {
            return;
        }
        let (m, n, nbatches) = (self.args.m, self.args.n, self.args.nbatches);
        let inner_arrays = GemmArrays::new(
            self.arrays.a,
            self.arrays.lda,
            self.arrays.b,
            self.arrays.ldb,
            self.result_ptr(),
            n,
        )
        .a_strides(self.arrays.a_batch_stride, self.arrays.a_multi_stride)
        .b_multi_stride(self.arrays.b_multi_stride)
        .c_strides(m * n, m * n * nbatches);
        self.inner.set_arrays(inner_arrays);
    }

    fn requantize(&self, range: Range<usize>) {
        assert!(!self.col_sums.is_null(), "B must be pretransposed before execution");
        assert!(self.arrays.is_set(), "arrays not set");

        let args = &self.args;
        let arrays = &self.arrays;
        let (m, n, k) = (args.m, args.n, args.k);
        let tr_a = Transpose::from(args.tr_a);
        let result = self.result_ptr() as *const To::Acc;
        let mut row_bias = [0i32];

        for run in self.window.runs(range) {
            let [_, batch, multi] = run.coords;
            unsafe {
                let col_bias = std::slice::from_raw_parts(self.col_sums.0.add(multi * n), n);
                let bias = (!self.bias.is_null()).then(|| {
                    std::slice::from_raw_parts(self.bias.0.add(multi * self.bias_multi_stride), n)
                });
                for row in run.dim0() {
                    let a_row = panel_ptr(arrays.a_at(multi, batch), row, 0, arrays.lda, tr_a);
                    compute_row_sums(&self.qp, 1, k, a_row, arrays.lda, tr_a, &mut row_bias);
                    let src = result.add(((multi * args.nbatches + batch) * m + row) * n);
                    requantize_block::<To>(
                        &self.qp,
                        1,
                        n,
                        src,
                        n,
                        arrays.c_at(multi, batch).add(row * arrays.ldc),
                        arrays.ldc,
                        &row_bias,
                        col_bias,
                        bias,
                        0,
                    );
                }
            }
        }
    }
}

impl<To: QuantizedElement> GemmCommon<To, To> for QuantizeWrapper<To> {
    unsafe fn set_arrays(&mut self, arrays: GemmArrays<To, To>) {
        self.arrays = arrays;
        self.connect_inner();
    }

    fn num_stages(&self) -> usize {
        self.inner_stages + 1
    }

    fn stage_window(&self, stage: usize) -> usize {
        if stage < self.inner_stages {
            self.inner.stage_window(stage)
        } else {
            self.window.total_size()
        }
    }

    fn stage_granule(&self, stage: usize) -> usize {
        if stage < self.inner_stages {
            self.inner.stage_granule(stage)
        } else {
            REQUANTIZE_ROW_GRANULE
        }
    }

    fn execute_stage(&self, stage: usize, range: Range<usize>, info: &ThreadInfo) {
        assert!(stage <= self.inner_stages, "stage {stage} out of range");
        if stage < self.inner_stages {
            if !range.is_empty() {
                assert!(!self.working_space.is_null(), "working space not set");
            }
            self.inner.execute_stage(stage, range, info);
            return;
        }
        super::check_range(&range, self.window.total_size(), REQUANTIZE_ROW_GRANULE);
        if range.is_empty() {
            return;
        }
        self.requantize(range);
    }

    fn set_nthreads(&mut self, nthreads: usize) {
        self.nthreads = nthreads.clamp(1, self.args.max_threads.max(1));
        self.inner.set_nthreads(self.nthreads);
    }

    fn num_threads(&self) -> usize {
        self.nthreads
    }

    fn get_working_size(&self) -> usize {
        if self.args.is_degenerate() {
            return 0;
        }
        self.inner_working_bytes() + aligned_bytes::<To::Acc>(self.result_len()) + WORKSPACE_ALIGNMENT
    }

    unsafe fn set_working_space(&mut self, ws: *mut u8) {
        let base = align_workspace(ws);
        self.working_space = SyncPtr(base);
        if self.inner.get_working_size() > 0 {
            self.inner.set_working_space(base);
        }
        self.connect_inner();
    }

    fn b_is_pretransposed(&self) -> bool {
        true
    }

    fn b_pretranspose_required(&self) -> bool {
        self.col_sums.is_null()
    }

    fn get_b_pretransposed_array_size(&self) -> usize {
        self.col_sum_bytes() + self.inner.get_b_pretransposed_array_size() + WORKSPACE_ALIGNMENT
    }

    unsafe fn pretranspose_b_array(&mut self, buf: *mut u8, b: *const To, ldb: usize, b_multi_stride: usize) {
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
                Transpose::from(self.args.tr_b),
                out,
            );
        }
        if self.inner.b_is_pretransposed() {
            self.inner
                .pretranspose_b_array(base.add(self.col_sum_bytes()), b, ldb, b_multi_stride);
        }
    }

    unsafe fn set_pretransposed_b_data(&mut self, buf: *mut u8) {
        let base = align_workspace(buf);
        self.col_sums = SyncPtr(base as *mut i32);
        if self.inner.b_is_pretransposed() {
            self.inner.set_pretransposed_b_data(base.add(self.col_sum_bytes()));
        }
    }

    unsafe fn set_quantized_bias(&mut self, bias: *const i32, bias_multi_stride: usize) {
        self.bias = SyncPtr(bias as *mut i32);
        self.bias_multi_stride = bias_multi_stride;
    }

    fn block_sizes(&self) -> Option<BlockSizes> {
        self.inner.block_sizes()
    }
}

/// Build a boxed wrapper, failing when no inner GEMM or no requantization is available.
pub(crate) fn quantize_wrapper<To>(
    args: &GemmArgs,
    os: &OutputStage,
) -> Result<Box<dyn GemmCommon<To, To>>>
where
    To: QuantizedElement + Operand<<To as QuantizedElement>::Acc> + GemmKernelList<<To as QuantizedElement>::Acc>,
{
    let qp = os.requantize().ok_or(GemmError::MissingOutputStage)?;
    Ok(Box::new(QuantizeWrapper::<To>::new(args, qp)?))
}
