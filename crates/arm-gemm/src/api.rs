use crate::dispatch::{gemm, get_gemm_method, GemmKernelList};
use crate::driver::GemmArrays;
use crate::error::{GemmError, Result};
use crate::scheduler::{default_scheduler, schedule, Scheduler};
use gemm_core::{CpuInfo, GemmArgs, GemmConfig};
use gemm_kernels::cpu_info;
use gemm_types::{f16, DataType, Element, KernelDescription, OutputStage};
use std::marker::PhantomData;

/// Select a method for an input type known only at runtime.
///
/// 8-bit inputs map to the requantizing catalogs when `os` requantizes
/// and to the 32-bit accumulating ones otherwise. 32-bit integer inputs
/// have no GEMM and yield [`KernelDescription::fallback`].
///
/// # Example
///
/// ```
/// use arm_gemm::{select_method, CpuInfo, DataType, GemmArgs, GemmMethod, OutputStage};
///
/// let ci = CpuInfo::generic();
/// let args = GemmArgs::new(&ci, 128, 1, 64).batches(8);
/// let desc = select_method(DataType::F32, &args, &OutputStage::Nothing);
/// assert_eq!(desc.method, GemmMethod::GemvBatched);
/// ```
pub fn select_method(data_type: DataType, args: &GemmArgs, os: &OutputStage) -> KernelDescription {
    let requantize = os.requantize().is_some();
    match data_type {
        DataType::F32 => get_gemm_method::<f32, f32>(args, os),
        DataType::F16 => get_gemm_method::<f16, f16>(args, os),
        DataType::U8 | DataType::QAsymm8 if requantize => get_gemm_method::<u8, u8>(args, os),
        DataType::S8 | DataType::QAsymm8Signed if requantize => get_gemm_method::<i8, i8>(args, os),
        DataType::U8 | DataType::QAsymm8 => get_gemm_method::<u8, u32>(args, os),
        DataType::S8 | DataType::QAsymm8Signed => get_gemm_method::<i8, i32>(args, os),
        DataType::S32 | DataType::U32 => KernelDescription::fallback(),
    }
}

/// Simple matrix multiplication: `C = A * B`.
///
/// `a` is `m x k` and `b` is `k x n`, both row-major. Runs on the
/// detected CPU with the default scheduler.
///
/// # Example
///
/// ```
/// use arm_gemm::matmul;
///
/// let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
/// let b = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3x2
///
/// let c: Vec<f32> = matmul(&a, 2, 3, &b, 2).unwrap();
/// assert_eq!(c, vec![22.0, 28.0, 49.0, 64.0]);
/// ```
pub fn matmul<To, Tout>(a: &[To], m: usize, k: usize, b: &[To], n: usize) -> Result<Vec<Tout>>
where
    To: Element + GemmKernelList<Tout>,
    Tout: Element,
{
    let mut c = vec![Tout::zero(); m * n];
    Gemm::<To, Tout>::new(m, n, k).execute(a, k, b, n, &mut c, n)?;
    Ok(c)
}

/// GEMM builder over row-major slices.
///
/// Batches and multis are stored back to back: each batch of A and C
/// follows the previous one, and each multi follows the last batch of
/// the previous multi. B holds one matrix per multi.
///
/// # Example
///
/// ```
/// use arm_gemm::Gemm;
///
/// let a = vec![1.0f32; 4 * 3];
/// let b = vec![2.0f32; 3 * 2];
/// let mut c = vec![1.0f32; 4 * 2];
///
/// Gemm::<f32, f32>::new(4, 2, 3)
///     .beta(1.0)
///     .execute(&a, 3, &b, 2, &mut c, 2)
///     .unwrap();
/// assert!(c.iter().all(|&v| v == 7.0));
/// ```
pub struct Gemm<To, Tout> {
    args: GemmArgs,
    output_stage: OutputStage,
    _phantom: PhantomData<fn(To) -> Tout>,
}

impl<To, Tout> Gemm<To, Tout>
where
    To: Element + GemmKernelList<Tout>,
    Tout: Element,
{
    /// A single `m x k` by `k x n` product on the detected CPU.
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        let ci = cpu_info();
        Self {
            args: GemmArgs::new(ci, m, n, k).max_threads(ci.num_cpus()),
            output_stage: OutputStage::Nothing,
            _phantom: PhantomData,
        }
    }

    /// Plan for a specific CPU profile instead of the detected one.
    pub fn cpu_info(mut self, ci: &CpuInfo) -> Self {
        self.args.ci = *ci;
        self
    }

    pub fn trans_a(mut self) -> Self {
        self.args.tr_a = true;
        self
    }

    pub fn trans_b(mut self) -> Self {
        self.args.tr_b = true;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.args.alpha = alpha;
        self
    }

    pub fn beta(mut self, beta: f32) -> Self {
        self.args.beta = beta;
        self
    }

    pub fn batches(mut self, nbatches: usize) -> Self {
        self.args.nbatches = nbatches;
        self
    }

    pub fn multis(mut self, nmulti: usize) -> Self {
        self.args.nmulti = nmulti;
        self
    }

    pub fn max_threads(mut self, threads: usize) -> Self {
        self.args.max_threads = threads.max(1);
        self
    }

    /// Allow methods that pack B ahead of execution.
    pub fn pretransposed(mut self) -> Self {
        self.args.pretransposed_hint = true;
        self
    }

    pub fn config(mut self, cfg: GemmConfig) -> Self {
        self.args.cfg = Some(cfg);
        self
    }

    pub fn output_stage(mut self, os: OutputStage) -> Self {
        self.output_stage = os;
        self
    }

    pub fn args(&self) -> &GemmArgs {
        &self.args
    }

    /// The implementation [`execute`](Self::execute) would use.
    pub fn method(&self) -> KernelDescription {
        get_gemm_method::<To, Tout>(&self.args, &self.output_stage)
    }

    /// Run on the default scheduler.
    pub fn execute(
        &self,
        a: &[To],
        lda: usize,
        b: &[To],
        ldb: usize,
        c: &mut [Tout],
        ldc: usize,
    ) -> Result<KernelDescription> {
        let scheduler = default_scheduler(&self.args.ci);
        self.execute_on(a, lda, b, ldb, c, ldc, scheduler.as_ref())
    }

    /// Run on `scheduler`, returning the implementation used.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_on(
        &self,
        a: &[To],
        lda: usize,
        b: &[To],
        ldb: usize,
        c: &mut [Tout],
        ldc: usize,
        scheduler: &dyn Scheduler,
    ) -> Result<KernelDescription> {
        let args = &self.args;
        let (a_rows, a_cols) = if args.tr_a { (args.k, args.m) } else { (args.m, args.k) };
        let (b_rows, b_cols) = if args.tr_b { (args.n, args.k) } else { (args.k, args.n) };
        let a_stride = a_rows * lda;
        let c_stride = args.m * ldc;
        let matrices = args.nbatches * args.nmulti;
        check_operand("A", a.len(), a_rows, a_cols, lda, a_stride, matrices)?;
        check_operand("B", b.len(), b_rows, b_cols, ldb, b_rows * ldb, args.nmulti)?;
        check_operand("C", c.len(), args.m, args.n, ldc, c_stride, matrices)?;

        let kernel = self.method();
        let mut gemm = gemm::<To, Tout>(args, &self.output_stage)?;

        let mut pretransposed = Vec::new();
        if gemm.b_pretranspose_required() {
            pretransposed = vec![0u8; gemm.get_b_pretransposed_array_size()];
            let buf = pretransposed.as_mut_ptr();
            unsafe {
                gemm.pretranspose_b_array(buf, b.as_ptr(), ldb, b_rows * ldb);
                gemm.set_pretransposed_b_data(buf);
            }
        }
        let mut workspace = vec![0u8; gemm.get_working_size()];
        if !workspace.is_empty() {
            unsafe { gemm.set_working_space(workspace.as_mut_ptr()) };
        }

        let arrays = GemmArrays::new(a.as_ptr(), lda, b.as_ptr(), ldb, c.as_mut_ptr(), ldc)
            .a_strides(a_stride, a_stride * args.nbatches)
            .b_multi_stride(b_rows * ldb)
            .c_strides(c_stride, c_stride * args.nbatches);
        unsafe { gemm.set_arrays(arrays) };

        schedule(gemm.as_ref(), scheduler);
        Ok(kernel)
    }
}

/// Check that a slice holds `count` matrices of `rows x cols` at leading dimension `ld`.
fn check_operand(
    name: &str,
    len: usize,
    rows: usize,
    cols: usize,
    ld: usize,
    stride: usize,
    count: usize,
) -> Result<()> {
    if rows > 0 && ld < cols {
        return Err(GemmError::ShapeMismatch(format!(
            "{name} leading dimension {ld} is smaller than its {cols} columns"
        )));
    }
    let required = if rows == 0 || cols == 0 || count == 0 {
        0
    } else {
        (count - 1) * stride + (rows - 1) * ld + cols
    };
    if len < required {
        return Err(GemmError::OutOfBounds { required, len });
    }
    Ok(())
}
