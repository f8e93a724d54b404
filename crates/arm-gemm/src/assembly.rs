//! Tensor-level GEMM operator.
//!
//! [`GemmAssemblyDispatch`] maps tensors onto a [`GemmArgs`] problem,
//! picks an implementation once at configuration time, owns the scratch
//! buffers the driver asks for, and runs it on a [`Scheduler`].

use crate::dispatch::{check_output_stage, gemm, get_gemm_method, GemmKernelList};
use crate::driver::{GemmArrays, GemmCommon, WORKSPACE_ALIGNMENT};
use crate::error::{GemmError, Result};
use crate::scheduler::{schedule, Scheduler};
use crate::tensor::{TensorInfo, TensorView, TensorViewMut, MAX_DIMS};
use gemm_core::{BlockSizes, CpuInfo, GemmArgs, GemmConfig};
use gemm_types::{DataType, Element, GemmMethod, KernelDescription, OutputStage};
use tracing::{debug, instrument};

/// Operator-level options.
#[derive(Debug, Clone, PartialEq)]
pub struct GemmInfo {
    pub alpha: f32,
    pub beta: f32,
    /// Treat D's `y` and `z` as one row dimension.
    pub depth_output_gemm3d: bool,
    /// Treat A's `y` and `z` as one row dimension.
    pub reinterpret_input_as_3d: bool,
    /// B is constant across runs and may be packed once.
    pub pretranspose_b: bool,
    pub output_stage: OutputStage,
    /// Force a method, kernel or block sizes.
    pub config: Option<GemmConfig>,
}

impl Default for GemmInfo {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            depth_output_gemm3d: false,
            reinterpret_input_as_3d: false,
            pretranspose_b: false,
            output_stage: OutputStage::Nothing,
            config: None,
        }
    }
}

impl GemmInfo {
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn depth_output_gemm3d(mut self) -> Self {
        self.depth_output_gemm3d = true;
        self
    }

    pub fn reinterpret_input_as_3d(mut self) -> Self {
        self.reinterpret_input_as_3d = true;
        self
    }

    pub fn pretranspose_b(mut self) -> Self {
        self.pretranspose_b = true;
        self
    }

    pub fn output_stage(mut self, os: OutputStage) -> Self {
        self.output_stage = os;
        self
    }

    pub fn config(mut self, cfg: GemmConfig) -> Self {
        self.config = Some(cfg);
        self
    }
}

/// Problem dimensions and element strides derived from tensor metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmParams {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batches: usize,
    pub multis: usize,
    pub lda: usize,
    pub a_batch_stride: usize,
    pub a_multi_stride: usize,
    pub ldb: usize,
    pub b_multi_stride: usize,
    pub ldd: usize,
    pub d_batch_stride: usize,
    pub d_multi_stride: usize,
}

/// Scratch memory a configured operator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    /// Bytes of per-run working space.
    pub workspace: usize,
    /// Bytes of the buffer holding packed B, kept across runs.
    pub pretranspose: usize,
    pub alignment: usize,
}

/// Stride of the dimension group starting at `from`, requiring the group to be dense.
fn group_stride(info: &TensorInfo, from: usize, name: &str) -> Result<usize> {
    let shape = info.shape();
    let mut expected = info.stride(from);
    let mut prev = from;
    for dim in from + 1..MAX_DIMS {
        expected *= shape.dim(prev);
        if shape.dim(dim) > 1 && info.stride(dim) != expected {
            return Err(GemmError::ShapeMismatch(format!(
                "{name} dimensions {from}.. are not contiguous"
            )));
        }
        prev = dim;
    }
    Ok(info.stride(from))
}

/// Row, batch and multi strides for a tensor whose rows start at dimension 1.
fn matrix_strides(
    info: &TensorInfo,
    rows: usize,
    fold_3d: bool,
    batches: usize,
    multis: usize,
    name: &str,
) -> Result<(usize, usize, usize)> {
    let shape = info.shape();
    let batch_idx = if fold_3d { 3 } else { 2 };
    let folded_rows = if fold_3d { shape.y() * shape.z() } else { shape.y() };
    if folded_rows != rows {
        return Err(GemmError::ShapeMismatch(format!(
            "{name} has {folded_rows} rows, expected {rows}"
        )));
    }
    if fold_3d && shape.z() > 1 && info.stride(2) != info.stride(1) * shape.y() {
        return Err(GemmError::ShapeMismatch(format!(
            "{name} rows cannot be folded across dimension 2 with padding"
        )));
    }
    if shape.total_size_upper(batch_idx) != batches * multis {
        return Err(GemmError::ShapeMismatch(format!(
            "{name} holds {} matrices, expected {}",
            shape.total_size_upper(batch_idx),
            batches * multis
        )));
    }

    let batch_stride = group_stride(info, batch_idx, name)?;
    let multi_stride = if multis > 1 {
        if shape.dim(batch_idx) != batches || shape.total_size_upper(batch_idx + 2) != 1 {
            return Err(GemmError::ShapeMismatch(format!(
                "{name} must hold batches in dimension {batch_idx} and multis in {}",
                batch_idx + 1
            )));
        }
        info.stride(batch_idx + 1)
    } else {
        batch_stride * batches
    };
    Ok((info.stride(1), batch_stride, multi_stride))
}

/// Derive problem dimensions and strides from A, B and D.
///
/// `M = d.y` (`d.y * d.z` with `depth_output_gemm3d`), `N = d.x`,
/// `K = a.x`, `multis = b.z`, and batches are D's remaining matrices
/// divided by `multis`.
pub fn extract_parameters(
    a: &TensorInfo,
    b: &TensorInfo,
    d: &TensorInfo,
    info: &GemmInfo,
) -> Result<GemmParams> {
    let (ds, bs) = (d.shape(), b.shape());
    let multis = bs.z();
    if multis == 0 {
        return Err(GemmError::ShapeMismatch("B has no matrices".into()));
    }
    let n = ds.x();
    let k = a.shape().x();
    let (m, d_batch_idx) = if info.depth_output_gemm3d {
        (ds.y() * ds.z(), 3)
    } else {
        (ds.y(), 2)
    };
    let d_matrices = ds.total_size_upper(d_batch_idx);
    if d_matrices % multis != 0 {
        return Err(GemmError::ShapeMismatch(format!(
            "D holds {d_matrices} matrices, not a multiple of {multis} multis"
        )));
    }
    let batches = d_matrices / multis;

    if bs.x() != n || bs.y() != k || bs.total_size_upper(3) != 1 {
        return Err(GemmError::ShapeMismatch(format!(
            "B is {}x{}x{}, expected {}x{}x{}",
            bs.y(),
            bs.x(),
            bs.total_size_upper(2),
            k,
            n,
            multis
        )));
    }

    let (lda, a_batch_stride, a_multi_stride) =
        matrix_strides(a, m, info.reinterpret_input_as_3d, batches, multis, "A")?;
    let (ldd, d_batch_stride, d_multi_stride) =
        matrix_strides(d, m, info.depth_output_gemm3d, batches, multis, "D")?;

    Ok(GemmParams {
        m,
        n,
        k,
        batches,
        multis,
        lda,
        a_batch_stride,
        a_multi_stride,
        ldb: b.stride(1),
        b_multi_stride: b.stride(2),
        ldd,
        d_batch_stride,
        d_multi_stride,
    })
}

/// Whether the operator supports `input -> output`.
fn check_type_pair(input: DataType, output: DataType) -> Result<()> {
    use DataType::*;
    match (input, output) {
        (F32, F32) | (F16, F16) | (U8, U32) | (S8, S32) | (QAsymm8, QAsymm8)
        | (QAsymm8Signed, QAsymm8Signed) => Ok(()),
        _ => Err(GemmError::UnsupportedDataType { input, output }),
    }
}

fn check_storage<T: Element>(info: &TensorInfo) -> Result<()> {
    if info.data_type().storage() != T::DATA_TYPE {
        return Err(GemmError::TypeMismatch {
            expected: T::DATA_TYPE,
            found: info.data_type(),
        });
    }
    Ok(())
}

fn gemm_args(params: &GemmParams, info: &GemmInfo, ci: &CpuInfo, max_threads: usize) -> GemmArgs {
    let mut args = GemmArgs::new(ci, params.m, params.n, params.k)
        .batches(params.batches)
        .multis(params.multis)
        .alpha(info.alpha)
        .beta(info.beta)
        .max_threads(max_threads);
    if info.pretranspose_b {
        args = args.pretransposed();
    }
    if let Some(cfg) = &info.config {
        args = args.config(cfg.clone());
    }
    args
}

/// A GEMM bound to tensor shapes and one selected implementation.
pub struct GemmAssemblyDispatch<To: Element, Tout: Element> {
    gemm: Box<dyn GemmCommon<To, Tout>>,
    kernel: KernelDescription,
    params: GemmParams,
    a_info: TensorInfo,
    b_info: TensorInfo,
    d_info: TensorInfo,
    workspace: Vec<u8>,
    pretransposed: Vec<u8>,
    bias: Vec<i32>,
    prepared: bool,
}

impl<To, Tout> GemmAssemblyDispatch<To, Tout>
where
    To: Element + GemmKernelList<Tout>,
    Tout: Element,
{
    /// Check that A, B and D can be multiplied on `ci` and report the implementation that would run.
    pub fn validate(
        a: &TensorInfo,
        b: &TensorInfo,
        d: &TensorInfo,
        info: &GemmInfo,
        ci: &CpuInfo,
    ) -> Result<KernelDescription> {
        check_type_pair(a.data_type(), d.data_type())?;
        if b.data_type() != a.data_type() {
            return Err(GemmError::TypeMismatch {
                expected: a.data_type(),
                found: b.data_type(),
            });
        }
        check_storage::<To>(a)?;
        check_storage::<Tout>(d)?;
        if d.data_type().is_quantized() && info.output_stage.requantize().is_none() {
            return Err(GemmError::MissingOutputStage);
        }

        let params = extract_parameters(a, b, d, info)?;
        let args = gemm_args(&params, info, ci, 1);
        check_output_stage(&args, &info.output_stage)?;
        let kernel = get_gemm_method::<To, Tout>(&args, &info.output_stage);
        if kernel.is_default {
            return Err(GemmError::NoImplementation(format!(
                "{} -> {} on [{}]",
                a.data_type(),
                d.data_type(),
                ci.features()
            )));
        }
        Ok(kernel)
    }

    /// Select and build the GEMM for these tensors.
    #[instrument(skip_all, fields(a = ?a.shape(), d = ?d.shape(), max_threads = max_threads))]
    pub fn configure(
        a: &TensorInfo,
        b: &TensorInfo,
        d: &TensorInfo,
        info: &GemmInfo,
        ci: &CpuInfo,
        max_threads: usize,
    ) -> Result<Self> {
        let kernel = Self::validate(a, b, d, info, ci)?;
        let params = extract_parameters(a, b, d, info)?;

        // pin the selection so instantiation builds exactly what was reported
        let mut cfg = info.config.clone().unwrap_or_default();
        cfg.method = kernel.method;
        cfg.filter = kernel.name.clone();
        let args = gemm_args(&params, info, ci, max_threads.max(1)).config(cfg);

        let mut gemm = gemm::<To, Tout>(&args, &info.output_stage)?;
        let window = gemm.get_window_size();
        let units = window.div_ceil(gemm.stage_granule(0).max(1)).max(1);
        gemm.set_nthreads(units.min(max_threads.max(1)));
        debug!(kernel = %kernel, window, threads = gemm.num_threads(), "configured gemm operator");

        Ok(Self {
            gemm,
            kernel,
            params,
            a_info: *a,
            b_info: *b,
            d_info: *d,
            workspace: Vec::new(),
            pretransposed: Vec::new(),
            bias: Vec::new(),
            prepared: false,
        })
    }

    /// The implementation selected at configuration time.
    pub fn kernel(&self) -> &KernelDescription {
        &self.kernel
    }

    pub fn method(&self) -> GemmMethod {
        self.kernel.method
    }

    pub fn params(&self) -> &GemmParams {
        &self.params
    }

    pub fn block_sizes(&self) -> Option<BlockSizes> {
        self.gemm.block_sizes()
    }

    pub fn num_threads(&self) -> usize {
        self.gemm.num_threads()
    }

    pub fn workspace(&self) -> MemoryRequirements {
        MemoryRequirements {
            workspace: self.gemm.get_working_size(),
            pretranspose: self.gemm.get_b_pretransposed_array_size(),
            alignment: WORKSPACE_ALIGNMENT,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Pack B and install the per-column bias; runs once.
    ///
    /// `bias` holds `N` int32 values per multi and only applies to
    /// requantized output.
    #[instrument(skip_all, fields(kernel = %self.kernel))]
    pub fn prepare(&mut self, b: &TensorView<'_, To>, bias: Option<&[i32]>) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        self.check_info("B", b.info(), &self.b_info)?;

        if let Some(bias) = bias {
            let required = self.params.n * self.params.multis;
            if bias.len() < required {
                return Err(GemmError::OutOfBounds {
                    required,
                    len: bias.len(),
                });
            }
            self.bias = bias[..required].to_vec();
            unsafe { self.gemm.set_quantized_bias(self.bias.as_ptr(), self.params.n) };
        }

        if self.gemm.b_pretranspose_required() {
            let size = self.gemm.get_b_pretransposed_array_size();
            debug!(bytes = size, "pretransposing B");
            self.pretransposed = vec![0u8; size];
            let buf = self.pretransposed.as_mut_ptr();
            unsafe {
                self.gemm
                    .pretranspose_b_array(buf, b.as_ptr(), self.params.ldb, self.params.b_multi_stride);
                self.gemm.set_pretransposed_b_data(buf);
            }
        }
        self.prepared = true;
        Ok(())
    }

    /// Compute `D = alpha * A * B + beta * D` (or its requantized form).
    ///
    /// Prepares on first use if [`prepare`](Self::prepare) was not called.
    pub fn run(
        &mut self,
        a: &TensorView<'_, To>,
        b: &TensorView<'_, To>,
        d: &mut TensorViewMut<'_, Tout>,
        scheduler: &dyn Scheduler,
    ) -> Result<()> {
        self.check_info("A", a.info(), &self.a_info)?;
        self.check_info("B", b.info(), &self.b_info)?;
        self.check_info("D", d.info(), &self.d_info)?;
        if !self.prepared {
            self.prepare(b, None)?;
        }

        let size = self.gemm.get_working_size();
        if size > 0 {
            if self.workspace.len() < size {
                self.workspace = vec![0u8; size];
            }
            unsafe { self.gemm.set_working_space(self.workspace.as_mut_ptr()) };
        }

        let p = &self.params;
        let arrays = GemmArrays::new(a.as_ptr(), p.lda, b.as_ptr(), p.ldb, d.as_mut_ptr(), p.ldd)
            .a_strides(p.a_batch_stride, p.a_multi_stride)
            .b_multi_stride(p.b_multi_stride)
            .c_strides(p.d_batch_stride, p.d_multi_stride);
        unsafe { self.gemm.set_arrays(arrays) };

        schedule(self.gemm.as_ref(), scheduler);
        Ok(())
    }

    fn check_info(&self, name: &str, found: &TensorInfo, expected: &TensorInfo) -> Result<()> {
        if found.shape() != expected.shape() || found.strides() != expected.strides() {
            return Err(GemmError::ShapeMismatch(format!(
                "{name} is {:?}, operator was configured for {:?}",
                found.shape(),
                expected.shape()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SingleThreadScheduler;
    use crate::tensor::{Tensor, TensorShape};
    use gemm_core::CpuFeatures;
    use gemm_types::{f16, Requantize32};

    fn f32_info(dims: &[usize]) -> TensorInfo {
        TensorInfo::new(TensorShape::new(dims), DataType::F32)
    }

    fn fill(info: TensorInfo, seed: usize) -> Tensor<f32> {
        let data = (0..info.required_len())
            .map(|i| ((i * 7 + seed * 3) % 9) as f32 - 4.0)
            .collect();
        Tensor::from_vec(info, data).unwrap()
    }

    #[test]
    fn test_extract_parameters_plain() {
        let a = f32_info(&[32, 16, 4]);
        let b = f32_info(&[8, 32]);
        let d = f32_info(&[8, 16, 4]);
        let p = extract_parameters(&a, &b, &d, &GemmInfo::default()).unwrap();
        assert_eq!((p.m, p.n, p.k, p.batches, p.multis), (16, 8, 32, 4, 1));
        assert_eq!((p.lda, p.a_batch_stride), (32, 512));
        assert_eq!((p.ldd, p.d_batch_stride), (8, 128));
    }

    #[test]
    fn test_extract_parameters_multis() {
        let a = f32_info(&[5, 3, 2, 4]);
        let b = f32_info(&[6, 5, 4]);
        let d = f32_info(&[6, 3, 2, 4]);
        let p = extract_parameters(&a, &b, &d, &GemmInfo::default()).unwrap();
        assert_eq!((p.batches, p.multis), (2, 4));
        assert_eq!(p.a_multi_stride, 5 * 3 * 2);
        assert_eq!(p.b_multi_stride, 30);
        assert_eq!(p.d_multi_stride, 6 * 3 * 2);
    }

    #[test]
    fn test_extract_parameters_3d() {
        let a = f32_info(&[4, 6, 5]);
        let b = f32_info(&[7, 4]);
        let d = f32_info(&[7, 3, 2, 5]);
        let info = GemmInfo::default().depth_output_gemm3d();
        // A is 2-D per batch here, so its batch dimension stays at 2
        let p = extract_parameters(&a, &b, &d, &info).unwrap();
        assert_eq!((p.m, p.batches), (6, 5));

        let a3 = f32_info(&[4, 3, 2, 5]);
        let info = info.reinterpret_input_as_3d();
        let p = extract_parameters(&a3, &b, &d, &info).unwrap();
        assert_eq!((p.m, p.batches, p.a_batch_stride), (6, 5, 24));
    }

    #[test]
    fn test_extract_parameters_mismatch() {
        let a = f32_info(&[32, 16]);
        let b = f32_info(&[8, 31]);
        let d = f32_info(&[8, 16]);
        assert!(matches!(
            extract_parameters(&a, &b, &d, &GemmInfo::default()),
            Err(GemmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_validate_type_rules() {
        let ci = CpuInfo::generic();
        let a = TensorInfo::new(TensorShape::new(&[4, 4]), DataType::F32);
        let d = TensorInfo::new(TensorShape::new(&[4, 4]), DataType::U8);
        assert!(matches!(
            GemmAssemblyDispatch::<f32, f32>::validate(&a, &a, &d, &GemmInfo::default(), &ci),
            Err(GemmError::UnsupportedDataType { .. })
        ));

        let q = TensorInfo::new(TensorShape::new(&[4, 4]), DataType::QAsymm8);
        assert!(matches!(
            GemmAssemblyDispatch::<u8, u8>::validate(&q, &q, &q, &GemmInfo::default(), &ci),
            Err(GemmError::MissingOutputStage)
        ));

        let h = TensorInfo::new(TensorShape::new(&[4, 4]), DataType::F16);
        assert!(matches!(
            GemmAssemblyDispatch::<f16, f16>::validate(&h, &h, &h, &GemmInfo::default(), &ci),
            Err(GemmError::NoImplementation(_))
        ));
    }

    #[test]
    fn test_run_f32_batched() {
        let ci = CpuInfo::generic();
        let (m, n, k, batches) = (9, 10, 11, 3);
        let a = fill(f32_info(&[k, m, batches]), 1);
        let b = fill(f32_info(&[n, k]), 2);
        let mut d = Tensor::<f32>::new(f32_info(&[n, m, batches])).unwrap();

        let mut op = GemmAssemblyDispatch::<f32, f32>::configure(
            a.info(),
            b.info(),
            d.info(),
            &GemmInfo::default(),
            &ci,
            4,
        )
        .unwrap();
        assert_eq!(op.method(), GemmMethod::GemmNative);
        op.run(&a.view(), &b.view(), &mut d.view_mut(), &SingleThreadScheduler::new(&ci))
            .unwrap();

        for batch in 0..batches {
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0.0;
                    for p in 0..k {
                        acc += a.view().get(&[p, i, batch]).unwrap() * b.view().get(&[j, p]).unwrap();
                    }
                    assert_eq!(d.view().get(&[j, i, batch]), Some(acc));
                }
            }
        }
    }

    #[test]
    fn test_run_pretransposed_interleaved() {
        let ci = CpuInfo::generic().with_features(CpuFeatures::NEON);
        let (m, n, k) = (20, 70, 66);
        let a = fill(f32_info(&[k, m]), 3);
        let b = fill(f32_info(&[n, k]), 4);
        let mut d = fill(f32_info(&[n, m]), 5);
        let d0 = d.clone();
        let info = GemmInfo::default().pretranspose_b().beta(1.0);

        let mut op =
            GemmAssemblyDispatch::<f32, f32>::configure(a.info(), b.info(), d.info(), &info, &ci, 2)
                .unwrap();
        assert_eq!(op.kernel().name, "a64_sgemm_8x12");
        let req = op.workspace();
        assert!(req.workspace > 0 && req.pretranspose > 0);
        assert_eq!(req.alignment, 64);

        op.prepare(&b.view(), None).unwrap();
        assert!(op.is_prepared());
        op.run(&a.view(), &b.view(), &mut d.view_mut(), &SingleThreadScheduler::new(&ci))
            .unwrap();

        let (av, bv) = (a.view(), b.view());
        for i in 0..m {
            for j in 0..n {
                let mut acc = d0.view().get(&[j, i]).unwrap();
                for p in 0..k {
                    acc += av.get(&[p, i]).unwrap() * bv.get(&[j, p]).unwrap();
                }
                assert_eq!(d.view().get(&[j, i]), Some(acc));
            }
        }
    }

    #[test]
    fn test_run_quantized_with_bias() {
        let ci = CpuInfo::generic();
        let (m, n, k) = (6, 5, 7);
        let q = |dims: &[usize]| TensorInfo::new(TensorShape::new(dims), DataType::QAsymm8);
        let a_info = q(&[k, m]);
        let b_info = q(&[n, k]);
        let d_info = q(&[n, m]);
        let a: Vec<u8> = (0..m * k).map(|i| (i * 13 % 256) as u8).collect();
        let b: Vec<u8> = (0..k * n).map(|i| (i * 29 % 256) as u8).collect();
        let mut d = vec![0u8; m * n];
        let bias = vec![100, -200, 300, -400, 500];
        let qp = Requantize32::per_layer(128, 100, 20, 1 << 30, -8, 0, 255);
        let info = GemmInfo::default().output_stage(OutputStage::Requantize(qp.clone()));

        let mut op = GemmAssemblyDispatch::<u8, u8>::configure(&a_info, &b_info, &d_info, &info, &ci, 1)
            .unwrap();
        assert_eq!(op.method(), GemmMethod::QuantizeWrapper);

        let bv = TensorView::new(b_info, &b).unwrap();
        op.prepare(&bv, Some(&bias)).unwrap();
        op.run(
            &TensorView::new(a_info, &a).unwrap(),
            &bv,
            &mut TensorViewMut::new(d_info, &mut d).unwrap(),
            &SingleThreadScheduler::new(&ci),
        )
        .unwrap();

        for i in 0..m {
            for j in 0..n {
                let mut acc = bias[j];
                for p in 0..k {
                    acc += (a[i * k + p] as i32 - 128) * (b[p * n + j] as i32 - 100);
                }
                let v = gemm_core::quantize::requantize_value(&qp, acc, j);
                assert_eq!(d[i * n + j] as i32, v);
            }
        }
    }

    #[test]
    fn test_validate_rejects_short_per_channel() {
        let ci = CpuInfo::generic();
        let (m, n, k) = (4, 6, 4);
        let q = |dims: &[usize]| TensorInfo::new(TensorShape::new(dims), DataType::QAsymm8);
        let (a, b, d) = (q(&[k, m]), q(&[n, k]), q(&[n, m]));
        let short = Requantize32::per_layer(0, 0, 0, 1 << 30, 0, 0, 255)
            .with_per_channel(vec![1 << 30; 2], vec![0; 2]);
        let info = GemmInfo::default().output_stage(OutputStage::Requantize(short));

        assert!(matches!(
            GemmAssemblyDispatch::<u8, u8>::validate(&a, &b, &d, &info, &ci),
            Err(GemmError::ShapeMismatch(_))
        ));
        assert!(matches!(
            GemmAssemblyDispatch::<u8, u8>::configure(&a, &b, &d, &info, &ci, 1),
            Err(GemmError::ShapeMismatch(_))
        ));

        let full = Requantize32::per_layer(0, 0, 0, 1 << 30, 0, 0, 255)
            .with_per_channel(vec![1 << 30; n], vec![0; n]);
        let info = GemmInfo::default().output_stage(OutputStage::Requantize(full));
        assert!(GemmAssemblyDispatch::<u8, u8>::validate(&a, &b, &d, &info, &ci).is_ok());
    }

    #[test]
    fn test_run_rejects_other_shapes() {
        let ci = CpuInfo::generic();
        let a = fill(f32_info(&[4, 4]), 1);
        let b = fill(f32_info(&[4, 4]), 2);
        let mut d = Tensor::<f32>::new(f32_info(&[4, 4])).unwrap();
        let mut op = GemmAssemblyDispatch::<f32, f32>::configure(
            a.info(),
            b.info(),
            d.info(),
            &GemmInfo::default(),
            &ci,
            1,
        )
        .unwrap();
        let other = fill(f32_info(&[4, 5]), 3);
        assert!(matches!(
            op.run(&other.view(), &b.view(), &mut d.view_mut(), &SingleThreadScheduler::new(&ci)),
            Err(GemmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_configure_limits_threads_to_window() {
        let ci = CpuInfo::generic();
        let a = f32_info(&[8, 8]);
        let b = f32_info(&[8, 8]);
        let d = f32_info(&[8, 8]);
        let op = GemmAssemblyDispatch::<f32, f32>::configure(&a, &b, &d, &GemmInfo::default(), &ci, 16)
            .unwrap();
        // 8 rows in 4-row tiles: only two units of work exist
        assert_eq!(op.num_threads(), 2);
    }
}
