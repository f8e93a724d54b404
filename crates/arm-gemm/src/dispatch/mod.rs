//! Implementation catalogs and method selection.
//!
//! Every supported (operand, result) type pair owns an ordered, static
//! list of [`GemmImplementation`]s. Selection walks the list once:
//!
//! 1. entries whose CPU features are missing, whose `is_supported` check
//!    fails, or which a [`GemmConfig`](gemm_core::GemmConfig) override
//!    rules out are skipped;
//! 2. the first remaining entry whose `is_recommended` check passes wins;
//! 3. otherwise the first remaining entry wins.
//!
//! Lists are ordered most specialised first, so the portable entries at
//! the end act as fallbacks.

mod fp16;
mod fp32;
mod int8;
mod quantized;
mod uint8;

use crate::driver::{GemmCommon, GemmGemv, GemmHybrid, GemmInterleaved, GemmNative};
use crate::error::{GemmError, Result};
use gemm_core::{
    CpuFeatures, GemmArgs, GemvKernel, HybridKernel, InterleavedKernel, NativeKernel, TileShape,
};
use gemm_types::{GemmMethod, KernelDescription, OutputStage};
use tracing::debug;

/// Argument check run before an implementation is considered.
pub type Predicate = fn(&GemmArgs, &OutputStage) -> bool;

/// Constructor of a configured GEMM.
pub type Instantiate<To, Tout> = fn(&GemmArgs, &OutputStage) -> Result<Box<dyn GemmCommon<To, Tout>>>;

/// One catalog entry.
pub struct GemmImplementation<To: 'static, Tout: 'static> {
    pub method: GemmMethod,
    pub name: &'static str,
    /// CPU features the entry needs.
    pub required: CpuFeatures,
    pub shape: fn() -> TileShape,
    pub is_supported: Predicate,
    pub is_recommended: Predicate,
    pub instantiate: Instantiate<To, Tout>,
}

impl<To: 'static, Tout: 'static> GemmImplementation<To, Tout> {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        method: GemmMethod,
        name: &'static str,
        required: CpuFeatures,
        shape: fn() -> TileShape,
        is_supported: Predicate,
        is_recommended: Predicate,
        instantiate: Instantiate<To, Tout>,
    ) -> Self {
        Self {
            method,
            name,
            required,
            shape,
            is_supported,
            is_recommended,
            instantiate,
        }
    }

    /// Whether this entry can run `args` on the CPU described by `args.ci`.
    pub fn is_available(&self, args: &GemmArgs, os: &OutputStage) -> bool {
        args.ci.has(self.required) && (self.is_supported)(args, os)
    }

    pub fn description(&self) -> KernelDescription {
        KernelDescription::new(self.method, self.name, false)
    }
}

impl<To: 'static, Tout: 'static> std::fmt::Debug for GemmImplementation<To, Tout> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GemmImplementation")
            .field("method", &self.method)
            .field("name", &self.name)
            .field("required", &self.required)
            .field("shape", &(self.shape)())
            .finish()
    }
}

/// Operand types with a catalog producing `Tout`.
pub trait GemmKernelList<Tout: 'static>: Sized + 'static {
    fn implementation_list() -> &'static [GemmImplementation<Self, Tout>];
}

/// Select the implementation for `args`, if any.
pub fn find_implementation<To, Tout>(
    args: &GemmArgs,
    os: &OutputStage,
) -> Option<&'static GemmImplementation<To, Tout>>
where
    To: GemmKernelList<Tout>,
    Tout: 'static,
{
    let cfg = args.cfg.as_ref();
    let mut first_supported = None;
    for imp in To::implementation_list() {
        if !imp.is_available(args, os) {
            continue;
        }
        if cfg.is_some_and(|cfg| !cfg.admits(imp.method, imp.name)) {
            continue;
        }
        if (imp.is_recommended)(args, os) {
            debug!(name = imp.name, method = %imp.method, "selected recommended gemm");
            return Some(imp);
        }
        if first_supported.is_none() {
            first_supported = Some(imp);
        }
    }
    if let Some(imp) = first_supported {
        debug!(name = imp.name, method = %imp.method, "selected first supported gemm");
    }
    first_supported
}

/// Describe the implementation that [`gemm`] would build.
///
/// Returns [`KernelDescription::fallback`] when nothing matches.
pub fn get_gemm_method<To, Tout>(args: &GemmArgs, os: &OutputStage) -> KernelDescription
where
    To: GemmKernelList<Tout>,
    Tout: 'static,
{
    find_implementation::<To, Tout>(args, os)
        .map(GemmImplementation::description)
        .unwrap_or_else(KernelDescription::fallback)
}

/// Every implementation able to run `args`, in catalog order.
///
/// Overrides in `args.cfg` are ignored.
pub fn get_compatible_kernels<To, Tout>(args: &GemmArgs, os: &OutputStage) -> Vec<KernelDescription>
where
    To: GemmKernelList<Tout>,
    Tout: 'static,
{
    To::implementation_list()
        .iter()
        .filter(|imp| imp.is_available(args, os))
        .map(GemmImplementation::description)
        .collect()
}

/// Check that `os` can be applied to every output column of `args`.
pub fn check_output_stage(args: &GemmArgs, os: &OutputStage) -> Result<()> {
    match os.requantize() {
        Some(qp) if !qp.covers(args.n) => Err(GemmError::ShapeMismatch(format!(
            "per-channel requantization covers {} columns, output has {}",
            qp.channels().unwrap_or(0),
            args.n
        ))),
        _ => Ok(()),
    }
}

/// Select and build a GEMM.
pub fn gemm<To, Tout>(args: &GemmArgs, os: &OutputStage) -> Result<Box<dyn GemmCommon<To, Tout>>>
where
    To: GemmKernelList<Tout>,
    Tout: 'static,
{
    check_output_stage(args, os)?;
    let imp = find_implementation::<To, Tout>(args, os).ok_or_else(|| {
        GemmError::NoImplementation(format!(
            "{}x{}x{} ({} batches, {} multis) on [{}]",
            args.m,
            args.n,
            args.k,
            args.nbatches,
            args.nmulti,
            args.ci.features()
        ))
    })?;
    (imp.instantiate)(args, os)
}

/// Minimum `N` and `K` at which packing both operands pays off.
pub(crate) const INTERLEAVED_MIN_N: usize = 64;
pub(crate) const INTERLEAVED_MIN_K: usize = 64;
/// Largest `M / min(N, K)` for which packing both operands still pays off.
pub(crate) const INTERLEAVED_MAX_M_RATIO: usize = 4;

pub(crate) fn always(_: &GemmArgs, _: &OutputStage) -> bool {
    true
}

fn is_gemv(args: &GemmArgs) -> bool {
    args.n == 1 && !args.tr_a
}

pub(crate) fn gemv_batched_supported(args: &GemmArgs, _: &OutputStage) -> bool {
    is_gemv(args) && args.nbatches > 1
}

pub(crate) fn gemv_pretransposed_supported(args: &GemmArgs, _: &OutputStage) -> bool {
    is_gemv(args) && args.pretransposed_hint
}

pub(crate) fn gemv_supported(args: &GemmArgs, _: &OutputStage) -> bool {
    is_gemv(args)
}

pub(crate) fn untransposed(args: &GemmArgs, _: &OutputStage) -> bool {
    !args.tr_a && !args.tr_b
}

pub(crate) fn hybrid_supported(args: &GemmArgs, os: &OutputStage) -> bool {
    untransposed(args, os) && args.pretransposed_hint
}

/// Packed B is reused by every row block, packed A by every column block;
/// tall problems over a narrow `N` or shallow `K` amortise neither.
pub(crate) fn interleaved_recommended(args: &GemmArgs, _: &OutputStage) -> bool {
    args.pretransposed_hint
        && args.n >= INTERLEAVED_MIN_N
        && args.k >= INTERLEAVED_MIN_K
        && args.m <= args.n.min(args.k) * INTERLEAVED_MAX_M_RATIO
}

pub(crate) fn requantizing(_: &GemmArgs, os: &OutputStage) -> bool {
    os.requantize().is_some()
}

pub(crate) fn hybrid_quantized_supported(args: &GemmArgs, os: &OutputStage) -> bool {
    requantizing(args, os) && hybrid_supported(args, os)
}

pub(crate) fn native<S: NativeKernel>(
    args: &GemmArgs,
    _: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::ResultType>>> {
    Ok(Box::new(GemmNative::<S>::new(args)))
}

pub(crate) fn hybrid<S: HybridKernel>(
    args: &GemmArgs,
    _: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::ResultType>>> {
    Ok(Box::new(GemmHybrid::<S>::new(args)))
}

pub(crate) fn interleaved<S: InterleavedKernel>(
    args: &GemmArgs,
    _: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::ResultType>>> {
    Ok(Box::new(GemmInterleaved::<S>::new(args)))
}

pub(crate) fn gemv_batched<S: GemvKernel>(
    args: &GemmArgs,
    _: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::ResultType>>> {
    Ok(Box::new(GemmGemv::<S>::batched(args)))
}

pub(crate) fn gemv_pretransposed<S: GemvKernel>(
    args: &GemmArgs,
    _: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::ResultType>>> {
    Ok(Box::new(GemmGemv::<S>::pretransposed(args)))
}

pub(crate) fn gemv_native_transposed<S: GemvKernel>(
    args: &GemmArgs,
    _: &OutputStage,
) -> Result<Box<dyn GemmCommon<S::OperandType, S::ResultType>>> {
    Ok(Box::new(GemmGemv::<S>::native_transposed(args)))
}
