use super::{
    always, gemv_batched, gemv_batched_supported, gemv_native_transposed, gemv_pretransposed,
    gemv_pretransposed_supported, gemv_supported, hybrid, hybrid_supported, interleaved,
    interleaved_recommended, native, untransposed, GemmImplementation, GemmKernelList,
};
use gemm_core::{CpuFeatures, Strategy};
use gemm_kernels::{GemvTile, HybridTile, InterleavedTile, NativeTile};
use gemm_types::{f16, GemmMethod};

// Every entry needs fp16 vector arithmetic; there is no fp32 emulation path.
const FP16: CpuFeatures = CpuFeatures::NEON.union(CpuFeatures::FP16);

type Hgemv = GemvTile<f16, f16, 8>;
type Hgemm8x24 = InterleavedTile<f16, f16, 24, 8, 1>;
type HybridFp16Mla6x32 = HybridTile<f16, f16, 32, 6, 1>;
type HgemmNative8x8 = NativeTile<f16, f16, 8, 8>;

static HGEMM_METHODS: [GemmImplementation<f16, f16>; 6] = [
    GemmImplementation::new(
        GemmMethod::GemvBatched,
        "hgemv_batched",
        FP16,
        Hgemv::shape,
        gemv_batched_supported,
        always,
        gemv_batched::<Hgemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemvPretransposed,
        "hgemv_pretransposed",
        FP16,
        Hgemv::shape,
        gemv_pretransposed_supported,
        always,
        gemv_pretransposed::<Hgemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemvNativeTransposed,
        "hgemv_trans",
        FP16,
        Hgemv::shape,
        gemv_supported,
        always,
        gemv_native_transposed::<Hgemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmInterleaved,
        "a64_hgemm_8x24",
        FP16,
        Hgemm8x24::shape,
        always,
        interleaved_recommended,
        interleaved::<Hgemm8x24>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmHybrid,
        "a64_hybrid_fp16_mla_6x32",
        FP16,
        HybridFp16Mla6x32::shape,
        hybrid_supported,
        always,
        hybrid::<HybridFp16Mla6x32>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmNative,
        "a64_hgemm_native_8x8",
        FP16,
        HgemmNative8x8::shape,
        untransposed,
        always,
        native::<HgemmNative8x8>,
    ),
];

impl GemmKernelList<f16> for f16 {
    fn implementation_list() -> &'static [GemmImplementation<f16, f16>] {
        &HGEMM_METHODS
    }
}
