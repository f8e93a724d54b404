use super::{
    always, gemv_batched, gemv_batched_supported, gemv_native_transposed, gemv_pretransposed,
    gemv_pretransposed_supported, gemv_supported, hybrid, hybrid_supported, interleaved,
    interleaved_recommended, native, untransposed, GemmImplementation, GemmKernelList,
};
use gemm_core::{CpuFeatures, Strategy};
use gemm_kernels::{GemvTile, HybridTile, InterleavedTile, NativeTile, SgemmInterleaved8x12, SgemmNative16x4};
use gemm_types::GemmMethod;

type Sgemv = GemvTile<f32, f32, 8>;
type HybridFp32Mla6x16 = HybridTile<f32, f32, 16, 6, 1>;
type SgemmInterleaved4x4 = InterleavedTile<f32, f32, 4, 4, 1>;
type HybridFp32_4x8 = HybridTile<f32, f32, 8, 4, 1>;
type SgemmNative4x4 = NativeTile<f32, f32, 4, 4>;

static SGEMM_METHODS: [GemmImplementation<f32, f32>; 9] = [
    GemmImplementation::new(
        GemmMethod::GemvBatched,
        "sgemv_batched",
        CpuFeatures::empty(),
        Sgemv::shape,
        gemv_batched_supported,
        always,
        gemv_batched::<Sgemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemvPretransposed,
        "sgemv_pretransposed",
        CpuFeatures::empty(),
        Sgemv::shape,
        gemv_pretransposed_supported,
        always,
        gemv_pretransposed::<Sgemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemvNativeTransposed,
        "sgemv_trans",
        CpuFeatures::empty(),
        Sgemv::shape,
        gemv_supported,
        always,
        gemv_native_transposed::<Sgemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmInterleaved,
        "a64_sgemm_8x12",
        CpuFeatures::NEON,
        SgemmInterleaved8x12::shape,
        always,
        interleaved_recommended,
        interleaved::<SgemmInterleaved8x12>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmHybrid,
        "a64_hybrid_fp32_mla_6x16",
        CpuFeatures::NEON,
        HybridFp32Mla6x16::shape,
        hybrid_supported,
        always,
        hybrid::<HybridFp32Mla6x16>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmNative,
        "a64_sgemm_native_16x4",
        CpuFeatures::NEON,
        SgemmNative16x4::shape,
        untransposed,
        always,
        native::<SgemmNative16x4>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmInterleaved,
        "sgemm_interleaved_4x4",
        CpuFeatures::empty(),
        SgemmInterleaved4x4::shape,
        always,
        interleaved_recommended,
        interleaved::<SgemmInterleaved4x4>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmHybrid,
        "hybrid_fp32_4x8",
        CpuFeatures::empty(),
        HybridFp32_4x8::shape,
        hybrid_supported,
        always,
        hybrid::<HybridFp32_4x8>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmNative,
        "sgemm_native_4x4",
        CpuFeatures::empty(),
        SgemmNative4x4::shape,
        untransposed,
        always,
        native::<SgemmNative4x4>,
    ),
];

impl GemmKernelList<f32> for f32 {
    fn implementation_list() -> &'static [GemmImplementation<f32, f32>] {
        &SGEMM_METHODS
    }
}
