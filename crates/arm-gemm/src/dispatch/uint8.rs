use super::{
    always, gemv_batched, gemv_batched_supported, gemv_native_transposed, gemv_pretransposed,
    gemv_pretransposed_supported, gemv_supported, hybrid, hybrid_supported, interleaved,
    interleaved_recommended, native, untransposed, GemmImplementation, GemmKernelList,
};
use gemm_core::{CpuFeatures, Strategy};
use gemm_kernels::{GemvTile, HybridTile, InterleavedTile, NativeTile};
use gemm_types::GemmMethod;

const DOT: CpuFeatures = CpuFeatures::NEON.union(CpuFeatures::DOTPROD);
const MMLA: CpuFeatures = CpuFeatures::NEON.union(CpuFeatures::I8MM);

type Gemv = GemvTile<u8, u32, 8>;
type Mmla8x12 = InterleavedTile<u8, u32, 12, 8, 8>;
type Dot8x12 = InterleavedTile<u8, u32, 12, 8, 4>;
type HybridDot6x16 = HybridTile<u8, u32, 16, 6, 4>;
type Interleaved4x4 = InterleavedTile<u8, u32, 4, 4, 16>;
type Native4x4 = NativeTile<u8, u32, 4, 4>;

static UGEMM_METHODS: [GemmImplementation<u8, u32>; 8] = [
    GemmImplementation::new(
        GemmMethod::GemvBatched,
        "ugemv_batched",
        CpuFeatures::empty(),
        Gemv::shape,
        gemv_batched_supported,
        always,
        gemv_batched::<Gemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemvPretransposed,
        "ugemv_pretransposed",
        CpuFeatures::empty(),
        Gemv::shape,
        gemv_pretransposed_supported,
        always,
        gemv_pretransposed::<Gemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemvNativeTransposed,
        "ugemv_trans",
        CpuFeatures::empty(),
        Gemv::shape,
        gemv_supported,
        always,
        gemv_native_transposed::<Gemv>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmInterleaved,
        "a64_interleaved_u8u32_mmla_8x12",
        MMLA,
        Mmla8x12::shape,
        always,
        interleaved_recommended,
        interleaved::<Mmla8x12>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmInterleaved,
        "a64_gemm_u8_8x12",
        DOT,
        Dot8x12::shape,
        always,
        interleaved_recommended,
        interleaved::<Dot8x12>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmHybrid,
        "a64_hybrid_u8u32_dot_6x16",
        DOT,
        HybridDot6x16::shape,
        hybrid_supported,
        always,
        hybrid::<HybridDot6x16>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmInterleaved,
        "gemm_u8_interleaved_4x4",
        CpuFeatures::empty(),
        Interleaved4x4::shape,
        always,
        interleaved_recommended,
        interleaved::<Interleaved4x4>,
    ),
    GemmImplementation::new(
        GemmMethod::GemmNative,
        "gemm_u8_native_4x4",
        CpuFeatures::empty(),
        Native4x4::shape,
        untransposed,
        always,
        native::<Native4x4>,
    ),
];

impl GemmKernelList<u32> for u8 {
    fn implementation_list() -> &'static [GemmImplementation<u8, u32>] {
        &UGEMM_METHODS
    }
}
