use super::{always, hybrid_quantized_supported, requantizing, GemmImplementation, GemmKernelList};
use crate::driver::{hybrid_quantized, quantize_wrapper};
use gemm_core::{CpuFeatures, Strategy, TileShape};
use gemm_kernels::HybridTile;
use gemm_types::GemmMethod;

const DOT: CpuFeatures = CpuFeatures::NEON.union(CpuFeatures::DOTPROD);

type HybridU8qaDot4x16 = HybridTile<u8, u32, 16, 4, 4>;
type HybridS8qsDot6x16 = HybridTile<i8, i32, 16, 6, 4>;

// The wrapper has no tile of its own; it defers to the integer catalog.
fn wrapper_shape() -> TileShape {
    TileShape::new(1, 1, 1)
}

static QU8_METHODS: [GemmImplementation<u8, u8>; 2] = [
    GemmImplementation::new(
        GemmMethod::GemmHybridQuantized,
        "a64_hybrid_u8qa_dot_4x16",
        DOT,
        HybridU8qaDot4x16::shape,
        hybrid_quantized_supported,
        always,
        hybrid_quantized::<HybridU8qaDot4x16>,
    ),
    GemmImplementation::new(
        GemmMethod::QuantizeWrapper,
        "quantize_wrapper",
        CpuFeatures::empty(),
        wrapper_shape,
        requantizing,
        always,
        quantize_wrapper::<u8>,
    ),
];

static QS8_METHODS: [GemmImplementation<i8, i8>; 2] = [
    GemmImplementation::new(
        GemmMethod::GemmHybridQuantized,
        "a64_hybrid_s8qs_dot_6x16",
        DOT,
        HybridS8qsDot6x16::shape,
        hybrid_quantized_supported,
        always,
        hybrid_quantized::<HybridS8qsDot6x16>,
    ),
    GemmImplementation::new(
        GemmMethod::QuantizeWrapper,
        "quantize_wrapper",
        CpuFeatures::empty(),
        wrapper_shape,
        requantizing,
        always,
        quantize_wrapper::<i8>,
    ),
];

impl GemmKernelList<u8> for u8 {
    fn implementation_list() -> &'static [GemmImplementation<u8, u8>] {
        &QU8_METHODS
    }
}

impl GemmKernelList<i8> for i8 {
    fn implementation_list() -> &'static [GemmImplementation<i8, i8>] {
        &QS8_METHODS
    }
}
