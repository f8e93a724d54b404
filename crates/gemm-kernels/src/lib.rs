//! CPU probing and GEMM strategy implementations.
//!
//! This crate provides the machine-facing half of the GEMM stack: the
//! process-wide [`CpuInfo`] profile and the strategy objects the catalog
//! in `arm-gemm` selects from.
//!
//! # Strategies
//!
//! | Kind | Type | Shape |
//! |------|------|-------|
//! | native | [`NativeTile`], [`SgemmNative16x4`] | any / 4x16 |
//! | hybrid | [`HybridTile`] | any |
//! | interleaved | [`InterleavedTile`], [`SgemmInterleaved8x12`] | any / 8x12 |
//! | gemv | [`GemvTile`] | `H` rows |
//!
//! # Example
//!
//! ```
//! use gemm_kernels::{cpu_info, NativeTile};
//! use gemm_core::NativeKernel;
//!
//! println!("L1: {} bytes", cpu_info().l1_cache_size());
//!
//! let a = [1.0f32, 2.0];
//! let b = [3.0f32, 4.0];
//! let mut c = [0.0f32];
//!
//! let tile = NativeTile::<f32, f32, 4, 4>::default();
//! unsafe { tile.kernel(a.as_ptr(), 2, b.as_ptr(), 1, c.as_mut_ptr(), 1, 1.0, 0.0, 1, 1, 2) };
//! assert_eq!(c[0], 11.0);
//! ```
//!
//! [`CpuInfo`]: gemm_core::CpuInfo

mod detect;
pub mod kernels;

pub use detect::{
    cpu_info, detect_cache_sizes, detect_features, init_cpu_info, parse_cache_size, DetectCpu,
};
pub use kernels::*;
