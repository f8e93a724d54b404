//! GEMM method selection, cache blocking and multi-threaded execution.
//!
//! This library chooses, configures and runs a general matrix multiply
//! `C = alpha * A * B + beta * C` for the CPU it runs on. It supports
//! batched and multi-matrix problems, transposed operands, packing B ahead
//! of time, and 8-bit quantized products with a requantizing output stage.
//!
//! # Type pairs
//!
//! | Operand | Result | Catalog |
//! |---------|--------|---------|
//! | `f32` | `f32` | gemv, interleaved 8x12, hybrid 6x16, native 16x4, portable |
//! | [`f16`] | [`f16`] | needs `FP16` |
//! | `i8` | `i32` | dot product and int8 matrix multiply, portable |
//! | `u8` | `u32` | dot product and int8 matrix multiply, portable |
//! | `i8` | `i8` | requantized, needs an [`OutputStage::Requantize`] |
//! | `u8` | `u8` | requantized, needs an [`OutputStage::Requantize`] |
//!
//! # Methods
//!
//! Each type pair owns an ordered catalog of implementations. The first
//! entry whose CPU features, argument checks and [`GemmConfig`] override
//! all pass and whose recommendation check passes is chosen; otherwise
//! the first supported entry is. See [`dispatch`].
//!
//! # Quick Start
//!
//! ```
//! use arm_gemm::matmul;
//!
//! let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
//! let b = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3x2
//!
//! let c: Vec<f32> = matmul(&a, 2, 3, &b, 2).unwrap();
//! assert_eq!(c, vec![22.0, 28.0, 49.0, 64.0]);
//! ```
//!
//! # BLAS-style API
//!
//! ```
//! use arm_gemm::{Gemm, GemmMethod};
//!
//! let a = vec![1.0f32; 64 * 64];
//! let b = vec![1.0f32; 64 * 64];
//! let mut c = vec![0.0f32; 64 * 64];
//!
//! let kernel = Gemm::<f32, f32>::new(64, 64, 64)
//!     .pretransposed()
//!     .execute(&a, 64, &b, 64, &mut c, 64)
//!     .unwrap();
//! assert_eq!(kernel.method, GemmMethod::GemmInterleaved);
//! assert!(c.iter().all(|&v| v == 64.0));
//! ```
//!
//! # Tensor operator
//!
//! [`GemmAssemblyDispatch`] validates tensor descriptors, reports memory
//! requirements, packs B once and runs many times:
//!
//! ```
//! use arm_gemm::prelude::*;
//!
//! let ci = CpuInfo::generic();
//! let a = Tensor::<f32>::new(TensorInfo::new(TensorShape::new(&[8, 4]), DataType::F32)).unwrap();
//! let b = Tensor::<f32>::new(TensorInfo::new(TensorShape::new(&[4, 8]), DataType::F32)).unwrap();
//! let mut d = Tensor::<f32>::new(TensorInfo::new(TensorShape::new(&[4, 4]), DataType::F32)).unwrap();
//!
//! let mut op = GemmAssemblyDispatch::<f32, f32>::configure(
//!     a.info(), b.info(), d.info(), &GemmInfo::default(), &ci, 1,
//! ).unwrap();
//! op.run(&a.view(), &b.view(), &mut d.view_mut(), &SingleThreadScheduler::new(&ci)).unwrap();
//! ```
//!
//! # Backend
//!
//! ```
//! use arm_gemm::Backend;
//!
//! println!("Using: {}", Backend::description());
//! ```

pub mod assembly;
pub mod dispatch;
pub mod driver;
pub mod scheduler;
pub mod tensor;

mod api;
mod backend;
mod error;

// Public API
pub use api::{matmul, select_method, Gemm};
pub use assembly::{GemmAssemblyDispatch, GemmInfo, GemmParams, MemoryRequirements};
pub use backend::{version_info, Backend};
pub use dispatch::{
    check_output_stage, find_implementation, gemm, get_compatible_kernels, get_gemm_method,
    GemmImplementation, GemmKernelList,
};
pub use driver::{GemmArrays, GemmCommon, ThreadInfo};
pub use error::{GemmError, Result};
#[cfg(feature = "parallel")]
pub use scheduler::RayonScheduler;
pub use scheduler::{default_scheduler, schedule, Scheduler, SingleThreadScheduler};
pub use tensor::{QuantizationInfo, Tensor, TensorInfo, TensorShape, TensorView, TensorViewMut};

// Re-export the lower layers at crate root
pub use gemm_core::{
    BlockSizes, CpuFeatures, CpuInfo, GemmArgs, GemmConfig, NdRange, ThreadPartitioner, TileShape,
    Transpose,
};
pub use gemm_kernels::{cpu_info, init_cpu_info};
pub use gemm_types::{
    f16, Accumulator, DataType, Element, GemmMethod, KernelDescription, Operand, OutputStage,
    QuantizedElement, Requantize32,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::{
        cpu_info, matmul, Backend, CpuFeatures, CpuInfo, DataType, Gemm, GemmArgs,
        GemmAssemblyDispatch, GemmConfig, GemmError, GemmInfo, GemmMethod, KernelDescription,
        OutputStage, Requantize32, Scheduler, SingleThreadScheduler, Tensor, TensorInfo,
        TensorShape,
    };
}
