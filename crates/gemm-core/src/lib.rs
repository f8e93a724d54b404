//! Core blocking and partitioning logic for CPU GEMM.
//!
//! This crate is free of any particular kernel or threading runtime. It
//! provides the pure building blocks the drivers in `arm-gemm` are made
//! of:
//!
//! - [`calculate_block_sizes`]: cache-aware `k_block` / `x_block` / `m_round`
//! - [`ThreadPartitioner`]: tile-aligned per-thread work ranges
//! - [`NdRange`]: flattened 3-D iteration windows
//! - [`Strategy`] and the kernel traits a strategy implements
//! - operand packing and requantization reference routines
//!
//! # Example
//!
//! ```
//! use gemm_core::{calculate_block_sizes_for, CpuInfo, TileShape};
//!
//! let ci = CpuInfo::generic()
//!     .with_l1_cache_size(32 * 1024)
//!     .with_l2_cache_size(2 * 1024 * 1024);
//!
//! let blocks = calculate_block_sizes_for(&ci, 100, 64, 256, TileShape::new(16, 4, 4), 4);
//! assert_eq!(blocks.k_block, 256);
//! assert_eq!(blocks.x_block, 64);
//! assert_eq!(blocks.m_round, 100);
//! ```

mod args;
mod cpu;
mod kernel;
mod packing;
mod partition;
pub mod quantize;
mod tiling;
mod window;

pub use args::{GemmArgs, GemmConfig};
pub use cpu::{CpuFeatures, CpuInfo};
pub use kernel::{
    store_tile, GemvKernel, HybridKernel, InterleavedKernel, NativeKernel, Strategy,
};
pub use packing::{
    merge_panel, pack_a, pack_b, packed_a_size, packed_b_size, panel_ptr, Transpose,
};
pub use partition::ThreadPartitioner;
pub use tiling::{
    block_ranges, calculate_block_sizes, calculate_block_sizes_for, iceildiv, pretransposed_b_len,
    roundup, BlockSizes, BlockWalker, PanelBlock, TileShape,
};
pub use window::{NdRange, Run, Runs};
