//! Strategy implementations.
//!
//! The generic tiles are parameterised over operand/result types and tile
//! shape so that one body serves every catalog entry of a given kind; the
//! `wide` fp32 tiles vectorise the two hottest single-precision shapes.

pub mod gemv;
pub mod hybrid;
pub mod interleaved;
pub mod native;
pub mod sgemm;

pub use gemv::GemvTile;
pub use hybrid::HybridTile;
pub use interleaved::InterleavedTile;
pub use native::NativeTile;
pub use sgemm::{SgemmInterleaved8x12, SgemmNative16x4};
