//! Element types and descriptors shared by the GEMM selection engine.
//!
//! This crate holds the vocabulary the rest of the workspace speaks:
//! which scalar types a GEMM can read and write, which execution
//! methods exist, and how a quantized result is rescaled.
//!
//! # Supported type pairs
//!
//! | Operand | Result | Notes |
//! |---------|--------|-------|
//! | `f32` | `f32` | |
//! | [`f16`] | [`f16`] | needs fp16 vector arithmetic |
//! | `i8` | `i32` | |
//! | `u8` | `u32` | |
//! | `i8` | `i8` | through a [`Requantize32`] output stage |
//! | `u8` | `u8` | through a [`Requantize32`] output stage |
//!
//! # Example
//!
//! ```
//! use gemm_types::{Accumulator, DataType, Element, Operand};
//!
//! assert_eq!(<i8 as Element>::DATA_TYPE, DataType::S8);
//!
//! let acc: i32 = (-3i8).mul_widen(7);
//! assert_eq!(acc.acc_add(1), -20);
//! ```

mod data_type;
mod element;
mod method;
mod quant;

pub use data_type::DataType;
pub use element::{Accumulator, Element, Operand, QuantizedElement};
pub use half::f16;
pub use method::{GemmMethod, KernelDescription};
pub use quant::{OutputStage, Requantize32};
