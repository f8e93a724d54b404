use std::fmt;

/// How a GEMM is executed.
///
/// One invocation maps to exactly one method, chosen when the GEMM is
/// configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GemmMethod {
    /// No specific method; let the selector decide.
    #[default]
    Default,
    /// Matrix-vector product with batches folded into rows.
    GemvBatched,
    /// Matrix-vector product with the vector packed once up front.
    GemvPretransposed,
    /// Matrix-vector product reading the vector in place.
    GemvNativeTransposed,
    /// Blocked multiply reading both operands in place.
    GemmNative,
    /// A read in place, B packed ahead of time.
    GemmHybrid,
    /// Both operands packed into interleaved panels.
    GemmInterleaved,
    /// Integer GEMM followed by a separate requantization pass.
    QuantizeWrapper,
    /// Hybrid GEMM with requantization fused into each output tile.
    GemmHybridQuantized,
}

impl GemmMethod {
    /// All methods, in declaration order.
    pub const ALL: [GemmMethod; 9] = [
        GemmMethod::Default,
        GemmMethod::GemvBatched,
        GemmMethod::GemvPretransposed,
        GemmMethod::GemvNativeTransposed,
        GemmMethod::GemmNative,
        GemmMethod::GemmHybrid,
        GemmMethod::GemmInterleaved,
        GemmMethod::QuantizeWrapper,
        GemmMethod::GemmHybridQuantized,
    ];

    /// Whether this is one of the matrix-vector methods.
    pub const fn is_gemv(self) -> bool {
        matches!(
            self,
            GemmMethod::GemvBatched | GemmMethod::GemvPretransposed | GemmMethod::GemvNativeTransposed
        )
    }

    /// Whether this method produces requantized output.
    pub const fn is_quantized(self) -> bool {
        matches!(self, GemmMethod::QuantizeWrapper | GemmMethod::GemmHybridQuantized)
    }
}

impl fmt::Display for GemmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GemmMethod::Default => "DEFAULT",
            GemmMethod::GemvBatched => "GEMV_BATCHED",
            GemmMethod::GemvPretransposed => "GEMV_PRETRANSPOSED",
            GemmMethod::GemvNativeTransposed => "GEMV_NATIVE_TRANSPOSED",
            GemmMethod::GemmNative => "GEMM_NATIVE",
            GemmMethod::GemmHybrid => "GEMM_HYBRID",
            GemmMethod::GemmInterleaved => "GEMM_INTERLEAVED",
            GemmMethod::QuantizeWrapper => "QUANTIZE_WRAPPER",
            GemmMethod::GemmHybridQuantized => "GEMM_HYBRID_QUANTIZED",
        };
        f.write_str(name)
    }
}

/// Result of method selection.
///
/// `is_default` is only set on the sentinel returned when no
/// implementation matches; callers must then fall back to a reference
/// path of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelDescription {
    pub method: GemmMethod,
    pub name: String,
    pub is_default: bool,
}

impl KernelDescription {
    pub fn new(method: GemmMethod, name: impl Into<String>, is_default: bool) -> Self {
        Self {
            method,
            name: name.into(),
            is_default,
        }
    }

    /// The "no accelerated path" sentinel.
    pub fn fallback() -> Self {
        Self::new(GemmMethod::Default, "", true)
    }
}

impl Default for KernelDescription {
    fn default() -> Self {
        Self::fallback()
    }
}

impl fmt::Display for KernelDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default {
            write!(f, "{} (no implementation)", self.method)
        } else {
            write!(f, "{} [{}]", self.method, self.name)
        }
    }
}
