use crate::tiling::TileShape;
use gemm_types::{Accumulator, Operand};

/// Common contract of every GEMM strategy.
///
/// A strategy is a stateless bundle of a tile shape, operand and result
/// types, and one kernel entry point. Which kernel it exposes is given
/// by the kind-specific traits below.
pub trait Strategy: Default + Send + Sync + 'static {
    /// Element type of A and B.
    type OperandType: Operand<Self::ResultType>;

    /// Element type the kernel accumulates and writes.
    type ResultType: Accumulator;

    /// Columns of C produced per kernel call.
    const OUT_WIDTH: usize;

    /// Rows of C produced per kernel call.
    const OUT_HEIGHT: usize;

    /// Granularity of the K loop.
    const K_UNROLL: usize;

    fn shape() -> TileShape {
        TileShape::new(Self::OUT_WIDTH, Self::OUT_HEIGHT, Self::K_UNROLL)
    }
}

/// Kernel reading A and B in place.
pub trait NativeKernel: Strategy {
    /// Compute `C[0..rows, 0..n] = alpha * A * B + beta * C`.
    ///
    /// C is not read when `beta == 0`.
    ///
    /// # Safety
    /// - `a` must be valid for `rows` rows of `k` elements at stride `lda`
    /// - `b` must be valid for `k` rows of `n` elements at stride `ldb`
    /// - `c` must be valid for `rows` rows of `n` elements at stride `ldc`
    /// - `rows <= Self::OUT_HEIGHT`
    #[allow(clippy::too_many_arguments)]
    unsafe fn kernel(
        &self,
        a: *const Self::OperandType,
        lda: usize,
        b: *const Self::OperandType,
        ldb: usize,
        c: *mut Self::ResultType,
        ldc: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        n: usize,
        k: usize,
    );
}

/// Kernel reading A in place and B from packed panels.
pub trait HybridKernel: Strategy {
    /// Compute `C[0..rows, 0..n] = alpha * A * B + beta * C`.
    ///
    /// `b_panel` holds `ceil(n / OUT_WIDTH)` panels, each `kern_k` rows of
    /// `OUT_WIDTH` elements, zero padded. Only the first `k` rows of each
    /// panel pair with A.
    ///
    /// # Safety
    /// - `a` must be valid for `rows` rows of `k` elements at stride `lda`
    /// - `b_panel` must be valid for `ceil(n / OUT_WIDTH) * OUT_WIDTH * kern_k` elements
    /// - `c` must be valid for `rows` rows of `n` elements at stride `ldc`
    /// - `rows <= Self::OUT_HEIGHT` and `k <= kern_k`
    #[allow(clippy::too_many_arguments)]
    unsafe fn kernel(
        &self,
        a: *const Self::OperandType,
        lda: usize,
        b_panel: *const Self::OperandType,
        c: *mut Self::ResultType,
        ldc: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        n: usize,
        k: usize,
        kern_k: usize,
    );
}

/// Kernel working on packed A and B panels into a scratch C panel.
pub trait InterleavedKernel: Strategy {
    /// Overwrite `c_panel` with the product of one A panel and `bblocks` B panels.
    ///
    /// `a_panel` is `OUT_HEIGHT` rows packed column by column, `kern_k`
    /// deep. Each B panel is `kern_k` rows of `OUT_WIDTH`. `c_panel` is
    /// `OUT_HEIGHT` rows of `bblocks * OUT_WIDTH`, row-major.
    ///
    /// # Safety
    /// - `a_panel` must be valid for `OUT_HEIGHT * kern_k` elements
    /// - `b_panel` must be valid for `bblocks * OUT_WIDTH * kern_k` elements
    /// - `c_panel` must be valid for `OUT_HEIGHT * bblocks * OUT_WIDTH` elements
    unsafe fn kernel(
        &self,
        a_panel: *const Self::OperandType,
        b_panel: *const Self::OperandType,
        c_panel: *mut Self::ResultType,
        bblocks: usize,
        kern_k: usize,
    );
}

/// Matrix-vector kernel.
pub trait GemvKernel: Strategy {
    /// Compute `y[0..rows] = alpha * A * x + beta * y`.
    ///
    /// # Safety
    /// - `a` must be valid for `rows` rows of `k` elements at stride `lda`
    /// - `x` must be valid for `k` elements at stride `incx`
    /// - `y` must be valid for `rows` elements at stride `incy`
    #[allow(clippy::too_many_arguments)]
    unsafe fn kernel(
        &self,
        a: *const Self::OperandType,
        lda: usize,
        x: *const Self::OperandType,
        incx: usize,
        y: *mut Self::ResultType,
        incy: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        k: usize,
    );
}

/// Write a tile of accumulators to C as `alpha * acc + beta * C`.
///
/// # Safety
/// `c` must be valid for `rows` rows of `cols` elements at stride `ldc`.
#[inline]
pub unsafe fn store_tile<T: Accumulator, const W: usize, const H: usize>(
    acc: &[[T; W]; H],
    rows: usize,
    cols: usize,
    c: *mut T,
    ldc: usize,
    alpha: f32,
    beta: f32,
) {
    for (i, row) in acc.iter().enumerate().take(rows) {
        for (j, &v) in row.iter().enumerate().take(cols) {
            let dst = c.add(i * ldc + j);
            *dst = if beta == 0.0 {
                v.scale(alpha)
            } else {
                v.blend(alpha, *dst, beta)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Shape16x4;

    impl Strategy for Shape16x4 {
        type OperandType = f32;
        type ResultType = f32;
        const OUT_WIDTH: usize = 16;
        const OUT_HEIGHT: usize = 4;
        const K_UNROLL: usize = 4;
    }

    #[test]
    fn test_strategy_shape() {
        assert_eq!(Shape16x4::shape(), TileShape::new(16, 4, 4));
    }

    #[test]
    fn test_store_tile_beta_zero_ignores_c() {
        let acc = [[1.0f32, 2.0], [3.0, 4.0]];
        let mut c = [f32::NAN; 4];
        unsafe { store_tile(&acc, 2, 2, c.as_mut_ptr(), 2, 2.0, 0.0) };
        assert_eq!(c, [2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_store_tile_partial() {
        let acc = [[1.0f32, 2.0], [3.0, 4.0]];
        let mut c = [10.0f32; 6];
        unsafe { store_tile(&acc, 1, 2, c.as_mut_ptr(), 3, 1.0, 1.0) };
        assert_eq!(c, [11.0, 12.0, 10.0, 10.0, 10.0, 10.0]);
    }
}
