use gemm_core::{store_tile, NativeKernel, Strategy};
use gemm_types::{Accumulator, Operand};
use std::marker::PhantomData;

/// Portable native tile: `H` rows by `W` columns, operands read in place.
pub struct NativeTile<To, Tr, const W: usize, const H: usize> {
    _marker: PhantomData<fn() -> (To, Tr)>,
}

impl<To, Tr, const W: usize, const H: usize> Default for NativeTile<To, Tr, W, H> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<To, Tr, const W: usize, const H: usize> Strategy for NativeTile<To, Tr, W, H>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    type OperandType = To;
    type ResultType = Tr;
    const OUT_WIDTH: usize = W;
    const OUT_HEIGHT: usize = H;
    const K_UNROLL: usize = 1;
}

impl<To, Tr, const W: usize, const H: usize> NativeKernel for NativeTile<To, Tr, W, H>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    unsafe fn kernel(
        &self,
        a: *const To,
        lda: usize,
        b: *const To,
        ldb: usize,
        c: *mut Tr,
        ldc: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        n: usize,
        k: usize,
    ) {
        debug_assert!(rows <= H);

        for x0 in (0..n).step_by(W) {
            let cols = (n - x0).min(W);
            let mut acc = [[Tr::zero(); W]; H];

            for p in 0..k {
                let b_row = b.add(p * ldb + x0);
                for (i, acc_row) in acc.iter_mut().enumerate().take(rows) {
                    let a_val = *a.add(i * lda + p);
                    for (j, slot) in acc_row.iter_mut().enumerate().take(cols) {
                        *slot = slot.acc_add(a_val.mul_widen(*b_row.add(j)));
                    }
                }
            }

            store_tile(&acc, rows, cols, c.add(x0), ldc, alpha, beta);
        }
    }
}
