use gemm_core::{GemvKernel, Strategy};
use gemm_types::{Accumulator, Operand};
use std::marker::PhantomData;

/// Portable matrix-vector tile covering `H` rows per call.
pub struct GemvTile<To, Tr, const H: usize> {
    _marker: PhantomData<fn() -> (To, Tr)>,
}

impl<To, Tr, const H: usize> Default for GemvTile<To, Tr, H> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<To, Tr, const H: usize> Strategy for GemvTile<To, Tr, H>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    type OperandType = To;
    type ResultType = Tr;
    const OUT_WIDTH: usize = 1;
    const OUT_HEIGHT: usize = H;
    const K_UNROLL: usize = 1;
}

impl<To, Tr, const H: usize> GemvKernel for GemvTile<To, Tr, H>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    unsafe fn kernel(
        &self,
        a: *const To,
        lda: usize,
        x: *const To,
        incx: usize,
        y: *mut Tr,
        incy: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        k: usize,
    ) {
        for i in 0..rows {
            let a_row = a.add(i * lda);
            let mut acc = Tr::zero();
            for p in 0..k {
                acc = acc.acc_add((*a_row.add(p)).mul_widen(*x.add(p * incx)));
            }
            let dst = y.add(i * incy);
            *dst = if beta == 0.0 {
                acc.scale(alpha)
            } else {
                acc.blend(alpha, *dst, beta)
            };
        }
    }
}
