use gemm_core::{InterleavedKernel, Strategy};
use gemm_types::{Accumulator, Operand};
use std::marker::PhantomData;

/// Portable interleaved tile over packed A and B panels.
pub struct InterleavedTile<To, Tr, const W: usize, const H: usize, const U: usize> {
    _marker: PhantomData<fn() -> (To, Tr)>,
}

impl<To, Tr, const W: usize, const H: usize, const U: usize> Default
    for InterleavedTile<To, Tr, W, H, U>
{
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<To, Tr, const W: usize, const H: usize, const U: usize> Strategy
    for InterleavedTile<To, Tr, W, H, U>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    type OperandType = To;
    type ResultType = Tr;
    const OUT_WIDTH: usize = W;
    const OUT_HEIGHT: usize = H;
    const K_UNROLL: usize = U;
}

impl<To, Tr, const W: usize, const H: usize, const U: usize> InterleavedKernel
    for InterleavedTile<To, Tr, W, H, U>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    unsafe fn kernel(
        &self,
        a_panel: *const To,
        b_panel: *const To,
        c_panel: *mut Tr,
        bblocks: usize,
        kern_k: usize,
    ) {
        let ldc = bblocks * W;

        for block in 0..bblocks {
            let panel = b_panel.add(block * W * kern_k);
            let mut acc = [[Tr::zero(); W]; H];

            for p in 0..kern_k {
                let a_col = a_panel.add(p * H);
                let b_row = panel.add(p * W);
                for (i, acc_row) in acc.iter_mut().enumerate() {
                    let a_val = *a_col.add(i);
                    for (j, slot) in acc_row.iter_mut().enumerate() {
                        *slot = slot.acc_add(a_val.mul_widen(*b_row.add(j)));
                    }
                }
            }

            for (i, acc_row) in acc.iter().enumerate() {
                let dst = c_panel.add(i * ldc + block * W);
                for (j, &v) in acc_row.iter().enumerate() {
                    *dst.add(j) = v;
                }
            }
        }
    }
}
