use gemm_core::{store_tile, HybridKernel, Strategy};
use gemm_types::{Accumulator, Operand};
use std::marker::PhantomData;

/// Portable hybrid tile: A read in place, B from `W`-wide packed panels.
pub struct HybridTile<To, Tr, const W: usize, const H: usize, const U: usize> {
    _marker: PhantomData<fn() -> (To, Tr)>,
}

impl<To, Tr, const W: usize, const H: usize, const U: usize> Default for HybridTile<To, Tr, W, H, U> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<To, Tr, const W: usize, const H: usize, const U: usize> Strategy for HybridTile<To, Tr, W, H, U>
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

impl<To, Tr, const W: usize, const H: usize, const U: usize> HybridKernel for HybridTile<To, Tr, W, H, U>
where
    To: Operand<Tr>,
    Tr: Accumulator,
{
    unsafe fn kernel(
        &self,
        a: *const To,
        lda: usize,
        b_panel: *const To,
        c: *mut Tr,
        ldc: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        n: usize,
        k: usize,
        kern_k: usize,
    ) {
        debug_assert!(rows <= H && k <= kern_k);

        for (block, x0) in (0..n).step_by(W).enumerate() {
            let cols = (n - x0).min(W);
            let panel = b_panel.add(block * W * kern_k);
            let mut acc = [[Tr::zero(); W]; H];

            for p in 0..k {
                let b_row = panel.add(p * W);
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

#[cfg(test)]
mod tests {
    use super::*;
    use gemm_core::{pack_b, packed_b_size, Transpose};

    #[test]
    fn test_hybrid_matches_reference() {
        let (m, n, k) = (3usize, 5usize, 3usize);
        let a: Vec<u8> = (0..m * k).map(|i| i as u8 + 1).collect();
        let b: Vec<u8> = (0..k * n).map(|i| (i % 4) as u8).collect();

        // W = 4, U = 4: k padded from 3 to 4
        let kern_k = 4;
        let mut panel = vec![0u8; packed_b_size(kern_k, n, 4)];
        unsafe { pack_b(k, n, b.as_ptr(), n, Transpose::NoTrans, panel.as_mut_ptr(), 4, kern_k) };

        let mut c = vec![0u32; m * n];
        let tile = HybridTile::<u8, u32, 4, 4, 4>::default();
        unsafe {
            tile.kernel(a.as_ptr(), k, panel.as_ptr(), c.as_mut_ptr(), n, 1.0, 0.0, m, n, k, kern_k)
        };

        for i in 0..m {
            for j in 0..n {
                let expect: u32 = (0..k).map(|p| a[i * k + p] as u32 * b[p * n + j] as u32).sum();
                assert_eq!(c[i * n + j], expect);
            }
        }
    }

    #[test]
    fn test_hybrid_accumulates_with_beta_one() {
        let a: [f32; 1] = [2.0];
        let panel: [f32; 4] = [3.0, 0.0, 0.0, 0.0];
        let mut c = [1.0f32];

        let tile = HybridTile::<f32, f32, 4, 1, 1>::default();
        unsafe { tile.kernel(a.as_ptr(), 1, panel.as_ptr(), c.as_mut_ptr(), 1, 1.0, 1.0, 1, 1, 1, 1) };
        assert_eq!(c, [7.0]);
    }
}
