//! Vectorised single-precision tiles.

use gemm_core::{InterleavedKernel, NativeKernel, Strategy};
use gemm_types::Accumulator;
use wide::f32x4;

#[inline(always)]
unsafe fn load4(p: *const f32) -> f32x4 {
    f32x4::from([*p, *p.add(1), *p.add(2), *p.add(3)])
}

/// Interleaved fp32 kernel producing 8x12 tiles.
///
/// Each row of the tile is held in three f32x4 accumulators.
#[derive(Default, Clone, Copy)]
pub struct SgemmInterleaved8x12;

impl Strategy for SgemmInterleaved8x12 {
    type OperandType = f32;
    type ResultType = f32;
    const OUT_WIDTH: usize = 12;
    const OUT_HEIGHT: usize = 8;
    const K_UNROLL: usize = 1;
}

impl InterleavedKernel for SgemmInterleaved8x12 {
    unsafe fn kernel(
        &self,
        a_panel: *const f32,
        b_panel: *const f32,
        c_panel: *mut f32,
        bblocks: usize,
        kern_k: usize,
    ) {
        const W: usize = 12;
        const H: usize = 8;
        let ldc = bblocks * W;

        for block in 0..bblocks {
            let panel = b_panel.add(block * W * kern_k);
            let mut acc = [[f32x4::splat(0.0); 3]; H];

            for p in 0..kern_k {
                let b_row = panel.add(p * W);
                let b_vec = [load4(b_row), load4(b_row.add(4)), load4(b_row.add(8))];
                let a_col = a_panel.add(p * H);

                for (i, acc_row) in acc.iter_mut().enumerate() {
                    let a_broadcast = f32x4::splat(*a_col.add(i));
                    for (v, slot) in acc_row.iter_mut().enumerate() {
                        *slot = a_broadcast.mul_add(b_vec[v], *slot);
                    }
                }
            }

            // Write back
            for (i, acc_row) in acc.iter().enumerate() {
                let dst = c_panel.add(i * ldc + block * W);
                for (v, lane) in acc_row.iter().enumerate() {
                    let vals: [f32; 4] = (*lane).into();
                    for (j, &x) in vals.iter().enumerate() {
                        *dst.add(v * 4 + j) = x;
                    }
                }
            }
        }
    }
}

/// Native fp32 kernel producing 4x16 tiles.
#[derive(Default, Clone, Copy)]
pub struct SgemmNative16x4;

impl Strategy for SgemmNative16x4 {
    type OperandType = f32;
    type ResultType = f32;
    const OUT_WIDTH: usize = 16;
    const OUT_HEIGHT: usize = 4;
    const K_UNROLL: usize = 1;
}

impl NativeKernel for SgemmNative16x4 {
    unsafe fn kernel(
        &self,
        a: *const f32,
        lda: usize,
        b: *const f32,
        ldb: usize,
        c: *mut f32,
        ldc: usize,
        alpha: f32,
        beta: f32,
        rows: usize,
        n: usize,
        k: usize,
    ) {
        const W: usize = 16;
        const H: usize = 4;
        debug_assert!(rows <= H);

        for x0 in (0..n).step_by(W) {
            let cols = (n - x0).min(W);
            let mut acc = [[f32x4::splat(0.0); 4]; H];

            for p in 0..k {
                let b_row = b.add(p * ldb + x0);
                let b_vec = if cols == W {
                    [
                        load4(b_row),
                        load4(b_row.add(4)),
                        load4(b_row.add(8)),
                        load4(b_row.add(12)),
                    ]
                } else {
                    let mut padded = [0.0f32; W];
                    for (j, slot) in padded.iter_mut().enumerate().take(cols) {
                        *slot = *b_row.add(j);
                    }
                    [
                        load4(padded.as_ptr()),
                        load4(padded.as_ptr().add(4)),
                        load4(padded.as_ptr().add(8)),
                        load4(padded.as_ptr().add(12)),
                    ]
                };

                for (i, acc_row) in acc.iter_mut().enumerate().take(rows) {
                    let a_broadcast = f32x4::splat(*a.add(i * lda + p));
                    for (v, slot) in acc_row.iter_mut().enumerate() {
                        *slot = a_broadcast.mul_add(b_vec[v], *slot);
                    }
                }
            }

            for (i, acc_row) in acc.iter().enumerate().take(rows) {
                let dst = c.add(i * ldc + x0);
                for j in 0..cols {
                    let vals: [f32; 4] = acc_row[j / 4].into();
                    let v = vals[j % 4];
                    let out = dst.add(j);
                    *out = if beta == 0.0 {
                        v.scale(alpha)
                    } else {
                        v.blend(alpha, *out, beta)
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{InterleavedTile, NativeTile};
    use gemm_core::{pack_a, pack_b, packed_a_size, packed_b_size, Transpose};

    fn matrix(rows: usize, cols: usize, seed: usize) -> Vec<f32> {
        (0..rows * cols)
            .map(|i| ((i * 7 + seed) % 13) as f32 - 6.0)
            .collect()
    }

    #[test]
    fn test_sgemm_interleaved_matches_portable() {
        let (m, n, k) = (8usize, 24usize, 9usize);
        let a = matrix(m, k, 1);
        let b = matrix(k, n, 5);

        let mut ap = vec![0.0f32; packed_a_size(m, k, 8)];
        let mut bp = vec![0.0f32; packed_b_size(k, n, 12)];
        unsafe {
            pack_a(m, k, a.as_ptr(), k, Transpose::NoTrans, ap.as_mut_ptr(), 8, k);
            pack_b(k, n, b.as_ptr(), n, Transpose::NoTrans, bp.as_mut_ptr(), 12, k);
        }

        let mut fast = vec![0.0f32; m * n];
        let mut slow = vec![0.0f32; m * n];
        unsafe {
            SgemmInterleaved8x12.kernel(ap.as_ptr(), bp.as_ptr(), fast.as_mut_ptr(), 2, k);
            InterleavedTile::<f32, f32, 12, 8, 1>::default().kernel(
                ap.as_ptr(),
                bp.as_ptr(),
                slow.as_mut_ptr(),
                2,
                k,
            );
        }
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_sgemm_native_matches_portable() {
        let (m, n, k) = (3usize, 21usize, 5usize);
        let a = matrix(m, k, 2);
        let b = matrix(k, n, 3);
        let mut fast = vec![1.0f32; m * n];
        let mut slow = vec![1.0f32; m * n];

        unsafe {
            SgemmNative16x4.kernel(
                a.as_ptr(),
                k,
                b.as_ptr(),
                n,
                fast.as_mut_ptr(),
                n,
                0.5,
                2.0,
                m,
                n,
                k,
            );
            NativeTile::<f32, f32, 16, 4>::default().kernel(
                a.as_ptr(),
                k,
                b.as_ptr(),
                n,
                slow.as_mut_ptr(),
                n,
                0.5,
                2.0,
                m,
                n,
                k,
            );
        }
        assert_eq!(fast, slow);
    }
}
