use gemm_types::{Accumulator, Element};

/// Transpose specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    /// No transpose.
    NoTrans,
    /// The matrix is stored transposed.
    Trans,
}

impl From<bool> for Transpose {
    fn from(transposed: bool) -> Self {
        if transposed {
            Transpose::Trans
        } else {
            Transpose::NoTrans
        }
    }
}

/// Pack a panel of matrix A into a contiguous buffer.
///
/// The packed format stores rows in column-major order within blocks of
/// `mr` rows. Rows past `m` and columns past `k` (up to `k_pad`) are zero.
///
/// # Layout
/// ```text
/// Original A (m=6, k=3, mr=4, k_pad=4):
/// [ a00 a01 a02 ]
/// [ a10 a11 a12 ]
/// [ a20 a21 a22 ]
/// [ a30 a31 a32 ]
/// [ a40 a41 a42 ]
/// [ a50 a51 a52 ]
///
/// Packed:
/// Block 0: a00 a10 a20 a30 | a01 a11 a21 a31 | a02 a12 a22 a32 | 0 0 0 0
/// Block 1: a40 a50 0   0   | a41 a51 0   0   | a42 a52 0   0   | 0 0 0 0
/// ```
///
/// # Safety
/// - `a` must be valid for an `m x k` matrix with leading dimension `lda`
/// - `packed` must have capacity for `packed_a_size(m, k_pad, mr)` elements
#[allow(clippy::too_many_arguments)]
pub unsafe fn pack_a<T: Element>(
    m: usize,
    k: usize,
    a: *const T,
    lda: usize,
    trans: Transpose,
    packed: *mut T,
    mr: usize,
    k_pad: usize,
) {
    debug_assert!(k <= k_pad);
    let zero = T::zero();
    let mut packed_idx = 0;

    for row_start in (0..m).step_by(mr) {
        for col in 0..k_pad {
            for row_offset in 0..mr {
                let row = row_start + row_offset;
                let val = if row < m && col < k {
                    get_element(a, row, col, lda, trans)
                } else {
                    zero
                };
                *packed.add(packed_idx) = val;
                packed_idx += 1;
            }
        }
    }
}

/// Pack a panel of matrix B into a contiguous buffer.
///
/// The packed format stores rows in row-major order within blocks of
/// `nr` columns. Columns past `n` and rows past `k` (up to `k_pad`) are zero.
///
/// # Layout
/// ```text
/// Original B (k=3, n=6, nr=4, k_pad=3):
/// [ b00 b01 b02 b03 b04 b05 ]
/// [ b10 b11 b12 b13 b14 b15 ]
/// [ b20 b21 b22 b23 b24 b25 ]
///
/// Packed:
/// Block 0: b00 b01 b02 b03 | b10 b11 b12 b13 | b20 b21 b22 b23
/// Block 1: b04 b05 0   0   | b14 b15 0   0   | b24 b25 0   0
/// ```
///
/// # Safety
/// - `b` must be valid for a `k x n` matrix with leading dimension `ldb`
/// - `packed` must have capacity for `packed_b_size(k_pad, n, nr)` elements
#[allow(clippy::too_many_arguments)]
pub unsafe fn pack_b<T: Element>(
    k: usize,
    n: usize,
    b: *const T,
    ldb: usize,
    trans: Transpose,
    packed: *mut T,
    nr: usize,
    k_pad: usize,
) {
    debug_assert!(k <= k_pad);
    let zero = T::zero();
    let mut packed_idx = 0;

    for col_start in (0..n).step_by(nr) {
        for row in 0..k_pad {
            for col_offset in 0..nr {
                let col = col_start + col_offset;
                let val = if col < n && row < k {
                    get_element(b, row, col, ldb, trans)
                } else {
                    zero
                };
                *packed.add(packed_idx) = val;
                packed_idx += 1;
            }
        }
    }
}

/// Buffer size for packed A.
pub fn packed_a_size(m: usize, k_pad: usize, mr: usize) -> usize {
    m.div_ceil(mr) * mr * k_pad
}

/// Buffer size for packed B.
pub fn packed_b_size(k_pad: usize, n: usize, nr: usize) -> usize {
    n.div_ceil(nr) * nr * k_pad
}

/// Pointer to element `(row, col)` of a logical matrix, honouring transposition.
///
/// # Safety
/// The element must lie inside the allocation `a` points into.
#[inline]
pub unsafe fn panel_ptr<T>(a: *const T, row: usize, col: usize, ld: usize, trans: Transpose) -> *const T {
    match trans {
        Transpose::NoTrans => a.add(row * ld + col),
        Transpose::Trans => a.add(col * ld + row),
    }
}

#[inline]
unsafe fn get_element<T: Copy>(a: *const T, row: usize, col: usize, ld: usize, trans: Transpose) -> T {
    *panel_ptr(a, row, col, ld, trans)
}

/// Merge a scratch result panel into C as `alpha * panel + beta * C`.
///
/// C is not read when `beta == 0`.
///
/// # Safety
/// - `panel` must be valid for `rows` rows of `cols` elements at stride `panel_ld`
/// - `c` must be valid for `rows` rows of `cols` elements at stride `ldc`
#[allow(clippy::too_many_arguments)]
pub unsafe fn merge_panel<T: Accumulator>(
    panel: *const T,
    panel_ld: usize,
    rows: usize,
    cols: usize,
    c: *mut T,
    ldc: usize,
    alpha: f32,
    beta: f32,
) {
    for i in 0..rows {
        let src = panel.add(i * panel_ld);
        let dst = c.add(i * ldc);
        for j in 0..cols {
            let v = *src.add(j);
            let out = dst.add(j);
            *out = if beta == 0.0 {
                v.scale(alpha)
            } else {
                v.blend(alpha, *out, beta)
            };
        }
    }
}
