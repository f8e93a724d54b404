//! Reference requantization routines.
//!
//! Integer GEMMs accumulate raw products; the zero points of A and B are
//! folded back in afterwards as a per-row and a per-column correction:
//!
//! ```text
//! sum_k (A - a_off)(B - b_off) = sum_k A*B
//!                              - b_off * rowsum(A)
//!                              + a_off * b_off * K - a_off * colsum(B)
//! ```

use crate::packing::{panel_ptr, Transpose};
use gemm_types::{QuantizedElement, Requantize32};

/// Fixed-point multiply returning the high half of `2 * a * b`, rounded.
#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Divide by `2^exponent`, rounding half away from zero.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!((0..=31).contains(&exponent));
    if exponent <= 0 {
        return x;
    }
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i32::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// Rescale one corrected accumulator for output column `col`.
#[inline]
pub fn requantize_value(qp: &Requantize32, value: i32, col: usize) -> i32 {
    let (mul, shift) = qp.params_for(col);
    let left = shift.clamp(0, 31) as u32;
    let right = (-shift).clamp(0, 31);

    let v = saturating_rounding_doubling_high_mul(value.wrapping_shl(left), mul);
    let v = rounding_divide_by_pot(v, right).wrapping_add(qp.c_offset);
    v.max(qp.minval).min(qp.maxval)
}

/// Row corrections `-b_offset * rowsum(A)` for `rows` rows of A.
///
/// # Safety
/// `a` must be valid for a `rows x k` matrix with leading dimension `lda`.
pub unsafe fn compute_row_sums<T: QuantizedElement>(
    qp: &Requantize32,
    rows: usize,
    k: usize,
    a: *const T,
    lda: usize,
    trans: Transpose,
    out: &mut [i32],
) {
    assert!(out.len() >= rows);
    if qp.b_offset == 0 {
        out[..rows].fill(0);
        return;
    }
    for (row, slot) in out.iter_mut().enumerate().take(rows) {
        let mut sum = 0i32;
        for p in 0..k {
            sum = sum.wrapping_add((*panel_ptr(a, row, p, lda, trans)).to_i32());
        }
        *slot = sum.wrapping_mul(-qp.b_offset);
    }
}

/// Column corrections `a_offset * b_offset * K - a_offset * colsum(B)` for `n` columns of B.
///
/// # Safety
/// `b` must be valid for a `k x n` matrix with leading dimension `ldb`.
pub unsafe fn compute_col_sums<T: QuantizedElement>(
    qp: &Requantize32,
    n: usize,
    k: usize,
    b: *const T,
    ldb: usize,
    trans: Transpose,
    out: &mut [i32],
) {
    assert!(out.len() >= n);
    let constant = qp
        .a_offset
        .wrapping_mul(qp.b_offset)
        .wrapping_mul(k as i32);
    for (col, slot) in out.iter_mut().enumerate().take(n) {
        let mut sum = 0i32;
        if qp.a_offset != 0 {
            for p in 0..k {
                sum = sum.wrapping_add((*panel_ptr(b, p, col, ldb, trans)).to_i32());
            }
        }
        *slot = constant.wrapping_sub(sum.wrapping_mul(qp.a_offset));
    }
}

/// Requantize a block of accumulators into 8-bit output.
///
/// `row_bias` and `col_bias` are the corrections for this block's rows and
/// columns; `bias` (if any) is added per column. `channel_start` is the
/// output column of the block's first column, used for per-channel
/// parameters.
///
/// # Safety
/// - `input` must be valid for `rows` rows of `cols` elements at stride `in_ld`
/// - `output` must be valid for `rows` rows of `cols` elements at stride `out_ld`
#[allow(clippy::too_many_arguments)]
pub unsafe fn requantize_block<T: QuantizedElement>(
    qp: &Requantize32,
    rows: usize,
    cols: usize,
    input: *const T::Acc,
    in_ld: usize,
    output: *mut T,
    out_ld: usize,
    row_bias: &[i32],
    col_bias: &[i32],
    bias: Option<&[i32]>,
    channel_start: usize,
) {
    assert!(row_bias.len() >= rows && col_bias.len() >= cols);
    if let Some(bias) = bias {
        assert!(bias.len() >= cols);
    }

    for (i, &row_term) in row_bias.iter().enumerate().take(rows) {
        let src = input.add(i * in_ld);
        let dst = output.add(i * out_ld);
        for (j, &col_term) in col_bias.iter().enumerate().take(cols) {
            let mut v = T::acc_to_i32(*src.add(j))
                .wrapping_add(row_term)
                .wrapping_add(col_term);
            if let Some(bias) = bias {
                v = v.wrapping_add(bias[j]);
            }
            *dst.add(j) = T::saturate_from(requantize_value(qp, v, channel_start + j));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_qp(a_offset: i32, b_offset: i32) -> Requantize32 {
        Requantize32::per_layer(a_offset, b_offset, 0, i32::MAX, 0, -100_000, 100_000)
    }

    #[test]
    fn test_sqrdmulh() {
        assert_eq!(saturating_rounding_doubling_high_mul(100, i32::MAX), 100);
        assert_eq!(saturating_rounding_doubling_high_mul(-100, i32::MAX), -100);
        assert_eq!(saturating_rounding_doubling_high_mul(100, 1 << 30), 50);
        assert_eq!(
            saturating_rounding_doubling_high_mul(i32::MIN, i32::MIN),
            i32::MAX
        );
    }

    #[test]
    fn test_rounding_divide_by_pot() {
        assert_eq!(rounding_divide_by_pot(5, 1), 3);
        assert_eq!(rounding_divide_by_pot(-5, 1), -3);
        assert_eq!(rounding_divide_by_pot(4, 1), 2);
        assert_eq!(rounding_divide_by_pot(7, 2), 2);
        assert_eq!(rounding_divide_by_pot(9, 0), 9);
    }

    #[test]
    fn test_requantize_value_clamps() {
        let qp = Requantize32::per_layer(0, 0, 10, i32::MAX, -1, 0, 255);
        assert_eq!(requantize_value(&qp, 100, 0), 60);
        assert_eq!(requantize_value(&qp, 1000, 0), 255);
        assert_eq!(requantize_value(&qp, -100, 0), 0);
    }

    #[test]
    fn test_requantize_value_left_shift() {
        let qp = Requantize32::per_layer(0, 0, 0, 1 << 30, 2, -1000, 1000);
        // (7 << 2) * 0.5
        assert_eq!(requantize_value(&qp, 7, 0), 14);
    }

    #[test]
    fn test_requantize_value_per_channel() {
        let qp = Requantize32::per_layer(0, 0, 0, i32::MAX, 0, -1000, 1000)
            .with_per_channel(vec![i32::MAX, 1 << 30], vec![0, 0]);
        assert_eq!(requantize_value(&qp, 40, 0), 40);
        assert_eq!(requantize_value(&qp, 40, 1), 20);
    }

    #[test]
    fn test_row_sums() {
        let a: [u8; 6] = [1, 2, 3, 4, 5, 6];
        let mut out = [0i32; 2];
        unsafe {
            compute_row_sums(&unit_qp(0, 2), 2, 3, a.as_ptr(), 3, Transpose::NoTrans, &mut out)
        };
        assert_eq!(out, [-12, -30]);
    }

    #[test]
    fn test_row_sums_zero_offset() {
        let a: [u8; 2] = [9, 9];
        let mut out = [5i32; 1];
        unsafe {
            compute_row_sums(&unit_qp(3, 0), 1, 2, a.as_ptr(), 2, Transpose::NoTrans, &mut out)
        };
        assert_eq!(out, [0]);
    }

    #[test]
    fn test_col_sums() {
        let b: [u8; 6] = [1, 2, 3, 4, 5, 6];
        let mut out = [0i32; 2];
        unsafe {
            compute_col_sums(&unit_qp(1, 2), 2, 3, b.as_ptr(), 2, Transpose::NoTrans, &mut out)
        };
        assert_eq!(out, [-3, -6]);
    }

    #[test]
    fn test_offset_correction_matches_direct() {
        let (m, n, k) = (3usize, 2usize, 4usize);
        let a: Vec<i8> = (0..m * k).map(|i| (i as i8) * 3 - 10).collect();
        let b: Vec<i8> = (0..k * n).map(|i| 7 - (i as i8) * 2).collect();
        let qp = unit_qp(-3, 5);

        let mut rows = vec![0i32; m];
        let mut cols = vec![0i32; n];
        unsafe {
            compute_row_sums(&qp, m, k, a.as_ptr(), k, Transpose::NoTrans, &mut rows);
            compute_col_sums(&qp, n, k, b.as_ptr(), n, Transpose::NoTrans, &mut cols);
        }

        for i in 0..m {
            for j in 0..n {
                let mut raw = 0i32;
                let mut direct = 0i32;
                for p in 0..k {
                    let av = a[i * k + p] as i32;
                    let bv = b[p * n + j] as i32;
                    raw += av * bv;
                    direct += (av - qp.a_offset) * (bv - qp.b_offset);
                }
                assert_eq!(raw + rows[i] + cols[j], direct, "mismatch at ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_requantize_block() {
        let qp = Requantize32::per_layer(0, 0, 1, i32::MAX, 0, -128, 127);
        let acc: [i32; 4] = [10, 20, 300, -300];
        let mut out = [0i8; 4];
        unsafe {
            requantize_block::<i8>(
                &qp,
                2,
                2,
                acc.as_ptr(),
                2,
                out.as_mut_ptr(),
                2,
                &[1, 0],
                &[0, 2],
                Some(&[5, 5]),
                0,
            )
        };
        assert_eq!(out, [17, 29, 127, -128]);
    }
}
