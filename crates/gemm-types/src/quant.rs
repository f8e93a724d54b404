/// Parameters for rescaling 32-bit accumulators into 8-bit outputs.
///
/// Offsets are zero points: the product computed is
/// `sum_k (A[i,k] - a_offset) * (B[k,j] - b_offset)`, which is then
/// scaled by a fixed-point multiplier, shifted, offset by `c_offset`
/// and clamped to `[minval, maxval]`.
///
/// Shifts follow the sign convention `> 0` for a left shift before the
/// multiply and `< 0` for a rounding right shift after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requantize32 {
    pub a_offset: i32,
    pub b_offset: i32,
    pub c_offset: i32,
    pub per_layer_mul: i32,
    pub per_layer_shift: i32,
    /// Per output column multipliers, overriding `per_layer_mul`.
    pub per_channel_muls: Option<Vec<i32>>,
    /// Per output column shifts, overriding `per_layer_shift`.
    pub per_channel_shifts: Option<Vec<i32>>,
    pub minval: i32,
    pub maxval: i32,
}

impl Requantize32 {
    /// Uniform multiplier and shift for every output column.
    pub fn per_layer(
        a_offset: i32,
        b_offset: i32,
        c_offset: i32,
        mul: i32,
        shift: i32,
        minval: i32,
        maxval: i32,
    ) -> Self {
        Self {
            a_offset,
            b_offset,
            c_offset,
            per_layer_mul: mul,
            per_layer_shift: shift,
            per_channel_muls: None,
            per_channel_shifts: None,
            minval,
            maxval,
        }
    }

    /// Switch to per-column multipliers and shifts.
    pub fn with_per_channel(mut self, muls: Vec<i32>, shifts: Vec<i32>) -> Self {
        assert_eq!(
            muls.len(),
            shifts.len(),
            "per-channel multipliers and shifts must have the same length"
        );
        self.per_channel_muls = Some(muls);
        self.per_channel_shifts = Some(shifts);
        self
    }

    /// Whether per-column parameters are in use.
    pub fn is_per_channel(&self) -> bool {
        self.per_channel_muls.is_some()
    }

    /// Number of columns with per-channel parameters, `None` for per-layer.
    ///
    /// Fields are public, so the two vectors may disagree; the shorter one counts.
    pub fn channels(&self) -> Option<usize> {
        match (&self.per_channel_muls, &self.per_channel_shifts) {
            (None, None) => None,
            (muls, shifts) => Some(
                muls.as_ref()
                    .map_or(0, Vec::len)
                    .min(shifts.as_ref().map_or(0, Vec::len)),
            ),
        }
    }

    /// Whether parameters exist for every one of `n` output columns.
    pub fn covers(&self, n: usize) -> bool {
        self.channels().is_none_or(|channels| channels >= n)
    }

    /// Multiplier and shift for output column `col`.
    #[inline]
    pub fn params_for(&self, col: usize) -> (i32, i32) {
        match (&self.per_channel_muls, &self.per_channel_shifts) {
            (Some(muls), Some(shifts)) => (muls[col], shifts[col]),
            _ => (self.per_layer_mul, self.per_layer_shift),
        }
    }
}

/// Post-processing applied to accumulator results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputStage {
    /// Results are written as accumulated.
    #[default]
    Nothing,
    /// Results are requantized into 8-bit values.
    Requantize(Requantize32),
}

impl OutputStage {
    pub fn requantize(&self) -> Option<&Requantize32> {
        match self {
            OutputStage::Nothing => None,
            OutputStage::Requantize(qp) => Some(qp),
        }
    }
}
