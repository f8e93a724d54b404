use crate::DataType;
use half::f16;
use std::fmt::Debug;

/// Trait for scalar types that can be stored in a GEMM operand or result.
pub trait Element: Copy + Send + Sync + Debug + PartialEq + Default + 'static {
    /// Runtime tag of this type.
    const DATA_TYPE: DataType;

    /// The additive identity.
    fn zero() -> Self;

    /// The multiplicative identity.
    fn one() -> Self;

    /// Convert from `f32`, saturating for integer types.
    fn from_f32(value: f32) -> Self;

    /// Convert to `f32`.
    fn to_f32(self) -> f32;
}

/// Trait for types that accumulate dot products.
///
/// Integer accumulators wrap on overflow.
pub trait Accumulator: Element {
    /// Accumulator addition.
    fn acc_add(self, rhs: Self) -> Self;

    /// Multiply by a host scalar.
    fn scale(self, alpha: f32) -> Self;

    /// `alpha * self + beta * prev`.
    #[inline(always)]
    fn blend(self, alpha: f32, prev: Self, beta: f32) -> Self {
        self.scale(alpha).acc_add(prev.scale(beta))
    }
}

/// Trait for operand types whose products are accumulated in `Acc`.
pub trait Operand<Acc: Accumulator>: Element {
    /// Multiply two operands, widening into the accumulator type.
    fn mul_widen(self, rhs: Self) -> Acc;
}

/// 8-bit types that can be produced by requantizing an accumulator.
pub trait QuantizedElement: Element {
    /// Accumulator type of the widening multiply.
    type Acc: Accumulator;

    /// Widen to `i32`.
    fn to_i32(self) -> i32;

    /// Reinterpret an accumulator as `i32`.
    fn acc_to_i32(acc: Self::Acc) -> i32;

    /// Narrow from `i32`, saturating at the type bounds.
    fn saturate_from(value: i32) -> Self;
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    #[inline(always)]
    fn zero() -> Self {
        0.0
    }

    #[inline(always)]
    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for f16 {
    const DATA_TYPE: DataType = DataType::F16;

    #[inline(always)]
    fn zero() -> Self {
        f16::ZERO
    }

    #[inline(always)]
    fn one() -> Self {
        f16::ONE
    }

    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

macro_rules! impl_element_int {
    ($($t:ty => $dt:expr),*) => {
        $(
            impl Element for $t {
                const DATA_TYPE: DataType = $dt;

                #[inline(always)]
                fn zero() -> Self {
                    0
                }

                #[inline(always)]
                fn one() -> Self {
                    1
                }

                #[inline(always)]
                fn from_f32(value: f32) -> Self {
                    value as $t
                }

                #[inline(always)]
                fn to_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

impl_element_int!(
    i8 => DataType::S8,
    u8 => DataType::U8,
    i32 => DataType::S32,
    u32 => DataType::U32
);

impl Accumulator for f32 {
    #[inline(always)]
    fn acc_add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline(always)]
    fn scale(self, alpha: f32) -> Self {
        self * alpha
    }
}

impl Accumulator for f16 {
    #[inline(always)]
    fn acc_add(self, rhs: Self) -> Self {
        f16::from_f32(f16::to_f32(self) + f16::to_f32(rhs))
    }

    #[inline(always)]
    fn scale(self, alpha: f32) -> Self {
        f16::from_f32(f16::to_f32(self) * alpha)
    }
}

macro_rules! impl_accumulator_int {
    ($($t:ty),*) => {
        $(
            impl Accumulator for $t {
                #[inline(always)]
                fn acc_add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                #[inline(always)]
                fn scale(self, alpha: f32) -> Self {
                    if alpha == 1.0 {
                        self
                    } else {
                        self.wrapping_mul(alpha as $t)
                    }
                }
            }
        )*
    };
}

impl_accumulator_int!(i32, u32);

impl Operand<f32> for f32 {
    #[inline(always)]
    fn mul_widen(self, rhs: Self) -> f32 {
        self * rhs
    }
}

impl Operand<f16> for f16 {
    #[inline(always)]
    fn mul_widen(self, rhs: Self) -> f16 {
        f16::from_f32(f16::to_f32(self) * f16::to_f32(rhs))
    }
}

impl Operand<i32> for i8 {
    #[inline(always)]
    fn mul_widen(self, rhs: Self) -> i32 {
        self as i32 * rhs as i32
    }
}

impl Operand<u32> for u8 {
    #[inline(always)]
    fn mul_widen(self, rhs: Self) -> u32 {
        self as u32 * rhs as u32
    }
}

impl QuantizedElement for u8 {
    type Acc = u32;

    #[inline(always)]
    fn to_i32(self) -> i32 {
        self as i32
    }

    #[inline(always)]
    fn acc_to_i32(acc: u32) -> i32 {
        acc as i32
    }

    #[inline(always)]
    fn saturate_from(value: i32) -> Self {
        value.clamp(u8::MIN as i32, u8::MAX as i32) as u8
    }
}

impl QuantizedElement for i8 {
    type Acc = i32;

    #[inline(always)]
    fn to_i32(self) -> i32 {
        self as i32
    }

    #[inline(always)]
    fn acc_to_i32(acc: i32) -> i32 {
        acc
    }

    #[inline(always)]
    fn saturate_from(value: i32) -> Self {
        value.clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }
}
