use std::fmt;

/// Runtime tag for the element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit float.
    F32,
    /// 16-bit IEEE float.
    F16,
    /// Signed 8-bit integer.
    S8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 32-bit integer.
    S32,
    /// Unsigned 32-bit integer.
    U32,
    /// Asymmetric quantized unsigned 8-bit.
    QAsymm8,
    /// Asymmetric quantized signed 8-bit.
    QAsymm8Signed,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            DataType::F32 | DataType::S32 | DataType::U32 => 4,
            DataType::F16 => 2,
            DataType::S8 | DataType::U8 | DataType::QAsymm8 | DataType::QAsymm8Signed => 1,
        }
    }

    /// Whether values carry a scale and zero point.
    pub const fn is_quantized(self) -> bool {
        matches!(self, DataType::QAsymm8 | DataType::QAsymm8Signed)
    }

    /// The plain element type used to store values of this type.
    pub const fn storage(self) -> DataType {
        match self {
            DataType::QAsymm8 => DataType::U8,
            DataType::QAsymm8Signed => DataType::S8,
            other => other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::F32 => "F32",
            DataType::F16 => "F16",
            DataType::S8 => "S8",
            DataType::U8 => "U8",
            DataType::S32 => "S32",
            DataType::U32 => "U32",
            DataType::QAsymm8 => "QASYMM8",
            DataType::QAsymm8Signed => "QASYMM8_SIGNED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_size() {
        assert_eq!(DataType::F32.element_size(), 4);
        assert_eq!(DataType::F16.element_size(), 2);
        assert_eq!(DataType::QAsymm8.element_size(), 1);
        assert_eq!(DataType::U32.element_size(), 4);
    }

    #[test]
    fn test_storage() {
        assert_eq!(DataType::QAsymm8.storage(), DataType::U8);
        assert_eq!(DataType::QAsymm8Signed.storage(), DataType::S8);
        assert_eq!(DataType::F32.storage(), DataType::F32);
    }

    #[test]
    fn test_is_quantized() {
        assert!(DataType::QAsymm8.is_quantized());
        assert!(!DataType::U8.is_quantized());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::QAsymm8Signed.to_string(), "QASYMM8_SIGNED");
        assert_eq!(DataType::F16.to_string(), "F16");
    }
}
