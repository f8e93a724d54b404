use std::fmt;
use std::ops::BitOr;

/// Set of instruction-set extensions a strategy may depend on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuFeatures {
    bits: u32,
}

impl CpuFeatures {
    /// Advanced SIMD (128-bit NEON).
    pub const NEON: Self = Self { bits: 1 << 0 };
    /// Signed/unsigned 8-bit dot product.
    pub const DOTPROD: Self = Self { bits: 1 << 1 };
    /// 8-bit integer matrix multiply.
    pub const I8MM: Self = Self { bits: 1 << 2 };
    /// Half-precision vector arithmetic.
    pub const FP16: Self = Self { bits: 1 << 3 };
    /// BFloat16 arithmetic.
    pub const BF16: Self = Self { bits: 1 << 4 };
    /// Scalable vector extension.
    pub const SVE: Self = Self { bits: 1 << 5 };

    const NAMES: [(CpuFeatures, &'static str); 6] = [
        (Self::NEON, "neon"),
        (Self::DOTPROD, "dotprod"),
        (Self::I8MM, "i8mm"),
        (Self::FP16, "fp16"),
        (Self::BF16, "bf16"),
        (Self::SVE, "sve"),
    ];

    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Whether every feature in `other` is also in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.bits |= other.bits;
    }

    pub fn remove(&mut self, other: Self) {
        self.bits &= !other.bits;
    }
}

impl BitOr for CpuFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for CpuFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (feature, name) in Self::NAMES {
            if self.contains(feature) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

impl fmt::Display for CpuFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (feature, name) in Self::NAMES {
            if self.contains(feature) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Cache sizes, core count and instruction-set capabilities of a CPU.
///
/// Values are plain data so that selection and blocking can be driven by
/// synthetic profiles in tests. The probed profile of the running machine
/// lives in `gemm_kernels::cpu_info()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuInfo {
    l1_cache_size: usize,
    l2_cache_size: usize,
    num_cpus: usize,
    features: CpuFeatures,
    sve_vector_length: usize,
}

impl CpuInfo {
    /// L1 data cache size assumed when probing fails.
    pub const DEFAULT_L1_CACHE_SIZE: usize = 32 * 1024;
    /// L2 cache size assumed when probing fails.
    pub const DEFAULT_L2_CACHE_SIZE: usize = 512 * 1024;

    pub const fn new(
        l1_cache_size: usize,
        l2_cache_size: usize,
        num_cpus: usize,
        features: CpuFeatures,
    ) -> Self {
        Self {
            l1_cache_size,
            l2_cache_size,
            num_cpus,
            features,
            sve_vector_length: 0,
        }
    }

    /// Single core, default caches, no extensions.
    pub const fn generic() -> Self {
        Self::new(
            Self::DEFAULT_L1_CACHE_SIZE,
            Self::DEFAULT_L2_CACHE_SIZE,
            1,
            CpuFeatures::empty(),
        )
    }

    pub fn with_l1_cache_size(mut self, bytes: usize) -> Self {
        self.l1_cache_size = bytes;
        self
    }

    pub fn with_l2_cache_size(mut self, bytes: usize) -> Self {
        self.l2_cache_size = bytes;
        self
    }

    pub fn with_num_cpus(mut self, num_cpus: usize) -> Self {
        self.num_cpus = num_cpus;
        self
    }

    pub fn with_features(mut self, features: CpuFeatures) -> Self {
        self.features = features;
        self
    }

    /// Set the SVE vector length in bytes; a non-zero length implies SVE.
    pub fn with_sve_vector_length(mut self, bytes: usize) -> Self {
        self.sve_vector_length = bytes;
        if bytes > 0 {
            self.features.insert(CpuFeatures::SVE);
        } else {
            self.features.remove(CpuFeatures::SVE);
        }
        self
    }

    pub fn l1_cache_size(&self) -> usize {
        self.l1_cache_size
    }

    pub fn l2_cache_size(&self) -> usize {
        self.l2_cache_size
    }

    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    pub fn features(&self) -> CpuFeatures {
        self.features
    }

    pub fn sve_vector_length(&self) -> usize {
        self.sve_vector_length
    }

    /// Whether all of `required` is available.
    pub fn has(&self, required: CpuFeatures) -> bool {
        self.features.contains(required)
    }
}

impl Default for CpuInfo {
    fn default() -> Self {
        Self::generic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_contains() {
        let f = CpuFeatures::NEON | CpuFeatures::DOTPROD;
        assert!(f.contains(CpuFeatures::NEON));
        assert!(f.contains(CpuFeatures::empty()));
        assert!(!f.contains(CpuFeatures::NEON | CpuFeatures::I8MM));
    }

    #[test]
    fn test_feature_display() {
        assert_eq!(CpuFeatures::empty().to_string(), "none");
        assert_eq!(
            (CpuFeatures::FP16 | CpuFeatures::NEON).to_string(),
            "neon fp16"
        );
        assert_eq!(format!("{:?}", CpuFeatures::I8MM), "{i8mm}");
    }

    #[test]
    fn test_generic_profile() {
        let ci = CpuInfo::generic();
        assert_eq!(ci.l1_cache_size(), 32 * 1024);
        assert_eq!(ci.l2_cache_size(), 512 * 1024);
        assert_eq!(ci.num_cpus(), 1);
        assert!(ci.features().is_empty());
        assert_eq!(ci, CpuInfo::default());
    }

    #[test]
    fn test_builder() {
        let ci = CpuInfo::generic()
            .with_l2_cache_size(2 * 1024 * 1024)
            .with_num_cpus(8)
            .with_features(CpuFeatures::NEON | CpuFeatures::FP16);
        assert_eq!(ci.l2_cache_size(), 2 * 1024 * 1024);
        assert_eq!(ci.num_cpus(), 8);
        assert!(ci.has(CpuFeatures::FP16));
        assert!(!ci.has(CpuFeatures::DOTPROD));
    }

    #[test]
    fn test_sve_vector_length() {
        let ci = CpuInfo::generic().with_sve_vector_length(32);
        assert!(ci.has(CpuFeatures::SVE));
        assert_eq!(ci.sve_vector_length(), 32);

        let ci = ci.with_sve_vector_length(0);
        assert!(!ci.has(CpuFeatures::SVE));
    }
}
