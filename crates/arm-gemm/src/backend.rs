use gemm_core::CpuFeatures;
use gemm_kernels::cpu_info;

/// Instruction sets the catalogs can target on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Portable tiles only.
    Portable,
    /// AArch64 strategies are eligible.
    Neon,
}

impl Backend {
    /// Get the backend implied by the process-wide CPU profile.
    pub fn current() -> Self {
        if cpu_info().has(CpuFeatures::NEON) {
            Backend::Neon
        } else {
            Backend::Portable
        }
    }

    /// Get a description of the detected vector capabilities.
    pub fn description() -> String {
        let features = cpu_info().features();
        match Self::current() {
            Backend::Portable => "Portable (no NEON)".to_string(),
            Backend::Neon if features.contains(CpuFeatures::SVE) => {
                format!("ARM NEON + SVE ({}-byte vectors)", cpu_info().sve_vector_length())
            }
            Backend::Neon if features.contains(CpuFeatures::I8MM) => {
                "ARM NEON (128-bit) with int8 matrix multiply".to_string()
            }
            Backend::Neon if features.contains(CpuFeatures::DOTPROD) => {
                "ARM NEON (128-bit) with dot product".to_string()
            }
            Backend::Neon => "ARM NEON (128-bit)".to_string(),
        }
    }
}

/// Get information about the library configuration.
pub fn version_info() -> String {
    let ci = cpu_info();
    format!(
        "arm-gemm v{}\nBackend: {}\nCPU features: {}\nCaches: L1 {} KiB, L2 {} KiB\nThreads: {}",
        env!("CARGO_PKG_VERSION"),
        Backend::description(),
        ci.features(),
        ci.l1_cache_size() / 1024,
        ci.l2_cache_size() / 1024,
        ci.num_cpus()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detection() {
        let backend = Backend::current();
        println!("Current backend: {:?}", backend);
        println!("Version info:\n{}", version_info());
        assert_eq!(backend == Backend::Neon, cpu_info().has(CpuFeatures::NEON));
    }

    #[test]
    fn test_backend_description_not_empty() {
        let desc = Backend::description();
        assert!(desc.contains("Portable") || desc.contains("NEON"));
    }

    #[test]
    fn test_version_info_format() {
        let info = version_info();
        assert!(info.contains("arm-gemm v"));
        assert!(info.contains("Backend:"));
        assert!(info.contains("CPU features:"));
        assert!(info.contains("L1"));
    }

    #[test]
    fn test_backend_eq() {
        assert_eq!(Backend::Portable, Backend::Portable);
        assert_ne!(Backend::Portable, Backend::Neon);
        assert_eq!(format!("{:?}", Backend::Neon), "Neon");
    }
}
