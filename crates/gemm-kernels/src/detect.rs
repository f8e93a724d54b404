//! CPU feature and cache probing.
//!
//! Instruction-set extensions come from `std::arch` runtime detection,
//! cache sizes from sysfs on Linux. Anything that cannot be probed falls
//! back to the defaults of [`CpuInfo`]. The probed profile is computed
//! once per process and cached; [`init_cpu_info`] installs a fixed
//! profile instead, which must happen before the first [`cpu_info`] call.

use gemm_core::{CpuFeatures, CpuInfo};
use once_cell::sync::OnceCell;
use tracing::debug;

/// Global cached CPU profile.
static CPU_INFO: OnceCell<CpuInfo> = OnceCell::new();

/// Get the process-wide CPU profile, probing it on first use.
pub fn cpu_info() -> &'static CpuInfo {
    CPU_INFO.get_or_init(|| {
        let info = CpuInfo::detect();
        debug!(
            l1 = info.l1_cache_size(),
            l2 = info.l2_cache_size(),
            cpus = info.num_cpus(),
            features = %info.features(),
            "probed cpu"
        );
        info
    })
}

/// Install `info` as the process-wide CPU profile.
///
/// Returns `false` (leaving the existing profile in place) if the profile
/// was already initialized.
pub fn init_cpu_info(info: CpuInfo) -> bool {
    let installed = CPU_INFO.set(info).is_ok();
    if installed {
        debug!(features = %info.features(), "installed cpu profile");
    }
    installed
}

/// Probing entry points for [`CpuInfo`].
pub trait DetectCpu {
    /// Probe the running machine.
    fn detect() -> Self;
}

impl DetectCpu for CpuInfo {
    fn detect() -> Self {
        let (l1, l2) = detect_cache_sizes();
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let info = CpuInfo::new(l1, l2, num_cpus, detect_features());
        match detect_sve_vector_length() {
            Some(vl) if info.has(CpuFeatures::SVE) => info.with_sve_vector_length(vl),
            _ => info,
        }
    }
}

/// Detect the instruction-set extensions available at runtime.
pub fn detect_features() -> CpuFeatures {
    #[allow(unused_mut)]
    let mut features = CpuFeatures::empty();

    #[cfg(target_arch = "aarch64")]
    {
        use std::arch::is_aarch64_feature_detected;

        if is_aarch64_feature_detected!("neon") {
            features.insert(CpuFeatures::NEON);
        }
        if is_aarch64_feature_detected!("dotprod") {
            features.insert(CpuFeatures::DOTPROD);
        }
        if is_aarch64_feature_detected!("i8mm") {
            features.insert(CpuFeatures::I8MM);
        }
        if is_aarch64_feature_detected!("fp16") {
            features.insert(CpuFeatures::FP16);
        }
        if is_aarch64_feature_detected!("bf16") {
            features.insert(CpuFeatures::BF16);
        }
        if is_aarch64_feature_detected!("sve") {
            features.insert(CpuFeatures::SVE);
        }
    }

    features
}

/// (L1D bytes, L2 bytes)
pub fn detect_cache_sizes() -> (usize, usize) {
    #[cfg(target_os = "linux")]
    {
        if let Some(sizes) = detect_sysfs_cache() {
            return sizes;
        }
    }
    (
        CpuInfo::DEFAULT_L1_CACHE_SIZE,
        CpuInfo::DEFAULT_L2_CACHE_SIZE,
    )
}

#[cfg(target_os = "linux")]
fn detect_sysfs_cache() -> Option<(usize, usize)> {
    let mut l1d: Option<usize> = None;
    let mut l2: Option<usize> = None;

    for idx in 0..8 {
        let base = format!("/sys/devices/system/cpu/cpu0/cache/index{idx}");
        let Ok(level) = std::fs::read_to_string(format!("{base}/level")) else {
            break;
        };
        let ctype = std::fs::read_to_string(format!("{base}/type")).ok()?;
        let size = std::fs::read_to_string(format!("{base}/size")).ok()?;

        let Some(size) = parse_cache_size(&size) else {
            continue;
        };
        match (level.trim().parse::<u32>().ok(), ctype.trim()) {
            (Some(1), "Data" | "Unified") => l1d = Some(size),
            (Some(2), "Data" | "Unified") => l2 = Some(size),
            _ => {}
        }
    }

    match (l1d, l2) {
        (Some(d), Some(u)) => Some((d, u)),
        _ => None,
    }
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn detect_sve_vector_length() -> Option<usize> {
    std::fs::read_to_string("/proc/sys/abi/sve_default_vector_length")
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(not(all(target_os = "linux", target_arch = "aarch64")))]
fn detect_sve_vector_length() -> Option<usize> {
    None
}

/// Parse a sysfs cache size such as `32K`, `2048K` or `8M`.
pub fn parse_cache_size(text: &str) -> Option<usize> {
    let text = text.trim();
    if let Some(kb) = text.strip_suffix('K') {
        kb.parse::<usize>().ok().map(|v| v * 1024)
    } else if let Some(mb) = text.strip_suffix('M') {
        mb.parse::<usize>().ok().map(|v| v * 1024 * 1024)
    } else {
        text.parse::<usize>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_size() {
        assert_eq!(parse_cache_size("32K\n"), Some(32 * 1024));
        assert_eq!(parse_cache_size("8M"), Some(8 * 1024 * 1024));
        assert_eq!(parse_cache_size("65536"), Some(65536));
        assert_eq!(parse_cache_size("lots"), None);
    }

    #[test]
    fn test_detect() {
        let info = CpuInfo::detect();
        println!("Detected: {:?}", info);

        assert!(info.l1_cache_size() > 0);
        assert!(info.l2_cache_size() > 0);
        assert!(info.num_cpus() >= 1);

        #[cfg(target_arch = "aarch64")]
        assert!(info.has(CpuFeatures::NEON));

        #[cfg(not(target_arch = "aarch64"))]
        assert!(info.features().is_empty());
    }

    #[test]
    fn test_cpu_info_cached() {
        let first = cpu_info() as *const CpuInfo;
        let second = cpu_info() as *const CpuInfo;
        assert_eq!(first, second);
        assert!(!init_cpu_info(CpuInfo::generic()));
    }
}
