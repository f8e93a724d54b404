use crate::cpu::CpuInfo;
use gemm_types::GemmMethod;

/// Override that bypasses the selection heuristics.
///
/// Zero block sizes and an empty filter mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GemmConfig {
    /// Only consider implementations of this method.
    pub method: GemmMethod,
    /// Only consider implementations whose name contains this string.
    pub filter: String,
    /// Forced `k_block`.
    pub inner_block_size: usize,
    /// Forced `x_block`.
    pub outer_block_size: usize,
}

impl GemmConfig {
    pub fn with_method(method: GemmMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    pub fn block_sizes(mut self, inner: usize, outer: usize) -> Self {
        self.inner_block_size = inner;
        self.outer_block_size = outer;
        self
    }

    /// Whether an implementation called `name` with `method` passes this override.
    pub fn admits(&self, method: GemmMethod, name: &str) -> bool {
        if self.method != GemmMethod::Default && self.method != method {
            return false;
        }
        self.filter.is_empty() || name.contains(self.filter.as_str())
    }
}

/// Description of one GEMM invocation, `C = alpha * A * B + beta * C`.
///
/// A is `m x k`, B is `k x n`. `nbatches` (A, C) pairs share one B;
/// `nmulti` fully independent problems are stacked on top of that.
///
/// # Example
///
/// ```
/// use gemm_core::{CpuInfo, GemmArgs};
///
/// let ci = CpuInfo::generic();
/// let args = GemmArgs::new(&ci, 128, 64, 256)
///     .batches(4)
///     .max_threads(8)
///     .pretransposed();
///
/// assert_eq!(args.nbatches, 4);
/// assert!(args.pretransposed_hint);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GemmArgs {
    pub ci: CpuInfo,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub nbatches: usize,
    pub nmulti: usize,
    pub tr_a: bool,
    pub tr_b: bool,
    pub alpha: f32,
    pub beta: f32,
    pub max_threads: usize,
    pub pretransposed_hint: bool,
    pub cfg: Option<GemmConfig>,
}

impl GemmArgs {
    /// A single, untransposed problem with `alpha = 1` and `beta = 0`.
    pub fn new(ci: &CpuInfo, m: usize, n: usize, k: usize) -> Self {
        Self {
            ci: *ci,
            m,
            n,
            k,
            nbatches: 1,
            nmulti: 1,
            tr_a: false,
            tr_b: false,
            alpha: 1.0,
            beta: 0.0,
            max_threads: 1,
            pretransposed_hint: false,
            cfg: None,
        }
    }

    pub fn batches(mut self, nbatches: usize) -> Self {
        self.nbatches = nbatches;
        self
    }

    pub fn multis(mut self, nmulti: usize) -> Self {
        self.nmulti = nmulti;
        self
    }

    pub fn trans_a(mut self) -> Self {
        self.tr_a = true;
        self
    }

    pub fn trans_b(mut self) -> Self {
        self.tr_b = true;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// B will be packed once and reused.
    pub fn pretransposed(mut self) -> Self {
        self.pretransposed_hint = true;
        self
    }

    pub fn config(mut self, cfg: GemmConfig) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Whether the problem has no work at all.
    pub fn is_degenerate(&self) -> bool {
        self.m == 0 || self.n == 0 || self.k == 0 || self.nbatches == 0 || self.nmulti == 0
    }

    /// The configured override, or an empty one.
    pub fn config_or_default(&self) -> GemmConfig {
        self.cfg.clone().unwrap_or_default()
    }
}
