//! GEMM drivers.
//!
//! A driver owns the execution plan of one configured GEMM: its block
//! sizes, its iteration window, and the layout of any scratch memory. It
//! never allocates; callers query the sizes it needs, allocate, and hand
//! the memory back.
//!
//! Work is expressed as one or more stages. Each stage has a linear
//! window that a scheduler splits into granule-aligned ranges; all
//! ranges of a stage must finish before the next stage starts.

mod gemv;
mod hybrid;
mod hybrid_quantized;
mod interleaved;
mod native;
mod quantize_wrapper;

pub use gemv::{GemmGemv, GemvMode};
pub use hybrid::GemmHybrid;
pub use hybrid_quantized::GemmHybridQuantized;
pub use interleaved::GemmInterleaved;
pub use native::GemmNative;
pub use quantize_wrapper::QuantizeWrapper;

pub(crate) use hybrid_quantized::hybrid_quantized;
pub(crate) use quantize_wrapper::quantize_wrapper;

use gemm_core::{
    pack_b, panel_ptr, roundup, BlockSizes, BlockWalker, CpuInfo, GemmArgs, NdRange, TileShape,
    Transpose,
};
use gemm_types::Element;
use std::ops::Range;

/// Alignment of working space and pretransposed buffers.
pub const WORKSPACE_ALIGNMENT: usize = 64;

/// Identity of the worker executing a range.
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo {
    pub thread_id: usize,
    pub num_threads: usize,
    pub cpu_info: CpuInfo,
}

impl ThreadInfo {
    pub fn new(thread_id: usize, num_threads: usize, cpu_info: CpuInfo) -> Self {
        Self {
            thread_id,
            num_threads,
            cpu_info,
        }
    }
}

/// Operand and result locations of a GEMM, in elements.
pub struct GemmArrays<To, Tout> {
    pub a: *const To,
    pub lda: usize,
    pub a_batch_stride: usize,
    pub a_multi_stride: usize,
    pub b: *const To,
    pub ldb: usize,
    pub b_multi_stride: usize,
    pub c: *mut Tout,
    pub ldc: usize,
    pub c_batch_stride: usize,
    pub c_multi_stride: usize,
}

impl<To, Tout> GemmArrays<To, Tout> {
    pub fn new(a: *const To, lda: usize, b: *const To, ldb: usize, c: *mut Tout, ldc: usize) -> Self {
        Self {
            a,
            lda,
            a_batch_stride: 0,
            a_multi_stride: 0,
            b,
            ldb,
            b_multi_stride: 0,
            c,
            ldc,
            c_batch_stride: 0,
            c_multi_stride: 0,
        }
    }

    pub fn a_strides(mut self, batch: usize, multi: usize) -> Self {
        self.a_batch_stride = batch;
        self.a_multi_stride = multi;
        self
    }

    pub fn b_multi_stride(mut self, multi: usize) -> Self {
        self.b_multi_stride = multi;
        self
    }

    pub fn c_strides(mut self, batch: usize, multi: usize) -> Self {
        self.c_batch_stride = batch;
        self.c_multi_stride = multi;
        self
    }

    pub fn is_set(&self) -> bool {
        !self.a.is_null() && !self.c.is_null()
    }

    #[inline]
    pub(crate) unsafe fn a_at(&self, multi: usize, batch: usize) -> *const To {
        self.a
            .add(multi * self.a_multi_stride + batch * self.a_batch_stride)
    }

    #[inline]
    pub(crate) unsafe fn b_at(&self, multi: usize) -> *const To {
        self.b.add(multi * self.b_multi_stride)
    }

    #[inline]
    pub(crate) unsafe fn c_at(&self, multi: usize, batch: usize) -> *mut Tout {
        self.c
            .add(multi * self.c_multi_stride + batch * self.c_batch_stride)
    }
}

impl<To, Tout> Default for GemmArrays<To, Tout> {
    fn default() -> Self {
        Self::new(std::ptr::null(), 0, std::ptr::null(), 0, std::ptr::null_mut(), 0)
    }
}

impl<To, Tout> Clone for GemmArrays<To, Tout> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<To, Tout> Copy for GemmArrays<To, Tout> {}

impl<To, Tout> std::fmt::Debug for GemmArrays<To, Tout> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GemmArrays")
            .field("a", &self.a)
            .field("lda", &self.lda)
            .field("b", &self.b)
            .field("ldb", &self.ldb)
            .field("c", &self.c)
            .field("ldc", &self.ldc)
            .finish()
    }
}

// Disjoint row ranges of C are written from different threads; A and B are read only.
unsafe impl<To: Sync, Tout: Send> Send for GemmArrays<To, Tout> {}
unsafe impl<To: Sync, Tout: Send> Sync for GemmArrays<To, Tout> {}

/// Interface of every configured GEMM.
///
/// The `unsafe` setters hand raw memory to the driver; the caller
/// guarantees it stays valid, and is not otherwise written, for as long as
/// the driver may execute.
pub trait GemmCommon<To, Tout>: Send + Sync {
    /// Set operand and result locations.
    ///
    /// # Safety
    /// Every pointer must be valid for the problem described by the
    /// driver's arguments and the given strides.
    unsafe fn set_arrays(&mut self, arrays: GemmArrays<To, Tout>);

    /// Size of the stage 0 window.
    fn get_window_size(&self) -> usize {
        self.stage_window(0)
    }

    /// Number of stages separated by barriers.
    fn num_stages(&self) -> usize {
        1
    }

    /// Linear size of the window of `stage`.
    fn stage_window(&self, stage: usize) -> usize;

    /// Every range handed to `execute_stage` must start on a multiple of this.
    fn stage_granule(&self, _stage: usize) -> usize {
        1
    }

    /// Run `range` of `stage`.
    ///
    /// Panics if the range lies outside the stage window, does not start
    /// on a granule boundary, or required memory has not been set.
    fn execute_stage(&self, stage: usize, range: Range<usize>, info: &ThreadInfo);

    /// Run `range` of the first stage.
    fn execute(&self, range: Range<usize>, info: &ThreadInfo) {
        self.execute_stage(0, range, info)
    }

    /// Limit the number of workers that will execute this GEMM.
    fn set_nthreads(&mut self, nthreads: usize);

    /// Number of workers this GEMM is set up for.
    fn num_threads(&self) -> usize;

    /// Bytes of working space required, including alignment slack.
    fn get_working_size(&self) -> usize {
        0
    }

    /// Provide working space of at least `get_working_size()` bytes.
    ///
    /// # Safety
    /// `ws` must be valid for `get_working_size()` bytes.
    unsafe fn set_working_space(&mut self, _ws: *mut u8) {}

    /// Whether B is read from a pretransposed buffer.
    fn b_is_pretransposed(&self) -> bool {
        false
    }

    /// Whether `pretranspose_b_array` must run before execution.
    fn b_pretranspose_required(&self) -> bool {
        false
    }

    /// Bytes needed for the pretransposed B buffer, including alignment slack.
    fn get_b_pretransposed_array_size(&self) -> usize {
        0
    }

    /// Pack B into `buf`.
    ///
    /// # Safety
    /// `buf` must be valid for `get_b_pretransposed_array_size()` bytes and
    /// `b` for every multi of a `k x n` matrix at `ldb` / `b_multi_stride`.
    unsafe fn pretranspose_b_array(
        &mut self,
        _buf: *mut u8,
        _b: *const To,
        _ldb: usize,
        _b_multi_stride: usize,
    ) {
    }

    /// Use a buffer previously filled by `pretranspose_b_array`.
    ///
    /// # Safety
    /// `buf` must be the same pointer passed to `pretranspose_b_array`.
    unsafe fn set_pretransposed_b_data(&mut self, _buf: *mut u8) {}

    /// Per-column int32 bias added before requantization.
    ///
    /// # Safety
    /// `bias` must be valid for `n` elements per multi at `bias_multi_stride`.
    unsafe fn set_quantized_bias(&mut self, _bias: *const i32, _bias_multi_stride: usize) {}

    /// Block sizes in use, if the driver blocks at all.
    fn block_sizes(&self) -> Option<BlockSizes> {
        None
    }
}

/// Raw pointer shared between workers.
pub(crate) struct SyncPtr<T>(pub *mut T);

impl<T> SyncPtr<T> {
    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl<T> Clone for SyncPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SyncPtr<T> {}

unsafe impl<T> Send for SyncPtr<T> {}
unsafe impl<T> Sync for SyncPtr<T> {}

/// Round `ptr` up to [`WORKSPACE_ALIGNMENT`].
pub(crate) fn align_workspace(ptr: *mut u8) -> *mut u8 {
    let offset = ptr.align_offset(WORKSPACE_ALIGNMENT);
    ptr.wrapping_add(offset)
}

/// Bytes for `elems` values of `T`, rounded up to the workspace alignment.
pub(crate) fn aligned_bytes<T>(elems: usize) -> usize {
    roundup(elems * std::mem::size_of::<T>(), WORKSPACE_ALIGNMENT)
}

/// Window over `[m_round rows, batches, multis]`, empty for degenerate problems.
pub(crate) fn row_window(args: &GemmArgs, m_round: usize) -> NdRange<3> {
    if args.is_degenerate() {
        NdRange::new([0, 0, 0])
    } else {
        NdRange::new([m_round, args.nbatches, args.nmulti])
    }
}

/// Assert the preconditions of `execute_stage` shared by all drivers.
///
/// Both ends must be granule aligned, except that a range may stop at the
/// end of a window that is not itself a multiple of the granule.
pub(crate) fn check_range(range: &Range<usize>, window: usize, granule: usize) {
    assert!(
        range.start <= range.end && range.end <= window,
        "work range {range:?} outside of window of {window}"
    );
    assert!(
        range.start % granule == 0,
        "work range {range:?} does not start on a multiple of {granule}"
    );
    // a ragged end would round the last tile up into rows owned by the next range
    assert!(
        range.end % granule == 0 || range.end == window,
        "work range {range:?} does not end on a multiple of {granule} or the window end"
    );
}

/// Pack every B panel of every multi, in [`BlockWalker`] order.
///
/// # Safety
/// `dst` must hold `pretransposed_b_len * nmulti` elements; `b` must be
/// valid for `nmulti` `k x n` matrices.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn pack_b_panels<T: Element>(
    dst: *mut T,
    b: *const T,
    ldb: usize,
    b_multi_stride: usize,
    trans: Transpose,
    args: &GemmArgs,
    blocks: &BlockSizes,
    shape: TileShape,
) {
    let mut offset = 0;
    for block in BlockWalker::new(args.n, args.k, args.nmulti, blocks) {
        let kern_k = roundup(block.k_len(), shape.k_unroll);
        let src = panel_ptr(
            b.add(block.multi * b_multi_stride),
            block.k0,
            block.x0,
            ldb,
            trans,
        );
        pack_b(
            block.k_len(),
            block.x_len(),
            src,
            ldb,
            trans,
            dst.add(offset),
            shape.out_width,
            kern_k,
        );
        offset += block.packed_len(shape);
    }
}
