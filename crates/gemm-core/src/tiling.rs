use crate::args::GemmConfig;
use crate::cpu::CpuInfo;
use crate::kernel::Strategy;
use std::ops::Range;

/// Integer ceiling division.
#[inline]
pub const fn iceildiv(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

/// Round `x` up to a multiple of `multiple`.
#[inline]
pub const fn roundup(x: usize, multiple: usize) -> usize {
    x.div_ceil(multiple) * multiple
}

/// Output tile shape of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    /// Columns of C produced per kernel call.
    pub out_width: usize,
    /// Rows of C produced per kernel call.
    pub out_height: usize,
    /// Granularity of the K loop.
    pub k_unroll: usize,
}

impl TileShape {
    pub const fn new(out_width: usize, out_height: usize, k_unroll: usize) -> Self {
        Self {
            out_width,
            out_height,
            k_unroll,
        }
    }

    /// Validate that the shape can drive blocking.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.out_width == 0 || self.out_height == 0 {
            return Err("out_width and out_height must be non-zero");
        }
        if self.k_unroll == 0 {
            return Err("k_unroll must be non-zero");
        }
        Ok(())
    }
}

/// Cache blocking parameters for one configured GEMM.
///
/// `k_block` is a positive multiple of the strategy's `k_unroll`,
/// `x_block` a positive multiple of its `out_width`, and `m_round` is
/// `M` rounded up to a multiple of `out_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSizes {
    pub k_block: usize,
    pub x_block: usize,
    pub m_round: usize,
    pub strategy_out_height: usize,
}

impl BlockSizes {
    /// Number of K blocks needed to cover `k`.
    pub fn num_k_blocks(&self, k: usize) -> usize {
        iceildiv(k, self.k_block)
    }

    /// Number of column blocks needed to cover `n`.
    pub fn num_x_blocks(&self, n: usize) -> usize {
        iceildiv(n, self.x_block)
    }

    /// Apply the block size overrides of `cfg`, keeping both sizes aligned to `shape`.
    pub fn with_config(mut self, cfg: &GemmConfig, shape: TileShape) -> Self {
        if cfg.inner_block_size > 0 {
            self.k_block = roundup(cfg.inner_block_size, shape.k_unroll.max(1));
        }
        if cfg.outer_block_size > 0 {
            self.x_block = roundup(cfg.outer_block_size, shape.out_width.max(1));
        }
        self
    }
}

/// Compute block sizes for strategy `S`.
///
/// See [`calculate_block_sizes_for`].
pub fn calculate_block_sizes<S: Strategy>(ci: &CpuInfo, m: usize, n: usize, k: usize) -> BlockSizes {
    calculate_block_sizes_for(
        ci,
        m,
        n,
        k,
        S::shape(),
        std::mem::size_of::<S::OperandType>(),
    )
}

/// Compute cache-friendly block sizes.
///
/// One k-block of a tile's operands fits in half of L1 and one x-block
/// panel of B fits in 90% of L2 once a tile's worth of A and B rows is
/// reserved. Both sizes are then evened out across the blocks needed to
/// cover the dimension, so the last block is not a sliver.
///
/// Degenerate dimensions are legal and produce one unroll unit / one tile.
/// When the L2 reserve alone exceeds the budget, `x_block` is one tile.
pub fn calculate_block_sizes_for(
    ci: &CpuInfo,
    m: usize,
    n: usize,
    k: usize,
    shape: TileShape,
    elem_size: usize,
) -> BlockSizes {
    let width = shape.out_width.max(1);
    let height = shape.out_height.max(1);
    let unroll = shape.k_unroll.max(1);
    let elem_size = elem_size.max(1);

    // K: half of L1 for the larger tile edge
    let mut k_block = (ci.l1_cache_size() / 2) / (elem_size * width.max(height));
    k_block = (k_block / unroll).max(1) * unroll;

    let num_k_blocks = iceildiv(k, k_block).max(1);
    k_block = roundup(iceildiv(k, num_k_blocks), unroll).max(unroll);

    // N: 90% of L2 after one tile's worth of A and B rows
    let budget = (ci.l2_cache_size() * 9) / 10;
    let reserve = k_block * elem_size * (width + height);
    let mut x_block = budget.saturating_sub(reserve) / (elem_size * k_block);
    x_block = (x_block / width).max(1) * width;

    let num_x_blocks = iceildiv(n, x_block).max(1);
    x_block = roundup(iceildiv(n, num_x_blocks), width).max(width);

    BlockSizes {
        k_block,
        x_block,
        m_round: roundup(m, height),
        strategy_out_height: height,
    }
}

/// Split `0..total` into consecutive ranges of `block` elements, the last one ragged.
///
/// Panics if `block` is zero.
pub fn block_ranges(total: usize, block: usize) -> impl Iterator<Item = Range<usize>> {
    assert!(block > 0, "block size must be non-zero");
    (0..total).step_by(block).map(move |start| start..(start + block).min(total))
}

/// One B panel visited by [`BlockWalker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelBlock {
    pub multi: usize,
    pub k0: usize,
    pub kmax: usize,
    pub x0: usize,
    pub xmax: usize,
    /// First panel of a new k-block (or multi).
    pub new_k_block: bool,
}

impl PanelBlock {
    pub fn k_len(&self) -> usize {
        self.kmax - self.k0
    }

    pub fn x_len(&self) -> usize {
        self.xmax - self.x0
    }

    /// Elements of this panel once packed and padded to `shape`.
    pub fn packed_len(&self, shape: TileShape) -> usize {
        roundup(self.x_len(), shape.out_width) * roundup(self.k_len(), shape.k_unroll)
    }
}

/// Walks B panels with columns fastest, then k-blocks, then multis.
///
/// Packing and consumption of pretransposed B both follow this order, so
/// a running offset is enough to locate any panel.
#[derive(Debug, Clone)]
pub struct BlockWalker {
    n: usize,
    k: usize,
    nmulti: usize,
    x_block: usize,
    k_block: usize,
    x0: usize,
    k0: usize,
    multi: usize,
}

impl BlockWalker {
    pub fn new(n: usize, k: usize, nmulti: usize, blocks: &BlockSizes) -> Self {
        Self::over_multis(n, k, 0..nmulti, blocks)
    }

    /// Walk only the panels of multis in `multis`.
    pub fn over_multis(
        n: usize,
        k: usize,
        multis: std::ops::Range<usize>,
        blocks: &BlockSizes,
    ) -> Self {
        assert!(blocks.x_block > 0 && blocks.k_block > 0);
        Self {
            n,
            k,
            nmulti: multis.end,
            x_block: blocks.x_block,
            k_block: blocks.k_block,
            x0: 0,
            k0: 0,
            multi: multis.start,
        }
    }
}

impl Iterator for BlockWalker {
    type Item = PanelBlock;

    fn next(&mut self) -> Option<PanelBlock> {
        if self.multi >= self.nmulti || self.n == 0 || self.k == 0 {
            return None;
        }

        let block = PanelBlock {
            multi: self.multi,
            k0: self.k0,
            kmax: (self.k0 + self.k_block).min(self.k),
            x0: self.x0,
            xmax: (self.x0 + self.x_block).min(self.n),
            new_k_block: self.x0 == 0,
        };

        self.x0 += self.x_block;
        if self.x0 >= self.n {
            self.x0 = 0;
            self.k0 += self.k_block;
            if self.k0 >= self.k {
                self.k0 = 0;
                self.multi += 1;
            }
        }

        Some(block)
    }
}

/// Elements needed to hold B for one multi, packed panel by panel.
pub fn pretransposed_b_len(n: usize, k: usize, blocks: &BlockSizes, shape: TileShape) -> usize {
    BlockWalker::new(n, k, 1, blocks)
        .map(|b| b.packed_len(shape))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ci(l1: usize, l2: usize) -> CpuInfo {
        CpuInfo::generic().with_l1_cache_size(l1).with_l2_cache_size(l2)
    }

    #[test]
    fn test_roundup() {
        assert_eq!(roundup(0, 4), 0);
        assert_eq!(roundup(1, 4), 4);
        assert_eq!(roundup(8, 4), 8);
        assert_eq!(iceildiv(10, 4), 3);
    }

    #[test]
    fn test_block_sizes_reference_shape() {
        let shape = TileShape::new(16, 4, 4);
        let bs = calculate_block_sizes_for(&ci(32768, 2097152), 100, 64, 256, shape, 4);

        assert_eq!(bs.k_block, 256);
        assert_eq!(bs.x_block, 64);
        assert_eq!(bs.m_round, 100);
        assert_eq!(bs.strategy_out_height, 4);
    }

    #[test]
    fn test_k_block_evened_out() {
        // 2 * 256 would leave a sliver of 1; evened out to two blocks of 132
        let shape = TileShape::new(16, 4, 4);
        let bs = calculate_block_sizes_for(&ci(32768, 2097152), 8, 8, 257, shape, 4);
        assert_eq!(bs.k_block, 132);
        assert_eq!(bs.num_k_blocks(257), 2);
    }

    #[test]
    fn test_x_block_evened_out() {
        // x_raw = 1808 for this cache; 2000 columns -> 2 blocks of 1008
        let shape = TileShape::new(16, 4, 4);
        let bs = calculate_block_sizes_for(&ci(32768, 2097152), 8, 2000, 256, shape, 4);
        assert_eq!(bs.x_block, 1008);
        assert_eq!(bs.num_x_blocks(2000), 2);
    }

    #[test]
    fn test_block_sizes_invariants() {
        let shapes = [
            TileShape::new(12, 8, 1),
            TileShape::new(16, 4, 4),
            TileShape::new(16, 6, 1),
            TileShape::new(24, 8, 8),
            TileShape::new(1, 8, 1),
        ];
        let dims = [1, 3, 7, 64, 100, 1000, 4097];
        let caches = [ci(32768, 2097152), ci(65536, 524288), ci(4096, 16384)];

        for cpu in &caches {
            for shape in shapes {
                for &m in &dims {
                    for &n in &dims {
                        for &k in &dims {
                            let bs = calculate_block_sizes_for(cpu, m, n, k, shape, 4);
                            assert_eq!(bs.k_block % shape.k_unroll, 0);
                            assert_eq!(bs.x_block % shape.out_width, 0);
                            assert!(bs.k_block >= shape.k_unroll);
                            assert!(bs.x_block >= shape.out_width);
                            assert!(bs.m_round >= m);
                            assert_eq!(bs.m_round % shape.out_height, 0);
                            assert!(bs.m_round < m + shape.out_height);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_block_sizes_idempotent() {
        let shape = TileShape::new(12, 8, 1);
        let cpu = ci(65536, 1048576);
        let a = calculate_block_sizes_for(&cpu, 333, 517, 1234, shape, 4);
        let b = calculate_block_sizes_for(&cpu, 333, 517, 1234, shape, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_block_sizes_degenerate() {
        let shape = TileShape::new(16, 4, 4);
        let bs = calculate_block_sizes_for(&ci(32768, 2097152), 0, 0, 0, shape, 4);
        assert_eq!(bs.k_block, 4);
        assert_eq!(bs.x_block, 16);
        assert_eq!(bs.m_round, 0);
    }

    #[test]
    fn test_x_block_clamped_when_l2_exhausted() {
        // reserve of 8 * 4 * 128 bytes exceeds 90% of a 1 KiB L2
        let shape = TileShape::new(64, 64, 8);
        let bs = calculate_block_sizes_for(&ci(1024, 1024), 10, 200, 100, shape, 4);
        assert_eq!(bs.k_block, 8);
        assert_eq!(bs.x_block, 64);
    }

    #[test]
    fn test_zero_element_size_does_not_divide_by_zero() {
        let shape = TileShape::new(4, 4, 1);
        let bs = calculate_block_sizes_for(&ci(32768, 262144), 4, 4, 4, shape, 0);
        assert!(bs.k_block >= 1);
    }

    #[test]
    fn test_with_config() {
        let shape = TileShape::new(16, 4, 4);
        let bs = calculate_block_sizes_for(&ci(32768, 2097152), 100, 64, 256, shape, 4);

        let cfg = GemmConfig::default().block_sizes(10, 50);
        let forced = bs.with_config(&cfg, shape);
        assert_eq!(forced.k_block, 12);
        assert_eq!(forced.x_block, 64);
        assert_eq!(forced.m_round, bs.m_round);

        assert_eq!(bs.with_config(&GemmConfig::default(), shape), bs);
    }

    #[test]
    fn test_tile_shape_validate() {
        assert!(TileShape::new(16, 4, 4).validate().is_ok());
        assert_eq!(
            TileShape::new(0, 4, 4).validate(),
            Err("out_width and out_height must be non-zero")
        );
        assert_eq!(
            TileShape::new(4, 4, 0).validate(),
            Err("k_unroll must be non-zero")
        );
    }

    #[test]
    fn test_block_ranges() {
        let k: Vec<_> = block_ranges(10, 4).collect();
        assert_eq!(k, vec![0..4, 4..8, 8..10]);
        assert_eq!(block_ranges(8, 4).count(), 2);
        assert_eq!(block_ranges(0, 4).count(), 0);
    }

    #[test]
    fn test_block_ranges_follow_block_sizes() {
        let blocks = BlockSizes {
            k_block: 8,
            x_block: 12,
            m_round: 4,
            strategy_out_height: 4,
        };
        let xs: Vec<_> = block_ranges(30, blocks.x_block).map(|r| r.len()).collect();
        assert_eq!(xs, vec![12, 12, 6]);
        assert!(block_ranges(30, blocks.x_block).all(|r| r.start % blocks.x_block == 0));
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_block_ranges_zero_block() {
        let _ = block_ranges(4, 0);
    }

    #[test]
    fn test_block_walker_order() {
        let bs = BlockSizes {
            k_block: 4,
            x_block: 4,
            m_round: 4,
            strategy_out_height: 4,
        };
        let blocks: Vec<_> = BlockWalker::new(10, 7, 2, &bs).collect();
        assert_eq!(blocks.len(), 12);

        let first = blocks[0];
        assert_eq!((first.multi, first.k0, first.x0), (0, 0, 0));
        assert!(first.new_k_block);

        assert_eq!((blocks[2].x0, blocks[2].xmax), (8, 10));
        assert!(!blocks[2].new_k_block);

        assert_eq!((blocks[3].k0, blocks[3].kmax, blocks[3].x0), (4, 7, 0));
        assert!(blocks[3].new_k_block);

        assert_eq!(blocks[6].multi, 1);
        assert!(blocks[6].new_k_block);
    }

    #[test]
    fn test_block_walker_over_multis() {
        let bs = BlockSizes {
            k_block: 8,
            x_block: 8,
            m_round: 8,
            strategy_out_height: 8,
        };
        let multis: Vec<_> = BlockWalker::over_multis(8, 8, 2..3, &bs)
            .map(|b| b.multi)
            .collect();
        assert_eq!(multis, vec![2]);
    }

    #[test]
    fn test_block_walker_degenerate() {
        let bs = BlockSizes {
            k_block: 4,
            x_block: 4,
            m_round: 0,
            strategy_out_height: 4,
        };
        assert_eq!(BlockWalker::new(0, 7, 2, &bs).count(), 0);
        assert_eq!(BlockWalker::new(7, 0, 2, &bs).count(), 0);
    }

    #[test]
    fn test_pretransposed_b_len() {
        let bs = BlockSizes {
            k_block: 4,
            x_block: 4,
            m_round: 4,
            strategy_out_height: 4,
        };
        let shape = TileShape::new(4, 4, 4);
        // 3 column panels x 2 k-blocks, each padded to 4 x 4
        assert_eq!(pretransposed_b_len(10, 7, &bs, shape), 96);
    }
}
