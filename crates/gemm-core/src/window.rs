use std::ops::Range;

/// An N-dimensional iteration space flattened into one linear index.
///
/// Dimension 0 varies fastest. Drivers hand out linear ranges to threads
/// and walk them back as runs along dimension 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange<const D: usize> {
    sizes: [usize; D],
}

impl<const D: usize> NdRange<D> {
    pub fn new(sizes: [usize; D]) -> Self {
        Self { sizes }
    }

    pub fn size(&self, dim: usize) -> usize {
        self.sizes[dim]
    }

    pub fn total_size(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Coordinates of linear index `linear`.
    pub fn coords(&self, mut linear: usize) -> [usize; D] {
        debug_assert!(linear < self.total_size());
        let mut out = [0; D];
        for (c, &size) in out.iter_mut().zip(self.sizes.iter()) {
            *c = linear % size;
            linear /= size;
        }
        out
    }

    /// Runs along dimension 0 covering `range`.
    ///
    /// Panics if `range` reaches past the end of the window.
    pub fn runs(&self, range: Range<usize>) -> Runs<'_, D> {
        assert!(
            range.end <= self.total_size() || range.is_empty(),
            "window range {:?} outside of {} iterations",
            range,
            self.total_size()
        );
        Runs {
            window: self,
            pos: range.start,
            end: range.end,
        }
    }
}

/// A contiguous stretch of dimension 0 at fixed outer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run<const D: usize> {
    /// Coordinates of the first element; `coords[0]` is where the run starts.
    pub coords: [usize; D],
    pub len: usize,
}

impl<const D: usize> Run<D> {
    /// Positions along dimension 0 covered by this run.
    pub fn dim0(&self) -> Range<usize> {
        self.coords[0]..self.coords[0] + self.len
    }
}

pub struct Runs<'a, const D: usize> {
    window: &'a NdRange<D>,
    pos: usize,
    end: usize,
}

impl<const D: usize> Iterator for Runs<'_, D> {
    type Item = Run<D>;

    fn next(&mut self) -> Option<Run<D>> {
        if self.pos >= self.end {
            return None;
        }
        let coords = self.window.coords(self.pos);
        let len = (self.window.sizes[0] - coords[0]).min(self.end - self.pos);
        self.pos += len;
        Some(Run { coords, len })
    }
}
