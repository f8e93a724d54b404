//! Tensor metadata and bounds-checked views for the operator layer.
//!
//! Shapes list dimensions innermost first: `x` is the column index of a
//! matrix, `y` its row, and higher dimensions stack matrices.

use crate::error::{GemmError, Result};
use gemm_types::{DataType, Element};

/// Maximum number of tensor dimensions.
pub const MAX_DIMS: usize = 6;

/// Tensor dimensions, innermost first. Unused dimensions are 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorShape {
    dims: [usize; MAX_DIMS],
    num_dims: usize,
}

impl TensorShape {
    /// # Panics
    /// Panics with more than [`MAX_DIMS`] dimensions.
    pub fn new(dims: &[usize]) -> Self {
        assert!(dims.len() <= MAX_DIMS, "at most {MAX_DIMS} dimensions are supported");
        let mut all = [1; MAX_DIMS];
        all[..dims.len()].copy_from_slice(dims);
        Self {
            dims: all,
            num_dims: dims.len(),
        }
    }

    pub fn x(&self) -> usize {
        self.dims[0]
    }

    pub fn y(&self) -> usize {
        self.dims[1]
    }

    pub fn z(&self) -> usize {
        self.dims[2]
    }

    /// Size of dimension `dim`, 1 past the last dimension.
    pub fn dim(&self, dim: usize) -> usize {
        self.dims.get(dim).copied().unwrap_or(1)
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dims
    }

    pub fn total_size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Product of dimensions `dim` and above.
    pub fn total_size_upper(&self, dim: usize) -> usize {
        self.dims.iter().skip(dim).product()
    }

    /// Product of dimensions below `dim`.
    pub fn total_size_lower(&self, dim: usize) -> usize {
        self.dims.iter().take(dim).product()
    }
}

/// Affine quantization of a tensor: `real = scale * (q - offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuantizationInfo {
    pub scale: f32,
    pub offset: i32,
}

impl QuantizationInfo {
    pub fn new(scale: f32, offset: i32) -> Self {
        Self { scale, offset }
    }
}

/// Shape, element type, strides and quantization of a tensor.
///
/// Strides are in elements. [`TensorInfo::new`] lays dimensions out
/// densely; [`TensorInfo::with_strides`] describes padded storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorInfo {
    shape: TensorShape,
    data_type: DataType,
    strides: [usize; MAX_DIMS],
    quantization: QuantizationInfo,
}

impl TensorInfo {
    pub fn new(shape: TensorShape, data_type: DataType) -> Self {
        let mut strides = [0; MAX_DIMS];
        let mut stride = 1;
        for (s, &d) in strides.iter_mut().zip(shape.dims.iter()) {
            *s = stride;
            stride *= d;
        }
        Self {
            shape,
            data_type,
            strides,
            quantization: QuantizationInfo::default(),
        }
    }

    pub fn with_quantization(mut self, quantization: QuantizationInfo) -> Self {
        self.quantization = quantization;
        self
    }

    /// Override the strides of the leading dimensions.
    pub fn with_strides(mut self, strides: &[usize]) -> Self {
        assert!(strides.len() <= MAX_DIMS, "at most {MAX_DIMS} strides are supported");
        self.strides[..strides.len()].copy_from_slice(strides);
        self
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn stride(&self, dim: usize) -> usize {
        self.strides.get(dim).copied().unwrap_or(0)
    }

    pub fn strides(&self) -> [usize; MAX_DIMS] {
        self.strides
    }

    pub fn quantization(&self) -> QuantizationInfo {
        self.quantization
    }

    /// Elements a buffer must hold to cover every index of this tensor.
    pub fn required_len(&self) -> usize {
        if self.shape.total_size() == 0 {
            return 0;
        }
        1 + self
            .shape
            .dims
            .iter()
            .zip(self.strides.iter())
            .map(|(&d, &s)| (d - 1) * s)
            .sum::<usize>()
    }

    /// Linear offset of `coords`, or `None` when out of bounds.
    pub fn offset_of(&self, coords: &[usize]) -> Option<usize> {
        if coords.len() > MAX_DIMS {
            return None;
        }
        let mut offset = 0;
        for (i, &c) in coords.iter().enumerate() {
            if c >= self.shape.dims[i] {
                return None;
            }
            offset += c * self.strides[i];
        }
        Some(offset)
    }

    fn check_buffer<T: Element>(&self, len: usize) -> Result<()> {
        if T::DATA_TYPE != self.data_type.storage() {
            return Err(GemmError::TypeMismatch {
                expected: self.data_type.storage(),
                found: T::DATA_TYPE,
            });
        }
        let required = self.required_len();
        if len < required {
            return Err(GemmError::OutOfBounds { required, len });
        }
        Ok(())
    }
}

/// An owned tensor.
#[derive(Debug, Clone)]
pub struct Tensor<T: Element> {
    info: TensorInfo,
    data: Vec<T>,
}

impl<T: Element> Tensor<T> {
    /// A zero-filled tensor.
    pub fn new(info: TensorInfo) -> Result<Self> {
        let data = vec![T::zero(); info.required_len()];
        Self::from_vec(info, data)
    }

    pub fn from_vec(info: TensorInfo, data: Vec<T>) -> Result<Self> {
        info.check_buffer::<T>(data.len())?;
        Ok(Self { info, data })
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn view(&self) -> TensorView<'_, T> {
        TensorView {
            info: self.info,
            data: &self.data,
        }
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_, T> {
        TensorViewMut {
            info: self.info,
            data: &mut self.data,
        }
    }
}

/// Read-only view of a tensor's storage.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    info: TensorInfo,
    data: &'a [T],
}

impl<'a, T: Element> TensorView<'a, T> {
    pub fn new(info: TensorInfo, data: &'a [T]) -> Result<Self> {
        info.check_buffer::<T>(data.len())?;
        Ok(Self { info, data })
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    pub fn get(&self, coords: &[usize]) -> Option<T> {
        self.info.offset_of(coords).map(|i| self.data[i])
    }
}

/// Mutable view of a tensor's storage.
#[derive(Debug)]
pub struct TensorViewMut<'a, T> {
    info: TensorInfo,
    data: &'a mut [T],
}

impl<'a, T: Element> TensorViewMut<'a, T> {
    pub fn new(info: TensorInfo, data: &'a mut [T]) -> Result<Self> {
        info.check_buffer::<T>(data.len())?;
        Ok(Self { info, data })
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_mut_ptr()
    }

    pub fn get(&self, coords: &[usize]) -> Option<T> {
        self.info.offset_of(coords).map(|i| self.data[i])
    }

    /// Store `value` at `coords`; returns `false` when out of bounds.
    pub fn set(&mut self, coords: &[usize], value: T) -> bool {
        match self.info.offset_of(coords) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }
}
