use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use parking_lot::RwLockReadGuard;

use crate::{
    dim::Dim,
    dimensions::Dimensions,
    dtype::{DType, Element, Values},
    errors::{Error, Result},
    units::Unit,
    variable::Variable,
};

/// Raw memory description of a variable for zero-copy interop with host numeric runtimes.
///
/// Keeps the buffer locked for reading while alive, so the pointer stays valid.
///
pub struct BufferInfo<'a> {
    values: RwLockReadGuard<'a, Values>,
    dtype: DType,
    itemsize: usize,
    offset: usize,
    shape: Vec<usize>,
    strides: Vec<isize>,
    readonly: bool,
}

impl<'a> BufferInfo<'a> {
    /// Address of the first element seen by the variable
    pub fn as_ptr(&self) -> *const u8 {
        self.values
            .as_ptr()
            .wrapping_add(self.offset * self.itemsize)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Strides in bytes
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }
}

impl Variable {
    /// Describe the memory of this variable. Only plain numeric and boolean dtypes can be
    /// exported.
    ///
    pub fn buffer_info(&self) -> Result<BufferInfo<'_>> {
        let itemsize = self.dtype().itemsize().ok_or_else(|| {
            Error::Type(format!(
                "Cannot export buffer of dtype {}.",
                self.dtype()
            ))
        })?;
        let strides = self
            .strides()
            .as_slice()
            .iter()
            .map(|stride| (stride * itemsize) as isize)
            .collect();

        Ok(BufferInfo {
            values: self.buffer_values()?,
            dtype: self.dtype(),
            itemsize,
            offset: self.offset(),
            shape: self.dims().shape().to_vec(),
            strides,
            readonly: self.is_readonly(),
        })
    }

    /// Build a variable from an ``ndarray`` array, labeling its axes with ``labels``.
    ///
    pub fn from_ndarray<T, S, D>(labels: &[Dim], array: &ArrayBase<S, D>, unit: Unit) -> Result<Self>
    where
        T: Element,
        S: Data<Elem = T>,
        D: Dimension,
    {
        let dims = Dimensions::new(labels, array.shape())?;

        Self::with_unit(dims, unit, array.iter().cloned().collect())
    }

    /// Contiguous ``ndarray`` copy of the elements
    ///
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>> {
        let values = self.values::<T>()?.to_vec();

        Ok(ArrayD::from_shape_vec(IxDyn(self.dims().shape()), values)?)
    }
}
