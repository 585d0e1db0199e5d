use std::ops::{Index, IndexMut};

use crate::{
    dim::Dim,
    dimensions::Dimensions,
    errors::{Error, Result},
    sizes::NDIM_MAX,
};

/// Per-dimension step, in elements, through the underlying buffer.
///
/// Parallel to the ``Dimensions`` of a variable. A stride of 0 reuses the same element along the
/// whole dimension (broadcast).
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Strides {
    strides: [usize; NDIM_MAX],
    ndim: usize,
}

impl Strides {
    /// Strides of a contiguous buffer laid out outer to inner in the order of ``dims``
    ///
    pub fn contiguous(dims: &Dimensions) -> Self {
        let mut strides = Self {
            strides: [0; NDIM_MAX],
            ndim: dims.ndim(),
        };
        let mut step = 1;
        for i in (0..dims.ndim()).rev() {
            strides.strides[i] = step;
            step *= dims.size(i);
        }

        strides
    }

    pub fn from_slice(strides: &[usize]) -> Result<Self> {
        if strides.len() > NDIM_MAX {
            return Err(Error::Dimension(String::from(
                "Maximum number of allowed dimensions exceeded.",
            )));
        }
        let mut out = Self {
            strides: [0; NDIM_MAX],
            ndim: strides.len(),
        };
        out.strides[..strides.len()].copy_from_slice(strides);

        Ok(out)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.strides[..self.ndim]
    }

    pub fn len(&self) -> usize {
        self.ndim
    }

    pub fn is_empty(&self) -> bool {
        self.ndim == 0
    }

    /// Remove the stride at position ``i``, shifting inner strides outward
    ///
    pub fn erase(&mut self, i: usize) {
        self.strides.copy_within(i + 1..self.ndim, i);
        self.ndim -= 1;
        self.strides[self.ndim] = 0;
    }

    /// Strides for ``dims`` reordered to ``order``, which must be a permutation of ``dims``
    ///
    pub fn transpose(&self, dims: &Dimensions, order: &Dimensions) -> Result<Self> {
        let reordered = order
            .labels()
            .iter()
            .map(|dim| dims.index(*dim).map(|i| self[i]))
            .collect::<Result<Vec<usize>>>()?;

        Self::from_slice(&reordered)
    }

    /// Strides to use when iterating over ``iteration`` dimensions for a variable laid out as
    /// ``dims`` with these strides. Dimensions the variable lacks are broadcast.
    ///
    pub(crate) fn for_iteration(&self, dims: &Dimensions, iteration: &Dimensions) -> Result<Self> {
        let mut out = Self {
            strides: [0; NDIM_MAX],
            ndim: iteration.ndim(),
        };
        for (i, dim) in iteration.labels().iter().enumerate() {
            if let Some(j) = dims.labels().iter().position(|label| label == dim) {
                out.strides[i] = self[j];
            }
        }
        for dim in dims.labels() {
            if !iteration.contains(*dim) {
                return Err(Error::Dimension(format!(
                    "Cannot iterate {dims} over {iteration}: dimension {dim} missing."
                )));
            }
        }

        Ok(out)
    }

    /// Position of ``dim`` among ``dims`` paired with its stride
    ///
    pub(crate) fn of(&self, dims: &Dimensions, dim: Dim) -> Result<(usize, usize)> {
        let i = dims.index(dim)?;

        Ok((i, self[i]))
    }
}

impl Index<usize> for Strides {
    type Output = usize;

    fn index(&self, i: usize) -> &Self::Output {
        &self.as_slice()[i]
    }
}

impl IndexMut<usize> for Strides {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.strides[..self.ndim][i]
    }
}
