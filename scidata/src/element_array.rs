use std::{ops::Index, sync::Arc};

use ndarray::{ArrayViewD, IxDyn, ShapeBuilder};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::{
    dimensions::Dimensions,
    dtype::{Element, Scalar},
    errors::{Error, Result},
    strides::Strides,
    variable::BufferData,
    view_index::{self, ViewIndex},
};

/// Read access to the elements of a variable, in logical order.
///
/// Holds a shared lock on the buffer for as long as it lives. Mutable access to the same buffer
/// fails with ``Error::Borrowed`` in the meantime.
///
pub struct ElementArrayView<'a, T: Element> {
    data: MappedRwLockReadGuard<'a, [T]>,
    offset: usize,
    dims: Dimensions,
    strides: Strides,
}

impl<'a, T: Element> ElementArrayView<'a, T> {
    pub(crate) fn new(
        data: MappedRwLockReadGuard<'a, [T]>,
        offset: usize,
        dims: Dimensions,
        strides: Strides,
    ) -> Self {
        Self {
            data,
            offset,
            dims,
            strides,
        }
    }

    pub fn len(&self) -> usize {
        self.dims.volume()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        if i < self.len() {
            Some(&self.data[view_index::position(self.offset, &self.dims, &self.strides, i)])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        ViewIndex::new(self.offset, &self.dims, &self.strides).map(move |p| &self.data[p])
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Call ``f`` with a zero-copy ``ndarray`` view of the elements.
    ///
    /// Broadcast dimensions are expressed with ndarray's own broadcasting, so the view never
    /// claims overlapping memory.
    ///
    pub fn with_array_view<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(ArrayViewD<'_, T>) -> R,
    {
        if self.is_empty() {
            let view = ArrayViewD::from_shape(IxDyn(self.dims.shape()), &self.data[..0])?;
            return Ok(f(view));
        }

        let strides = self.strides.as_slice();
        let base_shape: Vec<usize> = self
            .dims
            .shape()
            .iter()
            .zip(strides)
            .map(|(extent, stride)| if *stride == 0 { 1 } else { *extent })
            .collect();
        let base = ArrayViewD::from_shape(
            IxDyn(&base_shape).strides(IxDyn(strides)),
            &self.data[self.offset..],
        )?;
        let view = base.broadcast(IxDyn(self.dims.shape())).ok_or_else(|| {
            Error::Dimension(format!("Cannot express {} as an array view.", self.dims))
        })?;

        Ok(f(view))
    }
}

impl<'a, T: Element> Index<usize> for ElementArrayView<'a, T> {
    type Output = T;

    fn index(&self, i: usize) -> &Self::Output {
        match self.get(i) {
            Some(value) => value,
            None => panic!(
                "Out of bounds: index {i} is out of bounds for array with length {}",
                self.len()
            ),
        }
    }
}

/// Write access to the elements of a variable, in logical order.
///
/// Holds an exclusive lock on the buffer for as long as it lives.
///
pub struct ElementArrayViewMut<'a, T: Element> {
    data: MappedRwLockWriteGuard<'a, [T]>,
    offset: usize,
    dims: Dimensions,
    strides: Strides,
    buffer: Arc<BufferData>,
}

impl<'a, T: Element> ElementArrayViewMut<'a, T> {
    pub(crate) fn new(
        data: MappedRwLockWriteGuard<'a, [T]>,
        offset: usize,
        dims: Dimensions,
        strides: Strides,
        buffer: Arc<BufferData>,
    ) -> Self {
        Self {
            data,
            offset,
            dims,
            strides,
            buffer,
        }
    }

    pub fn len(&self) -> usize {
        self.dims.volume()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        if i < self.len() {
            Some(&self.data[self.position(i)])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        ViewIndex::new(self.offset, &self.dims, &self.strides).map(move |p| &self.data[p])
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Store ``value`` at logical index ``i``
    ///
    pub fn set(&mut self, i: usize, value: T) -> Result<()> {
        if i >= self.len() {
            return Err(Error::Slice(format!(
                "Index {i} is out of range for {} elements.",
                self.len()
            )));
        }
        value.check_nesting(&self.buffer)?;
        let position = self.position(i);
        self.data[position] = value;

        Ok(())
    }

    /// Overwrite all elements, in logical order
    ///
    pub fn copy_from_slice(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::Dimension(format!(
                "Expected {} values, got {}.",
                self.len(),
                values.len()
            )));
        }
        for value in values {
            value.check_nesting(&self.buffer)?;
        }
        let positions = ViewIndex::new(self.offset, &self.dims, &self.strides);
        for (position, value) in positions.zip(values) {
            self.data[position] = value.clone();
        }

        Ok(())
    }

    fn position(&self, i: usize) -> usize {
        view_index::position(self.offset, &self.dims, &self.strides, i)
    }
}

impl<'a, T: Scalar> ElementArrayViewMut<'a, T> {
    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        if i < self.len() {
            let position = self.position(i);
            Some(&mut self.data[position])
        } else {
            None
        }
    }

    /// Transform every element in place
    ///
    pub fn apply<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut T),
    {
        let positions = ViewIndex::new(self.offset, &self.dims, &self.strides);
        for position in positions {
            f(&mut self.data[position]);
        }
    }
}

impl<'a, T: Element> Index<usize> for ElementArrayViewMut<'a, T> {
    type Output = T;

    fn index(&self, i: usize) -> &Self::Output {
        match self.get(i) {
            Some(value) => value,
            None => panic!(
                "Out of bounds: index {i} is out of bounds for array with length {}",
                self.len()
            ),
        }
    }
}
