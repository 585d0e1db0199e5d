use std::{fmt, ops::Deref};

use crate::{
    dim::Dim,
    errors::{Error, Result},
    sizes::{self, Sizes},
    slice::Slice,
};

/// Dimension labels and extents of an array, outer dimension first.
///
/// Adds volume and memory layout queries to ``Sizes``. Unlike ``Sizes``, equality is sensitive to
/// the order of dimensions since the order defines the default memory layout. Every mutation keeps
/// the volume representable.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct Dimensions {
    sizes: Sizes,
}

impl Dimensions {
    pub fn new(labels: &[Dim], shape: &[usize]) -> Result<Self> {
        if labels.len() != shape.len() {
            return Err(Error::Dimension(format!(
                "Constructing Dimensions: number of dimensions ({}) does not match shape ({}).",
                labels.len(),
                shape.len()
            )));
        }
        let mut dims = Self::default();
        for (dim, extent) in labels.iter().zip(shape) {
            dims.add_inner(*dim, *extent)?;
        }

        Ok(dims)
    }

    /// Build from ``(dim, extent)`` pairs given outer to inner
    ///
    pub fn from_pairs(pairs: &[(Dim, usize)]) -> Result<Self> {
        let mut dims = Self::default();
        for (dim, extent) in pairs {
            dims.add_inner(*dim, *extent)?;
        }

        Ok(dims)
    }

    /// A single dimension
    ///
    pub fn one(dim: Dim, extent: usize) -> Self {
        Self {
            sizes: Sizes::single(dim, extent),
        }
    }

    pub fn sizes(&self) -> &Sizes {
        &self.sizes
    }

    pub fn ndim(&self) -> usize {
        self.sizes.len()
    }

    pub fn shape(&self) -> &[usize] {
        self.sizes.extents()
    }

    /// Number of elements. The volume of zero dimensions is 1.
    ///
    pub fn volume(&self) -> usize {
        self.shape().iter().product()
    }

    /// Label of the dimension at position ``i``
    ///
    pub fn label(&self, i: usize) -> Dim {
        self.labels()[i]
    }

    /// Extent of the dimension at position ``i``
    ///
    pub fn size(&self, i: usize) -> usize {
        self.shape()[i]
    }

    /// The innermost (fastest varying) dimension
    ///
    pub fn inner(&self) -> Option<Dim> {
        self.labels().last().copied()
    }

    /// Number of elements spanned by one step along ``dim`` in a contiguous layout
    ///
    pub fn offset(&self, dim: Dim) -> Result<usize> {
        let i = self.index(dim)?;

        Ok(self.shape()[i + 1..].iter().product())
    }

    /// Add ``dim`` as the new outermost dimension
    ///
    pub fn add(&mut self, dim: Dim, extent: usize) -> Result<()> {
        let mut out = self.sizes;
        out.insert_left(dim, extent)?;
        self.commit(out)
    }

    /// Add ``dim`` as the new innermost dimension
    ///
    pub fn add_inner(&mut self, dim: Dim, extent: usize) -> Result<()> {
        let mut out = self.sizes;
        out.insert_right(dim, extent)?;
        self.commit(out)
    }

    pub fn resize(&mut self, dim: Dim, extent: usize) -> Result<()> {
        let mut out = self.sizes;
        out.resize(dim, extent)?;
        self.commit(out)
    }

    pub fn erase(&mut self, dim: Dim) -> Result<()> {
        self.sizes.erase(dim)
    }

    /// Relabel ``from`` as ``to`` in place
    ///
    pub fn rename(&mut self, from: Dim, to: Dim) -> Result<()> {
        self.sizes.replace_key(from, to)
    }

    pub fn slice(&self, slice: &Slice) -> Result<Self> {
        Ok(Self {
            sizes: self.sizes.slice(slice)?,
        })
    }

    /// Whether these dimensions describe a contiguous block inside ``parent``.
    ///
    /// The labels must be the innermost labels of ``parent`` in the same order, with equal extents
    /// except for the outermost one, which may be shorter.
    ///
    pub fn is_contiguous_in(&self, parent: &Dimensions) -> bool {
        if parent == self {
            return true;
        }
        if self.ndim() > parent.ndim() {
            return false;
        }

        let skip = parent.ndim() - self.ndim();
        self.sizes.iter().enumerate().all(|(i, (dim, extent))| {
            let parent_dim = parent.label(skip + i);
            let parent_extent = parent.size(skip + i);
            if i == 0 {
                parent_dim == dim && parent_extent >= extent
            } else {
                parent_dim == dim && parent_extent == extent
            }
        })
    }

    fn commit(&mut self, sizes: Sizes) -> Result<()> {
        let overflows = sizes
            .extents()
            .iter()
            .try_fold(1usize, |volume, extent| volume.checked_mul(*extent))
            .is_none();
        if overflows {
            return Err(Error::Dimension(format!("Volume of {sizes} overflows.")));
        }
        self.sizes = sizes;

        Ok(())
    }
}

impl Deref for Dimensions {
    type Target = Sizes;

    fn deref(&self) -> &Self::Target {
        &self.sizes
    }
}

impl PartialEq for Dimensions {
    fn eq(&self, other: &Self) -> bool {
        self.labels() == other.labels() && self.shape() == other.shape()
    }
}

impl Eq for Dimensions {}

impl From<Dimensions> for Sizes {
    fn from(dims: Dimensions) -> Self {
        dims.sizes
    }
}

impl TryFrom<Sizes> for Dimensions {
    type Error = Error;

    fn try_from(sizes: Sizes) -> Result<Self> {
        let mut dims = Dimensions::default();
        dims.commit(sizes)?;

        Ok(dims)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dimensions{{")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}: {extent}")?;
        }
        write!(f, "}}")
    }
}

/// Union of ``a`` and ``b``, dimensions of ``a`` first. Shared dimensions must agree in extent.
///
pub fn merge(a: &Dimensions, b: &Dimensions) -> Result<Dimensions> {
    Dimensions::try_from(sizes::merge(a, b)?)
}

/// Dimensions of ``a`` that also appear in ``b``, in the order of ``a``
///
pub fn intersection(a: &Dimensions, b: &Dimensions) -> Result<Dimensions> {
    let mut out = Dimensions::default();
    for (dim, extent) in a.iter() {
        match b.get(dim) {
            Some(other) if other == extent => out.add_inner(dim, extent)?,
            Some(other) => {
                return Err(Error::Dimension(format!(
                    "Inconsistent size for dim {dim}: {extent} vs {other}."
                )))
            }
            None => {}
        }
    }

    Ok(out)
}

/// Reorder ``dims`` to follow ``order``. An empty order reverses the dimensions.
///
pub fn transpose(dims: &Dimensions, order: &[Dim]) -> Result<Dimensions> {
    if order.is_empty() {
        let labels: Vec<Dim> = dims.labels().iter().rev().copied().collect();
        return transpose(dims, &labels);
    }
    if order.len() != dims.ndim() {
        return Err(Error::Dimension(format!(
            "Cannot transpose {dims}: order {order:?} is not a permutation of its labels."
        )));
    }

    let mut out = Dimensions::default();
    for dim in order {
        out.add_inner(*dim, dims.at(*dim)?)?;
    }

    Ok(out)
}

/// Replace ``from_dim`` of ``old`` by the dimensions of ``to``, which must hold the same volume
///
pub fn fold(old: &Dimensions, from_dim: Dim, to: &Dimensions) -> Result<Dimensions> {
    let extent = old.at(from_dim)?;
    if extent != to.volume() {
        return Err(Error::Dimension(format!(
            "Cannot fold {from_dim} of extent {extent} into {to} of volume {}.",
            to.volume()
        )));
    }

    let mut out = Dimensions::default();
    for (dim, extent) in old.iter() {
        if dim == from_dim {
            for (new_dim, new_extent) in to.iter() {
                out.add_inner(new_dim, new_extent)?;
            }
        } else {
            out.add_inner(dim, extent)?;
        }
    }

    Ok(out)
}
