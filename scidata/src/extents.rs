use std::collections::HashMap;

use crate::{
    dim::Dim,
    dimensions::Dimensions,
    errors::{Error, Result},
};

/// What is known about the extent of one dimension of a dataset.
///
/// A coordinate alone cannot tell whether it holds one value per element or bin edges, so the
/// first coordinate written to an otherwise unseen dimension leaves its extent pending. Data, or a
/// second coordinate differing by one, settles it.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extent {
    Known(usize),

    /// Set by a coordinate only. The true extent is either this value or one less.
    PendingFromEdge(usize),
}

impl Extent {
    pub fn value(&self) -> usize {
        match self {
            Extent::Known(extent) | Extent::PendingFromEdge(extent) => *extent,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Extent::Known(_))
    }
}

/// Shared per-dimension extents of a dataset
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ExtentTable {
    extents: HashMap<Dim, Extent>,
}

impl ExtentTable {
    pub(crate) fn get(&self, dim: Dim) -> Option<Extent> {
        self.extents.get(&dim).copied()
    }

    pub(crate) fn contains(&self, dim: Dim) -> bool {
        self.extents.contains_key(&dim)
    }

    /// Extent of every dimension, pending ones included
    ///
    pub(crate) fn dimensions(&self) -> HashMap<Dim, usize> {
        self.extents
            .iter()
            .map(|(dim, extent)| (*dim, extent.value()))
            .collect()
    }

    /// Record that a data array (``is_coord == false``) or a coordinate (``is_coord == true``)
    /// has ``extent`` along ``dim``.
    ///
    pub(crate) fn set_extent(&mut self, dim: Dim, extent: usize, is_coord: bool) -> Result<()> {
        let mut current = match self.extents.get(&dim) {
            None => {
                let initial = if is_coord {
                    Extent::PendingFromEdge(extent)
                } else {
                    Extent::Known(extent)
                };
                self.extents.insert(dim, initial);
                return Ok(());
            }
            Some(current) => *current,
        };

        let value = current.value();
        if (extent == value && !is_coord) || (extent == value + 1 && is_coord) {
            current = Extent::Known(value);
        }
        if let Extent::PendingFromEdge(pending) = current {
            if extent + 1 == pending {
                current = Extent::Known(extent);
            }
        }

        let value = current.value();
        if extent != value && !(is_coord && extent == value + 1) {
            return Err(Error::Dimension(format!(
                "Mismatch in dimension extents for {dim}: dataset has {value}, got {extent}."
            )));
        }
        self.extents.insert(dim, current);

        Ok(())
    }

    /// Record all dimensions of ``dims``. ``coord_dim`` is the dimension along which the
    /// variable is a coordinate, if any. Nothing is recorded unless every dimension fits.
    ///
    pub(crate) fn set_dims(&mut self, dims: &Dimensions, coord_dim: Option<Dim>) -> Result<()> {
        let mut updated = self.clone();
        for (dim, extent) in dims.iter() {
            updated.set_extent(dim, extent, Some(dim) == coord_dim)?;
        }
        *self = updated;

        Ok(())
    }
}
