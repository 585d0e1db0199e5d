use std::fmt;

use crate::dim::Dim;

/// A point or range selection along one dimension.
///
/// A point slice selects a single index and removes the dimension. A range slice selects
/// ``begin..end`` and keeps the dimension with extent ``end - begin``. Bounds are validated when
/// the slice is applied, against the extent it is applied to.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slice {
    dim: Dim,
    begin: usize,
    end: Option<usize>,
}

impl Slice {
    pub fn point(dim: Dim, index: usize) -> Self {
        Self {
            dim,
            begin: index,
            end: None,
        }
    }

    pub fn range(dim: Dim, begin: usize, end: usize) -> Self {
        Self {
            dim,
            begin,
            end: Some(end),
        }
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    /// End of the range, or ``None`` for a point slice
    pub fn end(&self) -> Option<usize> {
        self.end
    }

    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// Whether this slice is valid for a dimension of the given extent
    ///
    pub fn fits(&self, extent: usize) -> bool {
        match self.end {
            None => self.begin < extent,
            Some(end) => self.begin <= end && end <= extent,
        }
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            None => write!(f, "Slice({}, {})", self.dim, self.begin),
            Some(end) => write!(f, "Slice({}, {}, {})", self.dim, self.begin, end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point() {
        let slice = Slice::point(Dim::X, 3);
        assert_eq!(slice.dim(), Dim::X);
        assert_eq!(slice.begin(), 3);
        assert_eq!(slice.end(), None);
        assert!(!slice.is_range());
        assert!(slice.fits(4));
        assert!(!slice.fits(3));
        assert_eq!(format!("{slice}"), "Slice(x, 3)");
    }

    #[test]
    fn test_range() {
        let slice = Slice::range(Dim::Y, 1, 3);
        assert!(slice.is_range());
        assert_eq!(slice.end(), Some(3));
        assert!(slice.fits(3));
        assert!(!slice.fits(2));
        assert!(Slice::range(Dim::Y, 2, 2).fits(2));
        assert!(!Slice::range(Dim::Y, 2, 1).fits(5));
        assert_eq!(format!("{slice}"), "Slice(y, 1, 3)");
    }

    #[test]
    fn test_equality() {
        assert_eq!(Slice::point(Dim::X, 1), Slice::point(Dim::X, 1));
        assert_ne!(Slice::point(Dim::X, 1), Slice::range(Dim::X, 1, 2));
        assert_ne!(Slice::point(Dim::X, 1), Slice::point(Dim::Y, 1));
    }
}
